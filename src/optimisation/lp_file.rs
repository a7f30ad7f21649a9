//! Writes a [`LinearProblem`] in CPLEX LP format, for inspecting a model by hand.
use super::{ColumnIndex, LinearProblem};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// The length after which expressions are wrapped onto a new line
const MAX_LINE_LENGTH: usize = 80;

/// Replace characters which are not allowed in LP names
fn sanitise_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "!\"#$%&()/,.;?@_`'{}|~".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn format_bound(value: f64) -> String {
    if value == f64::INFINITY {
        "+inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        value.to_string()
    }
}

/// Format a linear expression, wrapping long lines
fn format_expression(problem: &LinearProblem, terms: &[(ColumnIndex, f64)]) -> String {
    let mut expression = String::new();
    let mut line_length = 0;
    for (column, coefficient) in terms {
        let sign = if *coefficient < 0.0 { '-' } else { '+' };
        let term = format!(
            " {sign} {} {}",
            coefficient.abs(),
            sanitise_name(&problem.columns[*column].name)
        );
        if line_length + term.len() > MAX_LINE_LENGTH {
            expression.push('\n');
            line_length = 0;
        }
        line_length += term.len();
        expression.push_str(&term);
    }

    expression
}

/// Write the problem to `file_path`.
///
/// Rows bounded on both sides are split into a `_lo` and a `_hi` row.
pub fn write_lp(problem: &LinearProblem, file_path: &Path) -> Result<()> {
    let file = File::create(file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    let mut writer = BufWriter::new(file);
    write_sections(problem, &mut writer)
        .with_context(|| format!("Could not write {}", file_path.display()))
}

fn write_sections<W: Write>(problem: &LinearProblem, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "\\ energynet linear program")?;
    writeln!(writer)?;

    writeln!(writer, "Minimize")?;
    let objective: Vec<_> = problem
        .columns
        .iter()
        .enumerate()
        .filter(|(_, column)| column.cost != 0.0)
        .map(|(index, column)| (index, column.cost))
        .collect();
    if objective.is_empty() && !problem.columns.is_empty() {
        writeln!(writer, " obj: 0 {}", sanitise_name(&problem.columns[0].name))?;
    } else {
        writeln!(writer, " obj:{}", format_expression(problem, &objective))?;
    }

    writeln!(writer)?;
    writeln!(writer, "Subject To")?;
    for row in &problem.rows {
        let name = sanitise_name(&row.name);
        let expression = format_expression(problem, &row.terms);
        let has_min = row.min.is_finite();
        let has_max = row.max.is_finite();
        match (has_min, has_max) {
            _ if row.min == row.max => writeln!(writer, " {name}:{expression} = {}", row.min)?,
            (true, true) => {
                writeln!(writer, " {name}_lo:{expression} >= {}", row.min)?;
                writeln!(writer, " {name}_hi:{expression} <= {}", row.max)?;
            }
            (true, false) => writeln!(writer, " {name}:{expression} >= {}", row.min)?,
            (false, true) => writeln!(writer, " {name}:{expression} <= {}", row.max)?,
            (false, false) => {}
        }
    }

    writeln!(writer)?;
    writeln!(writer, "Bounds")?;
    for column in &problem.columns {
        let name = sanitise_name(&column.name);
        if column.min == column.max {
            writeln!(writer, " {name} = {}", column.min)?;
        } else if column.min == f64::NEG_INFINITY && column.max == f64::INFINITY {
            writeln!(writer, " {name} free")?;
        } else {
            writeln!(
                writer,
                " {} <= {name} <= {}",
                format_bound(column.min),
                format_bound(column.max)
            )?;
        }
    }

    writeln!(writer)?;
    writeln!(writer, "End")?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimisation::{at_most, equal_to};
    use rstest::rstest;
    use std::fs;
    use tempfile::tempdir;

    #[rstest]
    #[case("flow(gas,CHP_01,0)", "flow(gas,CHP_01,0)")]
    #[case("content(storage th,1)", "content(storage_th,1)")]
    #[case("a+b-c:d", "a_b_c_d")]
    fn test_sanitise_name(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(sanitise_name(name), expected);
    }

    #[test]
    fn test_write_lp() {
        let mut problem = LinearProblem::default();
        let gas = problem.add_column("flow(gas,boiler,0)".into(), 2.0, 0.0..=f64::INFINITY);
        let heat = problem.add_column("flow(boiler,heat,0)".into(), 0.0, 0.0..=10.0);
        problem.add_row(
            "conversion(boiler,0)".into(),
            equal_to(0.0),
            vec![(heat, 1.0), (gas, -0.9)],
        );
        problem.add_row("limit(boiler)".into(), at_most(8.0), vec![(heat, 1.0)]);
        problem.add_row("range(boiler)".into(), 1.0..=5.0, vec![(gas, 1.0)]);

        let dir = tempdir().unwrap();
        let file_path = dir.path().join("model.lp");
        write_lp(&problem, &file_path).unwrap();
        let contents = fs::read_to_string(&file_path).unwrap();

        let expected = [
            "Minimize",
            " obj: + 2 flow(gas,boiler,0)",
            "Subject To",
            " conversion(boiler,0): + 1 flow(boiler,heat,0) - 0.9 flow(gas,boiler,0) = 0",
            " limit(boiler): + 1 flow(boiler,heat,0) <= 8",
            " range(boiler)_lo: + 1 flow(gas,boiler,0) >= 1",
            " range(boiler)_hi: + 1 flow(gas,boiler,0) <= 5",
            "Bounds",
            " 0 <= flow(gas,boiler,0) <= +inf",
            " 0 <= flow(boiler,heat,0) <= 10",
            "End",
        ];
        let lines: Vec<_> = contents.lines().filter(|line| !line.is_empty()).collect();
        assert_eq!(&lines[1..], expected);
    }
}
