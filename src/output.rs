//! The module responsible for writing output data to disk.
//!
//! All outputs for an experiment live in one folder:
//!
//! ```text
//! <output dir>/
//!     metadata.toml
//!     optimisation_results/
//!         data/<price relationship>/      scalars and full sequences per scenario
//!         dumps/<price relationship>/     solved networks as JSON
//!         log/<price relationship>/       LP files written in debug mode
//!     data_postprocessed/<price relationship>/
//!     plots/
//! ```
//!
//! Files are overwritten on each run.
use crate::analysis::{Accumulator, ScenarioReport, TimeSeriesColumns};
use crate::config::PriceRelationship;
use crate::results::{FlowKey, Results, STORAGE_CONTENT};
use anyhow::{Context, Result, ensure};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The default folder in which experiment-specific output folders are created
pub const DEFAULT_RESULTS_ROOT: &str = "energynet_results";

/// The name of the time column in time series files
const TIME_COLUMN: &str = "time";

/// Get the output folder under `results_root` for the experiment file at `config_path`
pub fn get_output_dir(results_root: &Path, config_path: &Path) -> Result<PathBuf> {
    let experiment_name = config_path
        .file_stem()
        .context("Experiment file has no name")?
        .to_str()
        .context("Invalid chars in experiment file name")?;

    Ok(results_root.join(experiment_name))
}

/// Create a new output directory, if it doesn't already exist.
///
/// Files in an existing directory are overwritten as outputs are written. With `clear` set, the
/// existing directory is emptied first so no files from earlier runs are left behind.
///
/// # Returns
///
/// Whether an existing, non-empty directory was cleared
pub fn create_output_directory(output_dir: &Path, clear: bool) -> Result<bool> {
    let is_non_empty = output_dir.is_dir() && fs::read_dir(output_dir)?.next().is_some();
    if is_non_empty && clear {
        fs::remove_dir_all(output_dir)
            .with_context(|| format!("Could not clear {}", output_dir.display()))?;
    }

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Could not create {}", output_dir.display()))?;

    Ok(is_non_empty && clear)
}

/// The folders results are written to for one price relationship
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    /// The top-level output folder
    pub root: PathBuf,
    /// Scalars and sequences of each scenario
    pub data: PathBuf,
    /// Solved networks
    pub dumps: PathBuf,
    /// LP files
    pub log: PathBuf,
    /// Derived time series and cross-scenario results
    pub postprocessed: PathBuf,
    /// Charts
    pub plots: PathBuf,
}

impl OutputPaths {
    /// The output folders below `root`
    pub fn new(root: &Path, price_relationship: PriceRelationship) -> Self {
        let folder = price_relationship.folder_name();
        let optimisation_results = root.join("optimisation_results");
        Self {
            root: root.to_path_buf(),
            data: optimisation_results.join("data").join(folder),
            dumps: optimisation_results.join("dumps").join(folder),
            log: optimisation_results.join("log").join(folder),
            postprocessed: root.join("data_postprocessed").join(folder),
            plots: root.join("plots"),
        }
    }

    /// Create every folder which doesn't exist yet
    pub fn create(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.data,
            &self.dumps,
            &self.log,
            &self.postprocessed,
            &self.plots,
        ] {
            create_output_directory(dir, false)?;
        }

        Ok(())
    }

    /// The file a scenario's solved network is written to
    pub fn dump_file(&self, filename_dump: &str, scenario: usize) -> PathBuf {
        self.dumps
            .join(format!("{filename_dump}_scenario_{scenario}.json"))
    }

    /// The LP file of a scenario
    pub fn lp_file(&self, scenario: usize) -> PathBuf {
        self.log.join(format!("model_scenario_{scenario}.lp"))
    }

    /// The Graphviz file of a scenario's network
    pub fn graph_file(&self, scenario: usize) -> PathBuf {
        self.log.join(format!("network_scenario_{scenario}.dot"))
    }

    /// The scalars of a scenario
    pub fn scalars_file(&self, scenario: usize) -> PathBuf {
        self.data.join(format!("scalars_{scenario}.csv"))
    }

    /// Every result sequence of a scenario
    pub fn sequences_file(&self, scenario: usize) -> PathBuf {
        self.data.join(format!("sequences_{scenario}.csv"))
    }

    /// The derived time series of a scenario
    pub fn time_series_file(&self, scenario: usize) -> PathBuf {
        self.postprocessed
            .join(format!("time_series_{scenario}.csv"))
    }

    /// The scalars of all scenarios
    pub fn accumulated_file(&self, price_relationship: PriceRelationship) -> PathBuf {
        let suffix = match price_relationship {
            PriceRelationship::Linear => "linear",
            PriceRelationship::Quadratic => "quad",
        };
        self.postprocessed
            .join(format!("sensitivity_results_{suffix}.csv"))
    }
}

/// Format a value for a CSV field, leaving undefined values empty
fn format_field(value: Option<f64>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

/// Parse a CSV field written by [`format_field`]
fn parse_field(field: &str) -> Result<Option<f64>> {
    if field.is_empty() {
        return Ok(None);
    }
    let value = field
        .parse()
        .with_context(|| format!("Invalid number `{field}`"))?;

    Ok(Some(value))
}

/// Write columns of values with a leading time column
fn write_columns(
    file_path: &Path,
    time_index: &[NaiveDateTime],
    columns: &TimeSeriesColumns,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;

    let header = std::iter::once(TIME_COLUMN).chain(columns.keys().map(String::as_str));
    writer.write_record(header)?;
    for (t, time) in time_index.iter().enumerate() {
        let values = columns
            .values()
            .map(|values| format_field(values.get(t).copied().flatten()));
        writer.write_record(std::iter::once(time.to_string()).chain(values))?;
    }
    writer.flush()?;

    Ok(())
}

/// Write the derived time series of a scenario.
///
/// Undefined values (e.g. efficiencies while a plant is idle) are written as empty fields.
pub fn write_time_series(
    file_path: &Path,
    time_index: &[NaiveDateTime],
    report: &ScenarioReport,
) -> Result<()> {
    write_columns(file_path, time_index, &report.time_series)
}

/// Read a file written by [`write_time_series`] or [`write_sequences`]
pub fn read_time_series(file_path: &Path) -> Result<TimeSeriesColumns> {
    let mut reader = csv::Reader::from_path(file_path)
        .with_context(|| format!("Could not open {}", file_path.display()))?;
    let header = reader.headers()?.clone();
    ensure!(
        header.get(0) == Some(TIME_COLUMN),
        "{} does not start with a `{TIME_COLUMN}` column",
        file_path.display()
    );

    let mut columns: TimeSeriesColumns = header
        .iter()
        .skip(1)
        .map(|name| (name.to_string(), Vec::new()))
        .collect();
    for record in reader.records() {
        let record = record.with_context(|| format!("Error reading {}", file_path.display()))?;
        for (field, values) in record.iter().skip(1).zip(columns.values_mut()) {
            values.push(parse_field(field)?);
        }
    }

    Ok(columns)
}

/// The column name used for a result key in the sequences file
fn sequence_column_name(key: &FlowKey) -> String {
    match &key.to {
        Some(_) => key.to_string(),
        None => format!("({}, {STORAGE_CONTENT})", key.from),
    }
}

/// Write every result sequence, one column per key
pub fn write_sequences(
    file_path: &Path,
    time_index: &[NaiveDateTime],
    results: &Results,
) -> Result<()> {
    let columns: TimeSeriesColumns = results
        .iter()
        .map(|(key, result)| {
            (
                sequence_column_name(key),
                result.sequence.iter().copied().map(Some).collect(),
            )
        })
        .collect();

    write_columns(file_path, time_index, &columns)
}

/// Write the scalars of a scenario as `name,value` rows
pub fn write_scalars(file_path: &Path, report: &ScenarioReport) -> Result<()> {
    let mut writer = csv::Writer::from_path(file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    writer.write_record(["name", "value"])?;
    writer.write_record(["id".to_string(), report.scenario.to_string()])?;
    for (name, value) in &report.scalars {
        writer.write_record([name.clone(), format_field(*value)])?;
    }
    writer.flush()?;

    Ok(())
}

/// Read a file written by [`write_scalars`]
pub fn read_scalars(file_path: &Path) -> Result<IndexMap<String, Option<f64>>> {
    let mut reader = csv::Reader::from_path(file_path)
        .with_context(|| format!("Could not open {}", file_path.display()))?;
    let mut scalars = IndexMap::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Error reading {}", file_path.display()))?;
        let name = record.get(0).unwrap_or_default();
        scalars.insert(name.to_string(), parse_field(record.get(1).unwrap_or_default())?);
    }

    Ok(scalars)
}

/// Write the scalars of every scenario run, one row per scenario
pub fn write_accumulated(file_path: &Path, accumulator: &Accumulator) -> Result<()> {
    let mut writer = csv::Writer::from_path(file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))?;
    let columns = accumulator.columns();
    writer.write_record(std::iter::once("id").chain(columns.iter().copied()))?;
    for (scenario, scalars) in accumulator.rows() {
        let values = columns
            .iter()
            .map(|&name| format_field(scalars.get(name).copied().flatten()));
        writer.write_record(std::iter::once(scenario.to_string()).chain(values))?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::sample_results;
    use chrono::NaiveDate;
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};
    use tempfile::tempdir;

    #[fixture]
    fn time_index() -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2018, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..3)
            .map(|hour| start + chrono::TimeDelta::hours(hour))
            .collect()
    }

    #[test]
    fn test_get_output_dir() {
        let output_dir = get_output_dir(
            Path::new(DEFAULT_RESULTS_ROOT),
            Path::new("demos/flex_chp/experiment.yml"),
        )
        .unwrap();
        assert_eq!(output_dir, Path::new("energynet_results/experiment"));

        let output_dir = get_output_dir(Path::new("/tmp/runs"), Path::new("flex_chp")).unwrap();
        assert_eq!(output_dir, Path::new("/tmp/runs/flex_chp"));
    }

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::new(Path::new("out"), PriceRelationship::Quadratic);
        assert_eq!(
            paths.dump_file("flexCHP", 2),
            Path::new(
                "out/optimisation_results/dumps/quadratic_price_relationship/\
                 flexCHP_scenario_2.json"
            )
        );
        assert_eq!(
            paths.accumulated_file(PriceRelationship::Quadratic),
            Path::new("out/data_postprocessed/quadratic_price_relationship/sensitivity_results_quad.csv")
        );

        let dir = tempdir().unwrap();
        let paths = OutputPaths::new(dir.path(), PriceRelationship::Linear);
        paths.create().unwrap();
        assert!(paths.log.is_dir());
        assert!(paths.postprocessed.is_dir());
    }

    #[test]
    fn test_create_output_directory() {
        let dir = tempdir().unwrap();
        let output_dir = dir.path().join("output");
        assert!(!create_output_directory(&output_dir, true).unwrap());
        assert!(output_dir.is_dir());

        let file_path = output_dir.join("old.csv");
        fs::write(&file_path, "stale").unwrap();
        assert!(!create_output_directory(&output_dir, false).unwrap());
        assert!(file_path.is_file());
        assert!(create_output_directory(&output_dir, true).unwrap());
        assert!(!file_path.exists());
    }

    #[rstest]
    fn test_sequences_round_trip(time_index: Vec<NaiveDateTime>, sample_results: Results) {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sequences.csv");
        write_sequences(&file_path, &time_index, &sample_results).unwrap();

        let columns = read_time_series(&file_path).unwrap();
        assert_eq!(columns.len(), sample_results.len());
        for (key, result) in sample_results.iter() {
            let values = &columns[&sequence_column_name(key)];
            for (read, written) in values.iter().zip(&result.sequence) {
                assert_approx_eq!(f64, read.unwrap(), *written);
            }
        }
        assert!(columns.contains_key("(storage_el, storage_content)"));
    }

    #[rstest]
    fn test_time_series_undefined_values(time_index: Vec<NaiveDateTime>) {
        let report = ScenarioReport {
            scenario: 0,
            time_series: [
                ("CHP_eta_el".to_string(), vec![Some(0.4), None, Some(0.1 + 0.2)]),
                ("boiler".to_string(), vec![Some(1.0), Some(2.0), Some(3.0)]),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("time_series.csv");
        write_time_series(&file_path, &time_index, &report).unwrap();

        let contents = fs::read_to_string(&file_path).unwrap();
        assert!(contents.contains("2018-01-01 01:00:00,,2"));
        assert_eq!(read_time_series(&file_path).unwrap(), report.time_series);
    }

    #[test]
    fn test_scalars_round_trip() {
        let report = ScenarioReport {
            scenario: 4,
            scalars: [
                ("TES_cap_MWh".to_string(), Some(1234.5)),
                ("solar_fraction_thermal".to_string(), None),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("scalars.csv");
        write_scalars(&file_path, &report).unwrap();

        let scalars = read_scalars(&file_path).unwrap();
        assert_eq!(scalars["id"], Some(4.0));
        assert_eq!(scalars["TES_cap_MWh"], Some(1234.5));
        assert_eq!(scalars["solar_fraction_thermal"], None);
    }

    #[test]
    fn test_write_accumulated() {
        let mut accumulator = Accumulator::default();
        for (scenario, capacity) in [(0, Some(10.0)), (1, None)] {
            accumulator.push(&ScenarioReport {
                scenario,
                scalars: [("TES_cap_MWh".to_string(), capacity)].into_iter().collect(),
                ..Default::default()
            });
        }
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("sensitivity.csv");
        write_accumulated(&file_path, &accumulator).unwrap();

        let contents = fs::read_to_string(&file_path).unwrap();
        assert_eq!(contents, "id,TES_cap_MWh\n0,10\n1,\n");
    }

    #[test]
    fn test_read_time_series_without_time_column() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.csv");
        fs::write(&file_path, "a,b\n1,2\n").unwrap();
        assert!(read_time_series(&file_path).is_err());
    }
}
