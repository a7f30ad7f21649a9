//! Static SVG charts of the results.
//!
//! Charts are drawn as small multiples: a row of panels sharing one y axis. Only points and
//! polylines are needed, so the SVG is written by hand.
use crate::analysis::{Accumulator, TimeSeriesColumns};
use crate::config::{PlotWindow, SystemKind};
use crate::output::{OutputPaths, read_time_series};
use anyhow::{Context, Result};
use log::{info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const PANEL_WIDTH: f64 = 420.0;
const PANEL_HEIGHT: f64 = 320.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 60.0;
const TICK_COUNT: usize = 5;

/// Colours used for successive series
const PALETTE: [&str; 6] = [
    "#0098a1", "#ef181e", "#39b7bc", "#1e3a8a", "#f59e0b", "#6b7280",
];

/// How a series is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Style {
    /// One dot per point
    Scatter,
    /// Points joined in order
    Line,
}

/// A set of points drawn in one colour
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// Legend entry
    pub label: String,
    /// The points to draw
    pub points: Vec<(f64, f64)>,
    /// How to draw them
    pub style: Style,
}

/// One set of axes
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    /// Title shown above the panel
    pub title: String,
    /// The series drawn in the panel
    pub series: Vec<Series>,
}

/// A chart made of panels sharing a y axis
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    /// Title of the chart
    pub title: String,
    /// Label of the x axes
    pub x_label: String,
    /// Label of the y axis
    pub y_label: String,
    /// The panels, left to right
    pub panels: Vec<Panel>,
}

/// The range of values along an axis
#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    /// The range covering all values, or `[0, 1]` if there are none
    fn covering<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let (min, max) = values
            .into_iter()
            .filter(|value| value.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
                (min.min(value), max.max(value))
            });
        if min > max {
            return Self { min: 0.0, max: 1.0 };
        }
        if min == max {
            return Self {
                min: min - 0.5,
                max: max + 0.5,
            };
        }

        let padding = (max - min) * 0.05;
        Self {
            min: min - padding,
            max: max + padding,
        }
    }

    /// Map a value to the interval `[0, 1]`
    fn fraction(self, value: f64) -> f64 {
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    fn tick(self, i: usize) -> f64 {
        self.min + (self.max - self.min) * i as f64 / TICK_COUNT as f64
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
}

impl Chart {
    /// Write the chart as an SVG file
    pub fn write_svg(&self, file_path: &Path) -> Result<()> {
        let file = File::create(file_path)
            .with_context(|| format!("Could not create {}", file_path.display()))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)
            .with_context(|| format!("Could not write {}", file_path.display()))
    }

    fn write_to<W: Write>(&self, f: &mut W) -> std::io::Result<()> {
        let panel_count = self.panels.len().max(1) as f64;
        let width = panel_count * (PANEL_WIDTH + MARGIN_LEFT + MARGIN_RIGHT);
        let height = PANEL_HEIGHT + MARGIN_TOP + MARGIN_BOTTOM;
        let points = || {
            self.panels
                .iter()
                .flat_map(|panel| &panel.series)
                .flat_map(|series| &series.points)
        };
        let y_range = Range::covering(points().map(|&(_, y)| y));

        writeln!(
            f,
            "<svg xmlns='http://www.w3.org/2000/svg' width='{width}' height='{height}' viewBox='0 0 {width} {height}'>"
        )?;
        writeln!(
            f,
            "<rect x='0' y='0' width='{width}' height='{height}' fill='#ffffff'/>"
        )?;
        writeln!(
            f,
            "<text x='{}' y='24' font-family='sans-serif' font-size='18' fill='#111827'>{}</text>",
            MARGIN_LEFT,
            xml_escape(&self.title)
        )?;
        writeln!(
            f,
            "<text x='16' y='{:.2}' transform='rotate(-90 16 {:.2})' text-anchor='middle' font-family='sans-serif' font-size='13' fill='#374151'>{}</text>",
            MARGIN_TOP + PANEL_HEIGHT / 2.0,
            MARGIN_TOP + PANEL_HEIGHT / 2.0,
            xml_escape(&self.y_label)
        )?;

        for (i, panel) in self.panels.iter().enumerate() {
            let left = i as f64 * (PANEL_WIDTH + MARGIN_LEFT + MARGIN_RIGHT) + MARGIN_LEFT;
            self.write_panel(f, panel, left, y_range)?;
        }

        writeln!(f, "</svg>")?;
        f.flush()
    }

    fn write_panel<W: Write>(
        &self,
        f: &mut W,
        panel: &Panel,
        left: f64,
        y_range: Range,
    ) -> std::io::Result<()> {
        let x_range = Range::covering(
            panel
                .series
                .iter()
                .flat_map(|series| &series.points)
                .map(|&(x, _)| x),
        );
        let bottom = MARGIN_TOP + PANEL_HEIGHT;
        let x_of = |x: f64| left + x_range.fraction(x) * PANEL_WIDTH;
        let y_of = |y: f64| bottom - y_range.fraction(y) * PANEL_HEIGHT;

        writeln!(
            f,
            "<text x='{left:.2}' y='{:.2}' font-family='sans-serif' font-size='14' fill='#111827'>{}</text>",
            MARGIN_TOP - 10.0,
            xml_escape(&panel.title)
        )?;

        // Grid and tick labels
        for i in 0..=TICK_COUNT {
            let x = x_of(x_range.tick(i));
            let y = y_of(y_range.tick(i));
            writeln!(
                f,
                "<line x1='{x:.2}' y1='{MARGIN_TOP:.2}' x2='{x:.2}' y2='{bottom:.2}' stroke='#d1d5db' stroke-width='1'/>"
            )?;
            writeln!(
                f,
                "<text x='{x:.2}' y='{:.2}' text-anchor='middle' font-family='sans-serif' font-size='11' fill='#4b5563'>{:.4}</text>",
                bottom + 16.0,
                x_range.tick(i)
            )?;
            writeln!(
                f,
                "<line x1='{left:.2}' y1='{y:.2}' x2='{:.2}' y2='{y:.2}' stroke='#d1d5db' stroke-width='1'/>",
                left + PANEL_WIDTH
            )?;
            writeln!(
                f,
                "<text x='{:.2}' y='{:.2}' text-anchor='end' font-family='sans-serif' font-size='11' fill='#4b5563'>{:.4}</text>",
                left - 6.0,
                y + 4.0,
                y_range.tick(i)
            )?;
        }
        writeln!(
            f,
            "<text x='{:.2}' y='{:.2}' text-anchor='middle' font-family='sans-serif' font-size='13' fill='#374151'>{}</text>",
            left + PANEL_WIDTH / 2.0,
            bottom + 40.0,
            xml_escape(&self.x_label)
        )?;

        for (i, series) in panel.series.iter().enumerate() {
            let colour = PALETTE[i % PALETTE.len()];
            match series.style {
                Style::Scatter => {
                    for &(x, y) in &series.points {
                        writeln!(
                            f,
                            "<circle cx='{:.2}' cy='{:.2}' r='2' fill='{colour}'/>",
                            x_of(x),
                            y_of(y)
                        )?;
                    }
                }
                Style::Line => {
                    let points: Vec<_> = series
                        .points
                        .iter()
                        .map(|&(x, y)| format!("{:.2},{:.2}", x_of(x), y_of(y)))
                        .collect();
                    writeln!(
                        f,
                        "<polyline points='{}' fill='none' stroke='{colour}' stroke-width='1.5'/>",
                        points.join(" ")
                    )?;
                }
            }

            // Legend
            let legend_y = MARGIN_TOP + 14.0 + 16.0 * i as f64;
            writeln!(
                f,
                "<rect x='{:.2}' y='{:.2}' width='10' height='10' fill='{colour}'/>",
                left + PANEL_WIDTH - 150.0,
                legend_y - 9.0
            )?;
            writeln!(
                f,
                "<text x='{:.2}' y='{legend_y:.2}' font-family='sans-serif' font-size='11' fill='#111827'>{}</text>",
                left + PANEL_WIDTH - 135.0,
                xml_escape(&series.label)
            )?;
        }

        Ok(())
    }
}

/// Pairs of values from two columns, skipping steps where either is undefined
fn paired_points(columns: &TimeSeriesColumns, x: &str, y: &str) -> Option<Vec<(f64, f64)>> {
    let xs = columns.get(x)?;
    let ys = columns.get(y)?;
    Some(
        xs.iter()
            .zip(ys)
            .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
            .collect(),
    )
}

/// Electrical against thermal output of the CHP plant, one panel per scenario
pub fn chp_operating_points(scenarios: &[(usize, TimeSeriesColumns)]) -> Chart {
    let panels = scenarios
        .iter()
        .filter_map(|(scenario, columns)| {
            let points = paired_points(columns, "CHP_01_th", "CHP_01_el")?;
            Some(Panel {
                title: format!("Scenario {scenario}"),
                series: vec![Series {
                    label: "CHP_01".to_string(),
                    points,
                    style: Style::Scatter,
                }],
            })
        })
        .collect();

    Chart {
        title: "CHP operating points".to_string(),
        x_label: "Thermal output in MW_th".to_string(),
        y_label: "Electrical output in MW_el".to_string(),
        panels,
    }
}

/// Each scalar across the scenarios, one panel per scalar
pub fn sensitivity(accumulator: &Accumulator, names: &[&str]) -> Chart {
    let panels = names
        .iter()
        .map(|&name| {
            let points = accumulator
                .rows()
                .iter()
                .zip(accumulator.column(name))
                .filter_map(|((scenario, _), value)| Some((*scenario as f64, value?)))
                .collect();
            Panel {
                title: name.to_string(),
                series: vec![Series {
                    label: name.to_string(),
                    points,
                    style: Style::Line,
                }],
            }
        })
        .collect();

    Chart {
        title: "Results of the parameter variation".to_string(),
        x_label: "Scenario".to_string(),
        y_label: "Value".to_string(),
        panels,
    }
}

/// Time series of the given columns within a window of time steps
pub fn time_series(
    title: &str,
    columns: &TimeSeriesColumns,
    names: &[&str],
    window: Option<PlotWindow>,
) -> Chart {
    let series = names
        .iter()
        .filter_map(|&name| {
            let values = columns.get(name)?;
            let (start, end) = window.map_or((0, values.len()), |window| {
                (window.start, window.end.min(values.len()))
            });
            let points = (start..end)
                .filter_map(|t| Some((t as f64, values[t]?)))
                .collect();
            Some(Series {
                label: name.to_string(),
                points,
                style: Style::Line,
            })
        })
        .collect();

    Chart {
        title: title.to_string(),
        x_label: "Time step".to_string(),
        y_label: "Power".to_string(),
        panels: vec![Panel {
            title: title.to_string(),
            series,
        }],
    }
}

/// The scalars shown in the sensitivity chart
fn sensitivity_names(kind: SystemKind, accumulator: &Accumulator) -> Vec<&str> {
    match kind {
        SystemKind::FlexChpSysopt => vec![
            "CHP_cap_MW_el",
            "TES_cap_MWh",
            "EES_cap_MWh",
            "P2H_cap_MW_th",
            "Boiler_cap_MW_th",
        ],
        SystemKind::FlexChp => vec!["CHP_omega_annual", "gas_consumption_GWh"],
        SystemKind::SolarCooling | SystemKind::SolarCoolingElectric => accumulator
            .columns()
            .into_iter()
            .filter(|name| name.starts_with("invest") || name.starts_with("solar_fraction"))
            .collect(),
    }
}

/// The columns shown in the time series chart
fn time_series_names(kind: SystemKind) -> &'static [&'static str] {
    match kind {
        SystemKind::FlexChp | SystemKind::FlexChpSysopt => {
            &["demand_th", "CHP_01_th", "boiler", "CHP_01_el", "demand_el"]
        }
        SystemKind::SolarCooling => &["collector", "boiler", "excess_thermal", "demand"],
        SystemKind::SolarCoolingElectric => &["pv", "grid_el", "excess_el", "demand"],
    }
}

/// Draw all charts for the scenarios which were run
pub fn make_plots(
    kind: SystemKind,
    paths: &OutputPaths,
    scenarios: &[usize],
    accumulator: &Accumulator,
    window: Option<PlotWindow>,
) -> Result<()> {
    info!("Drawing plots in {}", paths.plots.display());

    let mut time_series_by_scenario = Vec::new();
    for &scenario in scenarios {
        let file_path = paths.time_series_file(scenario);
        if !file_path.is_file() {
            warn!("No time series for scenario {scenario}; was post-processing run?");
            continue;
        }
        time_series_by_scenario.push((scenario, read_time_series(&file_path)?));
    }

    if matches!(kind, SystemKind::FlexChp | SystemKind::FlexChpSysopt) {
        chp_operating_points(&time_series_by_scenario)
            .write_svg(&paths.plots.join("chp_operating_points.svg"))?;
    }
    for (scenario, columns) in &time_series_by_scenario {
        time_series(
            &format!("Scenario {scenario}"),
            columns,
            time_series_names(kind),
            window,
        )
        .write_svg(&paths.plots.join(format!("time_series_{scenario}.svg")))?;
    }
    if !accumulator.is_empty() {
        sensitivity(accumulator, &sensitivity_names(kind, accumulator))
            .write_svg(&paths.plots.join("sensitivity.svg"))?;
    }

    Ok(())
}
