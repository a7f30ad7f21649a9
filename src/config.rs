//! Defines the `ExperimentConfig` struct, which represents the contents of an experiment file.
//!
//! An experiment file is a YAML document saying which energy system to build, where its
//! parameters and time series live, which parameter variations (scenarios) to run and which
//! stages of the pipeline to execute.
use crate::input::{input_err_msg, read_yaml};
use anyhow::{Context, Result, ensure};
use chrono::{NaiveDateTime, TimeDelta};
use serde::Deserialize;
use serde_string_enum::{DeserializeLabeledStringEnum, SerializeLabeledStringEnum};
use std::path::{Path, PathBuf};
use strum::EnumIter;

/// The number of time steps used when running in debug mode
pub const DEBUG_TIME_STEPS: usize = 3;

/// The only solver which is available
const SOLVER_NAME: &str = "highs";

/// The format for `start_date`
const START_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

define_param_default!(default_solver, String, SOLVER_NAME.to_string());
define_param_default!(default_number_of_time_steps, usize, 8760);
define_param_default!(default_start_date, String, "2018-01-01 00:00:00".to_string());
define_param_default!(default_time_step_hours, u32, 1);
define_param_default!(default_true, bool, true);
define_param_default!(default_filename_dump, String, "results".to_string());

/// The hard-coded energy system topologies which can be built
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    DeserializeLabeledStringEnum,
    SerializeLabeledStringEnum,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum SystemKind {
    /// A CHP plant with optional thermal and electrical storage covering fixed demands
    #[string = "flex_chp"]
    FlexChp,
    /// Investment optimisation of a CHP system selling electricity at a fluctuating price
    #[string = "flex_chp_sysopt"]
    FlexChpSysopt,
    /// A solar-driven absorption cooling system
    #[string = "solar_cooling"]
    SolarCooling,
    /// A cooling system with a compression chiller running on PV and grid electricity
    #[string = "solar_cooling_electric"]
    SolarCoolingElectric,
}

/// How the electricity price depends on the (normalised) residual load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceRelationship {
    /// Price proportional to residual load
    Linear,
    /// Price proportional to the square of residual load
    Quadratic,
}

impl PriceRelationship {
    /// The name of the output subfolder for results with this price relationship
    pub fn folder_name(self) -> &'static str {
        match self {
            Self::Linear => "linear_price_relationship",
            Self::Quadratic => "quadratic_price_relationship",
        }
    }
}

/// Input files for the preprocessing stage
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PreprocessingConfig {
    /// Hourly load and renewable generation profiles
    pub load_profiles: PathBuf,
    /// Installed capacities used to project the residual load
    pub load_profile_parameters: PathBuf,
}

/// Range of time steps shown in time series plots (end exclusive)
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct PlotWindow {
    /// First time step to plot
    pub start: usize,
    /// One past the last time step to plot
    pub end: usize,
}

/// Represents the contents of an experiment file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    /// Which energy system to build
    pub system: SystemKind,
    /// Solver to use (only `highs` is available)
    #[serde(default = "default_solver")]
    pub solver: String,
    /// Whether to show the solver's own output
    #[serde(default)]
    pub solver_verbose: bool,
    /// Run a short horizon and write the LP file for every scenario
    #[serde(default)]
    pub debug: bool,
    /// The number of time steps for a full run
    #[serde(default = "default_number_of_time_steps")]
    pub number_of_time_steps: usize,
    /// Timestamp of the first time step
    #[serde(default = "default_start_date")]
    pub start_date: String,
    /// Length of a time step in hours
    #[serde(default = "default_time_step_hours")]
    pub time_step_hours: u32,
    /// Whether to regenerate the demand time series before each scenario
    #[serde(default)]
    pub run_preprocessing: bool,
    /// Whether to build and solve the model
    #[serde(default = "default_true")]
    pub run_model: bool,
    /// Whether to analyse the results
    #[serde(default = "default_true")]
    pub run_postprocessing: bool,
    /// Whether to draw plots after all scenarios have run
    #[serde(default)]
    pub make_plots: bool,
    /// Run only the scenario given by `scenario_number`
    #[serde(default)]
    pub run_single_scenario: bool,
    /// Index into `parameter_variation` of the scenario to run on its own
    #[serde(default)]
    pub scenario_number: usize,
    /// Use a quadratic rather than linear electricity price relationship
    #[serde(default)]
    pub price_el_quadratic: bool,
    /// CSV file with demand and weather time series
    pub demand_time_series: PathBuf,
    /// Base parameter table
    pub parameters_energy_system: PathBuf,
    /// Parameter tables applied on top of the base table, one per scenario
    pub parameter_variation: Vec<PathBuf>,
    /// File stem for result dumps
    #[serde(default = "default_filename_dump")]
    pub filename_dump: String,
    /// Inputs for the preprocessing stage
    #[serde(default)]
    pub preprocessing: Option<PreprocessingConfig>,
    /// Time steps to show in time series plots
    #[serde(default)]
    pub plot_window: Option<PlotWindow>,
}

impl ExperimentConfig {
    /// Read an experiment file.
    ///
    /// Relative paths in the file are taken to be relative to the folder containing it.
    ///
    /// # Arguments
    ///
    /// * `file_path` - Path to the YAML file
    ///
    /// # Returns
    ///
    /// The validated experiment configuration or an error if the file is missing or invalid
    pub fn from_path(file_path: &Path) -> Result<ExperimentConfig> {
        let mut config: ExperimentConfig = read_yaml(file_path)?;
        config.validate().with_context(|| input_err_msg(file_path))?;

        let base_dir = file_path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base_dir);

        Ok(config)
    }

    /// Make all relative input paths relative to `base_dir`
    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        };

        resolve(&mut self.demand_time_series);
        resolve(&mut self.parameters_energy_system);
        self.parameter_variation.iter_mut().for_each(resolve);
        if let Some(preprocessing) = &mut self.preprocessing {
            resolve(&mut preprocessing.load_profiles);
            resolve(&mut preprocessing.load_profile_parameters);
        }
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        ensure!(
            self.solver.eq_ignore_ascii_case(SOLVER_NAME),
            "Unknown solver `{}`: only `{SOLVER_NAME}` is available",
            self.solver
        );
        ensure!(
            !self.parameter_variation.is_empty(),
            "`parameter_variation` must list at least one file"
        );
        if self.run_single_scenario {
            ensure!(
                self.scenario_number < self.parameter_variation.len(),
                "`scenario_number` is {} but there are only {} parameter variations",
                self.scenario_number,
                self.parameter_variation.len()
            );
        }
        ensure!(
            self.number_of_time_steps > 0,
            "`number_of_time_steps` must be greater than zero"
        );
        ensure!(
            self.time_step_hours > 0,
            "`time_step_hours` must be greater than zero"
        );
        ensure!(
            !self.filename_dump.trim().is_empty(),
            "`filename_dump` cannot be empty"
        );
        self.parse_start_date()?;
        if let Some(window) = self.plot_window {
            ensure!(
                window.start < window.end,
                "`plot_window` start must come before its end"
            );
        }
        if self.run_preprocessing {
            ensure!(
                self.preprocessing.is_some(),
                "`run_preprocessing` is set but no `preprocessing` section was given"
            );
        }

        Ok(())
    }

    fn parse_start_date(&self) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.start_date, START_DATE_FORMAT).with_context(|| {
            format!(
                "Invalid `start_date` `{}` (expected format {START_DATE_FORMAT})",
                self.start_date
            )
        })
    }

    /// The number of time steps to optimise over
    pub fn horizon(&self) -> usize {
        if self.debug {
            DEBUG_TIME_STEPS
        } else {
            self.number_of_time_steps
        }
    }

    /// The timestamps of each time step
    pub fn time_index(&self) -> Result<Vec<NaiveDateTime>> {
        let start = self.parse_start_date()?;
        let step = TimeDelta::hours(i64::from(self.time_step_hours));

        Ok((0..self.horizon())
            .scan(start, |time, _| {
                let current = *time;
                *time += step;
                Some(current)
            })
            .collect())
    }

    /// The indexes of the scenarios to run
    pub fn scenarios(&self) -> Vec<usize> {
        if self.run_single_scenario {
            vec![self.scenario_number]
        } else {
            (0..self.parameter_variation.len()).collect()
        }
    }

    /// The electricity price relationship in use
    pub fn price_relationship(&self) -> PriceRelationship {
        if self.price_el_quadratic {
            PriceRelationship::Quadratic
        } else {
            PriceRelationship::Linear
        }
    }

    /// The path to the variation table for the given scenario
    pub fn variation_path(&self, scenario: usize) -> Result<&Path> {
        self.parameter_variation
            .get(scenario)
            .map(PathBuf::as_path)
            .with_context(|| format!("No parameter variation for scenario {scenario}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use rstest::rstest;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    const MINIMAL: &str = "system: flex_chp
demand_time_series: data/demand.csv
parameters_energy_system: data/parameters.csv
parameter_variation:
  - data/variation_0.csv
  - data/variation_1.csv
";

    fn write_config(dir: &Path, contents: &str) -> PathBuf {
        let file_path = dir.join("experiment.yml");
        let mut file = File::create(&file_path).unwrap();
        write!(file, "{contents}").unwrap();
        file_path
    }

    #[test]
    fn test_from_path_defaults() {
        let dir = tempdir().unwrap();
        let config = ExperimentConfig::from_path(&write_config(dir.path(), MINIMAL)).unwrap();
        assert_eq!(config.system, SystemKind::FlexChp);
        assert_eq!(config.solver, "highs");
        assert!(!config.debug);
        assert_eq!(config.horizon(), 8760);
        assert!(config.run_model);
        assert!(!config.make_plots);
        assert_eq!(config.price_relationship(), PriceRelationship::Linear);
        assert_eq!(config.scenarios(), [0, 1]);
    }

    #[test]
    fn test_from_path_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        let config = ExperimentConfig::from_path(&write_config(dir.path(), MINIMAL)).unwrap();
        assert_eq!(
            config.demand_time_series,
            dir.path().join("data").join("demand.csv")
        );
        assert_eq!(
            config.variation_path(1).unwrap(),
            dir.path().join("data").join("variation_1.csv")
        );
        assert!(config.variation_path(2).is_err());
    }

    #[test]
    fn test_from_path_missing_file() {
        let dir = tempdir().unwrap();
        assert!(ExperimentConfig::from_path(&dir.path().join("missing.yml")).is_err());
    }

    #[test]
    fn test_debug_horizon_and_time_index() {
        let dir = tempdir().unwrap();
        let contents = format!("{MINIMAL}debug: true\nstart_date: '2019-06-01 12:00:00'\n");
        let config = ExperimentConfig::from_path(&write_config(dir.path(), &contents)).unwrap();
        assert_eq!(config.horizon(), 3);
        let index = config.time_index().unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index[2].to_string(), "2019-06-01 14:00:00");
    }

    #[test]
    fn test_single_scenario() {
        let dir = tempdir().unwrap();
        let contents = format!("{MINIMAL}run_single_scenario: true\nscenario_number: 1\n");
        let config = ExperimentConfig::from_path(&write_config(dir.path(), &contents)).unwrap();
        assert_eq!(config.scenarios(), [1]);
    }

    #[rstest]
    #[case("solver: cbc\n")]
    #[case("run_single_scenario: true\nscenario_number: 2\n")]
    #[case("number_of_time_steps: 0\n")]
    #[case("start_date: yesterday\n")]
    #[case("plot_window: {start: 5, end: 5}\n")]
    #[case("run_preprocessing: true\n")]
    fn test_validate_invalid(#[case] extra: &str) {
        let dir = tempdir().unwrap();
        let contents = format!("{MINIMAL}{extra}");
        assert!(ExperimentConfig::from_path(&write_config(dir.path(), &contents)).is_err());
    }

    #[test]
    fn test_validate_empty_variations() {
        let mut config: ExperimentConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.parameter_variation.clear();
        assert_error!(
            config.validate(),
            "`parameter_variation` must list at least one file"
        );
    }

    #[test]
    fn test_unknown_system() {
        let contents = MINIMAL.replace("flex_chp", "nuclear");
        assert!(serde_yaml::from_str::<ExperimentConfig>(&contents).is_err());
    }

    #[rstest]
    #[case(SystemKind::FlexChp, "flex_chp")]
    #[case(SystemKind::FlexChpSysopt, "flex_chp_sysopt")]
    #[case(SystemKind::SolarCooling, "solar_cooling")]
    #[case(SystemKind::SolarCoolingElectric, "solar_cooling_electric")]
    fn test_system_kind_display(#[case] kind: SystemKind, #[case] expected: &str) {
        assert_eq!(kind.to_string(), expected);
    }

    #[test]
    fn test_price_relationship_folder_name() {
        assert_eq!(
            PriceRelationship::Quadratic.folder_name(),
            "quadratic_price_relationship"
        );
    }
}
