//! Program-wide settings, read from `settings.toml` in the user's config folder.
//!
//! Settings apply to every run. Most can also be switched on for a single run from the command
//! line; the experiment file only says what to model.
use crate::get_energynet_config_dir;
use crate::input::read_toml;
use crate::log::DEFAULT_LOG_LEVEL;
use crate::output::DEFAULT_RESULTS_ROOT;
use anyhow::{Context, Result};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.toml";

const DEFAULT_SETTINGS_FILE_HEADER: &str = "# energynet program settings
#
# Every setting is shown with its default value. Uncomment a line to change it.
";

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_results_root() -> PathBuf {
    PathBuf::from(DEFAULT_RESULTS_ROOT)
}

/// Get the path to where the settings file will be read from
pub fn get_settings_file_path() -> PathBuf {
    get_energynet_config_dir().join(SETTINGS_FILE_NAME)
}

/// Program settings from config file
#[derive(Debug, Clone, DocumentedFields, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// The default program log level (`off`, `error`, `warn`, `info`, `debug` or `trace`)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Folder in which a run's output folder is created when none is given
    #[serde(default = "default_results_root")]
    pub results_root: PathBuf,
    /// Whether to clear an existing output folder before a run
    #[serde(default)]
    pub overwrite: bool,
    /// Whether to write the LP and network graph files for every scenario
    #[serde(default)]
    pub debug_model: bool,
    /// Whether to show the solver's output, whatever the experiment file says
    #[serde(default)]
    pub solver_verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            results_root: default_results_root(),
            overwrite: false,
            debug_model: false,
            solver_verbose: false,
        }
    }
}

impl Settings {
    /// Read the program settings file, using defaults if there is none
    pub fn load() -> Result<Settings> {
        Self::load_from_path(&get_settings_file_path())
    }

    /// Read from the specified path, falling back on defaults if there is no file
    pub fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        read_toml(file_path)
    }

    /// The settings as TOML, each preceded by its doc comment
    fn to_documented_toml(&self, commented: bool) -> Result<String> {
        let table = toml::Table::try_from(self).context("Could not convert settings to TOML")?;
        let prefix = if commented { "# " } else { "" };

        let mut out = String::new();
        for (key, value) in &table {
            let docs = Settings::get_field_docs(key)
                .ok()
                .with_context(|| format!("No documentation for setting `{key}`"))?;
            for line in docs.lines() {
                writeln!(out, "\n# {}", line.trim())?;
            }
            writeln!(out, "{prefix}{key} = {value}")?;
        }

        Ok(out)
    }

    /// The contents of a placeholder settings file, with every setting commented out
    pub fn default_file_contents() -> String {
        let body = Settings::default()
            .to_documented_toml(true)
            .expect("Default settings can always be written as TOML");

        format!("{DEFAULT_SETTINGS_FILE_HEADER}{body}")
    }

    /// The settings in use, as they would appear in a settings file
    pub fn describe(&self) -> Result<String> {
        self.to_documented_toml(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_settings_load_from_path_no_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME); // NB: doesn't exist
        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings::default()
        );
    }

    #[test]
    fn test_settings_load_from_path() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(
            &file_path,
            "log_level = \"warn\"\nresults_root = \"runs\"\nsolver_verbose = true\n",
        )
        .unwrap();

        assert_eq!(
            Settings::load_from_path(&file_path).unwrap(),
            Settings {
                log_level: "warn".to_string(),
                results_root: PathBuf::from("runs"),
                solver_verbose: true,
                ..Settings::default()
            }
        );
    }

    #[test]
    fn test_settings_unknown_key() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&file_path, "solver = \"cbc\"\n").unwrap();
        assert!(Settings::load_from_path(&file_path).is_err());
    }

    #[test]
    fn test_default_file_contents() {
        let contents = Settings::default_file_contents();
        assert!(contents.starts_with(DEFAULT_SETTINGS_FILE_HEADER));
        assert!(contents.contains("# log_level = \"info\""));
        assert!(contents.contains("# results_root = \"energynet_results\""));
        assert!(contents.contains("# solver_verbose = false"));

        // A file with everything commented out gives the defaults
        let settings: Settings = toml::from_str(&contents).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_describe() {
        let settings = Settings {
            debug_model: true,
            ..Settings::default()
        };
        let description = settings.describe().unwrap();
        assert!(description.contains("\ndebug_model = true\n"));
        assert!(description.contains("# Whether to write the LP and network graph files"));

        let parsed: Settings = toml::from_str(&description).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join(SETTINGS_FILE_NAME);
        fs::write(&file_path, "overwrite = \"yes\"\n").unwrap();
        assert_error!(
            Settings::load_from_path(&file_path),
            format!("Error reading {}", file_path.display())
        );
    }
}
