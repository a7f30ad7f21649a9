//! Integration tests for the `run` command driven by program settings.
use energynet::cli::{RunOpts, handle_run_command};
use energynet::settings::Settings;
use std::path::Path;
use tempfile::tempdir;

/// Without an output folder, results go under the configured results folder
#[test]
fn test_run_into_results_root() {
    unsafe { std::env::set_var("ENERGYNET_LOG_LEVEL", "off") };

    let results_root = tempdir().unwrap();
    let settings = Settings {
        results_root: results_root.path().join("runs"),
        solver_verbose: true,
        ..Settings::default()
    };
    handle_run_command(
        Path::new("demos/flex_chp/experiment.yml"),
        &RunOpts::default(),
        Some(settings),
    )
    .unwrap();

    let output_dir = results_root.path().join("runs").join("experiment");
    assert!(output_dir.join("metadata.toml").is_file());
    assert!(output_dir.join("energynet_info.log").is_file());
}
