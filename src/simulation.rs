//! Functionality for running the scenarios of an experiment.
use crate::analysis::{Accumulator, analyse};
use crate::config::ExperimentConfig;
use crate::graph::{validate_energy_system, write_dot};
use crate::input::{ParameterTable, TimeSeries};
use crate::network::EnergySystem;
use crate::optimisation::Model;
use crate::output::{
    OutputPaths, write_accumulated, write_scalars, write_sequences, write_time_series,
};
use crate::plot::make_plots;
use crate::preprocessing;
use crate::results::ResultsDump;
use crate::systems::{SystemInputs, build_energy_system};
use anyhow::{Context, Result};
use log::info;

/// Read the base parameters merged with the variation for `scenario`
fn load_parameters(config: &ExperimentConfig, scenario: usize) -> Result<ParameterTable> {
    ParameterTable::from_paths(
        &config.parameters_energy_system,
        config.variation_path(scenario)?,
    )
}

/// Build and validate the energy system for one scenario
fn build_scenario(
    config: &ExperimentConfig,
    params: &ParameterTable,
    series: &TimeSeries,
) -> Result<EnergySystem> {
    let system = build_energy_system(
        config.system,
        &SystemInputs {
            params,
            series,
            horizon: config.horizon(),
            price_relationship: config.price_relationship(),
        },
    )?;
    validate_energy_system(&system)?;

    Ok(system)
}

/// Build, solve and save the model for one scenario
fn solve_scenario(
    config: &ExperimentConfig,
    paths: &OutputPaths,
    scenario: usize,
    params: &ParameterTable,
    debug_model: bool,
) -> Result<()> {
    let series = TimeSeries::from_path(&config.demand_time_series, config.horizon())?;
    let system = build_scenario(config, params, &series)?;

    let model = Model::new(&system);
    if config.debug || debug_model {
        model.write_lp(&paths.lp_file(scenario))?;
        write_dot(&system, &paths.graph_file(scenario))?;
    }

    let dump = model.solve(config.solver_verbose)?;
    let dump_path = paths.dump_file(&config.filename_dump, scenario);
    dump.save(&dump_path)?;
    info!("Saved results to {}", dump_path.display());
    write_sequences(
        &paths.sequences_file(scenario),
        &config.time_index()?,
        &dump.results,
    )
}

/// Analyse the saved results of one scenario and add its scalars to `accumulator`
fn postprocess_scenario(
    config: &ExperimentConfig,
    paths: &OutputPaths,
    scenario: usize,
    params: &ParameterTable,
    accumulator: &mut Accumulator,
) -> Result<()> {
    let dump = ResultsDump::load(&paths.dump_file(&config.filename_dump, scenario))?;
    let report = analyse(config.system, scenario, &dump, params)?;
    write_scalars(&paths.scalars_file(scenario), &report)?;
    write_time_series(
        &paths.time_series_file(scenario),
        &config.time_index()?,
        &report,
    )?;
    accumulator.push(&report);

    Ok(())
}

/// Run the experiment.
///
/// Scenarios run one after another. Any error aborts the whole run.
///
/// # Arguments
///
/// * `config` - The experiment to run
/// * `paths` - Where to write outputs (must already exist)
/// * `debug_model` - Whether to write the LP and graph files even if `debug` isn't set
pub fn run(config: &ExperimentConfig, paths: &OutputPaths, debug_model: bool) -> Result<()> {
    let scenarios = config.scenarios();
    info!(
        "Running {} scenario(s) of the {} system over {} time steps",
        scenarios.len(),
        config.system,
        config.horizon()
    );

    // The demand file is shared by all scenarios, so it is only written once
    if config.run_preprocessing {
        let preprocessing = config
            .preprocessing
            .as_ref()
            .context("No preprocessing inputs given")?;
        preprocessing::run(
            preprocessing,
            config.number_of_time_steps,
            &config.demand_time_series,
        )?;
    }

    let mut accumulator = Accumulator::default();
    for &scenario in &scenarios {
        info!("Scenario {scenario}");

        let params = load_parameters(config, scenario)?;
        if config.run_model {
            solve_scenario(config, paths, scenario, &params, debug_model)
                .with_context(|| format!("Scenario {scenario} failed"))?;
        }
        if config.run_postprocessing {
            postprocess_scenario(config, paths, scenario, &params, &mut accumulator)
                .with_context(|| format!("Could not analyse scenario {scenario}"))?;
        }
    }

    if !accumulator.is_empty() {
        let file_path = paths.accumulated_file(config.price_relationship());
        write_accumulated(&file_path, &accumulator)?;
        info!("Saved scenario comparison to {}", file_path.display());
    }
    if config.make_plots {
        make_plots(
            config.system,
            paths,
            &scenarios,
            &accumulator,
            config.plot_window,
        )?;
    }

    Ok(())
}

/// Build and validate the energy system of every scenario without solving
pub fn validate(config: &ExperimentConfig) -> Result<()> {
    let series = TimeSeries::from_path(&config.demand_time_series, config.horizon())?;
    for scenario in config.scenarios() {
        let params = load_parameters(config, scenario)?;
        build_scenario(config, &params, &series)
            .with_context(|| format!("Scenario {scenario} is invalid"))?;
    }

    Ok(())
}
