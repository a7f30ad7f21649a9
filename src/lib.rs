//! Common functionality for energynet.
//!
//! energynet assembles typed energy networks (buses, sources, sinks, transformers and storages)
//! from tabular parameters, optimises their operation and sizing with the HiGHS solver and
//! post-processes the results of each scenario.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod analysis;
pub mod cli;
pub mod config;
pub mod finance;
pub mod graph;
pub mod id;
pub mod input;
pub mod log;
pub mod network;
pub mod optimisation;
pub mod output;
pub mod plot;
pub mod preprocessing;
pub mod results;
pub mod settings;
pub mod simulation;
pub mod systems;
pub mod units;

#[cfg(test)]
mod fixture;

/// Get the config folder for the program.
///
/// This is where the program settings file lives.
pub fn get_energynet_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        // No config folder on this platform; fall back to the working directory
        return PathBuf::from(".");
    };
    config_dir.push("energynet");

    config_dir
}
