//! Provides the main entry point to the program.
use anyhow::Result;
use energynet::cli::run_cli;
use human_panic::{metadata, setup_panic};

fn main() -> Result<()> {
    setup_panic!(metadata!().support("Open an issue on the project's issue tracker"));

    run_cli()
}
