//! The command line interface for the program.
use crate::config::ExperimentConfig;
use crate::log;
use crate::output::metadata::write_metadata;
use crate::output::{OutputPaths, create_output_directory, get_output_dir};
use crate::settings::Settings;
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod example;
use example::ExampleSubcommands;
pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for the program.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the run command
#[derive(Args, Clone, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to clear the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
    /// Whether to write the LP and network graph files for every scenario
    #[arg(long)]
    pub debug_model: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Run an experiment.
    Run {
        /// Path to the experiment file.
        config_path: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Manage example experiments.
    Example {
        /// The available subcommands for managing example experiments.
        #[command(subcommand)]
        subcommand: ExampleSubcommands,
    },
    /// Validate an experiment without solving it.
    Validate {
        /// The path to the experiment file.
        config_path: PathBuf,
    },
    /// Manage the program settings file.
    Settings {
        /// The available subcommands for managing settings.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { config_path, opts } => handle_run_command(&config_path, &opts, None),
            Self::Example { subcommand } => subcommand.execute(),
            Self::Validate { config_path } => handle_validate_command(&config_path, None),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start the program
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ energynet --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Handle the `run` command.
pub fn handle_run_command(
    config_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    // Load program settings, if not provided
    let mut settings = if let Some(settings) = settings {
        settings
    } else {
        Settings::load().context("Failed to load settings.")?
    };

    // These settings can be overridden by command-line arguments
    if opts.debug_model {
        settings.debug_model = true;
    }
    if opts.overwrite {
        settings.overwrite = true;
    }

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(&settings.results_root, config_path)?;
        &pathbuf
    };

    let cleared = create_output_directory(output_path, settings.overwrite).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_path.display()
        )
    })?;

    // Initialise program logger
    log::init(Some(&settings.log_level), Some(output_path))
        .context("Failed to initialise logging.")?;

    // NB: We have to wait until the logger is initialised to display this warning
    if cleared {
        warn!("Cleared existing output folder {}", output_path.display());
    }

    // Load the experiment to run
    let mut config =
        ExperimentConfig::from_path(config_path).context("Failed to load experiment.")?;
    config.solver_verbose |= settings.solver_verbose;
    info!("Loaded experiment from {}", config_path.display());
    info!("Output folder: {}", output_path.display());

    let paths = OutputPaths::new(output_path, config.price_relationship());
    paths.create()?;
    write_metadata(output_path, config_path, &config).context("Failed to save metadata.")?;

    // Run the experiment
    crate::simulation::run(&config, &paths, settings.debug_model)?;
    info!("Experiment complete!");

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(config_path: &Path, settings: Option<Settings>) -> Result<()> {
    // Load program settings, if not provided
    let settings = if let Some(settings) = settings {
        settings
    } else {
        Settings::load().context("Failed to load settings.")?
    };

    // Initialise program logger (we won't save log files when running the validate command)
    log::init(Some(&settings.log_level), None).context("Failed to initialise logging.")?;

    // Load/validate the experiment
    let config = ExperimentConfig::from_path(config_path).context("Failed to load experiment.")?;
    crate::simulation::validate(&config).context("Failed to validate experiment.")?;
    info!("Experiment validation successful!");

    Ok(())
}
