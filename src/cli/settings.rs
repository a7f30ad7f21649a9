//! The `settings` command, for inspecting and changing the program settings file.
use crate::settings::{Settings, get_settings_file_path};
use anyhow::{Context, Result};
use clap::Subcommand;
use std::fs;
use std::path::Path;

/// Subcommands for settings
#[derive(Subcommand)]
pub enum SettingsSubcommands {
    /// Open the settings file in a text editor, creating it if needed
    Edit,
    /// Print the path of the settings file
    Path,
    /// Print the settings in use, including defaults for any not set
    Show,
    /// Print a placeholder settings file with every setting at its default
    DumpDefault,
}

impl SettingsSubcommands {
    /// Execute the supplied settings subcommand
    pub fn execute(self) -> Result<()> {
        let file_path = get_settings_file_path();
        match self {
            Self::Edit => edit_settings_file(&file_path)?,
            Self::Path => println!("{}", file_path.display()),
            Self::Show => print!("{}", Settings::load_from_path(&file_path)?.describe()?),
            Self::DumpDefault => print!("{}", Settings::default_file_contents()),
        }

        Ok(())
    }
}

/// Write a placeholder settings file at `file_path` unless there is already one
fn create_settings_file(file_path: &Path) -> Result<()> {
    if file_path.is_file() {
        return Ok(());
    }

    if let Some(dir_path) = file_path.parent() {
        fs::create_dir_all(dir_path)
            .with_context(|| format!("Failed to create directory: {}", dir_path.display()))?;
    }
    fs::write(file_path, Settings::default_file_contents())
        .with_context(|| format!("Failed to write {}", file_path.display()))
}

/// Let the user edit the settings file, then check that it can still be read
fn edit_settings_file(file_path: &Path) -> Result<()> {
    create_settings_file(file_path)?;

    println!("Opening settings file for editing: {}", file_path.display());
    edit::edit_file(file_path)?;

    Settings::load_from_path(file_path)
        .context("The settings file is invalid. Run `energynet settings edit` to fix it.")?;

    Ok(())
}
