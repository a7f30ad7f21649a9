//! Code for reading parameter tables.
//!
//! A parameter table is a CSV file with one row per named scalar. Only the `parameter` and
//! `value` columns are used; any other columns (component, unit, comment...) are ignored.
use super::{input_err_msg, read_csv};
use anyhow::{Context, Result, bail, ensure};
use indexmap::IndexMap;
use indexmap::map::Entry;
use log::debug;
use serde::Deserialize;
use std::path::Path;

/// A single row of a parameter table
#[derive(Debug, Deserialize, PartialEq)]
struct ParameterRow {
    parameter: String,
    value: f64,
}

/// A flat mapping from parameter name to scalar value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterTable(IndexMap<String, f64>);

impl ParameterTable {
    /// Read a parameter table from a CSV file.
    ///
    /// A parameter name appearing more than once in the same file is an error.
    pub fn from_path(file_path: &Path) -> Result<Self> {
        let rows = read_csv::<ParameterRow>(file_path)?;
        Self::from_rows(rows.map(|row| (row.parameter, row.value)))
            .with_context(|| input_err_msg(file_path))
    }

    /// Read a base table and a variation table and merge them with [`ParameterTable::merge`]
    pub fn from_paths(base_path: &Path, variation_path: &Path) -> Result<Self> {
        let base = Self::from_path(base_path)?;
        let variation = Self::from_path(variation_path)?;

        Ok(Self::merge(base, variation))
    }

    /// Build a table from name/value pairs, rejecting duplicate names
    pub fn from_rows<I, S>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut map = IndexMap::new();
        for (name, value) in rows {
            let name = name.into();
            ensure!(!name.trim().is_empty(), "Empty parameter name");
            match map.entry(name) {
                Entry::Occupied(entry) => {
                    bail!("Parameter `{}` is defined more than once", entry.key())
                }
                Entry::Vacant(entry) => {
                    entry.insert(value);
                }
            }
        }

        Ok(Self(map))
    }

    /// Merge a base table with a scenario variation.
    ///
    /// The result contains every key from both tables. Where a key is present in both, the value
    /// from `variation` is used.
    pub fn merge(base: ParameterTable, variation: ParameterTable) -> ParameterTable {
        let mut map = base.0;
        for (name, value) in variation.0 {
            if let Some(old) = map.insert(name.clone(), value) {
                debug!("Parameter `{name}` overridden by variation: {old} -> {value}");
            }
        }

        Self(map)
    }

    /// Look up a parameter by name.
    ///
    /// There are no default values: a missing key is always an error.
    pub fn get(&self, name: &str) -> Result<f64> {
        self.0
            .get(name)
            .copied()
            .with_context(|| format!("Missing parameter `{name}`"))
    }

    /// Look up a parameter which must be a non-negative whole number (e.g. a lifetime in years)
    pub fn get_whole(&self, name: &str) -> Result<u32> {
        let value = self.get(name)?;
        ensure!(
            value >= 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX),
            "Parameter `{name}` must be a non-negative whole number (got {value})"
        );

        Ok(value as u32)
    }

    /// Whether the table contains the given parameter
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterate over the parameters in the order they were read
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// The number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
