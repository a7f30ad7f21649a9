//! Code for reading exogenous time series (demand profiles, irradiance, prices...).
use super::input_err_msg;
use anyhow::{Context, Result, ensure};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// A table of time series, addressed by column name.
///
/// Values are parsed when a column is requested, so files can contain non-numeric columns (e.g.
/// timestamps) which are simply never used.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    /// Where the data came from, for error messages
    source: PathBuf,
    columns: IndexMap<String, Vec<String>>,
    horizon: usize,
}

impl TimeSeries {
    /// Read time series from a CSV file, truncated to `horizon` rows.
    ///
    /// Fewer data rows than `horizon` is an error.
    pub fn from_path(file_path: &Path, horizon: usize) -> Result<Self> {
        Self::read(file_path, horizon).with_context(|| input_err_msg(file_path))
    }

    fn read(file_path: &Path, horizon: usize) -> Result<Self> {
        let mut reader = csv::Reader::from_path(file_path)?;
        let headers = reader.headers()?.clone();
        let mut columns: IndexMap<String, Vec<String>> = headers
            .iter()
            .map(|header| (header.trim().to_string(), Vec::with_capacity(horizon)))
            .collect();
        ensure!(
            columns.len() == headers.len(),
            "Duplicate column names in header"
        );

        let mut rows = 0;
        for record in reader.records().take(horizon) {
            let record = record?;
            for (column, field) in columns.values_mut().zip(record.iter()) {
                column.push(field.trim().to_string());
            }
            rows += 1;
        }
        ensure!(
            rows == horizon,
            "Time series has {rows} rows but the horizon is {horizon} steps"
        );

        Ok(Self {
            source: file_path.to_path_buf(),
            columns,
            horizon,
        })
    }

    /// Build time series directly from numeric columns.
    ///
    /// All columns must have the same length, which becomes the horizon.
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let columns: IndexMap<String, Vec<String>> = columns
            .into_iter()
            .map(|(name, values)| {
                (
                    name.into(),
                    values.iter().map(ToString::to_string).collect(),
                )
            })
            .collect();
        let horizon = columns.values().next().map_or(0, Vec::len);
        ensure!(
            columns.values().all(|column| column.len() == horizon),
            "Time series columns must all have the same length"
        );

        Ok(Self {
            source: PathBuf::from("<memory>"),
            columns,
            horizon,
        })
    }

    /// Get a column as numbers.
    ///
    /// A missing column or a value which isn't a number is an error.
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let raw = self.columns.get(name).with_context(|| {
            format!(
                "Missing column `{name}` in time series {}",
                self.source.display()
            )
        })?;

        raw.iter()
            .enumerate()
            .map(|(row, value)| {
                value.parse::<f64>().with_context(|| {
                    format!("Invalid value `{value}` in column `{name}`, row {}", row + 1)
                })
            })
            .collect()
    }

    /// Whether the given column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// The number of time steps
    pub fn horizon(&self) -> usize {
        self.horizon
    }
}
