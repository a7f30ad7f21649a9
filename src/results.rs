//! The results of an optimisation, keyed by flow.
//!
//! Every flow of a solved network has an entry keyed by `(from, Some(to))`. Node-level results
//! such as storage content or storage capacity investment are keyed by `(node, None)`.
use crate::id::NodeID;
use crate::input::input_err_msg;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// The name of the sequence of storage content
pub const STORAGE_CONTENT: &str = "storage_content";

/// The name of the scalar holding invested capacity
pub const INVEST: &str = "invest";

/// Identifies a result by the labels of the nodes involved
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowKey {
    /// The node the flow comes from (or the node itself for node-level results)
    pub from: NodeID,
    /// The node the flow goes to (`None` for node-level results)
    pub to: Option<NodeID>,
}

impl FlowKey {
    /// The key for a flow between two nodes
    pub fn flow<F: Into<NodeID>, T: Into<NodeID>>(from: F, to: T) -> Self {
        Self {
            from: from.into(),
            to: Some(to.into()),
        }
    }

    /// The key for node-level results
    pub fn node<N: Into<NodeID>>(node: N) -> Self {
        Self {
            from: node.into(),
            to: None,
        }
    }

    /// Whether either end of the key is the given node
    pub fn touches(&self, label: &str) -> bool {
        self.from.as_str() == label || self.to.as_ref().is_some_and(|to| to.as_str() == label)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.to {
            Some(to) => write!(f, "({}, {to})", self.from),
            None => write!(f, "({}, None)", self.from),
        }
    }
}

/// The results for a single key: a time series and named scalars
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowResult {
    /// One value per time step
    pub sequence: Vec<f64>,
    /// Named scalar values (e.g. `invest`)
    pub scalars: IndexMap<String, f64>,
}

/// Information about the solve which produced a set of results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// The value of the objective function
    pub objective: f64,
    /// The solver's status
    pub status: String,
    /// The number of time steps
    pub number_of_steps: usize,
    /// The number of variables in the problem
    pub number_of_variables: usize,
    /// The number of constraints in the problem
    pub number_of_constraints: usize,
}

/// A flattened entry, used for serialisation
#[derive(Clone, Serialize, Deserialize)]
pub struct ResultEntry {
    /// See [`FlowKey::from`]
    pub from: NodeID,
    /// See [`FlowKey::to`]
    pub to: Option<NodeID>,
    /// See [`FlowResult::sequence`]
    pub sequence: Vec<f64>,
    /// See [`FlowResult::scalars`]
    pub scalars: IndexMap<String, f64>,
}

/// All the results of an optimisation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<ResultEntry>", into = "Vec<ResultEntry>")]
pub struct Results(IndexMap<FlowKey, FlowResult>);

impl From<Vec<ResultEntry>> for Results {
    fn from(entries: Vec<ResultEntry>) -> Self {
        Self(
            entries
                .into_iter()
                .map(|entry| {
                    (
                        FlowKey {
                            from: entry.from,
                            to: entry.to,
                        },
                        FlowResult {
                            sequence: entry.sequence,
                            scalars: entry.scalars,
                        },
                    )
                })
                .collect(),
        )
    }
}

impl From<Results> for Vec<ResultEntry> {
    fn from(results: Results) -> Self {
        results
            .0
            .into_iter()
            .map(|(key, result)| ResultEntry {
                from: key.from,
                to: key.to,
                sequence: result.sequence,
                scalars: result.scalars,
            })
            .collect()
    }
}

impl FromIterator<(FlowKey, FlowResult)> for Results {
    fn from_iter<I: IntoIterator<Item = (FlowKey, FlowResult)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Results {
    /// Add or replace the results for a key
    pub fn insert(&mut self, key: FlowKey, result: FlowResult) {
        self.0.insert(key, result);
    }

    /// Get the results for a key
    pub fn get(&self, key: &FlowKey) -> Result<&FlowResult> {
        self.0
            .get(key)
            .with_context(|| format!("No results for {key}"))
    }

    /// Get the results for a key mutably, creating an empty entry if necessary
    pub fn entry(&mut self, key: FlowKey) -> &mut FlowResult {
        self.0.entry(key).or_default()
    }

    /// Whether there are results for a key
    pub fn contains(&self, key: &FlowKey) -> bool {
        self.0.contains_key(key)
    }

    /// The time series of the flow from `from` to `to`
    pub fn sequence(&self, from: &str, to: &str) -> Result<&[f64]> {
        Ok(&self.get(&FlowKey::flow(from, to))?.sequence)
    }

    /// The node-level time series for `node` (e.g. storage content)
    pub fn node_sequence(&self, node: &str) -> Result<&[f64]> {
        Ok(&self.get(&FlowKey::node(node))?.sequence)
    }

    /// A named scalar for a key
    pub fn scalar(&self, key: &FlowKey, name: &str) -> Result<f64> {
        self.get(key)?
            .scalars
            .get(name)
            .copied()
            .with_context(|| format!("No scalar `{name}` for {key}"))
    }

    /// The sum over the horizon of the flow from `from` to `to`
    pub fn sum(&self, from: &str, to: &str) -> Result<f64> {
        Ok(self.sequence(from, to)?.iter().sum())
    }

    /// Iterate over all results touching the given node
    pub fn node_view<'a>(
        &'a self,
        label: &'a str,
    ) -> impl Iterator<Item = (&'a FlowKey, &'a FlowResult)> + 'a {
        self.0.iter().filter(move |(key, _)| key.touches(label))
    }

    /// Iterate over all results
    pub fn iter(&self) -> impl Iterator<Item = (&FlowKey, &FlowResult)> {
        self.0.iter()
    }

    /// The number of keys
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no results
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A snapshot of a solved network, written by the solve stage and read by the analysis stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsDump {
    /// Information about the solve
    pub meta: Meta,
    /// The results themselves
    pub results: Results,
}

impl ResultsDump {
    /// Write the dump as JSON
    pub fn save(&self, file_path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(file_path, json)
            .with_context(|| format!("Could not write {}", file_path.display()))
    }

    /// Read a dump written by [`ResultsDump::save`]
    pub fn load(file_path: &Path) -> Result<Self> {
        let json = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
        serde_json::from_str(&json).with_context(|| input_err_msg(file_path))
    }
}
