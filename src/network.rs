//! The energy network data model.
//!
//! An [`EnergySystem`] is a set of uniquely labelled nodes. Buses are commodity balances; every
//! other node is connected to one or more buses by directed flows. Results of an optimisation are
//! addressed by [`FlowKey`]s built from the labels of the two ends of a flow.
use crate::id::NodeID;
use crate::results::FlowKey;
use crate::units::MoneyPerCapacity;
use anyhow::{Context, Result, bail, ensure};
use indexmap::IndexMap;
use log::debug;

/// A value which is either the same for every time step or given per time step
#[derive(Debug, Clone, PartialEq)]
pub enum TimeValue {
    /// The same value for every time step
    Constant(f64),
    /// One value per time step
    Series(Vec<f64>),
}

impl TimeValue {
    /// The value at time step `t`
    pub fn at(&self, t: usize) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::Series(values) => values[t],
        }
    }

    /// Check the value is finite everywhere and has a value for every time step
    fn validate(&self, horizon: usize, what: &str) -> Result<()> {
        match self {
            Self::Constant(value) => {
                ensure!(value.is_finite(), "{what} must be finite");
            }
            Self::Series(values) => {
                ensure!(
                    values.len() == horizon,
                    "{what} has {} values but the horizon is {horizon} steps",
                    values.len()
                );
                ensure!(
                    values.iter().all(|value| value.is_finite()),
                    "{what} must be finite"
                );
            }
        }

        Ok(())
    }
}

impl Default for TimeValue {
    fn default() -> Self {
        Self::Constant(0.0)
    }
}

impl From<f64> for TimeValue {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl From<Vec<f64>> for TimeValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Series(values)
    }
}

/// Capacity which is chosen by the optimisation
#[derive(Debug, Clone, PartialEq)]
pub struct Investment {
    /// Equivalent periodical costs per unit of new capacity
    pub ep_costs: MoneyPerCapacity,
    /// Upper limit for the new capacity
    pub maximum: Option<f64>,
    /// Capacity which already exists (free)
    pub existing: f64,
}

impl Investment {
    /// An investment with the given costs and no upper limit
    pub fn new(ep_costs: MoneyPerCapacity) -> Self {
        Self {
            ep_costs,
            maximum: None,
            existing: 0.0,
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.ep_costs.value().is_finite(),
            "Investment costs must be finite"
        );
        if let Some(maximum) = self.maximum {
            ensure!(maximum >= 0.0, "Investment maximum must be >= 0");
        }
        ensure!(
            self.existing >= 0.0,
            "Existing capacity must be >= 0 (got {})",
            self.existing
        );

        Ok(())
    }
}

/// A directed flow of energy between a bus and a component
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flow {
    /// Fixed capacity of the flow
    pub nominal_value: Option<f64>,
    /// Capacity chosen by the optimisation (mutually exclusive with `nominal_value`)
    pub investment: Option<Investment>,
    /// Lower bound relative to capacity
    pub min: Option<TimeValue>,
    /// Upper bound relative to capacity
    pub max: Option<TimeValue>,
    /// Profile relative to capacity which the flow must follow exactly
    pub fix: Option<TimeValue>,
    /// Cost per unit of flow
    pub variable_costs: TimeValue,
    /// Upper bound on the sum of the flow over the horizon
    pub summed_max: Option<f64>,
}

impl Flow {
    /// A flow with only a cost attached
    pub fn with_costs<T: Into<TimeValue>>(variable_costs: T) -> Self {
        Self {
            variable_costs: variable_costs.into(),
            ..Default::default()
        }
    }

    /// A flow following `profile × nominal_value`
    pub fn fixed(profile: Vec<f64>, nominal_value: f64) -> Self {
        Self {
            nominal_value: Some(nominal_value),
            fix: Some(TimeValue::Series(profile)),
            ..Default::default()
        }
    }

    /// A flow limited by a fixed capacity
    pub fn nominal(nominal_value: f64) -> Self {
        Self {
            nominal_value: Some(nominal_value),
            ..Default::default()
        }
    }

    /// A flow whose capacity is chosen by the optimisation
    pub fn invest(investment: Investment) -> Self {
        Self {
            investment: Some(investment),
            ..Default::default()
        }
    }

    /// Whether the flow has a capacity (fixed or invested)
    pub fn has_capacity(&self) -> bool {
        self.nominal_value.is_some() || self.investment.is_some()
    }

    fn validate(&self, horizon: usize) -> Result<()> {
        ensure!(
            !(self.nominal_value.is_some() && self.investment.is_some()),
            "A flow cannot have both a nominal value and an investment"
        );
        if let Some(nominal_value) = self.nominal_value {
            ensure!(
                nominal_value.is_finite() && nominal_value >= 0.0,
                "Nominal value must be a finite number >= 0 (got {nominal_value})"
            );
        }
        if let Some(investment) = &self.investment {
            investment.validate()?;
        }

        let relative = [("min", &self.min), ("max", &self.max), ("fix", &self.fix)];
        for (what, value) in relative {
            let Some(value) = value else { continue };
            ensure!(
                self.has_capacity(),
                "`{what}` is relative to capacity, so the flow needs a nominal value or investment"
            );
            value.validate(horizon, what)?;
        }
        ensure!(
            self.fix.is_none() || (self.min.is_none() && self.max.is_none()),
            "A fixed flow cannot also have `min` or `max`"
        );
        self.variable_costs.validate(horizon, "variable_costs")?;
        if let Some(summed_max) = self.summed_max {
            ensure!(summed_max >= 0.0, "`summed_max` must be >= 0");
        }

        Ok(())
    }
}

/// A component converting input commodities into output commodities in fixed proportions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transformer {
    /// Input flows, keyed by the bus they come from
    pub inputs: IndexMap<NodeID, Flow>,
    /// Output flows, keyed by the bus they go to
    pub outputs: IndexMap<NodeID, Flow>,
    /// Conversion factors, keyed by bus. Missing factors are 1.
    pub conversion_factors: IndexMap<NodeID, f64>,
}

impl Transformer {
    /// The conversion factor for the flow to/from `bus`
    pub fn conversion_factor(&self, bus: &NodeID) -> f64 {
        self.conversion_factors.get(bus).copied().unwrap_or(1.0)
    }
}

/// A CHP plant with an extraction turbine.
///
/// Heat is tapped from the turbine at the cost of some electrical output, so the plant can
/// operate anywhere between back-pressure and full condensation mode.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionTurbine {
    /// The bus the fuel comes from and its flow
    pub fuel: (NodeID, Flow),
    /// The bus for the main (electrical) output and its flow
    pub main_output: (NodeID, Flow),
    /// The bus for the tapped (heat) output and its flow
    pub tapped_output: (NodeID, Flow),
    /// Electrical efficiency in back-pressure mode
    pub main_conversion_factor: f64,
    /// Thermal efficiency in back-pressure mode
    pub tapped_conversion_factor: f64,
    /// Electrical efficiency in full condensation mode
    pub full_condensation_factor: f64,
}

impl ExtractionTurbine {
    /// Loss of main output per unit of tapped output
    pub fn power_loss_index(&self) -> f64 {
        (self.full_condensation_factor - self.main_conversion_factor)
            / self.tapped_conversion_factor
    }
}

/// The capacity of a storage
#[derive(Debug, Clone, PartialEq)]
pub enum StorageCapacity {
    /// A fixed capacity
    Nominal(f64),
    /// A capacity chosen by the optimisation
    Invest(Investment),
}

/// A component storing a commodity between time steps
#[derive(Debug, Clone, PartialEq)]
pub struct Storage {
    /// The bus the storage charges from and discharges to
    pub bus: NodeID,
    /// Charging flow
    pub input_flow: Flow,
    /// Discharging flow
    pub output_flow: Flow,
    /// The storage capacity
    pub capacity: StorageCapacity,
    /// Share of the content lost per time step
    pub loss_rate: f64,
    /// Charging efficiency
    pub inflow_conversion_factor: f64,
    /// Discharging efficiency
    pub outflow_conversion_factor: f64,
    /// Content before the first time step, relative to capacity. Free if `None`.
    pub initial_storage_level: Option<f64>,
    /// Whether the content at the end of the horizon must equal the initial content
    pub balanced: bool,
    /// Ratio of charging power to invested capacity
    pub invest_relation_input_capacity: Option<f64>,
    /// Ratio of discharging power to invested capacity
    pub invest_relation_output_capacity: Option<f64>,
}

impl Storage {
    /// A lossless balanced storage with unrestricted flows
    pub fn new(bus: NodeID, capacity: StorageCapacity) -> Self {
        Self {
            bus,
            input_flow: Flow::default(),
            output_flow: Flow::default(),
            capacity,
            loss_rate: 0.0,
            inflow_conversion_factor: 1.0,
            outflow_conversion_factor: 1.0,
            initial_storage_level: None,
            balanced: true,
            invest_relation_input_capacity: None,
            invest_relation_output_capacity: None,
        }
    }

    fn validate(&self) -> Result<()> {
        match &self.capacity {
            StorageCapacity::Nominal(capacity) => ensure!(
                capacity.is_finite() && *capacity > 0.0,
                "Nominal storage capacity must be > 0 (storages without capacity should be left out)"
            ),
            StorageCapacity::Invest(investment) => investment.validate()?,
        }
        ensure!(
            (0.0..=1.0).contains(&self.loss_rate),
            "Loss rate must be between 0 and 1"
        );
        ensure!(
            self.inflow_conversion_factor > 0.0 && self.outflow_conversion_factor > 0.0,
            "Storage conversion factors must be > 0"
        );
        if let Some(level) = self.initial_storage_level {
            ensure!(
                (0.0..=1.0).contains(&level),
                "Initial storage level must be between 0 and 1"
            );
        }
        for relation in [
            self.invest_relation_input_capacity,
            self.invest_relation_output_capacity,
        ]
        .into_iter()
        .flatten()
        {
            ensure!(
                relation.is_finite() && relation > 0.0,
                "Invest relations must be finite and > 0"
            );
        }

        Ok(())
    }
}

/// A node in an energy network
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A commodity balance: the inflows equal the outflows in every time step
    Bus,
    /// Feeds a bus
    Source {
        /// The bus fed by the source
        output: NodeID,
        /// The flow into the bus
        flow: Flow,
    },
    /// Draws from a bus
    Sink {
        /// The bus the sink draws from
        input: NodeID,
        /// The flow out of the bus
        flow: Flow,
    },
    /// Converts inputs into outputs in fixed proportions
    Transformer(Transformer),
    /// A CHP plant with an extraction turbine
    ExtractionTurbine(ExtractionTurbine),
    /// Stores a commodity between time steps
    Storage(Storage),
}

/// A reference to one flow of a network
pub struct FlowRef<'a> {
    /// The labels of either end of the flow
    pub key: FlowKey,
    /// The flow's attributes
    pub flow: &'a Flow,
}

impl Node {
    /// A short description of the kind of node
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Bus => "bus",
            Node::Source { .. } => "source",
            Node::Sink { .. } => "sink",
            Node::Transformer(_) => "transformer",
            Node::ExtractionTurbine(_) => "extraction turbine",
            Node::Storage(_) => "storage",
        }
    }

    /// Iterate over the flows into and out of this node (buses have none of their own)
    pub fn iter_flows<'a>(
        &'a self,
        label: &'a NodeID,
    ) -> Box<dyn Iterator<Item = FlowRef<'a>> + 'a> {
        let into = move |bus: &NodeID, flow: &'a Flow| FlowRef {
            key: FlowKey::flow(bus.clone(), label.clone()),
            flow,
        };
        let out_of = move |bus: &NodeID, flow: &'a Flow| FlowRef {
            key: FlowKey::flow(label.clone(), bus.clone()),
            flow,
        };

        match self {
            Node::Bus => Box::new(std::iter::empty()),
            Node::Source { output, flow } => Box::new(std::iter::once(out_of(output, flow))),
            Node::Sink { input, flow } => Box::new(std::iter::once(into(input, flow))),
            Node::Transformer(transformer) => Box::new(
                transformer
                    .inputs
                    .iter()
                    .map(move |(bus, flow)| into(bus, flow))
                    .chain(
                        transformer
                            .outputs
                            .iter()
                            .map(move |(bus, flow)| out_of(bus, flow)),
                    ),
            ),
            Node::ExtractionTurbine(turbine) => Box::new(
                [
                    into(&turbine.fuel.0, &turbine.fuel.1),
                    out_of(&turbine.main_output.0, &turbine.main_output.1),
                    out_of(&turbine.tapped_output.0, &turbine.tapped_output.1),
                ]
                .into_iter(),
            ),
            Node::Storage(storage) => Box::new(
                [
                    into(&storage.bus, &storage.input_flow),
                    out_of(&storage.bus, &storage.output_flow),
                ]
                .into_iter(),
            ),
        }
    }

    fn validate(&self, horizon: usize) -> Result<()> {
        match self {
            Node::Transformer(transformer) => {
                ensure!(
                    !transformer.inputs.is_empty() && !transformer.outputs.is_empty(),
                    "A transformer needs at least one input and one output"
                );
                for bus in transformer.inputs.keys() {
                    ensure!(
                        !transformer.outputs.contains_key(bus),
                        "Bus {bus} is both an input and an output"
                    );
                }
                for (bus, factor) in &transformer.conversion_factors {
                    ensure!(
                        transformer.inputs.contains_key(bus)
                            || transformer.outputs.contains_key(bus),
                        "Conversion factor given for unconnected bus {bus}"
                    );
                    ensure!(
                        factor.is_finite() && *factor > 0.0,
                        "Conversion factor for {bus} must be > 0"
                    );
                }
            }
            Node::ExtractionTurbine(turbine) => {
                ensure!(
                    turbine.main_conversion_factor > 0.0 && turbine.tapped_conversion_factor > 0.0,
                    "Extraction turbine conversion factors must be > 0"
                );
                ensure!(
                    turbine.full_condensation_factor >= turbine.main_conversion_factor,
                    "Full condensation efficiency must be at least the back-pressure efficiency"
                );
            }
            Node::Storage(storage) => storage.validate()?,
            Node::Bus | Node::Source { .. } | Node::Sink { .. } => {}
        }

        Ok(())
    }
}

/// A network of labelled nodes over a fixed number of time steps
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySystem {
    nodes: IndexMap<NodeID, Node>,
    horizon: usize,
}

impl EnergySystem {
    /// Create an empty network
    pub fn new(horizon: usize) -> Self {
        Self {
            nodes: IndexMap::new(),
            horizon,
        }
    }

    /// The number of time steps
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Add a bus
    pub fn add_bus(&mut self, label: &str) -> Result<NodeID> {
        self.add(label, Node::Bus)
    }

    /// Add a node.
    ///
    /// Labels must be unique and every flow must connect to a bus which has already been added.
    pub fn add(&mut self, label: &str, node: Node) -> Result<NodeID> {
        let id = NodeID::new(label);
        ensure!(!label.trim().is_empty(), "Node labels cannot be empty");
        ensure!(
            !self.nodes.contains_key(label),
            "A node with label {label} already exists"
        );

        self.validate_node(&id, &node)
            .with_context(|| format!("Invalid {} {label}", node.kind()))?;

        debug!("Adding {} {label}", node.kind());
        self.nodes.insert(id.clone(), node);

        Ok(id)
    }

    fn validate_node(&self, id: &NodeID, node: &Node) -> Result<()> {
        node.validate(self.horizon)?;

        for flow_ref in node.iter_flows(id) {
            let FlowKey { from, to } = &flow_ref.key;
            let Some(to) = to else {
                bail!("Flow from {from} has no destination")
            };
            let bus = if from == id { to } else { from };
            match self.nodes.get(bus) {
                Some(Node::Bus) => {}
                Some(other) => bail!("{bus} is a {}, not a bus", other.kind()),
                None => bail!("Unknown bus {bus}"),
            }
            flow_ref
                .flow
                .validate(self.horizon)
                .with_context(|| format!("Invalid flow {}", flow_ref.key))?;
        }

        Ok(())
    }

    /// Get a node by label
    pub fn get(&self, label: &str) -> Option<&Node> {
        self.nodes.get(label)
    }

    /// Whether a node with the given label exists
    pub fn contains(&self, label: &str) -> bool {
        self.nodes.contains_key(label)
    }

    /// Iterate over nodes in the order they were added
    pub fn iter(&self) -> impl Iterator<Item = (&NodeID, &Node)> {
        self.nodes.iter()
    }

    /// Iterate over the labels of buses
    pub fn iter_buses(&self) -> impl Iterator<Item = &NodeID> {
        self.nodes
            .iter()
            .filter(|(_, node)| matches!(node, Node::Bus))
            .map(|(id, _)| id)
    }

    /// Iterate over every flow in the network
    pub fn iter_flows(&self) -> impl Iterator<Item = FlowRef<'_>> {
        self.nodes
            .iter()
            .flat_map(|(label, node)| node.iter_flows(label))
    }

    /// The number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the network has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Compute the imbalance of every bus for a given set of flows.
    ///
    /// The result is `Σ inflows − Σ outflows` per bus and time step, so a consistent set of flows
    /// gives zero everywhere. Every flow in the network must have a value.
    pub fn bus_residuals(
        &self,
        flows: &IndexMap<FlowKey, Vec<f64>>,
    ) -> Result<IndexMap<NodeID, Vec<f64>>> {
        let mut residuals: IndexMap<NodeID, Vec<f64>> = self
            .iter_buses()
            .map(|bus| (bus.clone(), vec![0.0; self.horizon]))
            .collect();

        for flow_ref in self.iter_flows() {
            let values = flows
                .get(&flow_ref.key)
                .with_context(|| format!("No values given for flow {}", flow_ref.key))?;
            ensure!(
                values.len() == self.horizon,
                "Flow {} has {} values but the horizon is {} steps",
                flow_ref.key,
                values.len(),
                self.horizon
            );

            let FlowKey { from, to } = &flow_ref.key;
            let to = to.as_ref().context("Flow without destination")?;
            let (bus, sign) = if residuals.contains_key(to) {
                (to, 1.0)
            } else {
                (from, -1.0)
            };
            let residual = residuals
                .get_mut(bus)
                .with_context(|| format!("Flow {} does not touch a bus", flow_ref.key))?;
            for (r, value) in residual.iter_mut().zip(values) {
                *r += sign * value;
            }
        }

        Ok(residuals)
    }
}
