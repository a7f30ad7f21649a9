//! Code for building and solving the linear program of an energy network.
//!
//! Every flow gets one variable per time step. An investment adds one capacity variable per flow
//! or storage, and every storage adds one content variable per time step plus one for the content
//! before the first step. The constraints tying these together are added by [`constraints`].
use crate::id::NodeID;
use crate::log::is_logging_disabled;
use crate::network::{EnergySystem, Flow, FlowRef, Node, StorageCapacity};
use crate::results::{FlowKey, FlowResult, INVEST, Meta, Results, ResultsDump};
use anyhow::{Result, anyhow, bail};
use highs::{HighsModelStatus, RowProblem, Sense};
use indexmap::IndexMap;
use log::{debug, info};
use std::ops::RangeInclusive;
use std::path::Path;

mod constraints;
mod lp_file;

/// The index of a column (variable) in a [`LinearProblem`]
pub type ColumnIndex = usize;

/// A variable of a [`LinearProblem`]
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Name used when writing the problem to file
    pub name: String,
    /// Coefficient in the objective function
    pub cost: f64,
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

/// A constraint of a [`LinearProblem`]: `min <= Σ coefficient × column <= max`
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Name used when writing the problem to file
    pub name: String,
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
    /// Pairs of column and coefficient
    pub terms: Vec<(ColumnIndex, f64)>,
}

/// A linear program to be minimised.
///
/// This is kept separate from the solver's own representation so that it can be inspected and
/// written to file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearProblem {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl LinearProblem {
    /// Add a variable, returning its index
    pub fn add_column(
        &mut self,
        name: String,
        cost: f64,
        bounds: RangeInclusive<f64>,
    ) -> ColumnIndex {
        self.columns.push(Column {
            name,
            cost,
            min: *bounds.start(),
            max: *bounds.end(),
        });
        self.columns.len() - 1
    }

    /// Add a constraint
    pub fn add_row(
        &mut self,
        name: String,
        bounds: RangeInclusive<f64>,
        terms: Vec<(ColumnIndex, f64)>,
    ) {
        self.rows.push(Row {
            name,
            min: *bounds.start(),
            max: *bounds.end(),
            terms,
        });
    }

    /// The variables of the problem
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The constraints of the problem
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The value of the objective function for the given variable values
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(values)
            .map(|(column, value)| column.cost * value)
            .sum()
    }

    /// Write the problem to a file in CPLEX LP format
    pub fn write_lp(&self, file_path: &Path) -> Result<()> {
        lp_file::write_lp(self, file_path)
    }

    /// Convert to the representation used by HiGHS
    fn to_highs(&self) -> RowProblem {
        let mut problem = RowProblem::default();
        let columns: Vec<_> = self
            .columns
            .iter()
            .map(|column| problem.add_column(column.cost, column.min..=column.max))
            .collect();
        for row in &self.rows {
            problem.add_row(
                row.min..=row.max,
                row.terms
                    .iter()
                    .map(|(column, coefficient)| (columns[*column], *coefficient)),
            );
        }

        problem
    }
}

/// Bounds for `= value`
fn equal_to(value: f64) -> RangeInclusive<f64> {
    value..=value
}

/// Bounds for `<= value`
fn at_most(value: f64) -> RangeInclusive<f64> {
    f64::NEG_INFINITY..=value
}

/// Bounds for `>= value`
fn at_least(value: f64) -> RangeInclusive<f64> {
    value..=f64::INFINITY
}

/// The variables for the content of a storage
struct StorageVariables {
    /// Content before the first time step
    initial: ColumnIndex,
    /// Content at the end of each time step
    content: Vec<ColumnIndex>,
}

/// A map for easy lookup of variables in the problem.
///
/// We use this data structure for two things:
///
/// 1. In order define constraints for the optimisation
/// 2. To keep track of what each variable corresponds to, for when we are reading the results of
///    the optimisation.
#[derive(Default)]
struct VariableMap {
    flows: IndexMap<FlowKey, Vec<ColumnIndex>>,
    flow_investments: IndexMap<FlowKey, ColumnIndex>,
    storage_content: IndexMap<NodeID, StorageVariables>,
    storage_investments: IndexMap<NodeID, ColumnIndex>,
}

impl VariableMap {
    /// The variable for the given flow at time step `t`
    fn flow(&self, key: &FlowKey, t: usize) -> ColumnIndex {
        self.flows.get(key).expect("No variable found for flow")[t]
    }
}

/// Lower and upper bound of a flow relative to its capacity at time step `t`
fn relative_bounds(flow: &Flow, t: usize) -> (f64, f64) {
    if let Some(fix) = &flow.fix {
        let value = fix.at(t);
        return (value, value);
    }

    let min = flow.min.as_ref().map_or(0.0, |min| min.at(t));
    let max = flow.max.as_ref().map_or(1.0, |max| max.at(t));
    (min, max)
}

/// The linear program for an energy network, along with the variables it is made of
pub struct Model<'a> {
    system: &'a EnergySystem,
    problem: LinearProblem,
    variables: VariableMap,
}

impl<'a> Model<'a> {
    /// Build the linear program for an energy network
    pub fn new(system: &'a EnergySystem) -> Self {
        let mut model = Self {
            system,
            problem: LinearProblem::default(),
            variables: VariableMap::default(),
        };
        model.add_flow_variables();
        model.add_storage_variables();
        constraints::add_constraints(&mut model.problem, &model.variables, system);

        debug!(
            "Built linear program with {} variables and {} constraints",
            model.problem.columns.len(),
            model.problem.rows.len()
        );

        model
    }

    /// The underlying linear program
    pub fn problem(&self) -> &LinearProblem {
        &self.problem
    }

    /// Write the linear program to a file in CPLEX LP format
    pub fn write_lp(&self, file_path: &Path) -> Result<()> {
        self.problem.write_lp(file_path)
    }

    fn add_flow_variables(&mut self) {
        let system = self.system;
        for FlowRef { key, flow } in system.iter_flows() {
            let name = flow_name(&key);
            if let Some(investment) = &flow.investment {
                let column = self.problem.add_column(
                    format!("invest({name})"),
                    investment.ep_costs.value(),
                    0.0..=investment.maximum.unwrap_or(f64::INFINITY),
                );
                self.variables.flow_investments.insert(key.clone(), column);
            }

            let columns = (0..system.horizon())
                .map(|t| {
                    // Flows with investments are bounded by constraints instead
                    let bounds = match flow.nominal_value {
                        Some(nominal_value) if flow.investment.is_none() => {
                            let (min, max) = relative_bounds(flow, t);
                            min * nominal_value..=max * nominal_value
                        }
                        _ => 0.0..=f64::INFINITY,
                    };
                    self.problem.add_column(
                        format!("flow({name},{t})"),
                        flow.variable_costs.at(t),
                        bounds,
                    )
                })
                .collect();
            self.variables.flows.insert(key, columns);
        }
    }

    fn add_storage_variables(&mut self) {
        let system = self.system;
        for (label, node) in system.iter() {
            let Node::Storage(storage) = node else {
                continue;
            };

            let max_content = match &storage.capacity {
                StorageCapacity::Nominal(capacity) => *capacity,
                StorageCapacity::Invest(investment) => {
                    let column = self.problem.add_column(
                        format!("invest({label})"),
                        investment.ep_costs.value(),
                        0.0..=investment.maximum.unwrap_or(f64::INFINITY),
                    );
                    self.variables
                        .storage_investments
                        .insert(label.clone(), column);
                    f64::INFINITY
                }
            };

            let initial_bounds = match (&storage.capacity, storage.initial_storage_level) {
                (StorageCapacity::Nominal(capacity), Some(level)) => equal_to(level * capacity),
                _ => 0.0..=max_content,
            };
            let initial =
                self.problem
                    .add_column(format!("init_content({label})"), 0.0, initial_bounds);
            let content = (0..system.horizon())
                .map(|t| {
                    self.problem.add_column(
                        format!("content({label},{t})"),
                        0.0,
                        0.0..=max_content,
                    )
                })
                .collect();
            self.variables
                .storage_content
                .insert(label.clone(), StorageVariables { initial, content });
        }
    }

    /// Solve the linear program with HiGHS.
    ///
    /// Anything other than an optimal solution is an error.
    pub fn solve(self, verbose: bool) -> Result<ResultsDump> {
        let number_of_variables = self.problem.columns.len();
        let number_of_constraints = self.problem.rows.len();

        let mut highs_model = self.problem.to_highs().optimise(Sense::Minimise);
        set_highs_logging(&mut highs_model, verbose);

        let solved = highs_model
            .try_solve()
            .map_err(|status| anyhow!("Could not solve: {status:?}"))?;
        match solved.status() {
            HighsModelStatus::Optimal => {}
            status => bail!("Could not solve: {status:?}"),
        }

        let solution = solved.get_solution();
        let values = solution.columns();
        let objective = self.problem.objective_value(values);
        info!("Solved with objective value {objective}");

        Ok(ResultsDump {
            meta: Meta {
                objective,
                status: format!("{:?}", HighsModelStatus::Optimal),
                number_of_steps: self.system.horizon(),
                number_of_variables,
                number_of_constraints,
            },
            results: self.collect_results(values),
        })
    }

    /// Read the values of the variables back into keyed results
    fn collect_results(&self, values: &[f64]) -> Results {
        let sequence = |columns: &[ColumnIndex]| -> Vec<f64> {
            columns.iter().map(|column| values[*column]).collect()
        };

        let mut results = Results::default();
        for (key, columns) in &self.variables.flows {
            let mut result = FlowResult {
                sequence: sequence(columns),
                scalars: IndexMap::new(),
            };
            if let Some(column) = self.variables.flow_investments.get(key) {
                result.scalars.insert(INVEST.to_string(), values[*column]);
            }
            results.insert(key.clone(), result);
        }

        for (label, storage_variables) in &self.variables.storage_content {
            let mut result = FlowResult {
                sequence: sequence(&storage_variables.content),
                scalars: IndexMap::new(),
            };
            if let Some(column) = self.variables.storage_investments.get(label) {
                result.scalars.insert(INVEST.to_string(), values[*column]);
            }
            results.insert(FlowKey::node(label.clone()), result);
        }

        // Charging and discharging capacity follow the invested storage capacity
        for (label, column) in &self.variables.storage_investments {
            let Some(Node::Storage(storage)) = self.system.get(label.as_str()) else {
                continue;
            };
            let relations = [
                (
                    FlowKey::flow(storage.bus.clone(), label.clone()),
                    storage.invest_relation_input_capacity,
                ),
                (
                    FlowKey::flow(label.clone(), storage.bus.clone()),
                    storage.invest_relation_output_capacity,
                ),
            ];
            for (key, relation) in relations {
                if let Some(relation) = relation {
                    results
                        .entry(key)
                        .scalars
                        .insert(INVEST.to_string(), relation * values[*column]);
                }
            }
        }

        results
    }
}

/// The name used for a flow in variable and constraint names
fn flow_name(key: &FlowKey) -> String {
    match &key.to {
        Some(to) => format!("{},{to}", key.from),
        None => key.from.to_string(),
    }
}

/// Forward the output of HiGHS to the console if requested
fn set_highs_logging(model: &mut highs::Model, verbose: bool) {
    // Skip this step if logging is disabled (e.g. when running tests)
    let enabled = verbose && !is_logging_disabled();
    model.set_option("log_to_console", enabled);
    model.set_option("output_flag", enabled);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::simple_system;
    use crate::network::{ExtractionTurbine, Investment, Storage, Transformer};
    use crate::units::MoneyPerCapacity;
    use float_cmp::{approx_eq, assert_approx_eq};
    use indexmap::indexmap;
    use rstest::rstest;

    fn assert_sequence_eq(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!(
                approx_eq!(f64, *a, *e, epsilon = 1e-6),
                "{actual:?} != {expected:?}"
            );
        }
    }

    fn bus_with_demand(horizon: usize, bus: &str, demand: Vec<f64>) -> EnergySystem {
        let mut system = EnergySystem::new(horizon);
        system.add_bus(bus).unwrap();
        system
            .add(
                "demand",
                Node::Sink {
                    input: bus.into(),
                    flow: Flow::fixed(demand, 1.0),
                },
            )
            .unwrap();
        system
    }

    #[rstest]
    fn test_model_size(simple_system: EnergySystem) {
        let model = Model::new(&simple_system);

        // Four flows over three steps and one balance per step
        assert_eq!(model.problem().columns().len(), 12);
        assert_eq!(model.problem().rows().len(), 3);
    }

    #[rstest]
    fn test_solve_balancing(simple_system: EnergySystem) {
        let dump = Model::new(&simple_system).solve(false).unwrap();
        let results = &dump.results;

        assert_sequence_eq(
            results.sequence("shortage_bel", "electricity").unwrap(),
            &[0.0, 5.0, 0.0],
        );
        assert_sequence_eq(
            results.sequence("electricity", "excess_bel").unwrap(),
            &[5.0, 0.0, 15.0],
        );
        assert_approx_eq!(f64, dump.meta.objective, 5000.0, epsilon = 1e-6);
        assert_eq!(dump.meta.status, "Optimal");
        assert_eq!(dump.meta.number_of_steps, 3);
    }

    #[test]
    fn test_solve_transformer() {
        let mut system = bus_with_demand(3, "heat", vec![9.0; 3]);
        system.add_bus("gas").unwrap();
        system
            .add(
                "gas_source",
                Node::Source {
                    output: "gas".into(),
                    flow: Flow::with_costs(2.0),
                },
            )
            .unwrap();
        system
            .add(
                "boiler",
                Node::Transformer(Transformer {
                    inputs: indexmap! {"gas".into() => Flow::default()},
                    outputs: indexmap! {"heat".into() => Flow::default()},
                    conversion_factors: indexmap! {"heat".into() => 0.9},
                }),
            )
            .unwrap();

        let dump = Model::new(&system).solve(false).unwrap();
        assert_sequence_eq(dump.results.sequence("gas", "boiler").unwrap(), &[10.0; 3]);
        assert_approx_eq!(f64, dump.meta.objective, 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_solve_extraction_turbine() {
        let mut system = bus_with_demand(3, "electricity", vec![3.0; 3]);
        for bus in ["gas", "heat"] {
            system.add_bus(bus).unwrap();
        }
        system
            .add(
                "heat_demand",
                Node::Sink {
                    input: "heat".into(),
                    flow: Flow::fixed(vec![1.0; 3], 3.0),
                },
            )
            .unwrap();
        system
            .add(
                "gas_source",
                Node::Source {
                    output: "gas".into(),
                    flow: Flow::with_costs(1.0),
                },
            )
            .unwrap();
        system
            .add(
                "chp",
                Node::ExtractionTurbine(ExtractionTurbine {
                    fuel: ("gas".into(), Flow::default()),
                    main_output: ("electricity".into(), Flow::default()),
                    tapped_output: ("heat".into(), Flow::default()),
                    main_conversion_factor: 0.3,
                    tapped_conversion_factor: 0.5,
                    full_condensation_factor: 0.5,
                }),
            )
            .unwrap();

        let dump = Model::new(&system).solve(false).unwrap();

        // (3 + 0.4 × 3) / 0.5
        assert_sequence_eq(dump.results.sequence("gas", "chp").unwrap(), &[8.4; 3]);
        assert_approx_eq!(f64, dump.meta.objective, 25.2, epsilon = 1e-6);
    }

    #[test]
    fn test_solve_flow_investment() {
        let mut system = bus_with_demand(3, "electricity", vec![1.0, 3.0, 2.0]);
        system
            .add(
                "plant",
                Node::Source {
                    output: "electricity".into(),
                    flow: Flow {
                        variable_costs: 1.0.into(),
                        ..Flow::invest(Investment::new(MoneyPerCapacity(10.0)))
                    },
                },
            )
            .unwrap();

        let dump = Model::new(&system).solve(false).unwrap();
        let invest = dump
            .results
            .scalar(&FlowKey::flow("plant", "electricity"), INVEST)
            .unwrap();
        assert_approx_eq!(f64, invest, 3.0, epsilon = 1e-6);
        assert_approx_eq!(f64, dump.meta.objective, 36.0, epsilon = 1e-6);
    }

    #[test]
    fn test_solve_storage_shifts_load() {
        let mut system = bus_with_demand(3, "electricity", vec![0.0, 10.0, 0.0]);
        system
            .add(
                "grid",
                Node::Source {
                    output: "electricity".into(),
                    flow: Flow::with_costs(vec![1.0, 5.0, 1.0]),
                },
            )
            .unwrap();
        let storage = Storage {
            initial_storage_level: Some(0.0),
            ..Storage::new("electricity".into(), StorageCapacity::Nominal(100.0))
        };
        system.add("battery", Node::Storage(storage)).unwrap();

        let dump = Model::new(&system).solve(false).unwrap();
        let results = &dump.results;
        assert_sequence_eq(
            results.sequence("grid", "electricity").unwrap(),
            &[10.0, 0.0, 0.0],
        );
        assert_sequence_eq(results.node_sequence("battery").unwrap(), &[10.0, 0.0, 0.0]);
        assert_approx_eq!(f64, dump.meta.objective, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_solve_storage_investment() {
        let mut system = bus_with_demand(3, "electricity", vec![0.0, 10.0, 0.0]);
        system
            .add(
                "grid",
                Node::Source {
                    output: "electricity".into(),
                    flow: Flow::with_costs(vec![1.0, 5.0, 1.0]),
                },
            )
            .unwrap();
        let storage = Storage {
            invest_relation_input_capacity: Some(0.5),
            invest_relation_output_capacity: Some(0.5),
            ..Storage::new(
                "electricity".into(),
                StorageCapacity::Invest(Investment::new(MoneyPerCapacity(1.0))),
            )
        };
        system.add("battery", Node::Storage(storage)).unwrap();

        let dump = Model::new(&system).solve(false).unwrap();
        let results = &dump.results;

        // Discharging 10 needs a capacity of 20, which is cheaper than buying at the peak price
        let invest = results
            .scalar(&FlowKey::node("battery"), INVEST)
            .unwrap();
        assert_approx_eq!(f64, invest, 20.0, epsilon = 1e-6);
        let output_invest = results
            .scalar(&FlowKey::flow("battery", "electricity"), INVEST)
            .unwrap();
        assert_approx_eq!(f64, output_invest, 10.0, epsilon = 1e-6);
        assert_approx_eq!(f64, dump.meta.objective, 30.0, epsilon = 1e-6);
    }

    #[test]
    fn test_solve_infeasible() {
        let system = {
            let mut system = bus_with_demand(3, "heat", vec![1.0; 3]);
            system
                .add(
                    "boiler",
                    Node::Source {
                        output: "heat".into(),
                        flow: Flow::nominal(0.5),
                    },
                )
                .unwrap();
            system
        };

        let error = Model::new(&system).solve(false).unwrap_err();
        assert!(error.to_string().starts_with("Could not solve"));
    }

    #[test]
    fn test_relative_bounds() {
        let flow = Flow {
            min: Some(0.2.into()),
            max: Some(vec![0.5, 0.8].into()),
            ..Flow::nominal(10.0)
        };
        assert_eq!(relative_bounds(&flow, 1), (0.2, 0.8));
        assert_eq!(relative_bounds(&Flow::fixed(vec![0.3], 1.0), 0), (0.3, 0.3));
        assert_eq!(relative_bounds(&Flow::default(), 0), (0.0, 1.0));
    }
}
