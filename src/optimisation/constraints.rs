//! Code for adding constraints to the linear program of an energy network.
use super::{
    ColumnIndex, LinearProblem, StorageVariables, VariableMap, at_least, at_most, equal_to,
    flow_name, relative_bounds,
};
use crate::id::NodeID;
use crate::network::{
    EnergySystem, ExtractionTurbine, FlowRef, Node, Storage, StorageCapacity, Transformer,
};
use crate::results::FlowKey;
use indexmap::IndexMap;

/// Add all constraints for an energy network.
///
/// # Arguments:
///
/// * `problem` - The linear program
/// * `variables` - The variables in the problem
/// * `system` - The energy network
pub fn add_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    system: &EnergySystem,
) {
    add_flow_investment_constraints(problem, variables, system);
    add_summed_max_constraints(problem, variables, system);
    add_bus_balance_constraints(problem, variables, system);

    for (label, node) in system.iter() {
        match node {
            Node::Transformer(transformer) => add_transformer_constraints(
                problem,
                variables,
                label,
                transformer,
                system.horizon(),
            ),
            Node::ExtractionTurbine(turbine) => add_extraction_turbine_constraints(
                problem,
                variables,
                label,
                turbine,
                system.horizon(),
            ),
            Node::Storage(storage) => {
                add_storage_constraints(problem, variables, label, storage, system.horizon());
            }
            Node::Bus | Node::Source { .. } | Node::Sink { .. } => {}
        }
    }
}

/// Bound flows whose capacity is an investment.
///
/// For every time step: `min_t × (existing + invest) <= flow_t <= max_t × (existing + invest)`,
/// or `flow_t = fix_t × (existing + invest)` for fixed flows.
fn add_flow_investment_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    system: &EnergySystem,
) {
    for FlowRef { key, flow } in system.iter_flows() {
        let Some(investment) = &flow.investment else {
            continue;
        };
        let invest = variables.flow_investments[&key];
        let name = flow_name(&key);

        for t in 0..system.horizon() {
            let flow_var = variables.flow(&key, t);
            let (min, max) = relative_bounds(flow, t);
            if flow.fix.is_some() {
                problem.add_row(
                    format!("fixed_flow({name},{t})"),
                    equal_to(max * investment.existing),
                    vec![(flow_var, 1.0), (invest, -max)],
                );
                continue;
            }

            problem.add_row(
                format!("max_flow({name},{t})"),
                at_most(max * investment.existing),
                vec![(flow_var, 1.0), (invest, -max)],
            );
            if min > 0.0 {
                problem.add_row(
                    format!("min_flow({name},{t})"),
                    at_least(min * investment.existing),
                    vec![(flow_var, 1.0), (invest, -min)],
                );
            }
        }
    }
}

/// Limit the total of a flow over the horizon
fn add_summed_max_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    system: &EnergySystem,
) {
    for FlowRef { key, flow } in system.iter_flows() {
        let Some(summed_max) = flow.summed_max else {
            continue;
        };
        let terms = (0..system.horizon())
            .map(|t| (variables.flow(&key, t), 1.0))
            .collect();
        problem.add_row(
            format!("summed_max({})", flow_name(&key)),
            at_most(summed_max),
            terms,
        );
    }
}

/// Add the commodity balance for every bus and time step: inflows equal outflows.
fn add_bus_balance_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    system: &EnergySystem,
) {
    // The flows touching each bus, with +1 for inflows and -1 for outflows
    let mut bus_flows: IndexMap<&NodeID, Vec<(FlowKey, f64)>> =
        system.iter_buses().map(|bus| (bus, Vec::new())).collect();
    for FlowRef { key, .. } in system.iter_flows() {
        if let Some(flows) = key.to.as_ref().and_then(|to| bus_flows.get_mut(to)) {
            flows.push((key, 1.0));
        } else if let Some(flows) = bus_flows.get_mut(&key.from) {
            flows.push((key, -1.0));
        }
    }

    for (bus, flows) in &bus_flows {
        for t in 0..system.horizon() {
            let terms = flows
                .iter()
                .map(|(key, sign)| (variables.flow(key, t), *sign))
                .collect();
            problem.add_row(format!("balance({bus},{t})"), equal_to(0.0), terms);
        }
    }
}

/// Link every flow of a transformer to its first input.
///
/// For a flow `x` and the reference input `r`: `flow_x × factor_r = flow_r × factor_x`.
fn add_transformer_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    label: &NodeID,
    transformer: &Transformer,
    horizon: usize,
) {
    let mut inputs = transformer.inputs.keys();
    let Some(reference_bus) = inputs.next() else {
        return;
    };
    let reference_key = FlowKey::flow(reference_bus.clone(), label.clone());
    let reference_factor = transformer.conversion_factor(reference_bus);

    let others = inputs
        .map(|bus| (bus, FlowKey::flow(bus.clone(), label.clone())))
        .chain(
            transformer
                .outputs
                .keys()
                .map(|bus| (bus, FlowKey::flow(label.clone(), bus.clone()))),
        );
    for (bus, key) in others {
        let factor = transformer.conversion_factor(bus);
        for t in 0..horizon {
            problem.add_row(
                format!("conversion({label},{bus},{t})"),
                equal_to(0.0),
                vec![
                    (variables.flow(&key, t), reference_factor),
                    (variables.flow(&reference_key, t), -factor),
                ],
            );
        }
    }
}

/// Add the operating region of an extraction turbine.
///
/// `flow_in × η_cond = flow_main + β × flow_tapped` and
/// `flow_main >= flow_tapped × c_main / c_tapped` (back-pressure line).
fn add_extraction_turbine_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    label: &NodeID,
    turbine: &ExtractionTurbine,
    horizon: usize,
) {
    let fuel = FlowKey::flow(turbine.fuel.0.clone(), label.clone());
    let main = FlowKey::flow(label.clone(), turbine.main_output.0.clone());
    let tapped = FlowKey::flow(label.clone(), turbine.tapped_output.0.clone());
    let power_loss_index = turbine.power_loss_index();
    let back_pressure_ratio = turbine.main_conversion_factor / turbine.tapped_conversion_factor;

    for t in 0..horizon {
        let fuel_var = variables.flow(&fuel, t);
        let main_var = variables.flow(&main, t);
        let tapped_var = variables.flow(&tapped, t);
        problem.add_row(
            format!("fuel_input({label},{t})"),
            equal_to(0.0),
            vec![
                (fuel_var, turbine.full_condensation_factor),
                (main_var, -1.0),
                (tapped_var, -power_loss_index),
            ],
        );
        problem.add_row(
            format!("back_pressure({label},{t})"),
            at_least(0.0),
            vec![(main_var, 1.0), (tapped_var, -back_pressure_ratio)],
        );
    }
}

/// Add the content balance of a storage along with the limits which depend on its capacity
fn add_storage_constraints(
    problem: &mut LinearProblem,
    variables: &VariableMap,
    label: &NodeID,
    storage: &Storage,
    horizon: usize,
) {
    let StorageVariables { initial, content } = &variables.storage_content[label];
    let input = FlowKey::flow(storage.bus.clone(), label.clone());
    let output = FlowKey::flow(label.clone(), storage.bus.clone());
    let invest = variables.storage_investments.get(label).copied();

    // c_t = c_{t-1} × (1 - loss) + η_in × in_t - out_t / η_out
    let mut previous = *initial;
    for (t, &current) in content.iter().enumerate() {
        problem.add_row(
            format!("storage_balance({label},{t})"),
            equal_to(0.0),
            vec![
                (current, 1.0),
                (previous, -(1.0 - storage.loss_rate)),
                (variables.flow(&input, t), -storage.inflow_conversion_factor),
                (
                    variables.flow(&output, t),
                    1.0 / storage.outflow_conversion_factor,
                ),
            ],
        );
        previous = current;
    }

    if storage.balanced {
        problem.add_row(
            format!("balanced_storage({label})"),
            equal_to(0.0),
            vec![(previous, 1.0), (*initial, -1.0)],
        );
    }

    if let (StorageCapacity::Invest(investment), Some(invest)) = (&storage.capacity, invest) {
        add_storage_investment_constraints(
            problem,
            label,
            storage,
            *initial,
            content,
            invest,
            investment.existing,
        );
    }

    let capacity = match &storage.capacity {
        StorageCapacity::Nominal(capacity) => *capacity,
        StorageCapacity::Invest(investment) => investment.existing,
    };
    let relations = [
        ("input", &input, storage.invest_relation_input_capacity),
        ("output", &output, storage.invest_relation_output_capacity),
    ];
    for (direction, key, relation) in relations {
        let Some(relation) = relation else {
            continue;
        };
        for t in 0..horizon {
            let mut terms = vec![(variables.flow(key, t), 1.0)];
            if let Some(invest) = invest {
                terms.push((invest, -relation));
            }
            problem.add_row(
                format!("{direction}_capacity({label},{t})"),
                at_most(relation * capacity),
                terms,
            );
        }
    }
}

/// Limit the content of a storage by its invested capacity
fn add_storage_investment_constraints(
    problem: &mut LinearProblem,
    label: &NodeID,
    storage: &Storage,
    initial: ColumnIndex,
    content: &[ColumnIndex],
    invest: ColumnIndex,
    existing: f64,
) {
    for (t, &current) in content.iter().enumerate() {
        problem.add_row(
            format!("max_content({label},{t})"),
            at_most(existing),
            vec![(current, 1.0), (invest, -1.0)],
        );
    }

    match storage.initial_storage_level {
        Some(level) => problem.add_row(
            format!("initial_content({label})"),
            equal_to(level * existing),
            vec![(initial, 1.0), (invest, -level)],
        ),
        None => problem.add_row(
            format!("max_initial_content({label})"),
            at_most(existing),
            vec![(initial, 1.0), (invest, -1.0)],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Flow, Investment};
    use crate::optimisation::Model;
    use crate::units::MoneyPerCapacity;
    use indexmap::indexmap;

    fn row_names(problem: &LinearProblem) -> Vec<&str> {
        problem.rows().iter().map(|row| row.name.as_str()).collect()
    }

    #[test]
    fn test_transformer_rows() {
        let mut system = EnergySystem::new(1);
        for bus in ["gas", "electricity", "heat"] {
            system.add_bus(bus).unwrap();
        }
        system
            .add(
                "chp",
                Node::Transformer(Transformer {
                    inputs: indexmap! {"gas".into() => Flow::default()},
                    outputs: indexmap! {
                        "electricity".into() => Flow::default(),
                        "heat".into() => Flow::default(),
                    },
                    conversion_factors: indexmap! {
                        "electricity".into() => 0.3,
                        "heat".into() => 0.5,
                    },
                }),
            )
            .unwrap();

        let model = Model::new(&system);
        let problem = model.problem();
        let row = problem
            .rows()
            .iter()
            .find(|row| row.name == "conversion(chp,heat,0)")
            .unwrap();

        // flow_heat × 1 - flow_gas × 0.5 = 0
        let coefficients: Vec<f64> = row.terms.iter().map(|(_, c)| *c).collect();
        assert_eq!(coefficients, [1.0, -0.5]);
        assert_eq!((row.min, row.max), (0.0, 0.0));
        assert_eq!(
            problem.columns()[row.terms[1].0].name,
            "flow(gas,chp,0)".to_string()
        );
    }

    #[test]
    fn test_storage_rows() {
        let mut system = EnergySystem::new(2);
        system.add_bus("heat").unwrap();
        let storage = Storage {
            loss_rate: 0.1,
            inflow_conversion_factor: 0.9,
            outflow_conversion_factor: 0.8,
            initial_storage_level: Some(0.5),
            invest_relation_input_capacity: Some(0.25),
            ..Storage::new(
                "heat".into(),
                StorageCapacity::Invest(Investment {
                    existing: 4.0,
                    ..Investment::new(MoneyPerCapacity(1.0))
                }),
            )
        };
        system.add("tes", Node::Storage(storage)).unwrap();

        let model = Model::new(&system);
        let problem = model.problem();
        assert_eq!(
            row_names(problem),
            [
                "balance(heat,0)",
                "balance(heat,1)",
                "storage_balance(tes,0)",
                "storage_balance(tes,1)",
                "balanced_storage(tes)",
                "max_content(tes,0)",
                "max_content(tes,1)",
                "initial_content(tes)",
                "input_capacity(tes,0)",
                "input_capacity(tes,1)",
            ]
        );

        let balance = &problem.rows()[2];
        let coefficients: Vec<f64> = balance.terms.iter().map(|(_, c)| *c).collect();
        assert_eq!(coefficients, [1.0, -0.9, -0.9, 1.25]);

        let initial = &problem.rows()[7];
        assert_eq!((initial.min, initial.max), (2.0, 2.0));

        let input_capacity = &problem.rows()[8];
        assert_eq!(input_capacity.max, 1.0);
    }

    #[test]
    fn test_summed_max_row() {
        let mut system = EnergySystem::new(3);
        system.add_bus("gas").unwrap();
        system
            .add(
                "rgas",
                Node::Source {
                    output: "gas".into(),
                    flow: Flow {
                        summed_max: Some(12.0),
                        ..Flow::nominal(10.0)
                    },
                },
            )
            .unwrap();

        let model = Model::new(&system);
        let row = model
            .problem()
            .rows()
            .iter()
            .find(|row| row.name == "summed_max(rgas,gas)")
            .unwrap();
        assert_eq!(row.terms.len(), 3);
        assert_eq!(row.max, 12.0);
        assert_eq!(row.min, f64::NEG_INFINITY);
    }
}
