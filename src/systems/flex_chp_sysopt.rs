//! Investment optimisation of a CHP system which sells electricity at a fluctuating price.
//!
//! The CHP plant, gas boiler, P2H unit and both storages are sized by the optimisation. Heat is
//! sold at the cost a gas boiler would have had. The negative residual load is fed in on its own
//! `residual` bus, so that it can reach the electricity bus through the `oneway` transformer but
//! CHP electricity can never be turned into heat by the P2H unit.
use super::{SystemInputs, add_excess_and_shortage, annuity_from_params, scale};
use crate::config::PriceRelationship;
use crate::finance::annuity;
use crate::id::NodeID;
use crate::input::ParameterTable;
use crate::network::{
    EnergySystem, ExtractionTurbine, Flow, Investment, Node, Storage, StorageCapacity,
    Transformer,
};
use crate::units::{Dimensionless, MoneyPerCapacity};
use anyhow::Result;
use indexmap::indexmap;

/// Capacity of the electricity sale
const DEMAND_EL_CAPACITY: f64 = 8000.0;

/// Upper limit for the fuel input capacity of the CHP plant
const MAX_CHP_FUEL_CAPACITY: f64 = 1667.0;

/// Build the network
pub fn build(inputs: &SystemInputs) -> Result<EnergySystem> {
    let SystemInputs { params, series, .. } = *inputs;
    let mut system = EnergySystem::new(inputs.horizon);

    let gas = system.add_bus("natural_gas")?;
    let electricity = system.add_bus("electricity")?;
    let residual = system.add_bus("residual")?;
    let heat = system.add_bus("heat")?;

    add_excess_and_shortage(&mut system, params, &electricity, "bel")?;
    add_excess_and_shortage(&mut system, params, &heat, "bth")?;

    let nom_val_gas = params.get("nom_val_gas")?;
    let gas_price = params.get("var_costs_gas")?;
    system.add(
        "rgas",
        Node::Source {
            output: gas.clone(),
            flow: Flow {
                summed_max: Some(params.get("sum_max_gas")? * nom_val_gas),
                variable_costs: (gas_price * params.get("gas_price_variation")?).into(),
                ..Flow::nominal(nom_val_gas)
            },
        },
    )?;

    let nom_val_neg_residual = params.get("nom_val_neg_residual")?;
    system.add(
        "residual_el",
        Node::Source {
            output: residual.clone(),
            flow: Flow::fixed(series.column("neg_residual_el")?, nom_val_neg_residual),
        },
    )?;

    // Electricity is sold, so its price enters the objective as a negative cost
    system.add(
        "demand_el",
        Node::Sink {
            input: electricity.clone(),
            flow: Flow {
                variable_costs: electricity_revenue(inputs)?.into(),
                ..Flow::nominal(DEMAND_EL_CAPACITY)
            },
        },
    )?;

    let boiler_efficiency = params.get("conversion_factor_boiler")?;
    system.add(
        "demand_th",
        Node::Sink {
            input: heat.clone(),
            flow: Flow {
                variable_costs: (-gas_price / boiler_efficiency).into(),
                ..Flow::fixed(
                    series.column("demand_th")?,
                    params.get("nom_val_demand_th")?,
                )
            },
        },
    )?;

    system.add(
        "oneway",
        Node::Transformer(Transformer {
            inputs: indexmap! {residual.clone() => Flow::nominal(nom_val_neg_residual)},
            outputs: indexmap! {electricity.clone() => Flow::default()},
            conversion_factors: indexmap! {electricity.clone() => 1.0},
        }),
    )?;

    // CHP investment costs are given per unit of electrical output
    let full_condensation_factor = params.get("conv_factor_full_cond")?;
    let chp_costs = annuity_from_params(params, "capex_CHP", "lifetime_CHP", "wacc_CHP")?
        * Dimensionless(full_condensation_factor);
    system.add(
        "CHP_01",
        Node::ExtractionTurbine(ExtractionTurbine {
            fuel: (
                gas.clone(),
                Flow::invest(Investment {
                    maximum: Some(MAX_CHP_FUEL_CAPACITY),
                    ..Investment::new(chp_costs)
                }),
            ),
            main_output: (electricity.clone(), Flow::default()),
            tapped_output: (heat.clone(), Flow::default()),
            main_conversion_factor: params.get("conv_factor_bel_CHP")?,
            tapped_conversion_factor: params.get("conv_factor_bth_CHP")?,
            full_condensation_factor,
        }),
    )?;

    let boiler_costs =
        annuity_from_params(params, "capex_boiler", "lifetime_boiler", "wacc_boiler")?;
    system.add(
        "boiler",
        Node::Transformer(Transformer {
            inputs: indexmap! {gas => Flow::default()},
            outputs: indexmap! {heat.clone() => Flow::invest(Investment::new(boiler_costs))},
            conversion_factors: indexmap! {heat.clone() => boiler_efficiency},
        }),
    )?;

    let p2h_costs = annuity_from_params(params, "capex_p2h", "lifetime_p2h", "wacc_p2h")?;
    let p2h_efficiency = params.get("conversion_factor_p2h")?;
    system.add(
        "P2H",
        Node::Transformer(Transformer {
            inputs: indexmap! {residual => Flow::default()},
            outputs: indexmap! {heat.clone() => Flow::invest(Investment::new(p2h_costs))},
            conversion_factors: indexmap! {heat.clone() => p2h_efficiency},
        }),
    )?;

    add_storage(&mut system, params, "th", "TES", &heat)?;
    add_storage(&mut system, params, "el", "EES", &electricity)?;

    Ok(system)
}

/// The (negative) price paid for electricity in every time step.
///
/// The price follows the normalised residual load, either linearly or quadratically.
fn electricity_revenue(inputs: &SystemInputs) -> Result<Vec<f64>> {
    let params = inputs.params;
    let price = params.get("el_price")? * params.get("el_price_variation")?;
    let residual_load = inputs.series.column("demand_el")?;

    Ok(match inputs.price_relationship {
        PriceRelationship::Linear => scale(residual_load, -price),
        PriceRelationship::Quadratic => {
            let factor = params.get("price_factor_sqr")?;
            residual_load
                .into_iter()
                .map(|value| -price * factor * value.powi(2))
                .collect()
        }
    })
}

/// Add `storage_<suffix>` with an investment costed from the `<technology>` parameters
fn add_storage(
    system: &mut EnergySystem,
    params: &ParameterTable,
    suffix: &str,
    technology: &str,
    bus: &NodeID,
) -> Result<()> {
    let label = format!("storage_{suffix}");
    let param = |name: &str| params.get(&format!("{name}_{label}"));

    let capex = params.get(&format!("capex_{technology}"))?
        * params.get(&format!("{technology}_capex_variation"))?;
    let costs = annuity(
        MoneyPerCapacity(capex),
        params.get_whole(&format!("lifetime_{technology}"))?,
        Dimensionless(params.get(&format!("wacc_{technology}"))?),
    );
    let relation = 1.0 / param("charging_time")?;

    let storage = Storage {
        loss_rate: param("capacity_loss")?,
        inflow_conversion_factor: param("inflow_conv_factor")?,
        outflow_conversion_factor: param("outflow_conv_factor")?,
        initial_storage_level: Some(param("init_capacity")?),
        invest_relation_input_capacity: Some(relation),
        invest_relation_output_capacity: Some(relation),
        ..Storage::new(bus.clone(), StorageCapacity::Invest(Investment::new(costs)))
    };
    system.add(&label, Node::Storage(storage))?;

    Ok(())
}
