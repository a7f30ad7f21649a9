//! A cooling system driven by a compression chiller, with electricity from PV and the grid.
//!
//! ```text
//!                      electricity  cool  waste  ambient
//! grid_el, pv          |---------->|     |      |
//! compression_chiller  |<----------|     |      |
//!                      |---------------->|----->|
//! cooling_tower        |<----------|<----------|
//!                      |------------------------------>|
//! storage_*            |<--------->| (electricity, cool)
//! demand               |<----------------|
//! excess_el            |<----------|
//! ```
//!
//! PV, chiller and cooling tower are sized by the optimisation, as are storages with a nominal
//! capacity of zero. Grid electricity may cover at most a given share of the electricity the
//! chiller needs for the total cooling demand.
use super::SystemInputs;
use super::solar_cooling::{
    COOLING_LOAD_COLUMN, PV_COLUMN, add_storage, costs_from_params, fixed_investment,
    horizon_demand,
};
use crate::network::{EnergySystem, Flow, Investment, Node, Transformer};
use anyhow::Result;
use indexmap::indexmap;

/// Build the network
pub fn build(inputs: &SystemInputs) -> Result<EnergySystem> {
    let SystemInputs { params, series, .. } = *inputs;
    let mut system = EnergySystem::new(inputs.horizon);

    let cool = system.add_bus("cool")?;
    let waste = system.add_bus("waste")?;
    let electricity = system.add_bus("electricity")?;
    let ambient = system.add_bus("ambient")?;

    system.add(
        "ambience",
        Node::Sink {
            input: ambient.clone(),
            flow: Flow::default(),
        },
    )?;

    let demand = series.column(COOLING_LOAD_COLUMN)?;
    let chiller_cop = params.get("conv_factor_compression_output_cool")?;
    let grid_limit = horizon_demand(&demand) / chiller_cop
        * params.get("sol_fraction_el")?
        * params.get("sol_fraction_el_variation")?;
    system.add(
        "grid_el",
        Node::Source {
            output: electricity.clone(),
            flow: Flow {
                summed_max: Some(grid_limit),
                ..Flow::with_costs(
                    params.get("price_electr")? * params.get("price_electr_variation")?,
                )
            },
        },
    )?;
    system.add(
        "pv",
        Node::Source {
            output: electricity.clone(),
            flow: fixed_investment(
                series.column(PV_COLUMN)?,
                costs_from_params(params, "invest_costs_pv_output_el_09708", "pv", 1.0)?,
            ),
        },
    )?;
    system.add(
        "demand",
        Node::Sink {
            input: cool.clone(),
            flow: Flow::fixed(demand, 1.0),
        },
    )?;
    system.add(
        "excess_el",
        Node::Sink {
            input: electricity.clone(),
            flow: Flow::default(),
        },
    )?;

    let chiller_costs = costs_from_params(
        params,
        "invest_costs_compression_output_cool",
        "compression",
        1.0,
    )?;
    system.add(
        "compression_chiller",
        Node::Transformer(Transformer {
            inputs: indexmap! {electricity.clone() => Flow::default()},
            outputs: indexmap! {
                cool.clone() => Flow::invest(Investment::new(chiller_costs)),
                waste.clone() => Flow::default(),
            },
            conversion_factors: indexmap! {
                cool.clone() => chiller_cop,
                waste.clone() => params.get("conv_factor_compression_output_waste")?,
            },
        }),
    )?;

    let tower_costs = costs_from_params(params, "invest_costs_tower_input_th", "tower", 1.0)?;
    system.add(
        "cooling_tower",
        Node::Transformer(Transformer {
            inputs: indexmap! {
                waste.clone() => Flow::invest(Investment::new(tower_costs)),
                electricity.clone() => Flow::default(),
            },
            outputs: indexmap! {ambient => Flow::default()},
            conversion_factors: indexmap! {
                waste => params.get("conv_factor_tower_input_waste")?,
                electricity.clone() => params.get("conv_factor_tower_input_el")?,
            },
        }),
    )?;

    add_storage(&mut system, params, "storage_cool", "cool", &cool)?;
    add_storage(&mut system, params, "storage_electricity", "el", &electricity)?;

    Ok(system)
}
