//! A CHP plant covering fixed electricity and heat demands, optionally with storage.
//!
//! ```text
//!                 natural_gas  electricity  heat
//! rgas               |---->|         |        |
//! demand_el          |<--------------|        |
//! demand_th          |<-----------------------|
//! P2H                |------------------------>|
//! CHP_01             |<----|         |        |
//!                    |-------------->|        |
//!                    |------------------------>|
//! boiler             |<----|         |        |
//!                    |------------------------>|
//! storage_th         |<----------------------->|
//! storage_el         |<------------->|        |
//! ```
//!
//! The P2H unit converts the negative residual load into heat. The storages are only part of the
//! network when their nominal capacity is above zero.
use super::{SystemInputs, add_excess_and_shortage};
use crate::id::NodeID;
use crate::input::ParameterTable;
use crate::network::{
    EnergySystem, ExtractionTurbine, Flow, Node, Storage, StorageCapacity, Transformer,
};
use anyhow::Result;
use indexmap::indexmap;
use log::info;

/// Build the network
pub fn build(inputs: &SystemInputs) -> Result<EnergySystem> {
    let SystemInputs { params, series, .. } = *inputs;
    let mut system = EnergySystem::new(inputs.horizon);

    let gas = system.add_bus("natural_gas")?;
    let electricity = system.add_bus("electricity")?;
    let heat = system.add_bus("heat")?;

    add_excess_and_shortage(&mut system, params, &electricity, "bel")?;
    add_excess_and_shortage(&mut system, params, &heat, "bth")?;

    let nom_val_gas = params.get("nom_val_gas")?;
    system.add(
        "rgas",
        Node::Source {
            output: gas.clone(),
            flow: Flow {
                summed_max: Some(params.get("sum_max_gas")? * nom_val_gas),
                variable_costs: params.get("var_costs_gas")?.into(),
                ..Flow::nominal(nom_val_gas)
            },
        },
    )?;
    system.add(
        "P2H",
        Node::Source {
            output: heat.clone(),
            flow: Flow::fixed(
                series.column("neg_residual_el")?,
                params.get("nom_val_neg_residual")? * params.get("conversion_factor_p2h")?,
            ),
        },
    )?;
    system.add(
        "demand_el",
        Node::Sink {
            input: electricity.clone(),
            flow: Flow::fixed(
                series.column("demand_el")?,
                params.get("nom_val_demand_el")?,
            ),
        },
    )?;
    system.add(
        "demand_th",
        Node::Sink {
            input: heat.clone(),
            flow: Flow::fixed(
                series.column("demand_th")?,
                params.get("nom_val_demand_th")?,
            ),
        },
    )?;

    // Fuel capacity is the fuel needed for maximum output in full condensation mode
    let full_condensation_factor = params.get("conv_factor_full_cond")?;
    system.add(
        "CHP_01",
        Node::ExtractionTurbine(ExtractionTurbine {
            fuel: (
                gas.clone(),
                Flow::nominal(params.get("P_max_woDH")? / full_condensation_factor),
            ),
            main_output: (electricity.clone(), Flow::default()),
            tapped_output: (heat.clone(), Flow::default()),
            main_conversion_factor: params.get("conv_factor_bel_CHP")?,
            tapped_conversion_factor: params.get("conv_factor_bth_CHP")?,
            full_condensation_factor,
        }),
    )?;

    let boiler_output = Flow {
        variable_costs: params.get("var_costs_boiler")?.into(),
        ..Flow::nominal(params.get("nom_val_out_boiler")?)
    };
    let boiler_efficiency = params.get("conversion_factor_boiler")?;
    system.add(
        "boiler",
        Node::Transformer(Transformer {
            inputs: indexmap! {gas => Flow::default()},
            outputs: indexmap! {heat.clone() => boiler_output},
            conversion_factors: indexmap! {heat.clone() => boiler_efficiency},
        }),
    )?;

    add_storage(&mut system, params, "th", &heat, "bth")?;
    add_storage(&mut system, params, "el", &electricity, "bel")?;

    Ok(system)
}

/// Add `storage_<suffix>` if `nom_capacity_storage_<suffix>` is above zero
fn add_storage(
    system: &mut EnergySystem,
    params: &ParameterTable,
    suffix: &str,
    bus: &NodeID,
    bus_suffix: &str,
) -> Result<()> {
    let label = format!("storage_{suffix}");
    let param = |name: &str| params.get(&format!("{name}_{label}"));

    let capacity = param("nom_capacity")?;
    if capacity <= 0.0 {
        info!("Leaving out {label} as it has no capacity");
        return Ok(());
    }

    let storage = Storage {
        input_flow: Flow {
            variable_costs: param(&format!("var_costs_input_{bus_suffix}"))?.into(),
            ..Flow::nominal(param(&format!("nom_val_input_{bus_suffix}"))?)
        },
        output_flow: Flow {
            variable_costs: param(&format!("var_costs_output_{bus_suffix}"))?.into(),
            ..Flow::nominal(param(&format!("nom_val_output_{bus_suffix}"))?)
        },
        loss_rate: param("capacity_loss")?,
        inflow_conversion_factor: param("inflow_conv_factor")?,
        outflow_conversion_factor: param("outflow_conv_factor")?,
        initial_storage_level: Some(param("init_capacity")?),
        ..Storage::new(bus.clone(), StorageCapacity::Nominal(capacity))
    };
    system.add(&label, Node::Storage(storage))?;

    Ok(())
}
