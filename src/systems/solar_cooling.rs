//! A cooling system driven by an absorption chiller, with heat from solar collectors and a gas
//! boiler and electricity from PV and the grid.
//!
//! ```text
//!                     gas  thermal  electricity  cool  waste  ambient
//! naturalgas           |--->|       |            |     |      |
//! grid_el, pv          |------------------------>|     |      |
//! collector            |----------->|            |     |      |
//! boiler               |<---|------>|            |     |      |
//! absorption_chiller   |<-----------|<-----------|     |      |
//!                      |------------------------------>|----->|
//! cooling_tower        |<------------------------|<----------|
//!                      |------------------------------------------>|
//! storage_*            |<---------->| (thermal, electricity, cool)
//! demand               |<------------------------------|
//! ```
//!
//! Collector, PV, chiller and cooling tower are sized by the optimisation. Boiler and storages are
//! sized by the optimisation when their nominal capacity is zero. The boiler may cover at most a
//! given share of the total cooling demand.
use super::SystemInputs;
use crate::finance::ep_costs;
use crate::id::NodeID;
use crate::input::ParameterTable;
use crate::network::{
    EnergySystem, Flow, Investment, Node, Storage, StorageCapacity, TimeValue, Transformer,
};
use crate::units::{Dimensionless, MoneyPerCapacity};
use anyhow::Result;
use indexmap::indexmap;

/// Column of the cooling demand in the time series
pub const COOLING_LOAD_COLUMN: &str = "Cooling load kW";

/// Column of the global irradiance in kW/m²
pub const IRRADIANCE_COLUMN: &str = "global_irradiance_kW_per_m2_TMY";

/// Column of the ambient temperature in °C
pub const AMBIENT_TEMPERATURE_COLUMN: &str = "t_amb";

/// Column of the normalised PV output
pub const PV_COLUMN: &str = "pv_normiert";

/// Equivalent periodical costs from parameters `<capex>`, `lifetime_<name>` and `opex_<name>`
/// along with the shared `wacc`
pub(super) fn costs_from_params(
    params: &ParameterTable,
    capex: &str,
    name: &str,
    capex_factor: f64,
) -> Result<MoneyPerCapacity> {
    Ok(ep_costs(
        MoneyPerCapacity(params.get(capex)? * capex_factor),
        params.get_whole(&format!("lifetime_{name}"))?,
        Dimensionless(params.get(&format!("opex_{name}"))?),
        Dimensionless(params.get("wacc")?),
    ))
}

/// Equivalent periodical costs per unit of capacity of the storage `stor_<name>`.
///
/// Battery (`el`) costs are scaled by `capex_stor_el_variation`.
pub fn storage_costs(params: &ParameterTable, name: &str) -> Result<MoneyPerCapacity> {
    let capex_factor = if name == "el" {
        params.get("capex_stor_el_variation")?
    } else {
        1.0
    };
    costs_from_params(
        params,
        &format!("invest_costs_stor_{name}_capacity"),
        &format!("stor_{name}"),
        capex_factor,
    )
}

/// Heat output of a flat-plate collector per unit of collector area.
///
/// This is a simplified model. The collector is taken to face the sun, so there are no tilt or
/// azimuth inputs and the global irradiance is used as is, without a split into direct and
/// diffuse radiation.
///
/// The efficiency is `η = η₀ − a₁·ΔT/G − a₂·ΔT²/G` with `ΔT` the difference between the mean
/// collector temperature and the ambient temperature and `G` the irradiance in W/m². Irradiance is
/// given in kW/m² and so is the output. The output is never negative.
pub fn flat_plate_heat(
    params: &ParameterTable,
    irradiance: &[f64],
    ambient_temperature: &[f64],
) -> Result<Vec<f64>> {
    let eta_0 = params.get("eta_0")?;
    let a_1 = params.get("a_1")?;
    let a_2 = params.get("a_2")?;
    let mean_temperature = params.get("temp_collector_inlet")? + params.get("delta_temp_n")?;

    Ok(irradiance
        .iter()
        .zip(ambient_temperature)
        .map(|(&irradiance, &ambient)| {
            let irradiance_w = irradiance * 1000.0;
            if irradiance_w <= 0.0 {
                return 0.0;
            }
            let delta_t = mean_temperature - ambient;
            let efficiency =
                eta_0 - a_1 * delta_t / irradiance_w - a_2 * delta_t.powi(2) / irradiance_w;
            efficiency.max(0.0) * irradiance
        })
        .collect())
}

/// Build the network
pub fn build(inputs: &SystemInputs) -> Result<EnergySystem> {
    let SystemInputs { params, series, .. } = *inputs;
    let mut system = EnergySystem::new(inputs.horizon);

    let thermal = system.add_bus("thermal")?;
    let cool = system.add_bus("cool")?;
    let waste = system.add_bus("waste")?;
    let electricity = system.add_bus("electricity")?;
    let gas = system.add_bus("gas")?;
    let ambient = system.add_bus("ambient")?;

    system.add(
        "ambience",
        Node::Sink {
            input: ambient.clone(),
            flow: Flow::default(),
        },
    )?;
    system.add(
        "naturalgas",
        Node::Source {
            output: gas.clone(),
            flow: Flow::with_costs(params.get("price_gas")? * params.get("price_gas_variation")?),
        },
    )?;
    system.add(
        "grid_el",
        Node::Source {
            output: electricity.clone(),
            flow: Flow::with_costs(
                params.get("price_electr")? * params.get("price_electr_variation")?,
            ),
        },
    )?;

    let collector_heat = flat_plate_heat(
        params,
        &series.column(IRRADIANCE_COLUMN)?,
        &series.column(AMBIENT_TEMPERATURE_COLUMN)?,
    )?;
    system.add(
        "collector",
        Node::Source {
            output: thermal.clone(),
            flow: fixed_investment(
                collector_heat,
                costs_from_params(params, "invest_costs_collect_output_th", "collector", 1.0)?,
            ),
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

    let demand = series.column(COOLING_LOAD_COLUMN)?;
    let demand_sum = horizon_demand(&demand);
    system.add(
        "demand",
        Node::Sink {
            input: cool.clone(),
            flow: Flow::fixed(demand, 1.0),
        },
    )?;
    system.add(
        "excess_thermal",
        Node::Sink {
            input: thermal.clone(),
            flow: Flow::default(),
        },
    )?;
    system.add(
        "excess_el",
        Node::Sink {
            input: electricity.clone(),
            flow: Flow::default(),
        },
    )?;

    // The boiler may only cover the non-solar share of the demand
    let boiler_nominal_value = params.get("nominal_value_boiler_output_thermal")?;
    let boiler_capacity = if boiler_nominal_value == 0.0 {
        Flow::invest(Investment::new(costs_from_params(
            params,
            "invest_costs_boiler_output_th",
            "boiler",
            1.0,
        )?))
    } else {
        Flow::nominal(boiler_nominal_value)
    };
    let boiler_output = Flow {
        summed_max: Some(
            demand_sum
                * params.get("sol_fraction_thermal")?
                * params.get("sol_fraction_thermal_variation")?,
        ),
        ..boiler_capacity
    };
    let boiler_efficiency = params.get("conv_factor_boiler_output_thermal")?;
    system.add(
        "boiler",
        Node::Transformer(Transformer {
            inputs: indexmap! {gas => Flow::default()},
            outputs: indexmap! {thermal.clone() => boiler_output},
            conversion_factors: indexmap! {thermal.clone() => boiler_efficiency},
        }),
    )?;

    let chiller_costs =
        costs_from_params(params, "invest_costs_absorption_output_cool", "absorption", 1.0)?;
    system.add(
        "absorption_chiller",
        Node::Transformer(Transformer {
            inputs: indexmap! {
                thermal.clone() => Flow::default(),
                electricity.clone() => Flow::default(),
            },
            outputs: indexmap! {
                cool.clone() => Flow::invest(Investment::new(chiller_costs)),
                waste.clone() => Flow::default(),
            },
            conversion_factors: indexmap! {
                cool.clone() => params.get("conv_factor_absorption_output_cool")?,
                waste.clone() => params.get("conv_factor_absorption_output_waste")?,
                thermal.clone() => params.get("conv_factor_absorption_input_th")?,
                electricity.clone() => params.get("conv_factor_absorption_input_el")?,
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
                waste.clone() => params.get("conv_factor_tower_input_waste")?,
                electricity.clone() => params.get("conv_factor_tower_input_el")?,
            },
        }),
    )?;

    add_storage(&mut system, params, "storage_cool", "cool", &cool)?;
    add_storage(&mut system, params, "storage_thermal", "thermal", &thermal)?;
    add_storage(&mut system, params, "storage_electricity", "el", &electricity)?;

    Ok(system)
}

/// The total cooling demand.
///
/// The series has already been cut to the horizon, so in a debug run this covers only the first
/// few time steps rather than the whole demand file. Limits derived from it scale with the
/// horizon.
pub(super) fn horizon_demand(demand: &[f64]) -> f64 {
    demand.iter().sum()
}

/// A flow following `profile × capacity` where the capacity is chosen by the optimisation
pub(super) fn fixed_investment(profile: Vec<f64>, costs: MoneyPerCapacity) -> Flow {
    Flow {
        fix: Some(TimeValue::Series(profile)),
        ..Flow::invest(Investment::new(costs))
    }
}

/// Add a storage which is sized by the optimisation if `nominal_capacitiy_stor_<name>` is zero
pub(super) fn add_storage(
    system: &mut EnergySystem,
    params: &ParameterTable,
    label: &str,
    name: &str,
    bus: &NodeID,
) -> Result<()> {
    let nominal_capacity = params.get(&format!("nominal_capacitiy_stor_{name}"))?;
    let capacity = if nominal_capacity == 0.0 {
        StorageCapacity::Invest(Investment::new(storage_costs(params, name)?))
    } else {
        StorageCapacity::Nominal(nominal_capacity)
    };

    let storage = Storage {
        loss_rate: params.get(&format!("capac_loss_stor_{name}"))?,
        inflow_conversion_factor: params.get(&format!("conv_factor_stor_{name}_input"))?,
        outflow_conversion_factor: params.get(&format!("conv_factor_stor_{name}_output"))?,
        ..Storage::new(bus.clone(), capacity)
    };
    system.add(label, Node::Storage(storage))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriceRelationship;
    use crate::graph::validate_energy_system;
    use crate::input::TimeSeries;
    use float_cmp::assert_approx_eq;
    use rstest::{fixture, rstest};

    fn params_with(boiler: f64, stor_thermal: f64) -> ParameterTable {
        let mut rows: Vec<(String, f64)> = [
            ("wacc", 0.05),
            ("price_gas", 0.04),
            ("price_gas_variation", 1.0),
            ("price_electr", 0.1),
            ("price_electr_variation", 1.0),
            ("eta_0", 0.73),
            ("a_1", 1.7),
            ("a_2", 0.016),
            ("temp_collector_inlet", 20.0),
            ("delta_temp_n", 10.0),
            ("invest_costs_collect_output_th", 300.0),
            ("invest_costs_pv_output_el_09708", 1000.0),
            ("invest_costs_boiler_output_th", 50.0),
            ("invest_costs_absorption_output_cool", 400.0),
            ("invest_costs_tower_input_th", 60.0),
            ("nominal_value_boiler_output_thermal", boiler),
            ("conv_factor_boiler_output_thermal", 0.9),
            ("conv_factor_absorption_output_cool", 0.7),
            ("conv_factor_absorption_output_waste", 1.7),
            ("conv_factor_absorption_input_th", 1.0),
            ("conv_factor_absorption_input_el", 0.02),
            ("conv_factor_tower_input_waste", 1.0),
            ("conv_factor_tower_input_el", 0.03),
            ("sol_fraction_thermal", 0.4),
            ("sol_fraction_thermal_variation", 1.0),
            ("capex_stor_el_variation", 1.0),
            ("nominal_capacitiy_stor_cool", 0.0),
            ("nominal_capacitiy_stor_thermal", stor_thermal),
            ("nominal_capacitiy_stor_el", 0.0),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
        for name in [
            "collector",
            "pv",
            "boiler",
            "absorption",
            "tower",
            "stor_cool",
            "stor_thermal",
            "stor_el",
        ] {
            rows.extend([
                (format!("lifetime_{name}"), 20.0),
                (format!("opex_{name}"), 0.01),
            ]);
        }
        for name in ["cool", "thermal", "el"] {
            rows.extend([
                (format!("invest_costs_stor_{name}_capacity"), 20.0),
                (format!("capac_loss_stor_{name}"), 0.01),
                (format!("conv_factor_stor_{name}_input"), 0.95),
                (format!("conv_factor_stor_{name}_output"), 0.95),
            ]);
        }

        ParameterTable::from_rows(rows).unwrap()
    }

    #[fixture]
    fn series() -> TimeSeries {
        TimeSeries::from_columns([
            (COOLING_LOAD_COLUMN, vec![10.0, 20.0, 30.0]),
            (IRRADIANCE_COLUMN, vec![0.0, 0.5, 0.9]),
            (AMBIENT_TEMPERATURE_COLUMN, vec![25.0, 30.0, 35.0]),
            (PV_COLUMN, vec![0.0, 0.4, 0.8]),
        ])
        .unwrap()
    }

    fn build_with(params: &ParameterTable, series: &TimeSeries) -> EnergySystem {
        build(&SystemInputs {
            params,
            series,
            horizon: 3,
            price_relationship: PriceRelationship::Linear,
        })
        .unwrap()
    }

    #[rstest]
    fn test_build(series: TimeSeries) {
        let system = build_with(&params_with(0.0, 0.0), &series);
        validate_energy_system(&system).unwrap();

        let Some(Node::Transformer(boiler)) = system.get("boiler") else {
            panic!("boiler should be a transformer");
        };
        let output = &boiler.outputs["thermal"];
        assert!(output.investment.is_some());
        assert_approx_eq!(f64, output.summed_max.unwrap(), 24.0);

        let Some(Node::Storage(storage)) = system.get("storage_thermal") else {
            panic!("storage_thermal should be a storage");
        };
        assert!(matches!(storage.capacity, StorageCapacity::Invest(_)));
    }

    #[rstest]
    fn test_build_nominal_capacities(series: TimeSeries) {
        let system = build_with(&params_with(50.0, 100.0), &series);

        let Some(Node::Transformer(boiler)) = system.get("boiler") else {
            panic!("boiler should be a transformer");
        };
        assert_eq!(boiler.outputs["thermal"].nominal_value, Some(50.0));

        let Some(Node::Storage(storage)) = system.get("storage_thermal") else {
            panic!("storage_thermal should be a storage");
        };
        assert_eq!(storage.capacity, StorageCapacity::Nominal(100.0));
    }

    #[test]
    fn test_battery_costs_scaled_by_variation() {
        let base = params_with(0.0, 0.0);
        let full = storage_costs(&base, "el").unwrap();
        let cheaper = ParameterTable::merge(
            base,
            ParameterTable::from_rows([("capex_stor_el_variation", 0.5)]).unwrap(),
        );
        assert_approx_eq!(
            f64,
            storage_costs(&cheaper, "el").unwrap().value(),
            full.value() * 0.5
        );

        // Other storages ignore the battery variation
        assert_approx_eq!(
            f64,
            storage_costs(&cheaper, "cool").unwrap().value(),
            storage_costs(&params_with(0.0, 0.0), "cool").unwrap().value()
        );
    }

    #[test]
    fn test_boiler_limit_follows_horizon() {
        let short = TimeSeries::from_columns([
            (COOLING_LOAD_COLUMN, vec![10.0, 20.0]),
            (IRRADIANCE_COLUMN, vec![0.0, 0.5]),
            (AMBIENT_TEMPERATURE_COLUMN, vec![25.0, 30.0]),
            (PV_COLUMN, vec![0.0, 0.4]),
        ])
        .unwrap();
        let system = build(&SystemInputs {
            params: &params_with(0.0, 0.0),
            series: &short,
            horizon: 2,
            price_relationship: PriceRelationship::Linear,
        })
        .unwrap();

        let Some(Node::Transformer(boiler)) = system.get("boiler") else {
            panic!("boiler should be a transformer");
        };
        assert_approx_eq!(f64, boiler.outputs["thermal"].summed_max.unwrap(), 12.0);
    }

    #[test]
    fn test_flat_plate_heat() {
        let params = params_with(0.0, 0.0);
        let heat = flat_plate_heat(&params, &[0.0, 1.0, 0.01], &[25.0, 30.0, 0.0]).unwrap();

        // No irradiance, no heat
        assert_eq!(heat[0], 0.0);

        // Collector at ambient temperature runs at its optical efficiency
        assert_approx_eq!(f64, heat[1], 0.73);

        // Heat losses exceed the gain
        assert_eq!(heat[2], 0.0);
    }
}
