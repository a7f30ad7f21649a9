//! The hard-coded energy system topologies.
//!
//! Each system is built from a merged [`ParameterTable`] and a [`TimeSeries`] table. Parameter
//! names are fixed by the builders and a missing parameter or column is an error.
use crate::config::{PriceRelationship, SystemKind};
use crate::finance::annuity;
use crate::id::NodeID;
use crate::input::{ParameterTable, TimeSeries};
use crate::network::{EnergySystem, Flow, Node};
use crate::units::{Dimensionless, MoneyPerCapacity};
use anyhow::{Context, Result};
use log::info;

pub mod flex_chp;
pub mod flex_chp_sysopt;
pub mod solar_cooling;
pub mod solar_cooling_electric;

/// The inputs for building the energy system of one scenario
pub struct SystemInputs<'a> {
    /// Base parameters merged with the scenario's variation
    pub params: &'a ParameterTable,
    /// Demand and weather time series
    pub series: &'a TimeSeries,
    /// The number of time steps
    pub horizon: usize,
    /// How the electricity price follows the residual load
    pub price_relationship: PriceRelationship,
}

/// Build the energy system of the given kind
pub fn build_energy_system(kind: SystemKind, inputs: &SystemInputs) -> Result<EnergySystem> {
    info!("Building the {kind} energy system");
    let system = match kind {
        SystemKind::FlexChp => flex_chp::build(inputs),
        SystemKind::FlexChpSysopt => flex_chp_sysopt::build(inputs),
        SystemKind::SolarCooling => solar_cooling::build(inputs),
        SystemKind::SolarCoolingElectric => solar_cooling_electric::build(inputs),
    }
    .with_context(|| format!("Could not build the {kind} energy system"))?;
    info!("The energy system has {} nodes", system.len());

    Ok(system)
}

/// Multiply every value of a series by `factor`
fn scale(values: Vec<f64>, factor: f64) -> Vec<f64> {
    values.into_iter().map(|value| value * factor).collect()
}

/// The annuity of a capital expenditure read from parameters `capex`, `lifetime` and `wacc`
fn annuity_from_params(
    params: &ParameterTable,
    capex: &str,
    lifetime: &str,
    wacc: &str,
) -> Result<MoneyPerCapacity> {
    Ok(annuity(
        MoneyPerCapacity(params.get(capex)?),
        params.get_whole(lifetime)?,
        Dimensionless(params.get(wacc)?),
    ))
}

/// Add a sink for surplus and a source for deficit on a bus, named `excess_<suffix>` and
/// `shortage_<suffix>`, with their penalties from `var_costs_excess_<suffix>` and
/// `var_costs_shortage_<suffix>`
fn add_excess_and_shortage(
    system: &mut EnergySystem,
    params: &ParameterTable,
    bus: &NodeID,
    suffix: &str,
) -> Result<()> {
    system.add(
        &format!("excess_{suffix}"),
        Node::Sink {
            input: bus.clone(),
            flow: Flow::with_costs(params.get(&format!("var_costs_excess_{suffix}"))?),
        },
    )?;
    system.add(
        &format!("shortage_{suffix}"),
        Node::Source {
            output: bus.clone(),
            flow: Flow::with_costs(params.get(&format!("var_costs_shortage_{suffix}"))?),
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use float_cmp::assert_approx_eq;

    #[test]
    fn test_annuity_from_params() {
        let params =
            ParameterTable::from_rows([("capex", 1000.0), ("lifetime", 10.0), ("wacc", 0.0)])
                .unwrap();
        let costs = annuity_from_params(&params, "capex", "lifetime", "wacc").unwrap();
        assert_approx_eq!(f64, costs.value(), 100.0);
    }

    #[test]
    fn test_annuity_from_params_fractional_lifetime() {
        let params =
            ParameterTable::from_rows([("capex", 1000.0), ("lifetime", 10.5), ("wacc", 0.0)])
                .unwrap();
        assert_error!(
            annuity_from_params(&params, "capex", "lifetime", "wacc"),
            "Parameter `lifetime` must be a non-negative whole number (got 10.5)"
        );
    }

    #[test]
    fn test_add_excess_and_shortage() {
        let params = ParameterTable::from_rows([
            ("var_costs_excess_bth", 0.0),
            ("var_costs_shortage_bth", 1000.0),
        ])
        .unwrap();
        let mut system = EnergySystem::new(3);
        let heat = system.add_bus("heat").unwrap();
        add_excess_and_shortage(&mut system, &params, &heat, "bth").unwrap();

        assert!(system.contains("excess_bth"));
        match system.get("shortage_bth") {
            Some(Node::Source { output, flow }) => {
                assert_eq!(output, &heat);
                assert_eq!(flow.variable_costs.at(0), 1000.0);
            }
            _ => panic!("Expected a source"),
        }
    }

    #[test]
    fn test_missing_parameter_names_system() {
        let params = ParameterTable::from_rows([("unrelated", 1.0)]).unwrap();
        let series = TimeSeries::from_columns([("demand_el", vec![1.0; 3])]).unwrap();
        let inputs = SystemInputs {
            params: &params,
            series: &series,
            horizon: 3,
            price_relationship: PriceRelationship::Linear,
        };
        assert_error!(
            build_energy_system(SystemKind::FlexChp, &inputs),
            "Could not build the flex_chp energy system"
        );
    }
}
