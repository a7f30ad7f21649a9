//! Derives the demand time series from projected load and renewable generation.
//!
//! The residual load is the electricity load which is left once wind and solar generation have
//! been subtracted. Its positive part, normalised to its maximum, becomes the electricity demand
//! (`demand_el`). Its negative part, normalised to its minimum, becomes the surplus which can be
//! turned into heat (`neg_residual_el`). The district heating profile, given in percent, becomes
//! the heat demand (`demand_th`).
use crate::config::PreprocessingConfig;
use crate::input::{ParameterTable, TimeSeries, check_finite_non_negative, input_err_msg};
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conversion from GW of installed capacity to MW
const MW_PER_GW: f64 = 1e3;

/// Conversion from MWh to TWh
const MWH_PER_TWH: f64 = 1e6;

/// A row of the demand time series file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DemandRow {
    demand_th: f64,
    demand_el: f64,
    neg_residual_el: f64,
}

/// Installed renewable capacities and other renewable generation
#[derive(Debug, Clone, PartialEq)]
pub struct RenewableCapacities {
    /// Installed PV capacity in GW
    pub pv: f64,
    /// Installed onshore and offshore wind capacity in GW
    pub wind: f64,
    /// Yearly generation from other renewables (hydro, biomass...) in TWh
    pub other_generation: f64,
}

impl RenewableCapacities {
    /// Read the capacities from a parameter table
    pub fn from_params(params: &ParameterTable) -> Result<Self> {
        let get = |name| {
            let value = params.get(name)?;
            check_finite_non_negative(name, value)?;
            Ok::<_, anyhow::Error>(value)
        };

        Ok(Self {
            pv: get("cap_inst_PV")?,
            wind: get("cap_inst_wind_onshore")? + get("cap_inst_wind_offshore")?,
            other_generation: get("misc_renewables_gen_TWh")?
                + get("biomass_gen_TWh")?
                + get("biomass_CHP_gen_TWh")?,
        })
    }
}

/// Load and renewable generation in MW for every time step
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualLoad {
    /// Electricity load
    pub load: Vec<f64>,
    /// Wind and solar generation
    pub renewable_generation: Vec<f64>,
    /// Load minus generation
    pub residual: Vec<f64>,
}

impl ResidualLoad {
    /// Project generation from normalised profiles and installed capacities
    pub fn new(
        load: Vec<f64>,
        solar_profile: &[f64],
        wind_profile: &[f64],
        capacities: &RenewableCapacities,
    ) -> Self {
        let renewable_generation: Vec<f64> = solar_profile
            .iter()
            .zip(wind_profile)
            .map(|(solar, wind)| {
                solar * capacities.pv * MW_PER_GW + wind * capacities.wind * MW_PER_GW
            })
            .collect();
        let residual = load
            .iter()
            .zip(&renewable_generation)
            .map(|(load, generation)| load - generation)
            .collect();

        Self {
            load,
            renewable_generation,
            residual,
        }
    }

    /// Log the characteristics of the residual load
    fn log_statistics(&self, capacities: &RenewableCapacities) {
        let count = |predicate: fn(f64) -> bool| {
            self.residual
                .iter()
                .filter(|&&value| predicate(value))
                .count()
        };
        info!("Characteristics of the residual load profile:");
        info!("  Hours of negative residual load: {}", count(|v| v < 0.0));
        info!("  Hours of positive residual load: {}", count(|v| v > 0.0));
        info!("  Hours of zero residual load: {}", count(|v| v == 0.0));

        let generation: f64 = self.renewable_generation.iter().sum();
        let load: f64 = self.load.iter().sum();
        info!(
            "  Renewable generation: {:.3} TWh",
            generation / MWH_PER_TWH + capacities.other_generation
        );
        info!("  Load: {:.3} TWh", load / MWH_PER_TWH);
        if load > 0.0 {
            let share = (generation + capacities.other_generation * MWH_PER_TWH) / load;
            info!("  Share of renewables in generation: {share:.4}");
        }
    }
}

/// Divide every value by `divisor`, or give zeros if the divisor is zero
fn normalise(values: impl Iterator<Item = f64>, divisor: f64, name: &str) -> Vec<f64> {
    if divisor == 0.0 {
        warn!("`{name}` is zero in every time step");
        return values.map(|_| 0.0).collect();
    }

    values.map(|value| value / divisor).collect()
}

/// The normalised demand profiles
#[derive(Debug, Clone, PartialEq)]
pub struct DemandProfiles {
    /// Heat demand as a fraction of its peak
    pub demand_th: Vec<f64>,
    /// Positive residual load as a fraction of its maximum
    pub demand_el: Vec<f64>,
    /// Negative residual load as a fraction of its minimum (so non-negative)
    pub neg_residual_el: Vec<f64>,
}

impl DemandProfiles {
    /// Derive the profiles from the residual load and a heat profile in percent
    pub fn new(residual: &[f64], heat_profile_percent: &[f64]) -> Self {
        let max = residual.iter().copied().fold(0.0, f64::max);
        let min = residual.iter().copied().fold(0.0, f64::min);

        Self {
            demand_th: heat_profile_percent.iter().map(|value| value / 100.0).collect(),
            demand_el: normalise(residual.iter().map(|value| value.max(0.0)), max, "demand_el"),
            neg_residual_el: normalise(
                residual.iter().map(|value| value.min(0.0)),
                min,
                "neg_residual_el",
            ),
        }
    }

    /// Write the profiles as a demand time series file
    pub fn write(&self, file_path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(file_path)
            .with_context(|| format!("Could not create {}", file_path.display()))?;
        for ((&demand_th, &demand_el), &neg_residual_el) in self
            .demand_th
            .iter()
            .zip(&self.demand_el)
            .zip(&self.neg_residual_el)
        {
            writer.serialize(DemandRow {
                demand_th,
                demand_el,
                neg_residual_el,
            })?;
        }
        writer.flush()?;

        Ok(())
    }

    /// Log the average linear price factor and the equivalent quadratic price factor
    fn log_price_factors(&self) {
        let positive: Vec<f64> = self
            .demand_el
            .iter()
            .copied()
            .filter(|&value| value > 0.0)
            .collect();
        if positive.is_empty() {
            return;
        }
        let sum: f64 = positive.iter().sum();
        let sum_of_squares: f64 = positive.iter().map(|value| value.powi(2)).sum();
        info!(
            "Average electricity price (linear): {:.4} × maximum price",
            sum / positive.len() as f64
        );
        info!(
            "Maximum quadratic price giving the same average: {:.4} × maximum linear price",
            sum / sum_of_squares
        );
    }
}

/// Regenerate the demand time series at `demand_path`.
///
/// # Arguments
///
/// * `config` - The input files for preprocessing
/// * `number_of_time_steps` - The number of rows to read from the load profiles
/// * `demand_path` - Where to write the demand time series
pub fn run(
    config: &PreprocessingConfig,
    number_of_time_steps: usize,
    demand_path: &Path,
) -> Result<()> {
    info!("Preprocessing {}", config.load_profiles.display());
    let params = ParameterTable::from_path(&config.load_profile_parameters)?;
    let capacities = RenewableCapacities::from_params(&params)
        .with_context(|| input_err_msg(&config.load_profile_parameters))?;
    let profiles = TimeSeries::from_path(&config.load_profiles, number_of_time_steps)?;
    let read_column = |name| {
        profiles
            .column(name)
            .with_context(|| input_err_msg(&config.load_profiles))
    };

    let residual_load = ResidualLoad::new(
        read_column("load")?,
        &read_column("solar_profile")?,
        &read_column("wind_profile")?,
        &capacities,
    );
    residual_load.log_statistics(&capacities);

    let demand = DemandProfiles::new(
        &residual_load.residual,
        &read_column("district_heating_profile")?,
    );
    demand.log_price_factors();
    demand.write(demand_path)?;
    info!("Saved demand time series to {}", demand_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use itertools::assert_equal;
    use std::fs;
    use tempfile::tempdir;

    fn capacities() -> RenewableCapacities {
        RenewableCapacities {
            pv: 0.1,
            wind: 0.2,
            other_generation: 0.0,
        }
    }

    #[test]
    fn test_negative_capacity() {
        let params = ParameterTable::from_rows([
            ("cap_inst_PV", -1.0),
            ("cap_inst_wind_onshore", 0.15),
            ("cap_inst_wind_offshore", 0.05),
            ("misc_renewables_gen_TWh", 0.0),
            ("biomass_gen_TWh", 0.0),
            ("biomass_CHP_gen_TWh", 0.0),
        ])
        .unwrap();
        assert!(RenewableCapacities::from_params(&params).is_err());
    }

    #[test]
    fn test_residual_load() {
        let residual_load = ResidualLoad::new(
            vec![500.0, 500.0, 500.0],
            &[0.0, 1.0, 0.5],
            &[0.5, 1.0, 1.0],
            &capacities(),
        );
        assert_eq!(residual_load.renewable_generation, [100.0, 300.0, 250.0]);
        assert_eq!(residual_load.residual, [400.0, 200.0, 250.0]);
    }

    #[test]
    fn test_demand_profiles() {
        let profiles = DemandProfiles::new(&[400.0, -100.0, 0.0, -50.0], &[50.0, 100.0, 0.0, 25.0]);
        assert_eq!(profiles.demand_th, [0.5, 1.0, 0.0, 0.25]);
        assert_eq!(profiles.demand_el, [1.0, 0.0, 0.0, 0.0]);
        assert_equal(
            profiles.neg_residual_el.iter().copied(),
            [0.0, 1.0, 0.0, 0.5],
        );
    }

    #[test]
    fn test_demand_profiles_without_surplus() {
        let profiles = DemandProfiles::new(&[400.0, 200.0], &[50.0, 100.0]);
        assert_eq!(profiles.demand_el, [1.0, 0.5]);
        assert_eq!(profiles.neg_residual_el, [0.0, 0.0]);
    }

    #[test]
    fn test_run() {
        let dir = tempdir().unwrap();
        let load_profiles = dir.path().join("load_profiles.csv");
        fs::write(
            &load_profiles,
            "utc_timestamp,load,solar_profile,wind_profile,district_heating_profile
2040-01-01 00:00:00,500,0,0.5,80
2040-01-01 01:00:00,500,1,1,100
2040-01-01 02:00:00,100,0.5,1,60
2040-01-01 03:00:00,100,0.5,1,60
",
        )
        .unwrap();
        let parameters = dir.path().join("parameters.csv");
        fs::write(
            &parameters,
            "component,parameter,value,unit
pv,cap_inst_PV,0.1,GW
wind,cap_inst_wind_onshore,0.15,GW
wind,cap_inst_wind_offshore,0.05,GW
other,misc_renewables_gen_TWh,0,TWh
other,biomass_gen_TWh,0,TWh
other,biomass_CHP_gen_TWh,0,TWh
",
        )
        .unwrap();
        let config = PreprocessingConfig {
            load_profiles,
            load_profile_parameters: parameters,
        };
        let demand_path = dir.path().join("demand.csv");
        run(&config, 3, &demand_path).unwrap();

        let series = TimeSeries::from_path(&demand_path, 3).unwrap();
        assert_eq!(series.column("demand_th").unwrap(), [0.8, 1.0, 0.6]);
        assert_eq!(series.column("demand_el").unwrap(), [1.0, 0.5, 0.0]);
        let neg_residual = series.column("neg_residual_el").unwrap();
        assert_approx_eq!(f64, neg_residual[2], 1.0);
    }
}
