//! Derived quantities and reports computed from the results of a scenario.
//!
//! Ratios such as efficiencies are undefined in time steps where the denominator is zero (e.g.
//! hours in which a plant is idle). These steps are reported as `None` and are left out of
//! minima, maxima and averages rather than being counted as zero or infinity.
use crate::config::SystemKind;
use crate::finance::annual_costs;
use crate::input::ParameterTable;
use crate::results::{FlowKey, INVEST, Results, ResultsDump};
use crate::systems::solar_cooling::storage_costs;
use crate::units::{Capacity, Money};
use anyhow::Result;
use indexmap::IndexMap;
use log::{info, warn};

/// Conversion from MWh to GWh
const MWH_PER_GWH: f64 = 1e3;

/// A flow counts as operating when above this value
const OPERATING_THRESHOLD: f64 = 0.2;

/// Threshold for operation of storages and the P2H unit
const LOW_OPERATING_THRESHOLD: f64 = 0.1;

/// Columns of derived time series, one value per time step
pub type TimeSeriesColumns = IndexMap<String, Vec<Option<f64>>>;

/// Named scalar results. `None` marks a value which is undefined.
pub type Scalars = IndexMap<String, Option<f64>>;

/// The derived results of a single scenario
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioReport {
    /// Index of the scenario
    pub scenario: usize,
    /// Summary values for the scenario
    pub scalars: Scalars,
    /// Derived time series
    pub time_series: TimeSeriesColumns,
}

impl ScenarioReport {
    fn new(scenario: usize) -> Self {
        Self {
            scenario,
            ..Default::default()
        }
    }

    fn add_scalar(&mut self, name: &str, value: Option<f64>) {
        self.scalars.insert(name.to_string(), value);
    }

    fn add_series(&mut self, name: &str, values: &[f64]) {
        self.time_series
            .insert(name.to_string(), values.iter().copied().map(Some).collect());
    }

    fn add_optional_series(&mut self, name: &str, values: Vec<Option<f64>>) {
        self.time_series.insert(name.to_string(), values);
    }
}

/// Collects the scalars of every scenario as the scenarios are run one after the other
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    rows: Vec<(usize, Scalars)>,
}

impl Accumulator {
    /// Record the scalars of a scenario
    pub fn push(&mut self, report: &ScenarioReport) {
        self.rows.push((report.scenario, report.scalars.clone()));
    }

    /// The names of all scalars, in the order they were first seen
    pub fn columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for name in self.rows.iter().flat_map(|(_, scalars)| scalars.keys()) {
            if !columns.contains(&name.as_str()) {
                columns.push(name);
            }
        }

        columns
    }

    /// The recorded scenarios and their scalars
    pub fn rows(&self) -> &[(usize, Scalars)] {
        &self.rows
    }

    /// The values of a scalar across all recorded scenarios
    pub fn column(&self, name: &str) -> Vec<Option<f64>> {
        self.rows
            .iter()
            .map(|(_, scalars)| scalars.get(name).copied().flatten())
            .collect()
    }

    /// Whether no scenario has been recorded
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// The ratio of two numbers, or `None` if the denominator is zero
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator != 0.0).then(|| numerator / denominator)
}

/// The ratio of two series at every time step, `None` where the denominator is zero
pub fn ratio_series(numerator: &[f64], denominator: &[f64]) -> Vec<Option<f64>> {
    numerator
        .iter()
        .zip(denominator)
        .map(|(&numerator, &denominator)| ratio(numerator, denominator))
        .collect()
}

/// The minimum and maximum of the defined values, or `None` if no value is defined
pub fn defined_range(values: &[Option<f64>]) -> Option<(f64, f64)> {
    values.iter().flatten().fold(None, |range, &value| match range {
        None => Some((value, value)),
        Some((min, max)) => Some((f64::min(min, value), f64::max(max, value))),
    })
}

/// The annual efficiency: total output over total input
pub fn annual_efficiency(output: &[f64], input: &[f64]) -> Option<f64> {
    ratio(output.iter().sum(), input.iter().sum())
}

/// The number of time steps in which the value is above `threshold`
pub fn operating_hours(values: &[f64], threshold: f64) -> usize {
    values.iter().filter(|&&value| value > threshold).count()
}

/// Storage content as a percentage of its maximum over the horizon.
///
/// The relative content is undefined if the storage is never filled.
pub fn relative_content(content: &[f64]) -> Vec<Option<f64>> {
    let max = content.iter().copied().fold(0.0, f64::max);
    content
        .iter()
        .map(|&value| ratio(value * 100.0, max))
        .collect()
}

/// Add two series step by step
fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(a, b)| a + b).collect()
}

fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "undefined".to_string(), |value| format!("{value:.4}"))
}

/// Log the horizon totals of every flow into and out of a bus
fn log_bus_sums(results: &Results, bus: &str, unit: &str, divisor: f64) {
    info!("{bus} bus: sums in {unit}");
    for (key, result) in results.node_view(bus) {
        info!("  {key}: {:.3}", sum(&result.sequence) / divisor);
    }
}

/// Compute the report for a solved scenario
pub fn analyse(
    kind: SystemKind,
    scenario: usize,
    dump: &ResultsDump,
    params: &ParameterTable,
) -> Result<ScenarioReport> {
    info!("Analysing scenario {scenario}");
    match kind {
        SystemKind::FlexChp => analyse_flex_chp(scenario, &dump.results, params),
        SystemKind::FlexChpSysopt => analyse_flex_chp_sysopt(scenario, &dump.results, params),
        SystemKind::SolarCooling => analyse_solar_cooling(scenario, dump, params),
        SystemKind::SolarCoolingElectric => {
            analyse_solar_cooling_electric(scenario, dump, params)
        }
    }
}

/// Efficiencies of the CHP plant, logged and added to the report
fn add_chp_efficiencies(report: &mut ScenarioReport, results: &Results) -> Result<()> {
    let electricity = results.sequence("CHP_01", "electricity")?;
    let heat = results.sequence("CHP_01", "heat")?;
    let fuel = results.sequence("natural_gas", "CHP_01")?;
    let total_output = add(electricity, heat);

    let eta_el = ratio_series(electricity, fuel);
    let omega = ratio_series(&total_output, fuel);
    let eta_el_range = defined_range(&eta_el);
    let omega_range = defined_range(&omega);
    let eta_el_annual = annual_efficiency(electricity, fuel);
    let omega_annual = annual_efficiency(&total_output, fuel);

    info!(
        "Electrical efficiency of CHP_01: min {}, max {}",
        format_optional(eta_el_range.map(|(min, _)| min)),
        format_optional(eta_el_range.map(|(_, max)| max))
    );
    info!(
        "Total efficiency of CHP_01: min {}, max {}",
        format_optional(omega_range.map(|(min, _)| min)),
        format_optional(omega_range.map(|(_, max)| max))
    );
    info!(
        "Annual efficiency of CHP_01: {}",
        format_optional(omega_annual)
    );

    report.add_scalar("CHP_eta_el_min", eta_el_range.map(|(min, _)| min));
    report.add_scalar("CHP_eta_el_max", eta_el_range.map(|(_, max)| max));
    report.add_scalar("CHP_eta_el_annual", eta_el_annual);
    report.add_scalar("CHP_omega_min", omega_range.map(|(min, _)| min));
    report.add_scalar("CHP_omega_max", omega_range.map(|(_, max)| max));
    report.add_scalar("CHP_omega_annual", omega_annual);
    report.add_optional_series("CHP_eta_el", eta_el);
    report.add_optional_series("CHP_omega", omega);

    Ok(())
}

/// Totals of consumption, shortage and excess on the electricity and heat buses, in GWh
fn add_bus_totals(report: &mut ScenarioReport, results: &Results) -> Result<()> {
    log_bus_sums(results, "electricity", "GWh_el", MWH_PER_GWH);
    log_bus_sums(results, "heat", "GWh_th", MWH_PER_GWH);

    for (name, from, to) in [
        ("shortage_el_GWh", "shortage_bel", "electricity"),
        ("shortage_th_GWh", "shortage_bth", "heat"),
        ("excess_el_GWh", "electricity", "excess_bel"),
        ("excess_th_GWh", "heat", "excess_bth"),
        ("gas_consumption_GWh", "rgas", "natural_gas"),
        ("demand_el_GWh", "electricity", "demand_el"),
        ("demand_th_GWh", "heat", "demand_th"),
    ] {
        let total = results.sum(from, to)? / MWH_PER_GWH;
        info!("{name}: {total:.3}");
        report.add_scalar(name, Some(total));
    }

    let shortage = add(
        results.sequence("shortage_bel", "electricity")?,
        results.sequence("shortage_bth", "heat")?,
    );
    let shortage_hours = operating_hours(&shortage, 0.0);
    info!("Hours of shortage: {shortage_hours}");
    report.add_scalar("shortage_hours", Some(shortage_hours as f64));

    Ok(())
}

/// Charge, discharge and relative content of a storage, if it is part of the network
fn add_storage_series(report: &mut ScenarioReport, results: &Results, storage: &str, bus: &str) {
    let (Ok(content), Ok(charge), Ok(discharge)) = (
        results.node_sequence(storage),
        results.sequence(bus, storage),
        results.sequence(storage, bus),
    ) else {
        return;
    };

    report.add_optional_series(&format!("{storage}_content_relative"), relative_content(content));
    report.add_series(&format!("{storage}_charge"), charge);
    report.add_series(&format!("{storage}_discharge"), discharge);
}

fn analyse_flex_chp(
    scenario: usize,
    results: &Results,
    params: &ParameterTable,
) -> Result<ScenarioReport> {
    let mut report = ScenarioReport::new(scenario);
    add_bus_totals(&mut report, results)?;
    add_chp_efficiencies(&mut report, results)?;

    let chp_el = results.sequence("CHP_01", "electricity")?;
    let chp_th = results.sequence("CHP_01", "heat")?;
    let boiler = results.sequence("boiler", "heat")?;
    let chp_hours = operating_hours(&add(chp_el, chp_th), 0.0);
    let boiler_hours = operating_hours(boiler, 0.0);
    info!("Operating hours: CHP_01 {chp_hours}, boiler {boiler_hours}");
    report.add_scalar("CHP_operating_hours", Some(chp_hours as f64));
    report.add_scalar("boiler_operating_hours", Some(boiler_hours as f64));

    let p2h_efficiency = params.get("conversion_factor_p2h")?;
    let neg_residual: Vec<f64> = results
        .sequence("P2H", "heat")?
        .iter()
        .map(|heat| heat / p2h_efficiency)
        .collect();

    report.add_series("demand_el", results.sequence("electricity", "demand_el")?);
    report.add_series("demand_th", results.sequence("heat", "demand_th")?);
    report.add_series("CHP_01_th", chp_th);
    report.add_series("CHP_01_el", chp_el);
    report.add_series("boiler", boiler);
    report.add_series("neg_residual_el", &neg_residual);
    add_storage_series(&mut report, results, "storage_th", "heat");
    add_storage_series(&mut report, results, "storage_el", "electricity");

    Ok(report)
}

fn analyse_flex_chp_sysopt(
    scenario: usize,
    results: &Results,
    params: &ParameterTable,
) -> Result<ScenarioReport> {
    let mut report = ScenarioReport::new(scenario);
    log_bus_sums(results, "electricity", "GWh_el", MWH_PER_GWH);
    log_bus_sums(results, "heat", "GWh_th", MWH_PER_GWH);

    let chp_el = results.sequence("CHP_01", "electricity")?;
    let chp_th = results.sequence("CHP_01", "heat")?;
    let boiler = results.sequence("boiler", "heat")?;
    let p2h = results.sequence("P2H", "heat")?;
    let tes_charge = results.sequence("heat", "storage_th")?;
    let tes_discharge = results.sequence("storage_th", "heat")?;
    let ees_charge = results.sequence("electricity", "storage_el")?;
    let ees_discharge = results.sequence("storage_el", "electricity")?;
    let feed_in = results.sequence("electricity", "demand_el")?;

    for (name, values, threshold) in [
        ("CHP_01", &add(chp_el, chp_th)[..], OPERATING_THRESHOLD),
        ("boiler", boiler, OPERATING_THRESHOLD),
        ("P2H", p2h, LOW_OPERATING_THRESHOLD),
        ("charging TES", tes_charge, LOW_OPERATING_THRESHOLD),
        ("discharging TES", tes_discharge, LOW_OPERATING_THRESHOLD),
        ("charging EES", ees_charge, LOW_OPERATING_THRESHOLD),
        ("discharging EES", ees_discharge, LOW_OPERATING_THRESHOLD),
        ("feed in", feed_in, LOW_OPERATING_THRESHOLD),
    ] {
        info!("Hours of {name}: {}", operating_hours(values, threshold));
    }
    let shortage = add(
        results.sequence("shortage_bel", "electricity")?,
        results.sequence("shortage_bth", "heat")?,
    );
    info!("Hours of shortage: {}", operating_hours(&shortage, 0.0));

    // CHP investment is in fuel input, reported as electrical capacity
    let chp_capacity = results.scalar(&FlowKey::flow("natural_gas", "CHP_01"), INVEST)?
        * params.get("conv_factor_full_cond")?;
    let gas_consumption = results.sum("rgas", "natural_gas")?;
    let capacities = [
        ("CHP_cap_MW_el", chp_capacity),
        (
            "TES_cap_MWh",
            results.scalar(&FlowKey::node("storage_th"), INVEST)?,
        ),
        (
            "EES_cap_MWh",
            results.scalar(&FlowKey::node("storage_el"), INVEST)?,
        ),
        (
            "P2H_cap_MW_th",
            results.scalar(&FlowKey::flow("P2H", "heat"), INVEST)?,
        ),
        (
            "Boiler_cap_MW_th",
            results.scalar(&FlowKey::flow("boiler", "heat"), INVEST)?,
        ),
        ("gas_consumption_MWh", gas_consumption),
    ];
    for (name, value) in capacities {
        info!("{name}: {value:.3}");
        report.add_scalar(name, Some(value));
    }

    let chp_fuel = results.sequence("natural_gas", "CHP_01")?;
    report.add_optional_series("CHP_eta_el", ratio_series(chp_el, chp_fuel));
    report.add_series("demand_el", feed_in);
    report.add_series("demand_th", results.sequence("heat", "demand_th")?);
    report.add_series("P2H_th", p2h);
    report.add_series("CHP_01_th", chp_th);
    report.add_series("CHP_01_el", chp_el);
    report.add_series("boiler", boiler);
    report.add_series("neg_residual_el", results.sequence("residual_el", "residual")?);
    add_storage_series(&mut report, results, "storage_th", "heat");
    add_storage_series(&mut report, results, "storage_el", "electricity");

    Ok(report)
}

/// The share of demand covered by a solar source.
///
/// Solar output which ends up in the excess sink is not counted as used.
fn solar_fraction(solar: f64, excess: f64, other: f64) -> Option<f64> {
    let solar_used = solar - excess;
    ratio(solar_used, solar_used + other)
}

/// A flow which feeds an excess sink at the same time as a purchased source runs, which means
/// energy is bought only to be thrown away
fn check_simultaneous(results: &Results, source: (&str, &str), excess: (&str, &str)) -> Result<()> {
    let source_flow = results.sequence(source.0, source.1)?;
    let excess_flow = results.sequence(excess.0, excess.1)?;
    let product: f64 = source_flow
        .iter()
        .zip(excess_flow)
        .map(|(a, b)| a * b)
        .sum();
    if product != 0.0 {
        warn!(
            "{} and {} are both non-zero in the same time step",
            FlowKey::flow(source.0, source.1),
            FlowKey::flow(excess.0, excess.1)
        );
    }

    Ok(())
}

/// Yearly costs with and without the given storages, as `(parameter name, label)` pairs.
///
/// Storages with a nominal capacity have no costs in the objective, so their costs are added to
/// give the costs with storage. Invested storages are already in the objective and their costs
/// are taken away to give the costs without storage.
fn add_costs(
    report: &mut ScenarioReport,
    dump: &ResultsDump,
    params: &ParameterTable,
    storages: &[(&str, &str)],
) -> Result<()> {
    let costs_total = Money(dump.meta.objective);
    let mut costs_with_storage = costs_total;
    let mut costs_without_storage = costs_total;
    for &(name, label) in storages {
        let ep_costs = storage_costs(params, name)?;
        let nominal_capacity = params.get(&format!("nominal_capacitiy_stor_{name}"))?;
        if nominal_capacity == 0.0 {
            let invest = Capacity(dump.results.scalar(&FlowKey::node(label), INVEST)?);
            costs_without_storage = costs_without_storage - annual_costs(ep_costs, invest);
        } else {
            costs_with_storage =
                costs_with_storage + annual_costs(ep_costs, Capacity(nominal_capacity));
        }
    }
    info!(
        "Costs per year: {:.2} (with storage {:.2})",
        costs_total.value(),
        costs_with_storage.value()
    );
    report.add_scalar("costs_total", Some(costs_total.value()));
    report.add_scalar("costs_with_storage", Some(costs_with_storage.value()));
    report.add_scalar("costs_without_storage", Some(costs_without_storage.value()));

    Ok(())
}

/// Record the optimised capacity of every investment
fn add_investments(report: &mut ScenarioReport, results: &Results) {
    for (key, result) in results.iter() {
        if let Some(&invest) = result.scalars.get(INVEST) {
            report.add_scalar(&format!("invest {key}"), Some(invest));
        }
    }
}

fn analyse_solar_cooling(
    scenario: usize,
    dump: &ResultsDump,
    params: &ParameterTable,
) -> Result<ScenarioReport> {
    let results = &dump.results;
    let mut report = ScenarioReport::new(scenario);
    for bus in ["thermal", "cool", "electricity"] {
        log_bus_sums(results, bus, "kWh", 1.0);
    }

    check_simultaneous(results, ("boiler", "thermal"), ("thermal", "excess_thermal"))?;
    check_simultaneous(results, ("grid_el", "electricity"), ("electricity", "excess_el"))?;

    let excess_thermal = results.sum("thermal", "excess_thermal")?;
    let excess_el = results.sum("electricity", "excess_el")?;
    let solar_fraction_thermal = solar_fraction(
        results.sum("collector", "thermal")?,
        excess_thermal,
        results.sum("boiler", "thermal")?,
    );
    let pv_output = results.sum("pv", "electricity")?;
    let solar_fraction_el =
        solar_fraction(pv_output, excess_el, results.sum("grid_el", "electricity")?);
    info!(
        "Solar fraction: thermal {}, electric {}",
        format_optional(solar_fraction_thermal),
        format_optional(solar_fraction_el)
    );

    add_investments(&mut report, results);
    report.add_scalar("solar_fraction_thermal", solar_fraction_thermal);
    report.add_scalar("solar_fraction_el", solar_fraction_el);
    report.add_scalar("gas_used", Some(results.sum("naturalgas", "gas")?));
    report.add_scalar("electricity_output", Some(excess_el));
    report.add_scalar("electricity_output_pv", Some(pv_output));

    add_costs(
        &mut report,
        dump,
        params,
        &[("thermal", "storage_thermal"), ("cool", "storage_cool")],
    )?;

    for (name, from, to) in [
        ("collector", "collector", "thermal"),
        ("boiler", "boiler", "thermal"),
        ("excess_thermal", "thermal", "excess_thermal"),
        ("absorption_chiller", "absorption_chiller", "cool"),
        ("demand", "cool", "demand"),
        ("pv", "pv", "electricity"),
        ("grid_el", "grid_el", "electricity"),
    ] {
        report.add_series(name, results.sequence(from, to)?);
    }
    for storage in ["storage_thermal", "storage_cool", "storage_electricity"] {
        report.add_optional_series(
            &format!("{storage}_content_relative"),
            relative_content(results.node_sequence(storage)?),
        );
    }

    Ok(report)
}

fn analyse_solar_cooling_electric(
    scenario: usize,
    dump: &ResultsDump,
    params: &ParameterTable,
) -> Result<ScenarioReport> {
    let results = &dump.results;
    let mut report = ScenarioReport::new(scenario);
    for bus in ["cool", "electricity"] {
        log_bus_sums(results, bus, "kWh", 1.0);
    }
    check_simultaneous(results, ("grid_el", "electricity"), ("electricity", "excess_el"))?;

    let excess_el = results.sum("electricity", "excess_el")?;
    let pv_output = results.sum("pv", "electricity")?;
    let grid = results.sum("grid_el", "electricity")?;
    let solar_fraction_el = solar_fraction(pv_output, excess_el, grid);
    info!(
        "Solar fraction: electric {}",
        format_optional(solar_fraction_el)
    );

    add_investments(&mut report, results);
    report.add_scalar("solar_fraction_el", solar_fraction_el);
    report.add_scalar("grid_el_used", Some(grid));
    report.add_scalar("electricity_output", Some(excess_el));
    report.add_scalar("electricity_output_pv", Some(pv_output));
    add_costs(
        &mut report,
        dump,
        params,
        &[("cool", "storage_cool"), ("el", "storage_electricity")],
    )?;

    for (name, from, to) in [
        ("pv", "pv", "electricity"),
        ("grid_el", "grid_el", "electricity"),
        ("excess_el", "electricity", "excess_el"),
        ("compression_chiller", "compression_chiller", "cool"),
        ("demand", "cool", "demand"),
    ] {
        report.add_series(name, results.sequence(from, to)?);
    }
    for storage in ["storage_cool", "storage_electricity"] {
        report.add_optional_series(
            &format!("{storage}_content_relative"),
            relative_content(results.node_sequence(storage)?),
        );
    }

    Ok(report)
}
