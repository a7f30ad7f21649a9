//! General functions related to finance.
use crate::units::{Capacity, Dimensionless, Money, MoneyPerCapacity};

/// Calculates the capital recovery factor (CRF) for a given lifetime and discount rate.
///
/// The CRF is used to annualize capital costs over the lifetime of an asset.
pub fn capital_recovery_factor(lifetime: u32, discount_rate: Dimensionless) -> Dimensionless {
    if lifetime == 0 {
        return Dimensionless(0.0);
    }
    if discount_rate == Dimensionless(0.0) {
        return Dimensionless(1.0) / Dimensionless(lifetime as f64);
    }
    let factor = (Dimensionless(1.0) + discount_rate).powi(lifetime as i32);
    (discount_rate * factor) / (factor - Dimensionless(1.0))
}

/// Calculates the annuity of a capital expenditure per unit of capacity.
///
/// This is the equivalent periodical cost that gets attached to an investment decision.
pub fn annuity(capex: MoneyPerCapacity, lifetime: u32, wacc: Dimensionless) -> MoneyPerCapacity {
    capex * capital_recovery_factor(lifetime, wacc)
}

/// Equivalent periodical costs including fixed operating costs.
///
/// `opex` is given as a fraction of `capex` per year.
pub fn ep_costs(
    capex: MoneyPerCapacity,
    lifetime: u32,
    opex: Dimensionless,
    wacc: Dimensionless,
) -> MoneyPerCapacity {
    annuity(capex, lifetime, wacc) + capex * opex
}

/// The yearly costs of `capacity` at the given equivalent periodical costs
pub fn annual_costs(ep_costs: MoneyPerCapacity, capacity: Capacity) -> Money {
    ep_costs * capacity
}
