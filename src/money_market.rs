// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Money Market Rate Model
//
// Jump-rate interest model: a linear borrow rate up to the kink, a steeper
// slope above it. Utilization is an exogenous draw discounted by the
// normalized downside trend of the volatile asset.

use std::iter;

use crate::errors::SimResult;
use crate::params::Parameters;
use crate::pipeline::{Block, Context, Policy, Signal, Updater};
use crate::state::{ScalarKey, StateKey};
use crate::types::{BLOCKS_PER_YEAR, FEI_MONEY_MARKET_PCV, FEI_MONEY_MARKET_USER};

// ─── Rate Curve ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateCurve {
    pub base_rate: f64,
    pub multiplier: f64,
    pub jump_multiplier: f64,
    pub kink: f64,
    pub reserve_factor: f64,
}

impl RateCurve {
    pub fn from_params(params: &Parameters) -> Self {
        Self {
            base_rate: params.money_market_base_rate,
            multiplier: params.money_market_multiplier,
            jump_multiplier: params.money_market_jump_multiplier,
            kink: params.money_market_kink,
            reserve_factor: params.money_market_reserve_factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterestRates {
    pub utilization: f64,
    pub borrow_rate: f64,
    pub supply_rate: f64,
    /// Yield actually earned by suppliers: `utilization * supply_rate`.
    pub effective_yield: f64,
}

pub fn interest_rates(curve: &RateCurve, utilization: f64, dt: f64) -> InterestRates {
    let u = utilization.clamp(0.0, 1.0);
    let per_block = curve.multiplier * u.min(curve.kink)
        + curve.jump_multiplier * (u - curve.kink).max(0.0)
        + curve.base_rate;
    let borrow_rate = per_block * BLOCKS_PER_YEAR * dt;
    let supply_rate = borrow_rate * u * (1.0 - curve.reserve_factor);
    InterestRates { utilization: u, borrow_rate, supply_rate, effective_yield: u * supply_rate }
}

// ─── Volatile Asset Risk ────────────────────────────────────────────────────

/// Least-squares slope of `prices` against their index. Fewer than three
/// points carry no trend.
pub fn trend_slope(prices: &[f64]) -> f64 {
    let n = prices.len();
    if n < 3 {
        return 0.0;
    }
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = prices.iter().sum::<f64>() / n_f;
    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in prices.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 { 0.0 } else { num / den }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskMetric {
    pub raw: f64,
    pub normalized: f64,
    pub min: f64,
    pub max: f64,
}

/// Downside trend relative to the running mean price, min-max normalized
/// against every raw value seen so far.
pub fn volatile_asset_risk(prices: &[f64], mean_price: f64, prev_min: f64, prev_max: f64) -> RiskMetric {
    let raw = if mean_price > 0.0 { -trend_slope(prices) / mean_price } else { 0.0 };
    let raw = if raw.is_finite() { raw } else { 0.0 };
    let min = prev_min.min(raw);
    let max = prev_max.max(raw);
    let normalized = (raw - min) / (max - min);
    let normalized = if normalized.is_finite() { normalized.clamp(0.0, 1.0) } else { 0.0 };
    RiskMetric { raw, normalized, min, max }
}

// ─── Policy ─────────────────────────────────────────────────────────────────

fn money_market_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let params = ctx.params;
    let prev = ctx.previous;
    let price = prev.scalars.volatile_asset_price;

    let t = ctx.timestep() as f64;
    let prev_mean = prev.scalars.volatile_asset_price_mean;
    let mean = prev_mean + (price - prev_mean) / (t + 1.0);

    let window = params.volatile_asset_risk_metric_window;
    let prices: Vec<f64> = ctx
        .history
        .trailing(window.saturating_sub(1))
        .map(|s| s.scalars.volatile_asset_price)
        .chain(iter::once(price))
        .collect();
    let risk = volatile_asset_risk(
        &prices,
        mean,
        prev.scalars.volatile_asset_risk_metric_min,
        prev.scalars.volatile_asset_risk_metric_max,
    );

    let drawn = ctx.processes.money_market_utilization.sample(ctx.run(), ctx.scaled_timestep());
    let drawn = if drawn.is_finite() { drawn.clamp(0.0, 1.0) } else { 0.0 };
    let utilization = drawn * (1.0 - params.money_market_max_risk_discount * risk.normalized);
    let rates = interest_rates(&RateCurve::from_params(params), utilization, params.dt);

    let mut signal = Signal::new();
    let mut supplied = 0.0;
    for key in [FEI_MONEY_MARKET_PCV, FEI_MONEY_MARKET_USER] {
        if let Some(deposit) = prev.deposits.get(&key) {
            let mut deposit = deposit.clone();
            deposit.set_yield_rate(rates.effective_yield)?;
            supplied += deposit.balance();
            signal.set_deposit(deposit);
        }
    }

    signal.set_scalar(ScalarKey::VolatileAssetPriceMean, mean);
    signal.set_scalar(ScalarKey::VolatileAssetRiskMetric, risk.normalized);
    signal.set_scalar(ScalarKey::VolatileAssetRiskMetricMin, risk.min);
    signal.set_scalar(ScalarKey::VolatileAssetRiskMetricMax, risk.max);
    signal.set_scalar(ScalarKey::MoneyMarketUtilization, rates.utilization);
    signal.set_scalar(ScalarKey::MoneyMarketBorrowed, rates.utilization * supplied);
    signal.set_scalar(ScalarKey::MoneyMarketBorrowRate, rates.borrow_rate);
    signal.set_scalar(ScalarKey::MoneyMarketSupplyRate, rates.supply_rate);
    Ok(signal)
}

const SCALARS: [ScalarKey; 8] = [
    ScalarKey::VolatileAssetPriceMean,
    ScalarKey::VolatileAssetRiskMetric,
    ScalarKey::VolatileAssetRiskMetricMin,
    ScalarKey::VolatileAssetRiskMetricMax,
    ScalarKey::MoneyMarketUtilization,
    ScalarKey::MoneyMarketBorrowed,
    ScalarKey::MoneyMarketBorrowRate,
    ScalarKey::MoneyMarketSupplyRate,
];

pub fn block(params: &Parameters) -> SimResult<Block> {
    let configured = params.deposit_keys();
    let mut emits: Vec<StateKey> = SCALARS.iter().map(|k| (*k).into()).collect();
    let mut updaters: Vec<Updater> = SCALARS.iter().map(|k| Updater::from_signal(*k)).collect();
    for key in [FEI_MONEY_MARKET_PCV, FEI_MONEY_MARKET_USER] {
        if configured.contains(&key) {
            emits.push(key.into());
            updaters.push(Updater::from_signal(key));
        }
    }
    Block::new("Money market", vec![Policy::new("money_market", emits, money_market_policy)], updaters)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> RateCurve {
        RateCurve::from_params(&Parameters::default())
    }

    #[test]
    fn test_jump_branch_above_kink() {
        let above = interest_rates(&curve(), 0.9, 1.0);
        let below = interest_rates(&curve(), 0.79, 1.0);
        assert!(above.borrow_rate > below.borrow_rate);

        // Above the kink the slope is the jump multiplier.
        let c = curve();
        let expected = (c.multiplier * 0.8 + c.jump_multiplier * 0.1) * BLOCKS_PER_YEAR;
        assert!((above.borrow_rate - expected).abs() < 1e-12);
    }

    #[test]
    fn test_supply_rate_and_effective_yield() {
        let r = interest_rates(&curve(), 0.5, 1.0);
        assert!((r.supply_rate - r.borrow_rate * 0.5 * 0.75).abs() < 1e-15);
        assert!((r.effective_yield - 0.5 * r.supply_rate).abs() < 1e-15);
    }

    #[test]
    fn test_zero_utilization_earns_nothing() {
        let r = interest_rates(&curve(), 0.0, 1.0);
        assert_eq!(r.supply_rate, 0.0);
        assert_eq!(r.effective_yield, 0.0);
    }

    #[test]
    fn test_utilization_clamped() {
        let r = interest_rates(&curve(), 1.7, 1.0);
        assert_eq!(r.utilization, 1.0);
    }

    #[test]
    fn test_trend_slope() {
        assert_eq!(trend_slope(&[1.0, 2.0]), 0.0);
        assert!((trend_slope(&[10.0, 8.0, 6.0, 4.0]) + 2.0).abs() < 1e-12);
        assert_eq!(trend_slope(&[5.0, 5.0, 5.0]), 0.0);
    }

    #[test]
    fn test_falling_price_raises_risk() {
        let falling = volatile_asset_risk(&[2000.0, 1900.0, 1800.0], 1900.0, 0.0, 0.0);
        assert!(falling.raw > 0.0);
        assert_eq!(falling.normalized, 1.0);

        let rising = volatile_asset_risk(&[1800.0, 1900.0, 2000.0], 1900.0, falling.min, falling.max);
        assert_eq!(rising.normalized, 0.0);
    }

    #[test]
    fn test_degenerate_range_maps_to_zero() {
        let flat = volatile_asset_risk(&[2000.0, 2000.0, 2000.0], 2000.0, 0.0, 0.0);
        assert_eq!(flat.normalized, 0.0);
    }
}
