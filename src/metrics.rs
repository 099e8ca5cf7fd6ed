// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - System Solvency Metrics

use serde::{Deserialize, Serialize};

use crate::errors::SimResult;
use crate::params::Parameters;
use crate::pipeline::{Block, Context, Policy, Signal, Updater};
use crate::state::{ScalarKey, Scalars, StateKey};
use crate::types::DAYS_PER_YEAR;

/// Ratio that reads zero instead of dividing by an empty denominator.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 { numerator / denominator } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub stable_backing_ratio: f64,
    pub stable_pcv_ratio: f64,
    pub collateralization_ratio: f64,
    pub pcv_yield_rate: f64,
    pub protocol_equity: f64,
    pub protocol_revenue: f64,
}

/// Metrics derived from already-accounted totals, all in USD.
pub fn system_metrics(s: &Scalars, dt: f64) -> SystemMetrics {
    let user_value = s.total_user_circulating_fei * s.fei_price;
    SystemMetrics {
        stable_backing_ratio: ratio(s.total_stable_asset_pcv, user_value),
        stable_pcv_ratio: ratio(s.total_stable_asset_pcv, s.total_pcv),
        collateralization_ratio: ratio(s.total_pcv, user_value),
        pcv_yield_rate: ratio(s.pcv_yield, s.total_pcv) * DAYS_PER_YEAR / dt,
        protocol_equity: s.total_pcv - user_value,
        protocol_revenue: s.pcv_yield + s.psm_mint_redeem_fees,
    }
}

impl SystemMetrics {
    pub fn write(&self, s: &mut Scalars) {
        s.stable_backing_ratio = self.stable_backing_ratio;
        s.stable_pcv_ratio = self.stable_pcv_ratio;
        s.collateralization_ratio = self.collateralization_ratio;
        s.pcv_yield_rate = self.pcv_yield_rate;
        s.protocol_equity = self.protocol_equity;
        s.protocol_revenue = self.protocol_revenue;
    }
}

const KEYS: [ScalarKey; 6] = [
    ScalarKey::StableBackingRatio,
    ScalarKey::StablePcvRatio,
    ScalarKey::CollateralizationRatio,
    ScalarKey::PcvYieldRate,
    ScalarKey::ProtocolEquity,
    ScalarKey::ProtocolRevenue,
];

fn system_metrics_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let mut scalars = Scalars::default();
    system_metrics(&ctx.previous.scalars, ctx.params.dt).write(&mut scalars);
    let mut signal = Signal::new();
    for key in KEYS {
        signal.set_scalar(key, scalars.get(key));
    }
    Ok(signal)
}

pub fn block(_params: &Parameters) -> SimResult<Block> {
    let emits: Vec<StateKey> = KEYS.iter().map(|k| StateKey::from(*k)).collect();
    let updaters = KEYS.iter().map(|k| Updater::from_signal(*k)).collect();
    Block::new("System metrics", vec![Policy::new("system_metrics", emits, system_metrics_policy)], updaters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratios() {
        let s = Scalars {
            fei_price: 1.0,
            total_user_circulating_fei: 200.0,
            total_stable_asset_pcv: 100.0,
            total_pcv: 300.0,
            pcv_yield: 0.3,
            psm_mint_redeem_fees: 0.1,
            ..Scalars::default()
        };
        let m = system_metrics(&s, 1.0);
        assert_eq!(m.stable_backing_ratio, 0.5);
        assert!((m.stable_pcv_ratio - 1.0 / 3.0).abs() < 1e-15);
        assert_eq!(m.collateralization_ratio, 1.5);
        assert_eq!(m.protocol_equity, 100.0);
        assert!((m.protocol_revenue - 0.4).abs() < 1e-15);
        assert!((m.pcv_yield_rate - 0.3 / 300.0 * 365.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_denominators_read_zero() {
        let m = system_metrics(&Scalars::default(), 1.0);
        assert_eq!(m.collateralization_ratio, 0.0);
        assert_eq!(m.stable_pcv_ratio, 0.0);
    }
}
