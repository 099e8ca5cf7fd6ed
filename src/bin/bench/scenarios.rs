// Scenario Definitions: parameter tweaks on a shared base configuration
// Each scenario either reshapes a process spec or pins the volatile price
// to a deterministic curve; the engine itself is never special-cased.

use pcv_engine::{CapitalAllocationMode, Parameters, ProcessSpec, RebalancingCondition};

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub timesteps: usize,
    /// Applied on top of the base parameters.
    pub configure: fn(&mut Parameters),
    /// Overrides the realized volatile price path, indexed by days elapsed.
    pub volatile_price_curve: Option<fn(f64) -> f64>,
    pub criteria: PassCriteria,
}

pub struct PassCriteria {
    /// FEI supply must equal protocol-owned plus user-circulating FEI.
    pub max_conservation_error: f64,
    /// Capital allocation targets must sum to one.
    pub max_weight_error: f64,
    pub min_collateralization_ratio: Option<f64>,
    pub min_protocol_equity: Option<f64>,
}

impl Default for PassCriteria {
    fn default() -> Self {
        Self {
            max_conservation_error: 1e-6,
            max_weight_error: 1e-6,
            min_collateralization_ratio: None,
            min_protocol_equity: None,
        }
    }
}

// ─── Curve Functions ────────────────────────────────────────────────────────

/// 60% decline over half a year, then flat.
fn bear_market_price(t: f64) -> f64 {
    2000.0 * (1.0 - 0.6 * (t / 180.0).min(1.0))
}

/// Halving over ten days, partial recovery afterwards.
fn flash_crash_price(t: f64) -> f64 {
    if t < 100.0 { 2000.0 }
    else if t < 110.0 { 2000.0 - (t - 100.0) * 100.0 }
    else if t < 200.0 { 1000.0 + (t - 110.0) * 5.0 }
    else { 1450.0 }
}

fn bull_market_price(t: f64) -> f64 {
    let progress = t / 365.0;
    let s_curve = 1.0 / (1.0 + (-12.0 * (progress - 0.4)).exp());
    2000.0 + 4000.0 * s_curve
}

// ─── Configurators ──────────────────────────────────────────────────────────

fn baseline(_: &mut Parameters) {}

fn quiet_prices(p: &mut Parameters) {
    p.stable_asset_price_process = ProcessSpec::Constant { value: 1.0 };
}

fn high_volatility(p: &mut Parameters) {
    p.volatile_asset_price_process = ProcessSpec::GeometricBrownianMotion {
        initial: 2000.0,
        drift: 0.0,
        volatility: 1.5,
    };
}

fn stable_backing_target(p: &mut Parameters) {
    p.target_stable_pcv_ratio = None;
    p.target_stable_backing_ratio = Some(0.6);
    p.target_rebalancing_condition = RebalancingCondition::LessThan;
    p.rebalancing_period = 30;
}

fn exogenous_allocation(p: &mut Parameters) {
    p.capital_allocation_mode = CapitalAllocationMode::Exogenous;
    p.capital_allocation_concentration = vec![4.0, 2.0, 1.0, 1.0];
}

fn no_allocation(p: &mut Parameters) {
    p.capital_allocation_mode = CapitalAllocationMode::Disabled;
}

fn yield_withdrawal(p: &mut Parameters) {
    p.yield_withdrawal_period = Some(30);
}

fn yield_reinvest(p: &mut Parameters) {
    p.yield_reinvest_period = Some(30);
}

fn high_psm_fees(p: &mut Parameters) {
    p.psm_mint_fee = 0.005;
    p.psm_redeem_fee = 0.01;
}

// ─── Scenario List ──────────────────────────────────────────────────────────

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "BASELINE",
            label: "Baseline (GBM volatile, endogenous CAM)",
            category: "core",
            timesteps: 365,
            configure: baseline,
            volatile_price_curve: None,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "BEAR_MARKET",
            label: "Bear market (-60% over 180d)",
            category: "stress",
            timesteps: 365,
            configure: quiet_prices,
            volatile_price_curve: Some(bear_market_price),
            criteria: PassCriteria { min_collateralization_ratio: Some(0.5), ..PassCriteria::default() },
        },
        Scenario {
            name: "FLASH_CRASH",
            label: "Flash crash (-50% in 10d)",
            category: "stress",
            timesteps: 365,
            configure: quiet_prices,
            volatile_price_curve: Some(flash_crash_price),
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "BULL_MARKET",
            label: "Bull market (S-curve to 3x)",
            category: "stress",
            timesteps: 365,
            configure: quiet_prices,
            volatile_price_curve: Some(bull_market_price),
            criteria: PassCriteria { min_protocol_equity: Some(0.0), ..PassCriteria::default() },
        },
        Scenario {
            name: "HIGH_VOLATILITY",
            label: "High volatility (sigma 1.5)",
            category: "stress",
            timesteps: 365,
            configure: high_volatility,
            volatile_price_curve: None,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "STABLE_BACKING",
            label: "Stable backing target 60%",
            category: "rebalancing",
            timesteps: 365,
            configure: stable_backing_target,
            volatile_price_curve: None,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "EXOGENOUS_CAM",
            label: "Exogenous capital allocation",
            category: "allocation",
            timesteps: 180,
            configure: exogenous_allocation,
            volatile_price_curve: None,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "NO_CAM",
            label: "Capital allocation disabled",
            category: "allocation",
            timesteps: 180,
            configure: no_allocation,
            volatile_price_curve: None,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "YIELD_WITHDRAWAL",
            label: "Yield withdrawal every 30d",
            category: "yield",
            timesteps: 365,
            configure: yield_withdrawal,
            volatile_price_curve: None,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "YIELD_REINVEST",
            label: "Yield reinvestment every 30d",
            category: "yield",
            timesteps: 365,
            configure: yield_reinvest,
            volatile_price_curve: None,
            criteria: PassCriteria::default(),
        },
        Scenario {
            name: "HIGH_PSM_FEES",
            label: "PSM fees 50/100 bps",
            category: "psm",
            timesteps: 365,
            configure: high_psm_fees,
            volatile_price_curve: None,
            criteria: PassCriteria::default(),
        },
    ]
}
