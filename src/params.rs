// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Parameters

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{SimError, SimResult};
use crate::processes::ProcessSpec;
use crate::types::*;

/// Initial balance of a configured deposit, in asset units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositConfig {
    pub key: DepositKey,
    #[serde(default)]
    pub balance: f64,
}

impl DepositConfig {
    pub fn new(key: DepositKey, balance: f64) -> Self {
        Self { key, balance }
    }
}

/// Immutable configuration for one subset of an experiment.
///
/// Periods are counted in timesteps and fire when `timestep % period == 0`.
/// Optional fields set to `None` disable the policy they drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Days per timestep.
    pub dt: f64,
    pub seed: u64,

    // Exogenous processes
    pub fei_price_process: ProcessSpec,
    pub stable_asset_price_process: ProcessSpec,
    pub volatile_asset_price_process: ProcessSpec,
    pub fei_savings_rate_process: ProcessSpec,
    pub money_market_utilization_process: ProcessSpec,

    // Initial balances
    pub pcv_deposits: Vec<DepositConfig>,
    pub user_deposits: Vec<DepositConfig>,

    // Liquidity pool
    pub liquidity_pool_tvl: f64,
    pub liquidity_pool_protocol_share: f64,
    pub liquidity_pool_trading_fee: f64,

    // Money market rate curve, per block
    pub money_market_base_rate: f64,
    pub money_market_multiplier: f64,
    pub money_market_jump_multiplier: f64,
    pub money_market_kink: f64,
    pub money_market_reserve_factor: f64,
    pub money_market_max_risk_discount: f64,
    pub volatile_asset_risk_metric_window: usize,

    // PCV yield
    pub stable_asset_yield_rate: f64,
    pub volatile_asset_yield_rate: f64,
    pub yield_withdrawal_period: Option<usize>,
    pub yield_reinvest_period: Option<usize>,

    // PCV rebalancing
    pub rebalancing_period: usize,
    pub target_stable_pcv_ratio: Option<f64>,
    pub target_stable_backing_ratio: Option<f64>,
    pub target_rebalancing_condition: RebalancingCondition,

    // Peg stability module
    pub active_psm_deposits: Vec<DepositKey>,
    pub psm_mint_fee: f64,
    pub psm_redeem_fee: f64,

    // Capital allocation
    pub capital_allocation_mode: CapitalAllocationMode,
    pub capital_allocation_deposits: Vec<DepositKey>,
    pub capital_allocation_concentration: Vec<f64>,
    /// Days over which a full move to target weights is spread.
    pub capital_allocation_rebalance_duration: f64,
    pub capital_allocation_yield_window: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        let volatile_price = 2000.0;
        Self {
            dt: 1.0,
            seed: 1,

            fei_price_process: ProcessSpec::Constant { value: 1.0 },
            stable_asset_price_process: ProcessSpec::GaussianNoise { mean: 1.0, std_dev: 0.005 },
            volatile_asset_price_process: ProcessSpec::GeometricBrownianMotion {
                initial: volatile_price,
                drift: 0.0,
                volatility: 0.8,
            },
            fei_savings_rate_process: ProcessSpec::Constant { value: 0.03 },
            money_market_utilization_process: ProcessSpec::GaussianNoise { mean: 0.7, std_dev: 0.05 },

            pcv_deposits: vec![
                DepositConfig::new(FEI_IDLE_PCV, 170e6),
                DepositConfig::new(FEI_MONEY_MARKET_PCV, 30e6),
                DepositConfig::new(STABLE_IDLE_PCV, 70e6),
                DepositConfig::new(STABLE_YIELD_BEARING_PCV, 70e6),
                DepositConfig::new(VOLATILE_IDLE_PCV, 102.5e6 / volatile_price),
                DepositConfig::new(VOLATILE_YIELD_BEARING_PCV, 102.5e6 / volatile_price),
            ],
            user_deposits: vec![
                DepositConfig::new(FEI_IDLE_USER, 125e6),
                DepositConfig::new(FEI_SAVINGS_USER, 50e6),
                DepositConfig::new(FEI_MONEY_MARKET_USER, 25e6),
            ],

            liquidity_pool_tvl: 50e6,
            liquidity_pool_protocol_share: 0.8,
            liquidity_pool_trading_fee: 0.003,

            money_market_base_rate: 0.0,
            money_market_multiplier: 23_782_343_987e-18,
            money_market_jump_multiplier: 518_455_098_934e-18,
            money_market_kink: 0.8,
            money_market_reserve_factor: 0.25,
            money_market_max_risk_discount: 0.5,
            volatile_asset_risk_metric_window: 30,

            stable_asset_yield_rate: 0.10,
            volatile_asset_yield_rate: 0.10,
            yield_withdrawal_period: None,
            yield_reinvest_period: None,

            rebalancing_period: 91,
            target_stable_pcv_ratio: Some(0.5),
            target_stable_backing_ratio: None,
            target_rebalancing_condition: RebalancingCondition::LessThan,

            active_psm_deposits: vec![STABLE_IDLE_PCV],
            psm_mint_fee: 0.0,
            psm_redeem_fee: 0.003,

            capital_allocation_mode: CapitalAllocationMode::Endogenous,
            capital_allocation_deposits: vec![
                FEI_IDLE_USER,
                FEI_SAVINGS_USER,
                FEI_LIQUIDITY_POOL_USER,
                FEI_MONEY_MARKET_USER,
            ],
            capital_allocation_concentration: vec![1.0; 4],
            capital_allocation_rebalance_duration: 7.0,
            capital_allocation_yield_window: 7,
        }
    }
}

impl Parameters {
    pub fn from_json(json: &str) -> SimResult<Self> {
        let params: Self = serde_json::from_str(json).map_err(|e| SimError::InvalidConfig(e.to_string()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_json_file(path: &Path) -> SimResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SimError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Deposits the pool setup creates regardless of configuration.
    pub fn liquidity_pool_deposits() -> [DepositKey; 4] {
        [FEI_LIQUIDITY_POOL_PCV, VOLATILE_LIQUIDITY_POOL_PCV, FEI_LIQUIDITY_POOL_USER, VOLATILE_LIQUIDITY_POOL_USER]
    }

    /// Every deposit key present at timestep zero.
    pub fn deposit_keys(&self) -> BTreeSet<DepositKey> {
        self.pcv_deposits
            .iter()
            .chain(&self.user_deposits)
            .map(|d| d.key)
            .chain(Self::liquidity_pool_deposits())
            .collect()
    }

    /// Yield-bearing PCV deposits that accrue each timestep.
    pub fn yield_bearing_pcv_deposits(&self) -> Vec<DepositKey> {
        self.pcv_deposits
            .iter()
            .map(|d| d.key)
            .filter(|k| matches!(k.location, Location::YieldBearing | Location::MoneyMarket))
            .collect()
    }

    pub fn pcv_rebalancing_enabled(&self) -> bool {
        self.target_stable_pcv_ratio.is_some() || self.target_stable_backing_ratio.is_some()
    }

    /// Reject contradictory or incomplete configurations before any run.
    pub fn validate(&self) -> SimResult<()> {
        let fail = |msg: String| Err(SimError::InvalidConfig(msg));

        if !(self.dt > 0.0) {
            return fail(format!("dt must be positive (got {})", self.dt));
        }

        for (name, spec) in [
            ("fei_price_process", &self.fei_price_process),
            ("stable_asset_price_process", &self.stable_asset_price_process),
            ("volatile_asset_price_process", &self.volatile_asset_price_process),
            ("fei_savings_rate_process", &self.fei_savings_rate_process),
            ("money_market_utilization_process", &self.money_market_utilization_process),
        ] {
            spec.validate(name)?;
        }

        // Deposits
        let mut seen = BTreeSet::new();
        for (configs, kind) in [(&self.pcv_deposits, DepositKind::Pcv), (&self.user_deposits, DepositKind::User)] {
            for d in configs {
                if d.key.kind != kind {
                    return fail(format!("{} listed with {} deposits", d.key, kind.as_str()));
                }
                if d.balance < 0.0 {
                    return fail(format!("{} has negative balance", d.key));
                }
                if !seen.insert(d.key) {
                    return fail(format!("{} configured twice", d.key));
                }
            }
        }
        let keys = self.deposit_keys();

        // Rates and fees
        for (name, value) in [
            ("liquidity_pool_tvl", self.liquidity_pool_tvl),
            ("money_market_base_rate", self.money_market_base_rate),
            ("money_market_multiplier", self.money_market_multiplier),
            ("money_market_jump_multiplier", self.money_market_jump_multiplier),
            ("stable_asset_yield_rate", self.stable_asset_yield_rate),
            ("volatile_asset_yield_rate", self.volatile_asset_yield_rate),
            ("psm_mint_fee", self.psm_mint_fee),
            ("psm_redeem_fee", self.psm_redeem_fee),
        ] {
            if value < 0.0 {
                return fail(format!("{name} must be non-negative"));
            }
        }
        for (name, value) in [
            ("liquidity_pool_protocol_share", self.liquidity_pool_protocol_share),
            ("liquidity_pool_trading_fee", self.liquidity_pool_trading_fee),
            ("money_market_kink", self.money_market_kink),
            ("money_market_reserve_factor", self.money_market_reserve_factor),
            ("money_market_max_risk_discount", self.money_market_max_risk_discount),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{name} must lie in [0, 1]"));
            }
        }
        if self.volatile_asset_risk_metric_window == 0 {
            return fail("volatile_asset_risk_metric_window must be at least 1".into());
        }

        // Yield management
        if self.yield_withdrawal_period.is_some() && self.yield_reinvest_period.is_some() {
            return fail("yield withdrawal and yield reinvestment are mutually exclusive".into());
        }
        if self.yield_withdrawal_period == Some(0) || self.yield_reinvest_period == Some(0) {
            return fail("yield periods must be positive".into());
        }
        if self.yield_withdrawal_period.is_some() {
            for key in self.yield_bearing_pcv_deposits() {
                if !keys.contains(&key.idle_sibling()) {
                    return fail(format!("{key} has no idle deposit to withdraw yield into"));
                }
            }
        }

        // PCV rebalancing
        if self.target_stable_pcv_ratio.is_some() && self.target_stable_backing_ratio.is_some() {
            return fail("target_stable_pcv_ratio and target_stable_backing_ratio are mutually exclusive".into());
        }
        if self.rebalancing_period == 0 {
            return fail("rebalancing_period must be positive".into());
        }
        if let Some(target) = self.target_stable_pcv_ratio.or(self.target_stable_backing_ratio) {
            if target < 0.0 {
                return fail("rebalancing target must be non-negative".into());
            }
            for key in [STABLE_IDLE_PCV, STABLE_YIELD_BEARING_PCV, VOLATILE_IDLE_PCV, VOLATILE_YIELD_BEARING_PCV] {
                if !keys.contains(&key) {
                    return fail(format!("PCV rebalancing requires {key}"));
                }
            }
        }

        // Peg stability module
        for key in &self.active_psm_deposits {
            if key.kind != DepositKind::Pcv || key.asset == Asset::Fei || !keys.contains(key) {
                return fail(format!("{key} is not a configured collateral PCV deposit"));
            }
        }

        // Capital allocation
        if self.capital_allocation_mode != CapitalAllocationMode::Disabled {
            let tracked = &self.capital_allocation_deposits;
            if tracked.len() < 2 {
                return fail("capital allocation needs at least two deposits".into());
            }
            let unique: BTreeSet<_> = tracked.iter().collect();
            if unique.len() != tracked.len() {
                return fail("capital allocation deposits must be unique".into());
            }
            for key in tracked {
                if key.kind != DepositKind::User || key.asset != Asset::Fei || !keys.contains(key) {
                    return fail(format!("{key} is not a configured user FEI deposit"));
                }
            }
            if !(self.capital_allocation_rebalance_duration > 0.0) {
                return fail("capital_allocation_rebalance_duration must be positive".into());
            }
            if self.capital_allocation_yield_window == 0 {
                return fail("capital_allocation_yield_window must be at least 1".into());
            }
            if self.capital_allocation_mode == CapitalAllocationMode::Exogenous {
                if self.capital_allocation_concentration.len() != tracked.len() {
                    return fail(format!(
                        "capital_allocation_concentration has {} entries for {} deposits",
                        self.capital_allocation_concentration.len(),
                        tracked.len()
                    ));
                }
                if self.capital_allocation_concentration.iter().any(|a| !(*a > 0.0)) {
                    return fail("capital_allocation_concentration entries must be positive".into());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        Parameters::default().validate().unwrap();
    }

    #[test]
    fn test_yield_policies_mutually_exclusive() {
        let params = Parameters {
            yield_withdrawal_period: Some(30),
            yield_reinvest_period: Some(30),
            ..Parameters::default()
        };
        assert!(matches!(params.validate(), Err(SimError::InvalidConfig(_))));
    }

    #[test]
    fn test_rebalancing_targets_mutually_exclusive() {
        let params = Parameters {
            target_stable_pcv_ratio: Some(0.5),
            target_stable_backing_ratio: Some(0.8),
            ..Parameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_exogenous_concentration_length_checked() {
        let params = Parameters {
            capital_allocation_mode: CapitalAllocationMode::Exogenous,
            capital_allocation_concentration: vec![1.0, 1.0],
            ..Parameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_psm_deposit_must_exist() {
        let params = Parameters {
            active_psm_deposits: vec![DepositKey::pcv(Asset::Stable, Location::MoneyMarket)],
            ..Parameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let params = Parameters::from_json(
            r#"{ "dt": 7.0, "target_stable_pcv_ratio": null, "target_stable_backing_ratio": 0.8 }"#,
        )
        .unwrap();
        assert_eq!(params.dt, 7.0);
        assert_eq!(params.target_stable_backing_ratio, Some(0.8));
        assert_eq!(params.rebalancing_period, 91);
    }

    #[test]
    fn test_json_round_trip_of_process_spec() {
        let json = serde_json::to_string(&Parameters::default()).unwrap();
        assert!(json.contains("\"type\":\"geometric_brownian_motion\""));
        assert!(json.contains("\"fei_idle_pcv\""));
        assert_eq!(Parameters::from_json(&json).unwrap(), Parameters::default());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        assert!(matches!(Parameters::from_json("{ \"dt\": "), Err(SimError::InvalidConfig(_))));
    }
}
