// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - State Vector

use std::collections::BTreeMap;
use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::deposit::Deposit;
use crate::errors::{SimError, SimResult};
use crate::types::{Asset, DepositKey, DepositKind};

// ─── Scalar State ───────────────────────────────────────────────────────────

/// Declares every scalar state variable once, generating the `Scalars`
/// record and the matching `ScalarKey` used to address it in signals.
macro_rules! scalar_state {
    ($($field:ident => $variant:ident,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum ScalarKey {
            $($variant,)*
        }

        impl ScalarKey {
            pub const ALL: &'static [ScalarKey] = &[$(ScalarKey::$variant,)*];

            pub fn name(&self) -> &'static str {
                match self {
                    $(ScalarKey::$variant => stringify!($field),)*
                }
            }
        }

        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct Scalars {
            $(pub $field: f64,)*
        }

        impl Scalars {
            pub fn get(&self, key: ScalarKey) -> f64 {
                match key {
                    $(ScalarKey::$variant => self.$field,)*
                }
            }

            pub fn set(&mut self, key: ScalarKey, value: f64) {
                match key {
                    $(ScalarKey::$variant => self.$field = value,)*
                }
            }
        }
    };
}

scalar_state! {
    // Prices and exogenous rates
    fei_price => FeiPrice,
    stable_asset_price => StableAssetPrice,
    volatile_asset_price => VolatileAssetPrice,
    fei_savings_rate => FeiSavingsRate,

    // FEI accounting
    total_fei_supply => TotalFeiSupply,
    total_protocol_owned_fei => TotalProtocolOwnedFei,
    total_user_circulating_fei => TotalUserCirculatingFei,
    fei_minted_redeemed => FeiMintedRedeemed,

    // Peg stability module
    psm_mint_redeem_fees => PsmMintRedeemFees,
    cumulative_psm_redemptions => CumulativePsmRedemptions,

    // Liquidity pool
    liquidity_pool_invariant => LiquidityPoolInvariant,
    liquidity_pool_tvl => LiquidityPoolTvl,
    liquidity_pool_liquidity_tokens => LiquidityPoolLiquidityTokens,
    liquidity_pool_fei_source_sink => LiquidityPoolFeiSourceSink,
    liquidity_pool_impermanent_loss => LiquidityPoolImpermanentLoss,
    liquidity_pool_trading_fees => LiquidityPoolTradingFees,

    // Money market
    money_market_utilization => MoneyMarketUtilization,
    money_market_borrowed => MoneyMarketBorrowed,
    money_market_borrow_rate => MoneyMarketBorrowRate,
    money_market_supply_rate => MoneyMarketSupplyRate,
    volatile_asset_price_mean => VolatileAssetPriceMean,
    volatile_asset_risk_metric => VolatileAssetRiskMetric,
    volatile_asset_risk_metric_min => VolatileAssetRiskMetricMin,
    volatile_asset_risk_metric_max => VolatileAssetRiskMetricMax,

    // PCV accounting
    total_pcv => TotalPcv,
    total_stable_asset_pcv => TotalStableAssetPcv,
    total_volatile_asset_pcv => TotalVolatileAssetPcv,
    total_stable_asset_pcv_balance => TotalStableAssetPcvBalance,
    total_volatile_asset_pcv_balance => TotalVolatileAssetPcvBalance,
    pcv_yield => PcvYield,

    // System metrics
    stable_backing_ratio => StableBackingRatio,
    stable_pcv_ratio => StablePcvRatio,
    collateralization_ratio => CollateralizationRatio,
    pcv_yield_rate => PcvYieldRate,
    protocol_equity => ProtocolEquity,
    protocol_revenue => ProtocolRevenue,
}

// ─── Keys and Updates ───────────────────────────────────────────────────────

/// Address of one independently updatable piece of state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateKey {
    Scalar(ScalarKey),
    Deposit(DepositKey),
    TargetWeights,
    RebalanceMatrix,
    RebalanceRemainder,
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(key) => f.write_str(key.name()),
            Self::Deposit(key) => write!(f, "{key}"),
            Self::TargetWeights => f.write_str("capital_allocation_target_weights"),
            Self::RebalanceMatrix => f.write_str("capital_allocation_rebalance_matrix"),
            Self::RebalanceRemainder => f.write_str("capital_allocation_rebalance_remainder"),
        }
    }
}

impl From<ScalarKey> for StateKey {
    fn from(key: ScalarKey) -> Self {
        Self::Scalar(key)
    }
}

impl From<DepositKey> for StateKey {
    fn from(key: DepositKey) -> Self {
        Self::Deposit(key)
    }
}

/// A new value for exactly one state key.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    Scalar(ScalarKey, f64),
    Deposit(Deposit),
    TargetWeights(Vec<f64>),
    RebalanceMatrix(Array2<f64>),
    RebalanceRemainder(Vec<f64>),
}

impl StateUpdate {
    pub fn key(&self) -> StateKey {
        match self {
            Self::Scalar(key, _) => StateKey::Scalar(*key),
            Self::Deposit(d) => StateKey::Deposit(d.key()),
            Self::TargetWeights(_) => StateKey::TargetWeights,
            Self::RebalanceMatrix(_) => StateKey::RebalanceMatrix,
            Self::RebalanceRemainder(_) => StateKey::RebalanceRemainder,
        }
    }
}

// ─── State ──────────────────────────────────────────────────────────────────

/// One snapshot of the whole balance sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub run: usize,
    pub subset: usize,
    pub timestep: usize,
    pub substep: usize,
    #[serde(flatten)]
    pub scalars: Scalars,
    pub deposits: BTreeMap<DepositKey, Deposit>,
    pub capital_allocation_target_weights: Vec<f64>,
    pub capital_allocation_rebalance_matrix: Array2<f64>,
    pub capital_allocation_rebalance_remainder: Vec<f64>,
}

impl State {
    pub fn new(run: usize, subset: usize) -> Self {
        Self {
            run,
            subset,
            timestep: 0,
            substep: 0,
            scalars: Scalars::default(),
            deposits: BTreeMap::new(),
            capital_allocation_target_weights: Vec::new(),
            capital_allocation_rebalance_matrix: Array2::zeros((0, 0)),
            capital_allocation_rebalance_remainder: Vec::new(),
        }
    }

    pub fn deposit(&self, key: DepositKey) -> SimResult<&Deposit> {
        self.deposits.get(&key).ok_or(SimError::UnknownDeposit(key))
    }

    /// Cloned deposit for a policy to mutate and emit.
    pub fn deposit_cloned(&self, key: DepositKey) -> SimResult<Deposit> {
        self.deposit(key).cloned()
    }

    pub fn balance_or_zero(&self, key: DepositKey) -> f64 {
        self.deposits.get(&key).map_or(0.0, Deposit::balance)
    }

    pub fn price(&self, asset: Asset) -> f64 {
        match asset {
            Asset::Stable => self.scalars.stable_asset_price,
            Asset::Volatile => self.scalars.volatile_asset_price,
            Asset::Fei => self.scalars.fei_price,
        }
    }

    /// Deposits matching a kind and asset, in key order.
    pub fn deposits_of(&self, kind: DepositKind, asset: Asset) -> impl Iterator<Item = &Deposit> {
        self.deposits.values().filter(move |d| d.kind() == kind && d.asset() == asset)
    }

    pub fn get(&self, key: StateKey) -> SimResult<StateUpdate> {
        Ok(match key {
            StateKey::Scalar(k) => StateUpdate::Scalar(k, self.scalars.get(k)),
            StateKey::Deposit(k) => StateUpdate::Deposit(self.deposit_cloned(k)?),
            StateKey::TargetWeights => StateUpdate::TargetWeights(self.capital_allocation_target_weights.clone()),
            StateKey::RebalanceMatrix => StateUpdate::RebalanceMatrix(self.capital_allocation_rebalance_matrix.clone()),
            StateKey::RebalanceRemainder => {
                StateUpdate::RebalanceRemainder(self.capital_allocation_rebalance_remainder.clone())
            }
        })
    }

    /// Commit one update. Deposits must already exist.
    pub fn apply(&mut self, update: StateUpdate) -> SimResult<()> {
        match update {
            StateUpdate::Scalar(key, value) => self.scalars.set(key, value),
            StateUpdate::Deposit(d) => {
                let slot = self.deposits.get_mut(&d.key()).ok_or(SimError::UnknownDeposit(d.key()))?;
                *slot = d;
            }
            StateUpdate::TargetWeights(w) => self.capital_allocation_target_weights = w,
            StateUpdate::RebalanceMatrix(m) => self.capital_allocation_rebalance_matrix = m,
            StateUpdate::RebalanceRemainder(r) => self.capital_allocation_rebalance_remainder = r,
        }
        Ok(())
    }
}

// ─── History ────────────────────────────────────────────────────────────────

/// Append-only snapshots of one run, indexed `[timestep][substep]`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateHistory {
    timesteps: Vec<Vec<State>>,
}

impl StateHistory {
    pub fn new(initial: State) -> Self {
        Self { timesteps: vec![vec![initial]] }
    }

    pub fn push(&mut self, substeps: Vec<State>) {
        if !substeps.is_empty() {
            self.timesteps.push(substeps);
        }
    }

    /// Number of committed timesteps, including the initial snapshot.
    pub fn len(&self) -> usize {
        self.timesteps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timesteps.is_empty()
    }

    pub fn initial(&self) -> Option<&State> {
        self.timesteps.first().and_then(|s| s.first())
    }

    /// Latest committed snapshot.
    pub fn latest(&self) -> Option<&State> {
        self.timesteps.last().and_then(|s| s.last())
    }

    pub fn substeps(&self, timestep: usize) -> &[State] {
        self.timesteps.get(timestep).map_or(&[], Vec::as_slice)
    }

    /// End-of-timestep snapshots, oldest first.
    pub fn finals(&self) -> impl DoubleEndedIterator<Item = &State> {
        self.timesteps.iter().filter_map(|s| s.last())
    }

    /// Up to `window` most recent end-of-timestep snapshots, oldest first.
    pub fn trailing(&self, window: usize) -> impl Iterator<Item = &State> {
        let skip = self.timesteps.len().saturating_sub(window);
        self.timesteps[skip..].iter().filter_map(|s| s.last())
    }

    pub fn iter(&self) -> impl Iterator<Item = &State> {
        self.timesteps.iter().flatten()
    }

    pub fn into_states(self) -> Vec<State> {
        self.timesteps.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn state_with(keys: &[DepositKey]) -> State {
        let mut state = State::new(0, 0);
        for key in keys {
            state.deposits.insert(*key, Deposit::new(*key, 10.0, 1.0).unwrap());
        }
        state
    }

    #[test]
    fn test_scalar_get_set_by_key() {
        let mut scalars = Scalars::default();
        scalars.set(ScalarKey::CollateralizationRatio, 1.5);
        assert_eq!(scalars.collateralization_ratio, 1.5);
        assert_eq!(scalars.get(ScalarKey::CollateralizationRatio), 1.5);
        assert_eq!(ScalarKey::CollateralizationRatio.name(), "collateralization_ratio");
        assert!(ScalarKey::ALL.contains(&ScalarKey::ProtocolRevenue));
    }

    #[test]
    fn test_apply_unknown_deposit_fails() {
        let mut state = state_with(&[STABLE_IDLE_PCV]);
        let stray = Deposit::new(VOLATILE_IDLE_PCV, 1.0, 2.0).unwrap();
        assert_eq!(
            state.apply(StateUpdate::Deposit(stray)),
            Err(SimError::UnknownDeposit(VOLATILE_IDLE_PCV))
        );
    }

    #[test]
    fn test_apply_replaces_deposit() {
        let mut state = state_with(&[STABLE_IDLE_PCV]);
        let mut d = state.deposit_cloned(STABLE_IDLE_PCV).unwrap();
        d.deposit(5.0, 1.0).unwrap();
        state.apply(StateUpdate::Deposit(d)).unwrap();
        assert_eq!(state.balance_or_zero(STABLE_IDLE_PCV), 15.0);
        assert_eq!(state.balance_or_zero(VOLATILE_IDLE_PCV), 0.0);
    }

    #[test]
    fn test_history_trailing_window() {
        let mut history = StateHistory::new(State::new(0, 0));
        for t in 1..=5 {
            let mut s = State::new(0, 0);
            s.timestep = t;
            history.push(vec![s.clone(), s]);
        }
        let ts: Vec<usize> = history.trailing(3).map(|s| s.timestep).collect();
        assert_eq!(ts, vec![3, 4, 5]);
        assert_eq!(history.latest().unwrap().timestep, 5);
        assert_eq!(history.substeps(2).len(), 2);
        assert_eq!(history.iter().count(), 11);
    }

    #[test]
    fn test_state_serializes_flat_scalars() {
        let state = state_with(&[FEI_IDLE_USER]);
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("collateralization_ratio").is_some());
        assert!(json["deposits"].get("fei_idle_user").is_some());
    }
}
