// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - FEI and PCV Accounting

use serde::{Deserialize, Serialize};

use crate::errors::SimResult;
use crate::params::Parameters;
use crate::pipeline::{Block, Context, Policy, Signal, Updater};
use crate::state::{ScalarKey, Scalars, State, StateKey};
use crate::types::{Asset, DepositKind};

// ─── FEI Supply ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeiTotals {
    pub protocol_owned: f64,
    pub user_circulating: f64,
    pub supply: f64,
}

/// Supply is defined as the sum of both sides, so conservation holds by
/// construction.
pub fn fei_totals(state: &State) -> FeiTotals {
    let protocol_owned: f64 = state.deposits_of(DepositKind::Pcv, Asset::Fei).map(|d| d.balance()).sum();
    let user_circulating: f64 = state.deposits_of(DepositKind::User, Asset::Fei).map(|d| d.balance()).sum();
    FeiTotals { protocol_owned, user_circulating, supply: protocol_owned + user_circulating }
}

impl FeiTotals {
    pub fn write(&self, scalars: &mut Scalars) {
        scalars.total_protocol_owned_fei = self.protocol_owned;
        scalars.total_user_circulating_fei = self.user_circulating;
        scalars.total_fei_supply = self.supply;
    }
}

// ─── PCV ────────────────────────────────────────────────────────────────────

/// Collateral held by the protocol. Protocol-owned FEI is a liability-side
/// item and carries no collateral value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PcvTotals {
    pub stable_balance: f64,
    pub volatile_balance: f64,
    pub stable_value: f64,
    pub volatile_value: f64,
    pub total_value: f64,
}

pub fn pcv_totals(state: &State) -> PcvTotals {
    let sum = |asset: Asset| -> f64 { state.deposits_of(DepositKind::Pcv, asset).map(|d| d.balance()).sum() };
    let stable_balance = sum(Asset::Stable);
    let volatile_balance = sum(Asset::Volatile);
    let stable_value = stable_balance * state.scalars.stable_asset_price;
    let volatile_value = volatile_balance * state.scalars.volatile_asset_price;
    PcvTotals {
        stable_balance,
        volatile_balance,
        stable_value,
        volatile_value,
        total_value: stable_value + volatile_value,
    }
}

impl PcvTotals {
    pub fn write(&self, scalars: &mut Scalars) {
        scalars.total_stable_asset_pcv_balance = self.stable_balance;
        scalars.total_volatile_asset_pcv_balance = self.volatile_balance;
        scalars.total_stable_asset_pcv = self.stable_value;
        scalars.total_volatile_asset_pcv = self.volatile_value;
        scalars.total_pcv = self.total_value;
    }
}

// ─── Policies ───────────────────────────────────────────────────────────────

const FEI_KEYS: [ScalarKey; 3] =
    [ScalarKey::TotalProtocolOwnedFei, ScalarKey::TotalUserCirculatingFei, ScalarKey::TotalFeiSupply];

const PCV_KEYS: [ScalarKey; 5] = [
    ScalarKey::TotalStableAssetPcvBalance,
    ScalarKey::TotalVolatileAssetPcvBalance,
    ScalarKey::TotalStableAssetPcv,
    ScalarKey::TotalVolatileAssetPcv,
    ScalarKey::TotalPcv,
];

fn signal_of(scalars: &Scalars, keys: &[ScalarKey]) -> Signal {
    let mut signal = Signal::new();
    for key in keys {
        signal.set_scalar(*key, scalars.get(*key));
    }
    signal
}

fn fei_accounting_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let mut scalars = Scalars::default();
    fei_totals(ctx.previous).write(&mut scalars);
    Ok(signal_of(&scalars, &FEI_KEYS))
}

fn pcv_accounting_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let mut scalars = Scalars::default();
    pcv_totals(ctx.previous).write(&mut scalars);
    Ok(signal_of(&scalars, &PCV_KEYS))
}

pub fn block(_params: &Parameters) -> SimResult<Block> {
    let keys = |ks: &[ScalarKey]| -> Vec<StateKey> { ks.iter().map(|k| StateKey::from(*k)).collect() };
    let updaters = FEI_KEYS.iter().chain(PCV_KEYS.iter()).map(|k| Updater::from_signal(*k)).collect();
    Block::new(
        "Accounting",
        vec![
            Policy::new("fei_accounting", keys(&FEI_KEYS), fei_accounting_policy),
            Policy::new("pcv_accounting", keys(&PCV_KEYS), pcv_accounting_policy),
        ],
        updaters,
    )
}
