// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Peg Stability Module

use log::warn;

use crate::deposit::Deposit;
use crate::errors::{SimError, SimResult};
use crate::params::Parameters;
use crate::pipeline::{Block, Context, Policy, Signal, Updater};
use crate::state::{ScalarKey, State, StateKey};
use crate::types::DepositKey;

/// Result of settling one period's net mint or redemption.
#[derive(Debug, Clone, PartialEq)]
pub struct PsmSettlement {
    /// The collateral deposit that was credited or debited.
    pub deposit: Deposit,
    pub fees_usd: f64,
    pub redeemed: f64,
}

/// Settle `fei_minted_redeemed` against the ordered active deposits.
/// Minting credits the first deposit; redemption debits the first deposit
/// with enough collateral. Returns `None` when no deposit is active.
pub fn settle(
    state: &State,
    active: &[DepositKey],
    fei_minted_redeemed: f64,
    mint_fee: f64,
    redeem_fee: f64,
) -> SimResult<Option<PsmSettlement>> {
    let Some(first) = active.first() else {
        return Ok(None);
    };
    let fei_price = state.scalars.fei_price;

    if fei_minted_redeemed >= 0.0 {
        let mut deposit = state.deposit_cloned(*first)?;
        let asset_price = state.price(deposit.asset());
        if !(asset_price > 0.0) {
            return Err(SimError::InvalidPrice { asset: deposit.asset().as_str(), price: asset_price });
        }
        deposit.deposit(fei_minted_redeemed * fei_price / asset_price, asset_price)?;
        return Ok(Some(PsmSettlement {
            deposit,
            fees_usd: mint_fee * fei_minted_redeemed * fei_price,
            redeemed: 0.0,
        }));
    }

    let redeemed = -fei_minted_redeemed;
    for key in active {
        let mut deposit = state.deposit_cloned(*key)?;
        let asset_price = state.price(deposit.asset());
        if !(asset_price > 0.0) {
            continue;
        }
        let amount = redeemed * fei_price / asset_price;
        if deposit.balance() >= amount {
            deposit.withdraw(amount, asset_price)?;
            return Ok(Some(PsmSettlement { deposit, fees_usd: redeem_fee * redeemed * fei_price, redeemed }));
        }
    }
    Err(SimError::InsufficientPcvForRedemption { requested: redeemed })
}

fn psm_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let params = ctx.params;
    let prev = ctx.previous;
    let mut signal = Signal::new();

    let settlement = settle(
        prev,
        &params.active_psm_deposits,
        prev.scalars.fei_minted_redeemed,
        params.psm_mint_fee,
        params.psm_redeem_fee,
    )?;
    let Some(settlement) = settlement else {
        warn!("no active PSM deposits, skipping mint/redeem of {}", prev.scalars.fei_minted_redeemed);
        return Ok(signal);
    };

    signal.set_deposit(settlement.deposit);
    signal.set_scalar(ScalarKey::PsmMintRedeemFees, settlement.fees_usd);
    signal.set_scalar(
        ScalarKey::CumulativePsmRedemptions,
        prev.scalars.cumulative_psm_redemptions + settlement.redeemed,
    );
    Ok(signal)
}

pub fn block(params: &Parameters) -> SimResult<Block> {
    let mut emits: Vec<StateKey> = params.active_psm_deposits.iter().map(|k| StateKey::from(*k)).collect();
    emits.push(ScalarKey::PsmMintRedeemFees.into());
    emits.push(ScalarKey::CumulativePsmRedemptions.into());
    let updaters = emits.iter().map(|k| Updater::optional(*k)).collect();
    Block::new("Peg stability module", vec![Policy::new("psm", emits, psm_policy)], updaters)
}
