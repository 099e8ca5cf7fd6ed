// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Constant Product Liquidity Pool
//
// FEI / volatile asset pool. Each timestep arbitrage moves the pool to the
// balances implied by the invariant at current prices; the incoming side
// pays the trading fee, which stays in the pool.

use crate::errors::{SimError, SimResult};
use crate::params::Parameters;
use crate::pipeline::{Block, Context, Policy, Signal, Updater};
use crate::state::{ScalarKey, StateKey};
use crate::types::*;

/// Absolute slack allowed between the target product and the invariant.
pub const TARGET_INVARIANT_TOLERANCE: f64 = 1.0;

// ─── Pool Math ──────────────────────────────────────────────────────────────

/// Outcome of moving the pool to its arbitrage-free balances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolRebalance {
    pub fei_balance: f64,
    pub volatile_balance: f64,
    /// Signed FEI gap before fees; positive when FEI flows into the pool.
    pub delta_fei: f64,
    pub delta_volatile: f64,
    pub fees_usd: f64,
    pub invariant: f64,
    pub tvl: f64,
}

pub fn rebalance_pool(
    fei_balance: f64,
    volatile_balance: f64,
    invariant: f64,
    fei_price: f64,
    volatile_price: f64,
    trading_fee: f64,
) -> SimResult<PoolRebalance> {
    if !(fei_price > 0.0) {
        return Err(SimError::InvalidPrice { asset: "fei", price: fei_price });
    }
    if !(volatile_price > 0.0) {
        return Err(SimError::InvalidPrice { asset: "volatile", price: volatile_price });
    }

    let target_fei = (invariant * volatile_price / fei_price).sqrt();
    let target_volatile = (invariant * fei_price / volatile_price).sqrt();
    let drift = (target_fei * target_volatile - invariant).abs();
    if !(drift <= TARGET_INVARIANT_TOLERANCE) {
        return Err(SimError::Invariant(format!(
            "target pool product deviates from invariant {invariant} by {drift}"
        )));
    }

    let delta_fei = target_fei - fei_balance;
    let delta_volatile = target_volatile - volatile_balance;

    let (new_fei, new_volatile, fees_usd) = if delta_fei > 0.0 {
        let fee = trading_fee * delta_fei;
        (target_fei + fee, target_volatile, fee * fei_price)
    } else if delta_fei < 0.0 {
        let fee = trading_fee * delta_volatile.abs();
        (target_fei, target_volatile + fee, fee * volatile_price)
    } else {
        (fei_balance, volatile_balance, 0.0)
    };

    Ok(PoolRebalance {
        fei_balance: new_fei,
        volatile_balance: new_volatile,
        delta_fei,
        delta_volatile,
        fees_usd,
        invariant: new_fei * new_volatile,
        tvl: new_fei * fei_price + new_volatile * volatile_price,
    })
}

/// Loss of an LP position versus holding, given the reference and current
/// volatile asset prices. Always in `[-1, 0]`.
pub fn impermanent_loss(reference_price: f64, price: f64) -> f64 {
    if !(reference_price > 0.0 && price > 0.0) {
        return 0.0;
    }
    let r = reference_price / price;
    2.0 * r.sqrt() / (1.0 + r) - 1.0
}

/// Relative slack past the full pool supply treated as float dust.
const REMOVAL_DUST: f64 = 1e-9;

/// Reserve, supply and voucher-token deltas of a liquidity change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiquidityChange {
    pub volatile: f64,
    pub fei: f64,
    pub tokens: f64,
}

/// Add `fei_in` to a pool holding `volatile_reserve` / `fei_supply` with
/// `tokens_outstanding` liquidity tokens. Keeps the reserve ratio; an empty
/// pool is seeded 1:1 with `volatile_value` of the volatile asset.
pub fn add_liquidity(
    volatile_reserve: f64,
    fei_supply: f64,
    tokens_outstanding: f64,
    fei_in: f64,
    volatile_value: f64,
) -> LiquidityChange {
    if tokens_outstanding <= 0.0 || fei_supply <= 0.0 {
        return LiquidityChange { volatile: volatile_value, fei: fei_in, tokens: fei_in };
    }
    let alpha = fei_in / fei_supply;
    LiquidityChange { volatile: alpha * volatile_reserve, fei: fei_in, tokens: alpha * tokens_outstanding }
}

/// Remove `fei_out` at the current reserve ratio. All deltas are negative.
/// Removing more FEI than the pool holds is an error; only float dust past
/// the full supply is absorbed.
pub fn remove_liquidity(
    volatile_reserve: f64,
    fei_supply: f64,
    tokens_outstanding: f64,
    fei_out: f64,
) -> SimResult<LiquidityChange> {
    if fei_out == 0.0 {
        return Ok(LiquidityChange { volatile: 0.0, fei: 0.0, tokens: 0.0 });
    }
    if !(fei_out > 0.0) || fei_out > fei_supply * (1.0 + REMOVAL_DUST) {
        return Err(SimError::InsufficientBalance { requested: fei_out, available: fei_supply.max(0.0) });
    }
    let alpha = if fei_out > fei_supply { 1.0 } else { fei_out / fei_supply };
    Ok(LiquidityChange {
        volatile: -alpha * volatile_reserve,
        fei: -alpha * fei_supply,
        tokens: -alpha * tokens_outstanding,
    })
}

// ─── Policy ─────────────────────────────────────────────────────────────────

const DEPOSITS: [DepositKey; 4] =
    [FEI_LIQUIDITY_POOL_PCV, VOLATILE_LIQUIDITY_POOL_PCV, FEI_LIQUIDITY_POOL_USER, VOLATILE_LIQUIDITY_POOL_USER];

const SCALARS: [ScalarKey; 6] = [
    ScalarKey::LiquidityPoolInvariant,
    ScalarKey::LiquidityPoolTvl,
    ScalarKey::LiquidityPoolTradingFees,
    ScalarKey::LiquidityPoolImpermanentLoss,
    ScalarKey::LiquidityPoolFeiSourceSink,
    ScalarKey::FeiMintedRedeemed,
];

fn liquidity_pool_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let prev = ctx.previous;
    let fei_price = prev.scalars.fei_price;
    let volatile_price = prev.scalars.volatile_asset_price;

    let mut fei_pcv = prev.deposit_cloned(FEI_LIQUIDITY_POOL_PCV)?;
    let mut volatile_pcv = prev.deposit_cloned(VOLATILE_LIQUIDITY_POOL_PCV)?;
    let mut fei_user = prev.deposit_cloned(FEI_LIQUIDITY_POOL_USER)?;
    let mut volatile_user = prev.deposit_cloned(VOLATILE_LIQUIDITY_POOL_USER)?;

    let fei_total = fei_pcv.balance() + fei_user.balance();
    let volatile_total = volatile_pcv.balance() + volatile_user.balance();
    let protocol_share = if fei_total > 0.0 {
        fei_pcv.balance() / fei_total
    } else {
        ctx.params.liquidity_pool_protocol_share
    };

    let pool = rebalance_pool(
        fei_total,
        volatile_total,
        prev.scalars.liquidity_pool_invariant,
        fei_price,
        volatile_price,
        ctx.params.liquidity_pool_trading_fee,
    )?;

    let reference_price = ctx.history.initial().map_or(volatile_price, |s| s.scalars.volatile_asset_price);
    let il = impermanent_loss(reference_price, volatile_price);
    let fee_yield = if pool.tvl > 0.0 {
        pool.fees_usd / pool.tvl * DAYS_PER_YEAR / ctx.params.dt
    } else {
        0.0
    };
    let yield_rate = (fee_yield - il.abs()).max(0.0);

    fei_pcv.set_balance(pool.fei_balance * protocol_share, fei_price)?;
    fei_user.set_balance(pool.fei_balance * (1.0 - protocol_share), fei_price)?;
    volatile_pcv.set_balance(pool.volatile_balance * protocol_share, volatile_price)?;
    volatile_user.set_balance(pool.volatile_balance * (1.0 - protocol_share), volatile_price)?;

    let mut signal = Signal::new();
    for mut deposit in [fei_pcv, volatile_pcv, fei_user, volatile_user] {
        deposit.set_yield_rate(yield_rate)?;
        signal.set_deposit(deposit);
    }
    signal.set_scalar(ScalarKey::LiquidityPoolInvariant, pool.invariant);
    signal.set_scalar(ScalarKey::LiquidityPoolTvl, pool.tvl);
    signal.set_scalar(ScalarKey::LiquidityPoolTradingFees, pool.fees_usd);
    signal.set_scalar(ScalarKey::LiquidityPoolImpermanentLoss, il);
    signal.set_scalar(ScalarKey::LiquidityPoolFeiSourceSink, -pool.delta_fei);
    signal.set_scalar(ScalarKey::FeiMintedRedeemed, pool.delta_fei);
    Ok(signal)
}

pub fn block(_params: &Parameters) -> SimResult<Block> {
    let emits: Vec<StateKey> = DEPOSITS
        .iter()
        .map(|k| StateKey::from(*k))
        .chain(SCALARS.iter().map(|k| StateKey::from(*k)))
        .collect();
    let updaters = emits.iter().map(|k| Updater::from_signal(*k)).collect();
    Block::new("Liquidity pool", vec![Policy::new("liquidity_pool", emits, liquidity_pool_policy)], updaters)
}
