// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Price and Savings Rate Inputs

use crate::errors::{SimError, SimResult};
use crate::params::Parameters;
use crate::pipeline::{Block, Context, Policy, Signal, Updater};
use crate::processes::Process;
use crate::state::{ScalarKey, StateKey, StateUpdate};
use crate::types::FEI_SAVINGS_USER;

/// Sample a price process, rejecting non-positive or non-finite draws.
pub fn sample_price(process: &Process, asset: &'static str, run: usize, scaled_timestep: f64) -> SimResult<f64> {
    let price = process.sample(run, scaled_timestep);
    if !(price > 0.0 && price.is_finite()) {
        return Err(SimError::InvalidPrice { asset, price });
    }
    Ok(price)
}

fn update_fei_price(ctx: &Context<'_>, _: &Signal) -> SimResult<StateUpdate> {
    let price = sample_price(&ctx.processes.fei_price, "fei", ctx.run(), ctx.scaled_timestep())?;
    Ok(StateUpdate::Scalar(ScalarKey::FeiPrice, price))
}

fn update_stable_asset_price(ctx: &Context<'_>, _: &Signal) -> SimResult<StateUpdate> {
    let price = sample_price(&ctx.processes.stable_asset_price, "stable", ctx.run(), ctx.scaled_timestep())?;
    Ok(StateUpdate::Scalar(ScalarKey::StableAssetPrice, price))
}

fn update_volatile_asset_price(ctx: &Context<'_>, _: &Signal) -> SimResult<StateUpdate> {
    let price = sample_price(&ctx.processes.volatile_asset_price, "volatile", ctx.run(), ctx.scaled_timestep())?;
    Ok(StateUpdate::Scalar(ScalarKey::VolatileAssetPrice, price))
}

/// Savings rate for the period, also applied to the user savings deposit.
fn savings_rate_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let rate = ctx.processes.fei_savings_rate.sample(ctx.run(), ctx.scaled_timestep()).max(0.0);
    let mut signal = Signal::new();
    signal.set_scalar(ScalarKey::FeiSavingsRate, rate);
    if let Some(savings) = ctx.previous.deposits.get(&FEI_SAVINGS_USER) {
        let mut savings = savings.clone();
        savings.set_yield_rate(rate)?;
        signal.set_deposit(savings);
    }
    Ok(signal)
}

pub fn blocks(params: &Parameters) -> SimResult<Vec<Block>> {
    let prices = Block::new(
        "Price processes",
        vec![],
        vec![
            Updater::compute(ScalarKey::FeiPrice, update_fei_price),
            Updater::compute(ScalarKey::StableAssetPrice, update_stable_asset_price),
            Updater::compute(ScalarKey::VolatileAssetPrice, update_volatile_asset_price),
        ],
    )?;

    let mut emits: Vec<StateKey> = vec![ScalarKey::FeiSavingsRate.into()];
    let mut updaters = vec![Updater::from_signal(ScalarKey::FeiSavingsRate)];
    if params.deposit_keys().contains(&FEI_SAVINGS_USER) {
        emits.push(FEI_SAVINGS_USER.into());
        updaters.push(Updater::optional(FEI_SAVINGS_USER));
    }
    let savings = Block::new(
        "FEI savings rate",
        vec![Policy::new("savings_rate", emits, savings_rate_policy)],
        updaters,
    )?;

    Ok(vec![prices, savings])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_price_rejected() {
        let p = Process::Constant(0.0);
        assert!(matches!(sample_price(&p, "volatile", 0, 1.0), Err(SimError::InvalidPrice { .. })));
        let p = Process::Constant(f64::NAN);
        assert!(sample_price(&p, "stable", 0, 1.0).is_err());
        let p = Process::Constant(2000.0);
        assert_eq!(sample_price(&p, "volatile", 0, 1.0), Ok(2000.0));
    }

    #[test]
    fn test_blocks_build_for_defaults() {
        let blocks = blocks(&Parameters::default()).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].updaters().len(), 2);
    }
}
