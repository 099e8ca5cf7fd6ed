// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - PCV Rebalancing
//
// Periodically shifts collateral between the stable and volatile asset to
// hit a stable-share target. Sources are tapped idle first, then yield
// bearing; an unfilled remainder is a logged shortfall, not an error.

use log::{info, warn};

use crate::accounting::{fei_totals, pcv_totals};
use crate::errors::SimResult;
use crate::params::Parameters;
use crate::pipeline::{Block, Context, Policy, Signal, Updater};
use crate::state::{State, StateKey};
use crate::types::*;

const DEPOSITS: [DepositKey; 4] =
    [STABLE_IDLE_PCV, STABLE_YIELD_BEARING_PCV, VOLATILE_IDLE_PCV, VOLATILE_YIELD_BEARING_PCV];

/// Remaining native amount below which a rebalance counts as filled.
const SHORTFALL_DUST: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RebalanceOutcome {
    /// Native units of the source asset actually moved.
    pub moved: f64,
    /// Native units of the source asset that could not be sourced.
    pub shortfall: f64,
}

/// Move `stable_change_usd` of value into (positive) or out of (negative)
/// the stable asset, updating `signal` with every touched deposit.
pub fn rebalance_stable_value(state: &State, stable_change_usd: f64, signal: &mut Signal) -> SimResult<RebalanceOutcome> {
    let (sources, sink) = if stable_change_usd >= 0.0 {
        ([VOLATILE_IDLE_PCV, VOLATILE_YIELD_BEARING_PCV], STABLE_IDLE_PCV)
    } else {
        ([STABLE_IDLE_PCV, STABLE_YIELD_BEARING_PCV], VOLATILE_IDLE_PCV)
    };
    let from_price = state.price(sources[0].asset);
    let to_price = state.price(sink.asset);

    let mut sink_deposit = state.deposit_cloned(sink)?;
    let target = if from_price > 0.0 { stable_change_usd.abs() / from_price } else { 0.0 };
    let mut remaining = target;

    for key in sources {
        let mut source = state.deposit_cloned(key)?;
        if remaining > 0.0 {
            if source.yield_rate() > 0.0 {
                source.compound(from_price)?;
            }
            let amount = remaining.min(source.balance());
            if amount > 0.0 {
                source.transfer(&mut sink_deposit, amount, from_price, Some(to_price))?;
                remaining -= amount;
            }
        }
        signal.set_deposit(source);
    }
    signal.set_deposit(sink_deposit);

    let shortfall = if remaining > SHORTFALL_DUST * target.max(1.0) { remaining } else { 0.0 };
    Ok(RebalanceOutcome { moved: target - remaining, shortfall })
}

fn due(ctx: &Context<'_>, current: f64, target: f64) -> bool {
    ctx.timestep() % ctx.params.rebalancing_period == 0
        && ctx.params.target_rebalancing_condition.holds(current, target)
}

fn apply(ctx: &Context<'_>, stable_change_usd: f64, variant: &str) -> SimResult<Signal> {
    let mut signal = Signal::new();
    let outcome = rebalance_stable_value(ctx.previous, stable_change_usd, &mut signal)?;
    info!(
        "PCV rebalancing ({variant}) at timestep {}: moved {:.4} toward stable change {:.2} USD",
        ctx.timestep(),
        outcome.moved,
        stable_change_usd
    );
    if outcome.shortfall > 0.0 {
        warn!(
            "PCV rebalancing ({variant}) at timestep {} short by {:.4} units of source collateral",
            ctx.timestep(),
            outcome.shortfall
        );
    }
    Ok(signal)
}

/// Target stable share of total PCV value. Ratios are taken at this
/// substep's prices, not the ones accounted at the end of last timestep.
fn stable_pcv_ratio_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let Some(target) = ctx.params.target_stable_pcv_ratio else {
        return Ok(Signal::new());
    };
    let pcv = pcv_totals(ctx.previous);
    if !(pcv.total_value > 0.0) {
        return Ok(Signal::new());
    }
    let current = pcv.stable_value / pcv.total_value;
    if !due(ctx, current, target) {
        return Ok(Signal::new());
    }
    apply(ctx, (target - current) * pcv.total_value, "stable PCV ratio")
}

/// Target stable backing of user-circulating FEI.
fn stable_backing_ratio_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let Some(target) = ctx.params.target_stable_backing_ratio else {
        return Ok(Signal::new());
    };
    let pcv = pcv_totals(ctx.previous);
    let user_value = fei_totals(ctx.previous).user_circulating * ctx.previous.scalars.fei_price;
    if !(user_value > 0.0) {
        return Ok(Signal::new());
    }
    if !due(ctx, pcv.stable_value / user_value, target) {
        return Ok(Signal::new());
    }
    apply(ctx, target * user_value - pcv.stable_value, "stable backing ratio")
}

pub fn block(params: &Parameters) -> SimResult<Option<Block>> {
    let emits: Vec<StateKey> = DEPOSITS.iter().map(|k| StateKey::from(*k)).collect();
    let policy = if params.target_stable_pcv_ratio.is_some() {
        Policy::new("stable_pcv_ratio", emits.clone(), stable_pcv_ratio_policy)
    } else if params.target_stable_backing_ratio.is_some() {
        Policy::new("stable_backing_ratio", emits.clone(), stable_backing_ratio_policy)
    } else {
        return Ok(None);
    };
    let updaters = emits.iter().map(|k| Updater::optional(*k)).collect();
    Block::new("PCV rebalancing", vec![policy], updaters).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deposit::Deposit;
    use crate::state::StateUpdate;

    fn state(stable_idle: f64, stable_yb: f64, volatile_idle: f64, volatile_yb: f64) -> State {
        let mut state = State::new(0, 0);
        state.scalars.stable_asset_price = 1.0;
        state.scalars.volatile_asset_price = 2000.0;
        for (key, balance) in [
            (STABLE_IDLE_PCV, stable_idle),
            (STABLE_YIELD_BEARING_PCV, stable_yb),
            (VOLATILE_IDLE_PCV, volatile_idle),
            (VOLATILE_YIELD_BEARING_PCV, volatile_yb),
        ] {
            let price = state.price(key.asset);
            state.deposits.insert(key, Deposit::new(key, balance, price).unwrap());
        }
        state
    }

    fn balance(signal: &Signal, key: DepositKey) -> f64 {
        match signal.get(&StateKey::Deposit(key)) {
            Some(StateUpdate::Deposit(d)) => d.balance(),
            _ => panic!("{key} not emitted"),
        }
    }

    #[test]
    fn test_buys_stable_idle_first() {
        let s = state(0.0, 0.0, 10.0, 10.0);
        let mut signal = Signal::new();
        let outcome = rebalance_stable_value(&s, 4000.0, &mut signal).unwrap();
        assert_eq!(outcome.shortfall, 0.0);
        assert!((outcome.moved - 2.0).abs() < 1e-12);
        assert!((balance(&signal, VOLATILE_IDLE_PCV) - 8.0).abs() < 1e-12);
        assert_eq!(balance(&signal, VOLATILE_YIELD_BEARING_PCV), 10.0);
        assert!((balance(&signal, STABLE_IDLE_PCV) - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn test_spills_into_yield_bearing() {
        let s = state(1000.0, 5000.0, 0.0, 0.0);
        let mut signal = Signal::new();
        rebalance_stable_value(&s, -3000.0, &mut signal).unwrap();
        assert_eq!(balance(&signal, STABLE_IDLE_PCV), 0.0);
        assert!((balance(&signal, STABLE_YIELD_BEARING_PCV) - 3000.0).abs() < 1e-9);
        assert!((balance(&signal, VOLATILE_IDLE_PCV) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_shortfall_is_reported_not_fatal() {
        let s = state(0.0, 0.0, 1.0, 1.0);
        let mut signal = Signal::new();
        let outcome = rebalance_stable_value(&s, 10_000.0, &mut signal).unwrap();
        assert!((outcome.shortfall - 3.0).abs() < 1e-12);
        assert!((balance(&signal, STABLE_IDLE_PCV) - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn test_yield_swept_before_tapping() {
        let mut s = state(0.0, 0.0, 0.0, 10.0);
        let yb = s.deposits.get_mut(&VOLATILE_YIELD_BEARING_PCV).unwrap();
        yb.set_yield_rate(0.365).unwrap();
        yb.accrue_yield(1.0, 2000.0).unwrap(); // 0.01 accrued
        let mut signal = Signal::new();
        rebalance_stable_value(&s, 2000.0 * 10.01, &mut signal).unwrap();
        assert!(balance(&signal, VOLATILE_YIELD_BEARING_PCV).abs() < 1e-9);
        assert!((balance(&signal, STABLE_IDLE_PCV) - 20_020.0).abs() < 1e-6);
    }

    #[test]
    fn test_block_disabled_without_target() {
        let params = Parameters {
            target_stable_pcv_ratio: None,
            target_stable_backing_ratio: None,
            ..Parameters::default()
        };
        assert!(block(&params).unwrap().is_none());
        assert!(block(&Parameters::default()).unwrap().is_some());
    }
}
