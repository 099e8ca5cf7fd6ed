// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - PCV Yield Accrual and Management

use std::collections::BTreeMap;

use log::debug;

use crate::deposit::Deposit;
use crate::errors::SimResult;
use crate::params::Parameters;
use crate::pipeline::{Block, Context, Policy, Signal, Updater};
use crate::state::{ScalarKey, State, StateKey};
use crate::types::{DepositKey, FEI_LIQUIDITY_POOL_PCV, FEI_LIQUIDITY_POOL_USER};

/// Fraction of the pool owned by the protocol, by FEI balance.
pub fn protocol_pool_share(state: &State) -> f64 {
    let pcv = state.balance_or_zero(FEI_LIQUIDITY_POOL_PCV);
    let total = pcv + state.balance_or_zero(FEI_LIQUIDITY_POOL_USER);
    if total > 0.0 { pcv / total } else { 0.0 }
}

fn periodic(period: Option<usize>, timestep: usize) -> bool {
    matches!(period, Some(p) if p > 0 && timestep % p == 0)
}

// ─── Accrual ────────────────────────────────────────────────────────────────

/// Accrue simple interest on every yield-bearing PCV deposit. The USD sum
/// plus the protocol's share of pool fees is reported as `pcv_yield`.
fn yield_accrual_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let prev = ctx.previous;
    let mut signal = Signal::new();
    let mut accrued_usd = 0.0;
    for key in ctx.params.yield_bearing_pcv_deposits() {
        let mut deposit = prev.deposit_cloned(key)?;
        let price = prev.price(deposit.asset());
        accrued_usd += deposit.accrue_yield(ctx.params.dt, price)? * price;
        signal.set_deposit(deposit);
    }
    let fees = prev.scalars.liquidity_pool_trading_fees * protocol_pool_share(prev);
    signal.set_scalar(ScalarKey::PcvYield, accrued_usd + fees);
    Ok(signal)
}

// ─── Withdrawal / Reinvestment ──────────────────────────────────────────────

/// Working copies of deposits touched by one policy invocation.
struct Ledger<'a> {
    state: &'a State,
    touched: BTreeMap<DepositKey, Deposit>,
}

impl<'a> Ledger<'a> {
    fn new(state: &'a State) -> Self {
        Self { state, touched: BTreeMap::new() }
    }

    fn take(&mut self, key: DepositKey) -> SimResult<Deposit> {
        match self.touched.remove(&key) {
            Some(d) => Ok(d),
            None => self.state.deposit_cloned(key),
        }
    }

    fn put(&mut self, deposit: Deposit) {
        self.touched.insert(deposit.key(), deposit);
    }

    fn into_signal(self) -> Signal {
        let mut signal = Signal::new();
        for deposit in self.touched.into_values() {
            signal.set_deposit(deposit);
        }
        signal
    }
}

/// Sweep accrued yield from each yield-bearing deposit into its idle sibling.
fn yield_withdrawal_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    if !periodic(ctx.params.yield_withdrawal_period, ctx.timestep()) {
        return Ok(Signal::new());
    }
    let mut ledger = Ledger::new(ctx.previous);
    for key in ctx.params.yield_bearing_pcv_deposits() {
        let mut source = ledger.take(key)?;
        let mut idle = ledger.take(key.idle_sibling())?;
        let price = ctx.previous.price(source.asset());
        let amount = source.yield_accrued();
        source.transfer_yield(&mut idle, amount, price)?;
        debug!("withdrew {amount:.2} accrued yield from {key} at timestep {}", ctx.timestep());
        ledger.put(source);
        ledger.put(idle);
    }
    Ok(ledger.into_signal())
}

/// Fold accrued yield back into each yield-bearing deposit's balance.
fn yield_reinvest_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    if !periodic(ctx.params.yield_reinvest_period, ctx.timestep()) {
        return Ok(Signal::new());
    }
    let mut signal = Signal::new();
    for key in ctx.params.yield_bearing_pcv_deposits() {
        let mut deposit = ctx.previous.deposit_cloned(key)?;
        deposit.compound(ctx.previous.price(deposit.asset()))?;
        signal.set_deposit(deposit);
    }
    Ok(signal)
}

// ─── Blocks ─────────────────────────────────────────────────────────────────

pub fn blocks(params: &Parameters) -> SimResult<Vec<Block>> {
    let yield_bearing = params.yield_bearing_pcv_deposits();

    let mut emits: Vec<StateKey> = yield_bearing.iter().map(|k| StateKey::from(*k)).collect();
    emits.push(ScalarKey::PcvYield.into());
    let updaters = emits.iter().map(|k| Updater::from_signal(*k)).collect();
    let mut blocks = vec![Block::new(
        "PCV yield accrual",
        vec![Policy::new("yield_accrual", emits, yield_accrual_policy)],
        updaters,
    )?];

    let management = if params.yield_withdrawal_period.is_some() {
        let mut emits: Vec<StateKey> = Vec::new();
        for key in &yield_bearing {
            for k in [*key, key.idle_sibling()] {
                if !emits.contains(&StateKey::from(k)) {
                    emits.push(k.into());
                }
            }
        }
        Some(Policy::new("yield_withdrawal", emits, yield_withdrawal_policy))
    } else if params.yield_reinvest_period.is_some() {
        let emits = yield_bearing.iter().map(|k| StateKey::from(*k)).collect();
        Some(Policy::new("yield_reinvest", emits, yield_reinvest_policy))
    } else {
        None
    };

    if let Some(policy) = management {
        let updaters = policy.emits.iter().map(|k| Updater::optional(*k)).collect();
        blocks.push(Block::new("PCV yield management", vec![policy], updaters)?);
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processes::ProcessSet;
    use crate::state::StateHistory;
    use crate::types::*;

    fn fixture(params: &Parameters) -> State {
        let mut state = State::new(0, 0);
        state.timestep = 30;
        state.scalars.fei_price = 1.0;
        state.scalars.stable_asset_price = 1.0;
        state.scalars.volatile_asset_price = 2000.0;
        for cfg in &params.pcv_deposits {
            let price = state.price(cfg.key.asset);
            let mut d = Deposit::new(cfg.key, cfg.balance, price).unwrap();
            if cfg.key.location == Location::YieldBearing {
                d.set_yield_rate(0.1).unwrap();
            }
            state.deposits.insert(cfg.key, d);
        }
        state
    }

    fn run_blocks(params: &Parameters, state: &State) -> State {
        let processes = ProcessSet::realize(params, 1, 1);
        let history = StateHistory::new(state.clone());
        let mut working = state.clone();
        for (i, block) in blocks(params).unwrap().iter().enumerate() {
            let ctx = Context {
                params,
                processes: &processes,
                substep: i + 1,
                history: &history,
                previous: &working,
            };
            working = block.execute(&ctx).unwrap();
        }
        working
    }

    #[test]
    fn test_accrual_reports_usd_yield() {
        let params = Parameters::default();
        let state = fixture(&params);
        let next = run_blocks(&params, &state);

        // 70M stable and 51,250 volatile at 10% APR for one day.
        let expected = (70e6 * 0.1 + 51_250.0 * 0.1 * 2000.0) / 365.0;
        assert!((next.scalars.pcv_yield - expected).abs() < 1e-6);
        let stable = next.deposit(STABLE_YIELD_BEARING_PCV).unwrap();
        assert!((stable.yield_accrued() - 70e6 * 0.1 / 365.0).abs() < 1e-6);
        assert_eq!(stable.balance(), 70e6);
    }

    #[test]
    fn test_withdrawal_moves_yield_to_idle_on_period() {
        let params = Parameters { yield_withdrawal_period: Some(30), ..Parameters::default() };
        let state = fixture(&params);
        let next = run_blocks(&params, &state);

        let yb = next.deposit(STABLE_YIELD_BEARING_PCV).unwrap();
        let idle = next.deposit(STABLE_IDLE_PCV).unwrap();
        assert!(yb.yield_accrued().abs() < 1e-9);
        assert!((idle.balance() - (70e6 + 70e6 * 0.1 / 365.0)).abs() < 1e-6);
    }

    #[test]
    fn test_withdrawal_waits_for_period() {
        let params = Parameters { yield_withdrawal_period: Some(7), ..Parameters::default() };
        let state = fixture(&params);
        let next = run_blocks(&params, &state);
        assert!(next.deposit(STABLE_YIELD_BEARING_PCV).unwrap().yield_accrued() > 0.0);
    }

    #[test]
    fn test_reinvest_compounds_in_place() {
        let params = Parameters { yield_reinvest_period: Some(10), ..Parameters::default() };
        let state = fixture(&params);
        let next = run_blocks(&params, &state);

        let yb = next.deposit(STABLE_YIELD_BEARING_PCV).unwrap();
        assert_eq!(yb.yield_accrued(), 0.0);
        assert!((yb.balance() - (70e6 + 70e6 * 0.1 / 365.0)).abs() < 1e-6);
        assert_eq!(next.deposit(STABLE_IDLE_PCV).unwrap().balance(), 70e6);
    }
}
