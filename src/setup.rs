// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Initial State
//
// Builds the timestep-zero snapshot: prices sampled at t=0, configured
// deposits, a pool seeded at the configured TVL, money market rates at the
// undiscounted utilization draw, and fully accounted totals and metrics.

use ndarray::Array2;

use crate::accounting::{fei_totals, pcv_totals};
use crate::capital_allocation::current_weights;
use crate::deposit::Deposit;
use crate::errors::SimResult;
use crate::metrics::system_metrics;
use crate::money_market::{interest_rates, RateCurve};
use crate::params::Parameters;
use crate::prices::sample_price;
use crate::processes::ProcessSet;
use crate::state::State;
use crate::types::*;

pub fn initial_state(params: &Parameters, processes: &ProcessSet, run: usize, subset: usize) -> SimResult<State> {
    params.validate()?;
    let mut state = State::new(run, subset);
    let s = &mut state.scalars;

    s.fei_price = sample_price(&processes.fei_price, "fei", run, 0.0)?;
    s.stable_asset_price = sample_price(&processes.stable_asset_price, "stable", run, 0.0)?;
    s.volatile_asset_price = sample_price(&processes.volatile_asset_price, "volatile", run, 0.0)?;
    s.fei_savings_rate = processes.fei_savings_rate.sample(run, 0.0).max(0.0);

    for config in params.pcv_deposits.iter().chain(&params.user_deposits) {
        let deposit = Deposit::new(config.key, config.balance, state.price(config.key.asset))?;
        state.deposits.insert(config.key, deposit);
    }

    set_yield_rate(&mut state, STABLE_YIELD_BEARING_PCV, params.stable_asset_yield_rate)?;
    set_yield_rate(&mut state, VOLATILE_YIELD_BEARING_PCV, params.volatile_asset_yield_rate)?;
    let savings_rate = state.scalars.fei_savings_rate;
    set_yield_rate(&mut state, FEI_SAVINGS_USER, savings_rate)?;

    seed_liquidity_pool(&mut state, params)?;
    seed_money_market(&mut state, params, processes, run)?;

    if params.capital_allocation_mode != CapitalAllocationMode::Disabled {
        let balances: Vec<f64> =
            params.capital_allocation_deposits.iter().map(|k| state.balance_or_zero(*k)).collect();
        let n = balances.len();
        state.capital_allocation_target_weights = current_weights(&balances);
        state.capital_allocation_rebalance_matrix = Array2::zeros((n, n));
        state.capital_allocation_rebalance_remainder = vec![0.0; n];
    }

    fei_totals(&state).write(&mut state.scalars);
    pcv_totals(&state).write(&mut state.scalars);
    system_metrics(&state.scalars, params.dt).write(&mut state.scalars);
    Ok(state)
}

fn set_yield_rate(state: &mut State, key: DepositKey, rate: f64) -> SimResult<()> {
    if let Some(deposit) = state.deposits.get_mut(&key) {
        deposit.set_yield_rate(rate)?;
    }
    Ok(())
}

/// Half the TVL on each side, split between protocol and users by the
/// configured share. Liquidity tokens are minted 1:1 with FEI.
fn seed_liquidity_pool(state: &mut State, params: &Parameters) -> SimResult<()> {
    let fei_price = state.scalars.fei_price;
    let volatile_price = state.scalars.volatile_asset_price;
    let fei_total = params.liquidity_pool_tvl / 2.0 / fei_price;
    let volatile_total = params.liquidity_pool_tvl / 2.0 / volatile_price;
    let share = params.liquidity_pool_protocol_share;

    for (key, balance, price) in [
        (FEI_LIQUIDITY_POOL_PCV, fei_total * share, fei_price),
        (VOLATILE_LIQUIDITY_POOL_PCV, volatile_total * share, volatile_price),
        (FEI_LIQUIDITY_POOL_USER, fei_total * (1.0 - share), fei_price),
        (VOLATILE_LIQUIDITY_POOL_USER, volatile_total * (1.0 - share), volatile_price),
    ] {
        state.deposits.insert(key, Deposit::new(key, balance, price)?);
    }

    let s = &mut state.scalars;
    s.liquidity_pool_invariant = fei_total * volatile_total;
    s.liquidity_pool_liquidity_tokens = fei_total;
    s.liquidity_pool_tvl = fei_total * fei_price + volatile_total * volatile_price;
    Ok(())
}

fn seed_money_market(state: &mut State, params: &Parameters, processes: &ProcessSet, run: usize) -> SimResult<()> {
    let drawn = processes.money_market_utilization.sample(run, 0.0);
    let drawn = if drawn.is_finite() { drawn } else { 0.0 };
    let rates = interest_rates(&RateCurve::from_params(params), drawn, params.dt);

    let mut supplied = 0.0;
    for key in [FEI_MONEY_MARKET_PCV, FEI_MONEY_MARKET_USER] {
        if let Some(deposit) = state.deposits.get_mut(&key) {
            deposit.set_yield_rate(rates.effective_yield)?;
            supplied += deposit.balance();
        }
    }

    let s = &mut state.scalars;
    s.money_market_utilization = rates.utilization;
    s.money_market_borrowed = rates.utilization * supplied;
    s.money_market_borrow_rate = rates.borrow_rate;
    s.money_market_supply_rate = rates.supply_rate;
    s.volatile_asset_price_mean = s.volatile_asset_price;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initial(params: &Parameters) -> State {
        let processes = ProcessSet::realize(params, 1, 10);
        initial_state(params, &processes, 0, 0).unwrap()
    }

    #[test]
    fn test_pool_seeded_at_configured_tvl() {
        let params = Parameters::default();
        let state = initial(&params);
        let s = &state.scalars;
        assert!((s.liquidity_pool_tvl - 50e6).abs() < 1e-3);
        assert!((s.liquidity_pool_liquidity_tokens - 25e6).abs() < 1e-6);

        let fei_pcv = state.balance_or_zero(FEI_LIQUIDITY_POOL_PCV);
        let fei_user = state.balance_or_zero(FEI_LIQUIDITY_POOL_USER);
        assert!((fei_pcv / (fei_pcv + fei_user) - 0.8).abs() < 1e-12);

        let volatile = state.balance_or_zero(VOLATILE_LIQUIDITY_POOL_PCV)
            + state.balance_or_zero(VOLATILE_LIQUIDITY_POOL_USER);
        assert!(((fei_pcv + fei_user) * volatile - s.liquidity_pool_invariant).abs() < 1.0);
    }

    #[test]
    fn test_yield_rates_assigned() {
        let params = Parameters::default();
        let state = initial(&params);
        assert_eq!(state.deposit(STABLE_YIELD_BEARING_PCV).unwrap().yield_rate(), 0.10);
        assert_eq!(state.deposit(FEI_SAVINGS_USER).unwrap().yield_rate(), 0.03);
        assert!(state.deposit(FEI_MONEY_MARKET_PCV).unwrap().yield_rate() >= 0.0);
    }

    #[test]
    fn test_totals_accounted_at_start() {
        let params = Parameters::default();
        let state = initial(&params);
        let s = &state.scalars;
        assert!((s.total_fei_supply - s.total_protocol_owned_fei - s.total_user_circulating_fei).abs() < 1e-6);
        assert!(s.total_pcv > 0.0);
        assert!(s.collateralization_ratio > 0.0);
        assert_eq!(s.psm_mint_redeem_fees, 0.0);
    }

    #[test]
    fn test_allocation_starts_at_current_weights() {
        let params = Parameters::default();
        let state = initial(&params);
        let w = &state.capital_allocation_target_weights;
        assert_eq!(w.len(), 4);
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(state.capital_allocation_rebalance_matrix.dim(), (4, 4));

        let disabled = Parameters {
            capital_allocation_mode: CapitalAllocationMode::Disabled,
            ..Parameters::default()
        };
        assert!(initial(&disabled).capital_allocation_target_weights.is_empty());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = Parameters { dt: 0.0, ..Parameters::default() };
        let processes = ProcessSet::realize(&Parameters::default(), 1, 1);
        assert!(initial_state(&params, &processes, 0, 0).is_err());
    }
}
