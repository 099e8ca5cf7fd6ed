// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Capital Allocation Model
//
// Drives user-circulating FEI toward target weights across the tracked
// deposits. Targets are either a stochastic perturbation of the current
// allocation or a yield-over-risk ranking; the move for the period is
// realized as pairwise transfers solved from the complete-graph incidence
// system in `linalg`.

use std::iter;

use log::warn;
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Dirichlet, Distribution};

use crate::deposit::Deposit;
use crate::errors::{SimError, SimResult};
use crate::linalg::{solve_rebalance, upper_triangular};
use crate::liquidity_pool::{add_liquidity, remove_liquidity};
use crate::params::Parameters;
use crate::pipeline::{Block, Context, Policy, Signal, Updater};
use crate::state::{ScalarKey, State, StateKey, StateUpdate};
use crate::types::*;

pub const WEIGHT_TOLERANCE: f64 = 1e-6;
/// Remainder share of a deposit's balance that is worth a warning.
pub const REMAINDER_WARN_RATIO: f64 = 0.001;
const YIELD_FLOOR: f64 = 1e-18;
const DIRICHLET_SALT: u64 = 0xCA11_0CA7;

// ─── Weights ────────────────────────────────────────────────────────────────

/// Share of the tracked total held by each deposit. An empty allocation is
/// treated as uniform.
pub fn current_weights(balances: &[f64]) -> Vec<f64> {
    let total: f64 = balances.iter().sum();
    if total > 0.0 {
        balances.iter().map(|b| b / total).collect()
    } else {
        vec![1.0 / balances.len() as f64; balances.len()]
    }
}

pub fn normalize(weights: &[f64]) -> SimResult<Vec<f64>> {
    let sum: f64 = weights.iter().sum();
    if !(sum > 0.0) || !sum.is_finite() {
        return Err(SimError::Invariant(format!("capital allocation weights sum to {sum}")));
    }
    Ok(weights.iter().map(|w| w / sum).collect())
}

fn check_normalized(weights: &[f64]) -> SimResult<()> {
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(SimError::Invariant(format!("target weights sum to {sum}")));
    }
    Ok(())
}

/// Fraction of the full gap closed each timestep.
pub fn rebalance_rate(dt: f64, duration: f64) -> f64 {
    (dt / duration).sqrt().min(1.0)
}

/// Current weights nudged by a Dirichlet draw scaled by the rebalance rate.
pub fn exogenous_weights(current: &[f64], sample: &[f64], rate: f64) -> SimResult<Vec<f64>> {
    let perturbed: Vec<f64> = current.iter().zip(sample).map(|(c, s)| rate * s + c).collect();
    normalize(&perturbed)
}

/// Per-deposit yield statistics over the trailing window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YieldProfile {
    pub mean_yield: f64,
    pub yield_std: f64,
    pub volatile_risk: f64,
}

impl YieldProfile {
    /// The mean is floored at `YIELD_FLOOR` on purpose: an all-zero window
    /// still gets a tiny positive yield, so `endogenous_weights` splits
    /// evenly across idle deposits instead of failing. Its zero-sum check
    /// only fires for an empty profile list.
    pub fn from_series(series: &[f64], volatile_risk: f64) -> Self {
        let n = series.len().max(1) as f64;
        let mean = series.iter().sum::<f64>() / n;
        let variance = series.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n;
        Self { mean_yield: mean.max(YIELD_FLOOR), yield_std: variance.sqrt(), volatile_risk }
    }

    pub fn risk(&self) -> f64 {
        1.0 + self.volatile_risk + self.yield_std / self.mean_yield
    }
}

/// Yield-over-risk weights.
pub fn endogenous_weights(profiles: &[YieldProfile]) -> SimResult<Vec<f64>> {
    let yield_sum: f64 = profiles.iter().map(|p| p.mean_yield).sum();
    let risk_sum: f64 = profiles.iter().map(YieldProfile::risk).sum();
    if !(yield_sum > 0.0) {
        return Err(SimError::Invariant(format!("capital allocation yield sum is {yield_sum}")));
    }
    if !(risk_sum > 0.0) {
        return Err(SimError::Invariant(format!("capital allocation risk sum is {risk_sum}")));
    }
    let raw: Vec<f64> = profiles.iter().map(|p| p.mean_yield / p.risk()).collect();
    normalize(&raw)
}

fn tracked_balances(state: &State, tracked: &[DepositKey]) -> Vec<f64> {
    tracked.iter().map(|k| state.balance_or_zero(*k)).collect()
}

fn exogenous_weights_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let params = ctx.params;
    let current = current_weights(&tracked_balances(ctx.previous, &params.capital_allocation_deposits));

    let dirichlet = Dirichlet::new(&params.capital_allocation_concentration)
        .map_err(|e| SimError::InvalidConfig(format!("capital allocation concentration: {e}")))?;
    let mut rng = ChaCha8Rng::seed_from_u64(params.seed ^ DIRICHLET_SALT ^ ((ctx.timestep() as u64) << 24));
    rng.set_stream(ctx.run() as u64);
    let sample = dirichlet.sample(&mut rng);

    let rate = rebalance_rate(params.dt, params.capital_allocation_rebalance_duration);
    let weights = exogenous_weights(&current, &sample, rate)?;
    check_normalized(&weights)?;

    let mut signal = Signal::new();
    signal.insert(StateUpdate::TargetWeights(weights));
    Ok(signal)
}

fn endogenous_weights_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let params = ctx.params;
    let window = params.capital_allocation_yield_window;
    let snapshots: Vec<&State> = ctx
        .history
        .trailing(window.saturating_sub(1))
        .chain(iter::once(ctx.previous))
        .collect();

    let volatile_risk = ctx.previous.scalars.volatile_asset_risk_metric;
    let profiles: Vec<YieldProfile> = params
        .capital_allocation_deposits
        .iter()
        .map(|key| {
            let series: Vec<f64> = snapshots
                .iter()
                .map(|s| s.deposits.get(key).map_or(0.0, Deposit::yield_rate))
                .collect();
            let risk = if key.location.is_volatile_exposed() { volatile_risk } else { 0.0 };
            YieldProfile::from_series(&series, risk)
        })
        .collect();

    let weights = endogenous_weights(&profiles)?;
    check_normalized(&weights)?;

    let mut signal = Signal::new();
    signal.insert(StateUpdate::TargetWeights(weights));
    Ok(signal)
}

// ─── Rebalancing ────────────────────────────────────────────────────────────

/// Pairwise transfers and their residual against the requested move.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRebalance {
    pub deposits: Vec<Deposit>,
    pub matrix: Array2<f64>,
    pub remainder: Vec<f64>,
}

fn pair_mut(deposits: &mut [Deposit], a: usize, b: usize) -> (&mut Deposit, &mut Deposit) {
    if a < b {
        let (left, right) = deposits.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = deposits.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

/// Move `deposits` a `rate` fraction of the way toward `targets`.
///
/// Matrix entry (i, j) > 0 moves from j to i, < 0 from i to j; every
/// transfer is capped at the source balance.
pub fn rebalance_allocation(
    mut deposits: Vec<Deposit>,
    targets: &[f64],
    rate: f64,
    price: f64,
) -> SimResult<AllocationRebalance> {
    let n = deposits.len();
    if targets.len() != n {
        return Err(SimError::Invariant(format!(
            "{} target weights for {n} tracked deposits",
            targets.len()
        )));
    }
    let before: Vec<f64> = deposits.iter().map(Deposit::balance).collect();
    let total: f64 = before.iter().sum();
    let current = current_weights(&before);
    let delta: Vec<f64> = targets.iter().zip(&current).map(|(t, c)| rate * (t - c) * total).collect();

    let x = solve_rebalance(&delta)?;
    let matrix = upper_triangular(n, &x);

    for i in 0..n {
        for j in (i + 1)..n {
            let value = matrix[[i, j]];
            if value == 0.0 {
                continue;
            }
            let (from, to) = if value > 0.0 { (j, i) } else { (i, j) };
            let (source, sink) = pair_mut(&mut deposits, from, to);
            let amount = value.abs().min(source.balance());
            if amount > 0.0 {
                source.transfer(sink, amount, price, None)?;
            }
        }
    }

    let after_total: f64 = deposits.iter().map(Deposit::balance).sum();
    if (after_total - total).abs() > 1e-9 * total.max(1.0) {
        return Err(SimError::Invariant(format!(
            "capital allocation changed tracked total from {total} to {after_total}"
        )));
    }

    let remainder: Vec<f64> = deposits
        .iter()
        .zip(before.iter().zip(&delta))
        .map(|(d, (b, dl))| {
            let r = (b + dl) - d.balance();
            if r.abs() <= 1e-9 * b.abs().max(1.0) { 0.0 } else { r }
        })
        .collect();

    Ok(AllocationRebalance { deposits, matrix, remainder })
}

fn remainder_share(remainder: f64, before: f64) -> f64 {
    remainder.abs() / (before + 1e-9)
}

/// Indices whose unrealized move is a noticeable share of the balance they
/// started the period with.
pub fn large_remainders(before: &[f64], remainder: &[f64]) -> Vec<usize> {
    before
        .iter()
        .zip(remainder)
        .enumerate()
        .filter(|(_, (b, r))| remainder_share(**r, **b) > REMAINDER_WARN_RATIO)
        .map(|(i, _)| i)
        .collect()
}

/// Keep the pool consistent after the user FEI position in it changed by
/// `fei_change`: the volatile side and liquidity tokens move pro rata.
fn mirror_pool_liquidity(prev: &State, fei_change: f64, signal: &mut Signal) -> SimResult<()> {
    let s = &prev.scalars;
    let fei_supply = prev.balance_or_zero(FEI_LIQUIDITY_POOL_PCV) + prev.balance_or_zero(FEI_LIQUIDITY_POOL_USER);
    let mut volatile_user = prev.deposit_cloned(VOLATILE_LIQUIDITY_POOL_USER)?;
    let volatile_user_before = volatile_user.balance();
    let volatile_reserve = prev.balance_or_zero(VOLATILE_LIQUIDITY_POOL_PCV) + volatile_user_before;
    let volatile_price = s.volatile_asset_price;

    let change = if fei_change >= 0.0 {
        let value = fei_change * s.fei_price / volatile_price;
        add_liquidity(volatile_reserve, fei_supply, s.liquidity_pool_liquidity_tokens, fei_change, value)
    } else {
        remove_liquidity(volatile_reserve, fei_supply, s.liquidity_pool_liquidity_tokens, -fei_change)?
    };

    if change.volatile >= 0.0 {
        volatile_user.deposit(change.volatile, volatile_price)?;
    } else {
        volatile_user.withdraw(-change.volatile, volatile_price)?;
    }

    let fei_balance = fei_supply + fei_change;
    let volatile_balance = volatile_reserve - volatile_user_before + volatile_user.balance();
    signal.set_scalar(ScalarKey::LiquidityPoolInvariant, fei_balance * volatile_balance);
    signal.set_scalar(ScalarKey::LiquidityPoolLiquidityTokens, s.liquidity_pool_liquidity_tokens + change.tokens);
    signal.set_scalar(
        ScalarKey::LiquidityPoolTvl,
        fei_balance * s.fei_price + volatile_balance * volatile_price,
    );
    signal.set_deposit(volatile_user);
    Ok(())
}

fn rebalancing_policy(ctx: &Context<'_>) -> SimResult<Signal> {
    let params = ctx.params;
    let prev = ctx.previous;
    let tracked = &params.capital_allocation_deposits;

    let deposits = tracked.iter().map(|k| prev.deposit_cloned(*k)).collect::<SimResult<Vec<_>>>()?;
    let lp_before = prev.balance_or_zero(FEI_LIQUIDITY_POOL_USER);
    let rate = rebalance_rate(params.dt, params.capital_allocation_rebalance_duration);

    let result = rebalance_allocation(deposits, &prev.capital_allocation_target_weights, rate, prev.scalars.fei_price)?;

    let before: Vec<f64> = tracked.iter().map(|k| prev.balance_or_zero(*k)).collect();
    for i in large_remainders(&before, &result.remainder) {
        warn!(
            "capital allocation remainder {:.4} on {} ({:.4}% of balance, now {:.4}) at timestep {}",
            result.remainder[i],
            tracked[i],
            100.0 * remainder_share(result.remainder[i], before[i]),
            result.deposits[i].balance(),
            ctx.timestep()
        );
    }

    let mut signal = Signal::new();
    if tracked.contains(&FEI_LIQUIDITY_POOL_USER) {
        let lp_after = result
            .deposits
            .iter()
            .find(|d| d.key() == FEI_LIQUIDITY_POOL_USER)
            .map_or(lp_before, Deposit::balance);
        mirror_pool_liquidity(prev, lp_after - lp_before, &mut signal)?;
    }
    for deposit in result.deposits {
        signal.set_deposit(deposit);
    }
    signal.insert(StateUpdate::RebalanceMatrix(result.matrix));
    signal.insert(StateUpdate::RebalanceRemainder(result.remainder));
    Ok(signal)
}

// ─── Blocks ─────────────────────────────────────────────────────────────────

pub fn blocks(params: &Parameters) -> SimResult<Vec<Block>> {
    let weights_policy = match params.capital_allocation_mode {
        CapitalAllocationMode::Disabled => return Ok(Vec::new()),
        CapitalAllocationMode::Exogenous => exogenous_weights_policy,
        CapitalAllocationMode::Endogenous => endogenous_weights_policy,
    };
    let weights = Block::new(
        "Capital allocation weights",
        vec![Policy::new("target_weights", vec![StateKey::TargetWeights], weights_policy)],
        vec![Updater::from_signal(StateKey::TargetWeights)],
    )?;

    let mut emits: Vec<StateKey> = params
        .capital_allocation_deposits
        .iter()
        .map(|k| StateKey::from(*k))
        .collect();
    emits.push(StateKey::RebalanceMatrix);
    emits.push(StateKey::RebalanceRemainder);
    if params.capital_allocation_deposits.contains(&FEI_LIQUIDITY_POOL_USER) {
        emits.push(VOLATILE_LIQUIDITY_POOL_USER.into());
        emits.push(ScalarKey::LiquidityPoolInvariant.into());
        emits.push(ScalarKey::LiquidityPoolLiquidityTokens.into());
        emits.push(ScalarKey::LiquidityPoolTvl.into());
    }
    let updaters = emits.iter().map(|k| Updater::from_signal(*k)).collect();
    let rebalancing = Block::new(
        "Capital allocation rebalancing",
        vec![Policy::new("allocation_rebalancing", emits, rebalancing_policy)],
        updaters,
    )?;

    Ok(vec![weights, rebalancing])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fei_users(balances: &[f64]) -> Vec<Deposit> {
        let keys = [FEI_IDLE_USER, FEI_SAVINGS_USER, FEI_LIQUIDITY_POOL_USER, FEI_MONEY_MARKET_USER];
        keys.iter()
            .zip(balances)
            .map(|(k, b)| Deposit::new(*k, *b, 1.0).unwrap())
            .collect()
    }

    #[test]
    fn test_four_way_rebalance_hits_equal_weights() {
        let deposits = fei_users(&[400.0, 300.0, 200.0, 100.0]);
        let result = rebalance_allocation(deposits, &[0.25; 4], 1.0, 1.0).unwrap();

        for d in &result.deposits {
            assert!((d.balance() - 250.0).abs() < 1e-6, "{} ended at {}", d.key(), d.balance());
        }
        assert!(result.remainder.iter().all(|r| *r == 0.0));

        // Row sums minus column sums of the upper-triangular matrix reproduce delta.
        let m = &result.matrix;
        let delta = [-150.0, -50.0, 50.0, 150.0];
        for i in 0..4 {
            let net = m.row(i).sum() - m.column(i).sum();
            assert!((net - delta[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn test_partial_rate_moves_strictly_closer() {
        let deposits = fei_users(&[400.0, 300.0, 200.0, 100.0]);
        let rate = rebalance_rate(1.0, 7.0);
        let result = rebalance_allocation(deposits, &[0.25; 4], rate, 1.0).unwrap();
        for (d, before) in result.deposits.iter().zip([400.0, 300.0, 200.0, 100.0]) {
            assert!((d.balance() - 250.0).abs() < (before - 250.0_f64).abs());
        }
        let total: f64 = result.deposits.iter().map(Deposit::balance).sum();
        assert!((total - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_delta_is_idempotent() {
        let deposits = fei_users(&[250.0, 250.0, 250.0, 250.0]);
        let result = rebalance_allocation(deposits.clone(), &[0.25; 4], 1.0, 1.0).unwrap();
        assert!(result.matrix.iter().all(|v| v.abs() < 1e-9));
        for (a, b) in result.deposits.iter().zip(&deposits) {
            assert!((a.balance() - b.balance()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_two_deposit_rebalance() {
        let deposits = fei_users(&[80.0, 20.0]);
        let result = rebalance_allocation(deposits, &[0.5, 0.5], 1.0, 1.0).unwrap();
        assert!((result.deposits[0].balance() - 50.0).abs() < 1e-6);
        assert!((result.deposits[1].balance() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_targets_rejected() {
        let deposits = fei_users(&[80.0, 20.0]);
        assert!(matches!(
            rebalance_allocation(deposits, &[1.0], 1.0, 1.0),
            Err(SimError::Invariant(_))
        ));
    }

    #[test]
    fn test_exogenous_weights_normalized() {
        let weights = exogenous_weights(&[0.4, 0.3, 0.2, 0.1], &[0.1, 0.2, 0.3, 0.4], 0.378).unwrap();
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < WEIGHT_TOLERANCE);
        assert!(weights[3] > 0.1, "draw pulls the smallest weight up");
    }

    #[test]
    fn test_endogenous_prefers_yield_and_penalizes_risk() {
        let steady = YieldProfile::from_series(&[0.05, 0.05, 0.05], 0.0);
        let risky = YieldProfile::from_series(&[0.05, 0.05, 0.05], 1.0);
        let idle = YieldProfile::from_series(&[0.0, 0.0, 0.0], 0.0);
        let weights = endogenous_weights(&[steady, risky, idle]).unwrap();

        assert!((weights.iter().sum::<f64>() - 1.0).abs() < WEIGHT_TOLERANCE);
        assert!((weights[0] - 2.0 * weights[1]).abs() < 1e-9, "risk 2 halves the weight");
        assert!(weights[2] < 1e-12);
    }

    #[test]
    fn test_yield_dispersion_adds_risk() {
        let noisy = YieldProfile::from_series(&[0.0, 0.1], 0.0);
        assert!((noisy.mean_yield - 0.05).abs() < 1e-15);
        assert!((noisy.risk() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_sources_leave_flagged_remainders() {
        // Pairwise routing asks deposit 0 to pay deposit 1 before deposit 0
        // has received anything, so part of the move cannot be realized.
        let keys = [FEI_IDLE_USER, FEI_SAVINGS_USER, FEI_MONEY_MARKET_USER];
        let deposits: Vec<Deposit> =
            keys.iter().zip([0.0, 0.0, 900.0]).map(|(k, b)| Deposit::new(*k, b, 1.0).unwrap()).collect();
        let third = 1.0 / 3.0;
        let result = rebalance_allocation(deposits, &[third; 3], 1.0, 1.0).unwrap();

        let balances: Vec<f64> = result.deposits.iter().map(Deposit::balance).collect();
        assert!((balances[0] - 900.0).abs() < 1e-6);
        assert!(balances[1].abs() < 1e-6 && balances[2].abs() < 1e-6);
        for (got, want) in result.remainder.iter().zip([-600.0, 300.0, 300.0]) {
            assert!((got - want).abs() < 1e-6, "remainder {got}, expected {want}");
        }
        assert_eq!(large_remainders(&[0.0, 0.0, 900.0], &result.remainder), vec![0, 1, 2]);
    }

    #[test]
    fn test_small_remainders_not_flagged() {
        assert!(large_remainders(&[1000.0, 1000.0], &[0.5, -0.5]).is_empty());
        assert_eq!(large_remainders(&[1000.0, 1000.0], &[0.5, -2.0]), vec![1]);
    }

    #[test]
    fn test_idle_window_splits_evenly() {
        let idle = YieldProfile::from_series(&[0.0, 0.0, 0.0], 0.0);
        let weights = endogenous_weights(&[idle, idle, idle]).unwrap();
        assert!(weights.iter().all(|w| (w - 1.0 / 3.0).abs() < 1e-12));
        assert!(endogenous_weights(&[]).is_err());
    }

    // ========== Pool Liquidity Mirror ==========

    /// 1000 FEI against 0.5 volatile at 1 and 2000, 1000 tokens outstanding.
    fn pool_state(volatile_user: f64) -> State {
        let mut state = State::new(0, 0);
        state.scalars.fei_price = 1.0;
        state.scalars.volatile_asset_price = 2000.0;
        state.scalars.liquidity_pool_liquidity_tokens = 1000.0;
        for (key, balance, price) in [
            (FEI_LIQUIDITY_POOL_PCV, 800.0, 1.0),
            (FEI_LIQUIDITY_POOL_USER, 200.0, 1.0),
            (VOLATILE_LIQUIDITY_POOL_PCV, 0.5 - volatile_user, 2000.0),
            (VOLATILE_LIQUIDITY_POOL_USER, volatile_user, 2000.0),
        ] {
            state.deposits.insert(key, Deposit::new(key, balance, price).unwrap());
        }
        state
    }

    fn mirrored_volatile_user(signal: &Signal) -> f64 {
        match signal.get(&StateKey::from(VOLATILE_LIQUIDITY_POOL_USER)) {
            Some(StateUpdate::Deposit(d)) => d.balance(),
            other => panic!("no volatile user deposit in signal: {other:?}"),
        }
    }

    #[test]
    fn test_mirror_inflow_adds_pro_rata() {
        let mut signal = Signal::new();
        mirror_pool_liquidity(&pool_state(0.1), 100.0, &mut signal).unwrap();

        // alpha = 100 / 1000
        assert!((mirrored_volatile_user(&signal) - (0.1 + 0.1 * 0.5)).abs() < 1e-12);
        let tokens = signal.scalar(ScalarKey::LiquidityPoolLiquidityTokens).unwrap();
        assert!((tokens - (1000.0 + 0.1 * 1000.0)).abs() < 1e-9);
        let k = signal.scalar(ScalarKey::LiquidityPoolInvariant).unwrap();
        assert!((k - 1100.0 * 0.55).abs() < 1e-9);
        let tvl = signal.scalar(ScalarKey::LiquidityPoolTvl).unwrap();
        assert!((tvl - (1100.0 + 0.55 * 2000.0)).abs() < 1e-9);
    }

    #[test]
    fn test_mirror_outflow_removes_pro_rata() {
        let mut signal = Signal::new();
        mirror_pool_liquidity(&pool_state(0.1), -100.0, &mut signal).unwrap();

        assert!((mirrored_volatile_user(&signal) - (0.1 - 0.1 * 0.5)).abs() < 1e-12);
        let tokens = signal.scalar(ScalarKey::LiquidityPoolLiquidityTokens).unwrap();
        assert!((tokens - (1000.0 - 0.1 * 1000.0)).abs() < 1e-9);
        let k = signal.scalar(ScalarKey::LiquidityPoolInvariant).unwrap();
        assert!((k - 900.0 * 0.45).abs() < 1e-9);
        let tvl = signal.scalar(ScalarKey::LiquidityPoolTvl).unwrap();
        assert!((tvl - (900.0 + 0.45 * 2000.0)).abs() < 1e-9);
    }

    #[test]
    fn test_mirror_outflow_beyond_user_volatile_is_error() {
        // Removing 10% of the pool needs 0.05 volatile but the user side holds 0.01.
        let mut signal = Signal::new();
        let err = mirror_pool_liquidity(&pool_state(0.01), -100.0, &mut signal).unwrap_err();
        assert!(matches!(err, SimError::InsufficientBalance { .. }));

        let err = mirror_pool_liquidity(&pool_state(0.1), -1500.0, &mut Signal::new()).unwrap_err();
        assert_eq!(err, SimError::InsufficientBalance { requested: 1500.0, available: 1000.0 });
    }

    #[test]
    fn test_rebalance_rate_capped() {
        assert!((rebalance_rate(7.0, 28.0) - 0.5).abs() < 1e-15);
        assert_eq!(rebalance_rate(30.0, 7.0), 1.0);
    }
}
