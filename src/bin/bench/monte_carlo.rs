// Monte Carlo Infrastructure: N runs per scenario with statistical aggregation
// Runs share one realization of the scenario's processes and differ only by
// their per-run random stream; runs execute in parallel.

use pcv_engine::*;
use rayon::prelude::*;

use crate::report::*;
use crate::scenarios::Scenario;
use crate::time_series::TimeSeriesRecorder;

use std::path::Path;
use std::time::Instant;

/// Scenario parameters on top of `base`, with the base seed applied.
pub fn scenario_params(scenario: &Scenario, base: &Parameters, seed: u64) -> Parameters {
    let mut params = base.clone();
    params.seed = seed;
    (scenario.configure)(&mut params);
    params
}

/// Realize every run's processes, then pin the volatile price to the
/// scenario curve if it has one.
pub fn scenario_processes(scenario: &Scenario, params: &Parameters, runs: usize, timesteps: usize) -> ProcessSet {
    let mut processes = ProcessSet::realize(params, runs, timesteps);
    if let Some(curve) = scenario.volatile_price_curve {
        processes.volatile_asset_price = Process::from_fn(move |_, t| curve(t));
    }
    processes
}

/// Run a single scenario iteration.
pub fn run_single(
    scenario: &Scenario,
    params: &Parameters,
    processes: &ProcessSet,
    run: usize,
    timesteps: usize,
    time_series_dir: Option<&Path>,
) -> BenchResult {
    let start = Instant::now();
    let mut result = BenchResult {
        scenario: scenario.label.to_string(),
        name: scenario.name.to_string(),
        category: scenario.category.to_string(),
        run,
        timesteps,
        ..BenchResult::default()
    };

    let history = Simulation::build(params.clone(), processes.clone(), run, 0).and_then(|sim| {
        let mut sim = sim.with_drop_substeps(true);
        sim.run(timesteps)?;
        Ok(sim.into_history())
    });
    let history = match history {
        Ok(history) => history,
        Err(e) => {
            result.error = Some(e.to_string());
            result.elapsed_ms = start.elapsed().as_millis();
            return result;
        }
    };

    let mut time_series = time_series_dir.map(|_| TimeSeriesRecorder::new());
    let mut min_cr = f64::INFINITY;
    for state in history.finals() {
        let s = &state.scalars;
        min_cr = min_cr.min(s.collateralization_ratio);
        if state.timestep > 0 {
            result.total_pcv_yield += s.pcv_yield;
            result.total_psm_fees += s.psm_mint_redeem_fees;
        }

        let conservation = s.total_fei_supply - s.total_protocol_owned_fei - s.total_user_circulating_fei;
        let normalized = if s.total_fei_supply > 0.0 { conservation.abs() / s.total_fei_supply } else { 0.0 };
        result.max_conservation_error = result.max_conservation_error.max(normalized);

        let weights = &state.capital_allocation_target_weights;
        if !weights.is_empty() {
            let error = (weights.iter().sum::<f64>() - 1.0).abs();
            result.max_weight_error = result.max_weight_error.max(error);
        }

        if let Some(ts) = time_series.as_mut() {
            ts.record(state);
        }
    }

    if let (Some(ts), Some(dir)) = (&time_series, time_series_dir) {
        let path = dir.join(format!("run-{}.jsonl", run));
        if let Err(e) = ts.write_jsonl(&path) {
            eprintln!("  Warning: failed to write time series: {}", e);
        }
    }

    let elapsed = start.elapsed();
    result.elapsed_ms = elapsed.as_millis();
    result.steps_per_sec = timesteps as f64 / elapsed.as_secs_f64().max(0.001);

    if let Some(last) = history.latest() {
        let s = &last.scalars;
        result.final_collateralization_ratio = s.collateralization_ratio;
        result.final_stable_backing_ratio = s.stable_backing_ratio;
        result.final_stable_pcv_ratio = s.stable_pcv_ratio;
        result.final_protocol_equity = s.protocol_equity;
        result.final_total_pcv = s.total_pcv;
        result.final_fei_supply = s.total_fei_supply;
        result.cumulative_psm_redemptions = s.cumulative_psm_redemptions;
    }
    result.min_collateralization_ratio = if min_cr.is_finite() { min_cr } else { 0.0 };

    let criteria = &scenario.criteria;
    let mut pass = result.max_conservation_error <= criteria.max_conservation_error
        && result.max_weight_error <= criteria.max_weight_error;
    if let Some(min) = criteria.min_collateralization_ratio {
        if result.min_collateralization_ratio < min {
            pass = false;
        }
    }
    if let Some(min) = criteria.min_protocol_equity {
        if result.final_protocol_equity < min {
            pass = false;
        }
    }
    result.pass = pass;
    result
}

/// Run Monte Carlo: N runs of a scenario, aggregate stats.
pub fn run_monte_carlo(
    scenario: &Scenario,
    base: &Parameters,
    n_runs: usize,
    base_seed: u64,
    timesteps_override: Option<usize>,
    time_series_base: Option<&Path>,
) -> MonteCarloReport {
    let ts_dir = time_series_base.map(|base| base.join(scenario.name.to_lowercase()));
    let timesteps = timesteps_override.unwrap_or(scenario.timesteps);
    let params = scenario_params(scenario, base, base_seed);
    let processes = scenario_processes(scenario, &params, n_runs, timesteps);

    let results: Vec<BenchResult> = (0..n_runs)
        .into_par_iter()
        .map(|run| run_single(scenario, &params, &processes, run, timesteps, ts_dir.as_deref()))
        .collect();

    aggregate(scenario, results)
}

/// Aggregate individual runs into a MonteCarloReport.
fn aggregate(scenario: &Scenario, results: Vec<BenchResult>) -> MonteCarloReport {
    let n = results.len();
    let passed = results.iter().filter(|r| r.pass).count();
    let pass_rate = if n > 0 { passed as f64 / n as f64 } else { 0.0 };
    let ok: Vec<&BenchResult> = results.iter().filter(|r| r.error.is_none()).collect();
    let stats = |f: fn(&BenchResult) -> f64| Stats::from_samples(&ok.iter().map(|r| f(r)).collect::<Vec<_>>());

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        pass_rate,
        failed_runs: n - ok.len(),
        collateralization_ratio: stats(|r| r.final_collateralization_ratio),
        min_collateralization_ratio: stats(|r| r.min_collateralization_ratio),
        stable_backing_ratio: stats(|r| r.final_stable_backing_ratio),
        protocol_equity: stats(|r| r.final_protocol_equity),
        total_pcv: stats(|r| r.final_total_pcv),
        pcv_yield: stats(|r| r.total_pcv_yield),
        psm_fees: stats(|r| r.total_psm_fees),
        psm_redemptions: stats(|r| r.cumulative_psm_redemptions),
        conservation_error: stats(|r| r.max_conservation_error),
        elapsed_ms: stats(|r| r.elapsed_ms as f64),
        individual_runs: results,
    }
}
