// Benchmark Report Types
// Structured output for independent analysis of balance sheet scenarios

use serde::Serialize;

// ─── Statistics (per-metric Monte Carlo aggregation) ────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    /// Lower tail, the solvency-relevant side for ratios and equity.
    pub p05: f64,
    pub p50: f64,
    pub p95: f64,
    pub n: usize,
}

/// Nearest-rank percentile of an ascending sample.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

impl Stats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
                ci_lower: 0.0,
                ci_upper: 0.0,
                min: 0.0,
                max: 0.0,
                p05: 0.0,
                p50: 0.0,
                p95: 0.0,
                n: 0,
            };
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let std_dev = variance.sqrt();
        let stderr = std_dev / (n as f64).sqrt();
        let z = 1.96; // 95% CI
        Self {
            mean,
            std_dev,
            ci_lower: mean - z * stderr,
            ci_upper: mean + z * stderr,
            min: sorted[0],
            max: sorted[n - 1],
            p05: percentile(&sorted, 0.05),
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            n,
        }
    }
}

// ─── Single-Run Result ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct BenchResult {
    pub scenario: String,
    pub name: String,
    pub category: String,
    pub run: usize,
    pub pass: bool,
    pub error: Option<String>,
    pub timesteps: usize,
    pub elapsed_ms: u128,
    pub steps_per_sec: f64,
    pub final_collateralization_ratio: f64,
    pub min_collateralization_ratio: f64,
    pub final_stable_backing_ratio: f64,
    pub final_stable_pcv_ratio: f64,
    pub final_protocol_equity: f64,
    pub final_total_pcv: f64,
    pub final_fei_supply: f64,
    pub total_pcv_yield: f64,
    pub total_psm_fees: f64,
    pub cumulative_psm_redemptions: f64,
    pub max_conservation_error: f64,
    pub max_weight_error: f64,
}

// ─── Monte Carlo Report (per-scenario aggregation) ──────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloReport {
    pub scenario_name: String,
    pub label: String,
    pub category: String,
    pub n_runs: usize,
    pub pass_rate: f64,
    pub failed_runs: usize,
    pub collateralization_ratio: Stats,
    pub min_collateralization_ratio: Stats,
    pub stable_backing_ratio: Stats,
    pub protocol_equity: Stats,
    pub total_pcv: Stats,
    pub pcv_yield: Stats,
    pub psm_fees: Stats,
    pub psm_redemptions: Stats,
    pub conservation_error: Stats,
    pub elapsed_ms: Stats,
    pub individual_runs: Vec<BenchResult>,
}

// ─── Top-Level Report ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub timestamp: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub n_runs_per_scenario: usize,
    pub base_seed: u64,
    pub summary: Summary,
    pub scenarios: Vec<MonteCarloReport>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub max_conservation_error: f64,
}
