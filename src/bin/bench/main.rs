// PCV Benchmark Runner v0.1.0: balance sheet stress scenarios
// Monte Carlo (N=30), seedable ChaCha8 processes, per-timestep audit trail
//
// Usage:
//   cargo run --release --bin bench                        # Run all scenarios (30 runs each)
//   cargo run --release --bin bench -- --runs 5            # Quick mode (5 runs each)
//   cargo run --release --bin bench -- BEAR_MARKET         # Filter by name
//   cargo run --release --bin bench -- --time-series       # Enable JSONL output
//   cargo run --release --bin bench -- --seed 42           # Custom base seed
//   cargo run --release --bin bench -- --timesteps 90      # Override scenario horizon
//   cargo run --release --bin bench -- --config base.json  # Base parameters from JSON

mod report;
mod scenarios;
mod monte_carlo;
mod time_series;

use pcv_engine::Parameters;
use report::*;
use scenarios::*;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// ─── CLI Parsing ────────────────────────────────────────────────────────────

struct CliArgs {
    runs: usize,
    seed: u64,
    timesteps: Option<usize>,
    time_series: bool,
    config: Option<String>,
    filter: Option<String>,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut cli = CliArgs {
        runs: 30,
        seed: 1,
        timesteps: None,
        time_series: false,
        config: None,
        filter: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--runs" => {
                i += 1;
                if i < args.len() {
                    cli.runs = args[i].parse().unwrap_or(30);
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    cli.seed = args[i].parse().unwrap_or(1);
                }
            }
            "--timesteps" => {
                i += 1;
                if i < args.len() {
                    cli.timesteps = args[i].parse().ok();
                }
            }
            "--config" => {
                i += 1;
                if i < args.len() {
                    cli.config = Some(args[i].clone());
                }
            }
            "--time-series" => {
                cli.time_series = true;
            }
            arg if !arg.starts_with('-') => {
                cli.filter = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    cli
}

// ─── Main ───────────────────────────────────────────────────────────────────

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = parse_args();
    let base = match &cli.config {
        Some(path) => match Parameters::from_json_file(std::path::Path::new(path)) {
            Ok(params) => params,
            Err(e) => {
                eprintln!("Invalid config {}: {}", path, e);
                std::process::exit(2);
            }
        },
        None => Parameters::default(),
    };

    let all_scenarios = scenarios();
    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => {
            let f_lower = f.to_lowercase();
            all_scenarios.iter()
                .filter(|s| s.name.to_lowercase().contains(&f_lower)
                          || s.label.to_lowercase().contains(&f_lower)
                          || s.category.to_lowercase().contains(&f_lower))
                .collect()
        }
        None => all_scenarios.iter().collect(),
    };

    if to_run.is_empty() {
        eprintln!("No scenarios match filter: {:?}", cli.filter);
        std::process::exit(1);
    }

    let ts_dir = if cli.time_series {
        Some(std::path::Path::new("benchmark-results/time-series").to_path_buf())
    } else {
        None
    };

    println!("\n  PCV Benchmark Runner v0.1.0");
    println!("  PRNG: ChaCha8Rng | Runs/scenario: {} | Base seed: {}", cli.runs, cli.seed);
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!("  {:<40} {:>5} {:>12} {:>9} {:>14} {:>7}",
        "Scenario", "Pass%", "CR", "CR p5", "Equity", "Time");
    println!("  {}", "-".repeat(92));

    let suite_start = Instant::now();
    let mut mc_reports = Vec::new();

    for scenario in &to_run {
        let report = monte_carlo::run_monte_carlo(
            scenario,
            &base,
            cli.runs,
            cli.seed,
            cli.timesteps,
            ts_dir.as_deref(),
        );

        let pass_pct = report.pass_rate * 100.0;
        let cr = &report.collateralization_ratio;
        let cr_ci = (cr.ci_upper - cr.ci_lower) / 2.0;
        let status = if report.pass_rate >= 0.933 { "PASS" } else { "FAIL" };

        println!("  {:<40} {:>4}% {:>6.3}±{:<5.3} {:>9.3} {:>14.3e} {:>5.0}ms  {}",
            report.label,
            pass_pct as u32,
            cr.mean, cr_ci,
            report.min_collateralization_ratio.p05,
            report.protocol_equity.mean,
            report.elapsed_ms.mean,
            status,
        );
        for run in report.individual_runs.iter().filter(|r| r.error.is_some()) {
            println!("      run {}: {}", run.run, run.error.as_deref().unwrap_or(""));
        }

        mc_reports.push(report);
    }

    let suite_elapsed = suite_start.elapsed();

    // ─── Summary ────────────────────────────────────────────────────────

    let total = mc_reports.len();
    let passed = mc_reports.iter().filter(|r| r.pass_rate >= 0.933).count();
    let failed = total - passed;
    let max_conservation_error = mc_reports.iter()
        .map(|r| r.conservation_error.max)
        .fold(0.0_f64, f64::max);

    println!("  {}", "-".repeat(92));
    println!("  Total: {}  Passed: {}  Failed: {}  Suite time: {:.1}s",
        total, passed, failed, suite_elapsed.as_secs_f64());
    println!("  Max normalized FEI conservation error: {:.2e}\n", max_conservation_error);

    // ─── Write JSON Report ──────────────────────────────────────────────

    let ts = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
    let timestamp = format!("{}", ts);

    let report = BenchReport {
        timestamp: timestamp.clone(),
        version: "0.1.0",
        prng: "ChaCha8Rng",
        n_runs_per_scenario: cli.runs,
        base_seed: cli.seed,
        summary: Summary {
            total,
            passed,
            failed,
            pass_rate: passed as f64 / total as f64,
            max_conservation_error,
        },
        scenarios: mc_reports,
    };

    let dir = std::path::Path::new("benchmark-results");
    if !dir.exists() {
        std::fs::create_dir_all(dir).expect("Failed to create benchmark-results/");
    }
    let path = dir.join(format!("bench-{}.json", timestamp));
    let json = serde_json::to_string_pretty(&report).expect("Failed to serialize");
    std::fs::write(&path, &json).expect("Failed to write benchmark file");
    println!("  Results saved to: {}\n", path.display());

    if failed > 0 {
        std::process::exit(1);
    }
}
