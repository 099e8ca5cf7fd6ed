// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Exogenous Processes
//
// Processes are realized once per experiment into read-only sample paths,
// one path per run, so parallel runs never share mutable state.

use std::fmt;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::errors::{SimError, SimResult};
use crate::params::Parameters;
use crate::types::DAYS_PER_YEAR;

// ─── Process Specification ──────────────────────────────────────────────────

/// Serializable recipe for an exogenous series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessSpec {
    Constant { value: f64 },
    /// Independent draws around a mean (stable asset peg noise).
    GaussianNoise { mean: f64, std_dev: f64 },
    /// Additive drifted Brownian motion in per-day units, floored.
    BrownianMotion { initial: f64, drift: f64, volatility: f64, floor: f64 },
    /// Geometric Brownian motion with annualized drift and volatility.
    GeometricBrownianMotion { initial: f64, drift: f64, volatility: f64 },
}

impl ProcessSpec {
    pub fn validate(&self, name: &str) -> SimResult<()> {
        let bad = |what: &str| Err(SimError::InvalidConfig(format!("{name}: {what}")));
        match *self {
            Self::Constant { value } if !value.is_finite() => bad("value must be finite"),
            Self::GaussianNoise { std_dev, .. } if std_dev < 0.0 => bad("std_dev must be non-negative"),
            Self::BrownianMotion { volatility, .. } if volatility < 0.0 => bad("volatility must be non-negative"),
            Self::GeometricBrownianMotion { initial, volatility, .. } if initial <= 0.0 || volatility < 0.0 => {
                bad("initial must be positive and volatility non-negative")
            }
            _ => Ok(()),
        }
    }

    /// Draw `runs` paths of `timesteps + 1` samples spaced `dt` days apart.
    pub fn realize(&self, seed: u64, runs: usize, timesteps: usize, dt: f64) -> Process {
        if let Self::Constant { value } = *self {
            return Process::Constant(value);
        }
        let paths = (0..runs)
            .map(|run| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(run as u64);
                self.path(&mut rng, timesteps + 1, dt)
            })
            .collect();
        Process::Sampled { dt, paths: Arc::new(paths) }
    }

    fn path(&self, rng: &mut ChaCha8Rng, len: usize, dt: f64) -> Vec<f64> {
        let mut out = Vec::with_capacity(len);
        match *self {
            Self::Constant { value } => out.resize(len, value),
            Self::GaussianNoise { mean, std_dev } => {
                for _ in 0..len {
                    let z: f64 = rng.sample(StandardNormal);
                    out.push(mean + std_dev * z);
                }
            }
            Self::BrownianMotion { initial, drift, volatility, floor } => {
                let mut x = initial;
                out.push(x);
                for _ in 1..len {
                    let z: f64 = rng.sample(StandardNormal);
                    x = (x + drift * dt + volatility * dt.sqrt() * z).max(floor);
                    out.push(x);
                }
            }
            Self::GeometricBrownianMotion { initial, drift, volatility } => {
                let h = dt / DAYS_PER_YEAR;
                let mut x = initial;
                out.push(x);
                for _ in 1..len {
                    let z: f64 = rng.sample(StandardNormal);
                    x *= ((drift - 0.5 * volatility * volatility) * h + volatility * h.sqrt() * z).exp();
                    out.push(x);
                }
            }
        }
        out
    }
}

// ─── Realized Process ───────────────────────────────────────────────────────

/// Deterministic `(run, scaled_timestep) -> value` lookup.
#[derive(Clone)]
pub enum Process {
    Constant(f64),
    Sampled { dt: f64, paths: Arc<Vec<Vec<f64>>> },
    Custom(Arc<dyn Fn(usize, f64) -> f64 + Send + Sync>),
}

impl Process {
    pub fn from_fn(f: impl Fn(usize, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn sample(&self, run: usize, scaled_timestep: f64) -> f64 {
        match self {
            Self::Constant(value) => *value,
            Self::Sampled { dt, paths } => {
                if paths.is_empty() {
                    return f64::NAN;
                }
                let path = &paths[run % paths.len()];
                let index = (scaled_timestep / dt).round().max(0.0) as usize;
                path[index.min(path.len() - 1)]
            }
            Self::Custom(f) => f(run, scaled_timestep),
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => write!(f, "Constant({value})"),
            Self::Sampled { dt, paths } => write!(f, "Sampled {{ dt: {dt}, runs: {} }}", paths.len()),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

// ─── Process Set ────────────────────────────────────────────────────────────

/// All exogenous inputs consumed by the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessSet {
    pub fei_price: Process,
    pub stable_asset_price: Process,
    pub volatile_asset_price: Process,
    pub fei_savings_rate: Process,
    pub money_market_utilization: Process,
}

impl ProcessSet {
    /// Realize every configured process. Each process gets its own seed so
    /// adding one never shifts another's draws.
    pub fn realize(params: &Parameters, runs: usize, timesteps: usize) -> Self {
        let seeded = |spec: &ProcessSpec, salt: u64| {
            spec.realize(params.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(salt), runs, timesteps, params.dt)
        };
        Self {
            fei_price: seeded(&params.fei_price_process, 1),
            stable_asset_price: seeded(&params.stable_asset_price_process, 2),
            volatile_asset_price: seeded(&params.volatile_asset_price_process, 3),
            fei_savings_rate: seeded(&params.fei_savings_rate_process, 4),
            money_market_utilization: seeded(&params.money_market_utilization_process, 5),
        }
    }
}
