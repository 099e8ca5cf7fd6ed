// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation ("pcv-engine")

pub mod types;
pub mod errors;
pub mod deposit;
pub mod linalg;
pub mod processes;
pub mod params;
pub mod state;
pub mod pipeline;

// Balance sheet modules, in pipeline order
pub mod prices;
pub mod money_market;
pub mod liquidity_pool;
pub mod psm;
pub mod pcv_yield;
pub mod pcv_rebalancing;
pub mod capital_allocation;
pub mod accounting;
pub mod metrics;

pub mod setup;
pub mod model;
pub mod simulation;
#[cfg(not(target_arch = "wasm32"))]
pub mod monte_carlo;

pub use deposit::Deposit;
pub use errors::{RunError, SimError, SimResult};
pub use params::{DepositConfig, Parameters};
pub use processes::{Process, ProcessSet, ProcessSpec};
pub use simulation::{run_single, Simulation};
pub use state::{ScalarKey, Scalars, State, StateHistory};
pub use types::*;

#[cfg(not(target_arch = "wasm32"))]
pub use monte_carlo::{Experiment, ExperimentResults, RunOutcome};

use wasm_bindgen::prelude::*;

// ─── WASM Interface ──────────────────────────────────────────────────────────

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[wasm_bindgen]
impl Simulation {
    /// Build a single run from a JSON parameter set. Missing fields take
    /// their defaults.
    #[wasm_bindgen(constructor)]
    pub fn from_config(config_json: &str, timesteps: u32, run: u32) -> Result<Simulation, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let params = if config_json.trim().is_empty() {
            Parameters::default()
        } else {
            Parameters::from_json(config_json).map_err(js_error)?
        };
        let run = run as usize;
        let processes = ProcessSet::realize(&params, run + 1, timesteps as usize);
        Simulation::build(params, processes, run, 0).map_err(js_error)
    }

    /// Advance one timestep and return the end-of-timestep state.
    pub fn tick(&mut self) -> Result<JsValue, JsValue> {
        let state = self.step().map_err(js_error)?;
        serde_wasm_bindgen::to_value(state).map_err(js_error)
    }

    /// Run N timesteps without returning intermediate states.
    pub fn run_batch(&mut self, timesteps: u32) -> Result<(), JsValue> {
        self.run(timesteps as usize).map_err(js_error)
    }

    pub fn state(&self) -> JsValue {
        self.latest()
            .and_then(|s| serde_wasm_bindgen::to_value(s).ok())
            .unwrap_or(JsValue::NULL)
    }

    pub fn timestep(&self) -> u32 {
        self.latest().map_or(0, |s| s.timestep as u32)
    }

    #[wasm_bindgen(js_name = setDropSubsteps)]
    pub fn set_drop_substeps(&mut self, drop_substeps: bool) {
        self.drop_substeps = drop_substeps;
    }
}
