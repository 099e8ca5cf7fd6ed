// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Simulation Driver

use log::{debug, info};
use wasm_bindgen::prelude::*;

use crate::errors::{RunError, SimError};
use crate::model::build_pipeline;
use crate::params::Parameters;
use crate::pipeline::Pipeline;
use crate::processes::ProcessSet;
use crate::setup::initial_state;
use crate::state::{State, StateHistory};

// ─── Simulation struct ──────────────────────────────────────────────────────

/// One run of one parameter subset: the assembled pipeline plus the
/// history it has produced so far.
#[wasm_bindgen]
pub struct Simulation {
    pub(crate) params: Parameters,
    pub(crate) processes: ProcessSet,
    pub(crate) pipeline: Pipeline,
    pub(crate) history: StateHistory,
    /// Keep only the end-of-timestep snapshot instead of one per block.
    pub(crate) drop_substeps: bool,
}

fn setup_error(run: usize, subset: usize, source: SimError) -> RunError {
    RunError { run, subset, timestep: 0, block: "initial state".into(), source }
}

// ─── Internal Logic (Testable, pure Rust) ───────────────────────────────────

impl Simulation {
    /// Validate `params`, assemble the pipeline and build the initial state.
    pub fn build(params: Parameters, processes: ProcessSet, run: usize, subset: usize) -> Result<Self, RunError> {
        let pipeline = build_pipeline(&params).map_err(|e| setup_error(run, subset, e))?;
        let initial = initial_state(&params, &processes, run, subset).map_err(|e| setup_error(run, subset, e))?;
        debug!(
            "run {run} subset {subset}: {} blocks, initial collateralization {:.4}",
            pipeline.blocks().len(),
            initial.scalars.collateralization_ratio
        );
        Ok(Self { params, processes, pipeline, history: StateHistory::new(initial), drop_substeps: false })
    }

    pub fn with_drop_substeps(mut self, drop_substeps: bool) -> Self {
        self.drop_substeps = drop_substeps;
        self
    }

    /// Advance one timestep and return its end-of-timestep snapshot.
    pub fn step(&mut self) -> Result<&State, RunError> {
        let mut substeps = self.pipeline.step(&self.params, &self.processes, &self.history)?;
        if self.drop_substeps {
            substeps = substeps.split_off(substeps.len().saturating_sub(1));
        }
        self.history.push(substeps);
        self.latest_or_err()
    }

    pub fn run(&mut self, timesteps: usize) -> Result<(), RunError> {
        for _ in 0..timesteps {
            self.step()?;
        }
        if let Some(last) = self.history.latest() {
            info!(
                "run {} subset {} finished at timestep {}: CR {:.4}, equity {:.2}",
                last.run,
                last.subset,
                last.timestep,
                last.scalars.collateralization_ratio,
                last.scalars.protocol_equity
            );
        }
        Ok(())
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn history(&self) -> &StateHistory {
        &self.history
    }

    pub fn latest(&self) -> Option<&State> {
        self.history.latest()
    }

    pub fn into_history(self) -> StateHistory {
        self.history
    }

    fn latest_or_err(&self) -> Result<&State, RunError> {
        self.history.latest().ok_or_else(|| RunError {
            run: 0,
            subset: 0,
            timestep: 0,
            block: "history".into(),
            source: SimError::Invariant("history is empty".into()),
        })
    }
}

/// Realize processes for `run` and execute `timesteps` steps.
pub fn run_single(
    params: &Parameters,
    run: usize,
    subset: usize,
    timesteps: usize,
    drop_substeps: bool,
) -> Result<StateHistory, RunError> {
    let processes = ProcessSet::realize(params, run + 1, timesteps);
    let mut sim = Simulation::build(params.clone(), processes, run, subset)?.with_drop_substeps(drop_substeps);
    sim.run(timesteps)?;
    Ok(sim.into_history())
}
