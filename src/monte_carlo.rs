// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Monte Carlo Experiments
//
// Every (subset, run) pair is independent: processes are realized once per
// subset and shared, then runs execute in parallel. A failing run is
// recorded with its error and does not abort its siblings.

use std::io::{self, Write};

use log::{info, warn};
use rayon::prelude::*;

use crate::errors::RunError;
use crate::params::Parameters;
use crate::processes::ProcessSet;
use crate::simulation::Simulation;
use crate::state::{State, StateHistory};

#[derive(Debug, Clone)]
pub struct Experiment {
    /// One parameter set per subset (the sweep axis).
    pub subsets: Vec<Parameters>,
    pub runs: usize,
    pub timesteps: usize,
    pub drop_substeps: bool,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub subset: usize,
    pub run: usize,
    pub result: Result<StateHistory, RunError>,
}

#[derive(Debug, Default)]
pub struct ExperimentResults {
    pub outcomes: Vec<RunOutcome>,
}

impl Experiment {
    pub fn new(subsets: Vec<Parameters>, runs: usize, timesteps: usize) -> Self {
        Self { subsets, runs, timesteps, drop_substeps: false }
    }

    pub fn with_drop_substeps(mut self, drop_substeps: bool) -> Self {
        self.drop_substeps = drop_substeps;
        self
    }

    pub fn execute(&self) -> ExperimentResults {
        let processes: Vec<ProcessSet> =
            self.subsets.iter().map(|p| ProcessSet::realize(p, self.runs, self.timesteps)).collect();
        let jobs: Vec<(usize, usize)> =
            (0..self.subsets.len()).flat_map(|s| (0..self.runs).map(move |r| (s, r))).collect();

        info!(
            "executing {} subset(s) x {} run(s) x {} timestep(s)",
            self.subsets.len(),
            self.runs,
            self.timesteps
        );

        let mut outcomes: Vec<RunOutcome> = jobs
            .into_par_iter()
            .map(|(subset, run)| {
                let result = Simulation::build(self.subsets[subset].clone(), processes[subset].clone(), run, subset)
                    .and_then(|sim| {
                        let mut sim = sim.with_drop_substeps(self.drop_substeps);
                        sim.run(self.timesteps)?;
                        Ok(sim.into_history())
                    });
                if let Err(e) = &result {
                    warn!("{e}");
                }
                RunOutcome { subset, run, result }
            })
            .collect();
        outcomes.sort_by_key(|o| (o.subset, o.run));
        ExperimentResults { outcomes }
    }
}

impl ExperimentResults {
    /// Snapshots of every successful run in (subset, run, timestep, substep)
    /// order.
    pub fn rows(&self) -> impl Iterator<Item = &State> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok()).flat_map(|h| h.iter())
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Write one JSON object per snapshot.
    pub fn write_jsonl<W: Write>(&self, mut out: W) -> io::Result<()> {
        for state in self.rows() {
            let line = serde_json::to_string(state)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}
