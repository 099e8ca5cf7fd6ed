// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - State Update Pipeline
//
// A timestep is an ordered list of blocks. Each block runs its policies
// against the latest committed snapshot, merges their signals, then lets
// every updater produce exactly one state key. The block's output becomes
// the snapshot the next block reads.

use std::collections::BTreeMap;

use crate::deposit::Deposit;
use crate::errors::{RunError, SimError, SimResult};
use crate::params::Parameters;
use crate::processes::ProcessSet;
use crate::state::{ScalarKey, State, StateHistory, StateKey, StateUpdate};

// ─── Signal ─────────────────────────────────────────────────────────────────

/// Typed policy output: at most one pending update per state key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signal {
    values: BTreeMap<StateKey, StateUpdate>,
}

impl Signal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, update: StateUpdate) {
        self.values.insert(update.key(), update);
    }

    pub fn set_scalar(&mut self, key: ScalarKey, value: f64) {
        self.insert(StateUpdate::Scalar(key, value));
    }

    pub fn set_deposit(&mut self, deposit: Deposit) {
        self.insert(StateUpdate::Deposit(deposit));
    }

    pub fn get(&self, key: &StateKey) -> Option<&StateUpdate> {
        self.values.get(key)
    }

    pub fn scalar(&self, key: ScalarKey) -> Option<f64> {
        match self.values.get(&StateKey::Scalar(key)) {
            Some(StateUpdate::Scalar(_, value)) => Some(*value),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &StateKey> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn merge(&mut self, other: Signal) {
        self.values.extend(other.values);
    }
}

// ─── Policies and Updaters ──────────────────────────────────────────────────

/// Read-only inputs available to policies and updaters.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub params: &'a Parameters,
    pub processes: &'a ProcessSet,
    pub substep: usize,
    /// Committed timesteps before the one being computed.
    pub history: &'a StateHistory,
    /// Latest committed snapshot within the current timestep.
    pub previous: &'a State,
}

impl Context<'_> {
    pub fn timestep(&self) -> usize {
        self.previous.timestep
    }

    pub fn run(&self) -> usize {
        self.previous.run
    }

    /// Time axis used to sample exogenous processes.
    pub fn scaled_timestep(&self) -> f64 {
        self.previous.timestep as f64 * self.params.dt
    }
}

pub type PolicyFn = fn(&Context<'_>) -> SimResult<Signal>;
pub type UpdateFn = fn(&Context<'_>, &Signal) -> SimResult<StateUpdate>;

/// A pure signal producer that declares the keys it may emit.
pub struct Policy {
    pub name: &'static str,
    pub emits: Vec<StateKey>,
    pub run: PolicyFn,
}

impl Policy {
    pub fn new(name: &'static str, emits: Vec<StateKey>, run: PolicyFn) -> Self {
        Self { name, emits, run }
    }
}

pub enum UpdateMode {
    /// Take the value from the merged signal; absence is an error.
    FromSignal,
    /// Take the value from the signal, or keep the previous value.
    OptionalFromSignal,
    Compute(UpdateFn),
}

/// Produces the new value of exactly one state key.
pub struct Updater {
    pub key: StateKey,
    pub mode: UpdateMode,
}

impl Updater {
    pub fn from_signal(key: impl Into<StateKey>) -> Self {
        Self { key: key.into(), mode: UpdateMode::FromSignal }
    }

    pub fn optional(key: impl Into<StateKey>) -> Self {
        Self { key: key.into(), mode: UpdateMode::OptionalFromSignal }
    }

    pub fn compute(key: impl Into<StateKey>, f: UpdateFn) -> Self {
        Self { key: key.into(), mode: UpdateMode::Compute(f) }
    }

    fn update(&self, ctx: &Context<'_>, signal: &Signal) -> SimResult<Option<StateUpdate>> {
        let update = match &self.mode {
            UpdateMode::FromSignal => signal.get(&self.key).cloned().ok_or(SimError::MissingSignal(self.key))?,
            UpdateMode::OptionalFromSignal => match signal.get(&self.key) {
                Some(update) => update.clone(),
                None => return Ok(None),
            },
            UpdateMode::Compute(f) => f(ctx, signal)?,
        };
        if update.key() != self.key {
            return Err(SimError::Invariant(format!(
                "updater for {} produced {}",
                self.key,
                update.key()
            )));
        }
        Ok(Some(update))
    }
}

// ─── Block ──────────────────────────────────────────────────────────────────

pub struct Block {
    pub description: &'static str,
    policies: Vec<Policy>,
    updaters: Vec<Updater>,
}

impl Block {
    /// Validates that no two policies claim a key, no key is updated twice,
    /// and every required signal has a declared producer.
    pub fn new(description: &'static str, policies: Vec<Policy>, updaters: Vec<Updater>) -> SimResult<Self> {
        let mut owners: BTreeMap<StateKey, &'static str> = BTreeMap::new();
        for policy in &policies {
            for key in &policy.emits {
                if let Some(first) = owners.insert(*key, policy.name) {
                    return Err(SimError::OverlappingSignal {
                        key: *key,
                        first: first.to_string(),
                        second: policy.name.to_string(),
                    });
                }
            }
        }

        let mut updated = Vec::with_capacity(updaters.len());
        for updater in &updaters {
            if updated.contains(&updater.key) {
                return Err(SimError::DuplicateUpdater(updater.key));
            }
            updated.push(updater.key);
            if matches!(updater.mode, UpdateMode::FromSignal) && !owners.contains_key(&updater.key) {
                return Err(SimError::MissingSignal(updater.key));
            }
        }

        Ok(Self { description, policies, updaters })
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn updaters(&self) -> &[Updater] {
        &self.updaters
    }

    /// Run policies, merge their signals, apply every updater.
    pub fn execute(&self, ctx: &Context<'_>) -> SimResult<State> {
        let mut signal = Signal::new();
        for policy in &self.policies {
            let emitted = (policy.run)(ctx)?;
            if let Some(key) = emitted.keys().find(|k| !policy.emits.contains(k)) {
                return Err(SimError::UndeclaredSignal { policy: policy.name.to_string(), key: *key });
            }
            signal.merge(emitted);
        }

        let mut next = ctx.previous.clone();
        next.substep = ctx.substep;
        for updater in &self.updaters {
            if let Some(update) = updater.update(ctx, &signal)? {
                next.apply(update)?;
            }
        }
        Ok(next)
    }
}

// ─── Pipeline ───────────────────────────────────────────────────────────────

pub struct Pipeline {
    blocks: Vec<Block>,
}

impl Pipeline {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Advance one timestep past the latest committed snapshot, returning
    /// one snapshot per block.
    pub fn step(
        &self,
        params: &Parameters,
        processes: &ProcessSet,
        history: &StateHistory,
    ) -> Result<Vec<State>, RunError> {
        let latest = history.latest().ok_or_else(|| RunError {
            run: 0,
            subset: 0,
            timestep: 0,
            block: "initial state".into(),
            source: SimError::Invariant("history has no initial state".into()),
        })?;

        let mut working = latest.clone();
        working.timestep += 1;
        working.substep = 0;

        let mut substeps = Vec::with_capacity(self.blocks.len().max(1));
        for (i, block) in self.blocks.iter().enumerate() {
            let ctx = Context { params, processes, substep: i + 1, history, previous: &working };
            let next = block.execute(&ctx).map_err(|source| RunError {
                run: working.run,
                subset: working.subset,
                timestep: working.timestep,
                block: block.description.to_string(),
                source,
            })?;
            substeps.push(next.clone());
            working = next;
        }
        if substeps.is_empty() {
            substeps.push(working);
        }
        Ok(substeps)
    }
}
