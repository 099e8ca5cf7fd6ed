// Copyright 2026 Hypermesh Foundation. All rights reserved.
// PCV Balance Sheet Simulation - Error Types

use crate::state::StateKey;
use crate::types::DepositKey;

/// Every fatal condition a run can hit. Soft shortfalls are logged, never
/// returned through this type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("{what} must be non-negative (got {value})")]
    NegativeAmount { what: &'static str, value: f64 },

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: f64, available: f64 },

    #[error("insufficient accrued yield: requested {requested}, accrued {accrued}")]
    InsufficientYield { requested: f64, accrued: f64 },

    #[error("cannot merge deposits with different {field}")]
    AmbiguousMerge { field: &'static str },

    #[error("invalid {asset} price {price}")]
    InvalidPrice { asset: &'static str, price: f64 },

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("rebalance solve residual {residual} exceeds tolerance {tolerance}")]
    SolveResidual { residual: f64, tolerance: f64 },

    #[error("insufficient PCV for redemption of {requested} FEI")]
    InsufficientPcvForRedemption { requested: f64 },

    #[error("unknown deposit {0}")]
    UnknownDeposit(DepositKey),

    #[error("signal {0} required but not emitted")]
    MissingSignal(StateKey),

    #[error("policy {policy} emitted undeclared signal {key}")]
    UndeclaredSignal { policy: String, key: StateKey },

    #[error("signal {key} emitted by both {first} and {second}")]
    OverlappingSignal { key: StateKey, first: String, second: String },

    #[error("state key {0} updated twice in one block")]
    DuplicateUpdater(StateKey),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A fatal error annotated with where in the experiment it happened.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("run {run} subset {subset} timestep {timestep} ({block}): {source}")]
pub struct RunError {
    pub run: usize,
    pub subset: usize,
    pub timestep: usize,
    pub block: String,
    #[source]
    pub source: SimError,
}

pub type SimResult<T> = Result<T, SimError>;

/// Guard used by every balance-affecting operation.
pub fn ensure_non_negative(what: &'static str, value: f64) -> SimResult<()> {
    if value < 0.0 || value.is_nan() {
        return Err(SimError::NegativeAmount { what, value });
    }
    Ok(())
}
