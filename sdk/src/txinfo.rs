// ============ TxInfo ============
// Planning result threaded through every composition step.
// Once `state` holds an error, later steps pass it through untouched.

use crate::skeleton::TxSkeleton;
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Asset {
    Ckb,
    Ickb,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Ckb => f.pad("CKB"),
            Asset::Ickb => f.pad("iCKB"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Not enough {asset}")]
    InsufficientBalance { asset: Asset },
    #[error("Not enough Deposits to withdraw from")]
    InsufficientReserve,
    #[error("Too many Deposits for the requested amount")]
    ReserveOvershoot,
    #[error("More than {limit} output cells ({outputs})")]
    OutputLimitExceeded { outputs: usize, limit: usize },
    #[error("Nothing to convert")]
    NothingToConvert,
    #[error("CKB change does not fit in a single cell")]
    ChangeOverflow,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxInfo {
    /// Human readable description of every step taken
    pub steps: Vec<String>,
    /// Network fee in shannons, set once change is balanced
    pub fee: u64,
    pub state: Result<TxSkeleton, PlanError>,
}

impl TxInfo {
    pub fn new(tx: TxSkeleton, steps: Vec<String>) -> Self {
        Self {
            steps,
            fee: 0,
            state: Ok(tx),
        }
    }

    pub fn failed(steps: Vec<String>, error: PlanError) -> Self {
        Self {
            steps,
            fee: 0,
            state: Err(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.state.is_ok()
    }

    pub fn tx(&self) -> Option<&TxSkeleton> {
        self.state.as_ref().ok()
    }

    pub fn error(&self) -> Option<&PlanError> {
        self.state.as_ref().err()
    }
}

/// "1 Receipt", "3 Receipts"
pub(crate) fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {}", noun)
    } else {
        format!("{} {}s", n, noun)
    }
}

// ============ Tests ============
