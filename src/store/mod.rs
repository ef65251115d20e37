//! Applied-state stores.
//!
//! A store records which versions are applied and executes one [`Action`]
//! at a time as an atomic unit: the statement and the bookkeeping update
//! either both take effect or neither does.

mod memory;
mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::MigrateResult;
use crate::migration::{Action, Version};

/// Failure-atomicity a store can guarantee for a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Atomicity {
    /// Statement and bookkeeping commit or roll back together.
    Transactional,
    /// Statement and bookkeeping run as two sequential steps. A failure in
    /// the second step leaves the statement applied but unrecorded.
    BestEffort,
}

impl fmt::Display for Atomicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transactional => write!(f, "transactional"),
            Self::BestEffort => write!(f, "best-effort"),
        }
    }
}

/// An applied version and when it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedVersion {
    pub version: Version,
    /// `None` when the backend's timestamp could not be read.
    pub applied_at: Option<NaiveDateTime>,
}

/// Persists the applied-version set and applies actions atomically.
///
/// Implementations set up their own bookkeeping lazily, at most once per
/// instance, before the first operation that needs it.
#[allow(async_fn_in_trait)]
pub trait AppliedStore {
    fn atomicity(&self) -> Atomicity;

    /// Applied versions, ascending.
    async fn list(&mut self) -> MigrateResult<Vec<Version>>;

    /// Applied versions with their timestamps, ascending.
    async fn history(&mut self) -> MigrateResult<Vec<AppliedVersion>>;

    /// Execute `action` and record (up) or forget (down) its version.
    ///
    /// On failure nothing is recorded and, for transactional stores, the
    /// statement's effects are rolled back.
    async fn apply(&mut self, action: &Action) -> MigrateResult<()>;
}
