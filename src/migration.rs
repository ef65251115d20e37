//! Core migration types.
//!
//! A [`Migration`] is a catalog entry identified by its [`Version`]. Its
//! forward, backward and snapshot texts are opaque SQL resolved on demand.
//! The planner turns migrations into [`Action`]s, which the executor hands
//! to an applied-state store one at a time.

use std::fmt;

use serde::Serialize;

use crate::error::MigrateResult;

/// Migration version number. Catalog versions start at 1; 0 means "nothing applied".
pub type Version = i64;

/// Direction of a planned action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply the change (forward or snapshot text).
    Up,
    /// Revert the change (backward text).
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Which payload of a migration is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Forward,
    Backward,
    Snapshot,
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "up"),
            Self::Backward => write!(f, "down"),
            Self::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// A single planned unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub version: Version,
    pub direction: Direction,
    /// SQL text to execute (forward, backward or snapshot payload).
    pub statement: String,
}

impl Action {
    pub fn up(version: Version, statement: impl Into<String>) -> Self {
        Self {
            version,
            direction: Direction::Up,
            statement: statement.into(),
        }
    }

    pub fn down(version: Version, statement: impl Into<String>) -> Self {
        Self {
            version,
            direction: Direction::Down,
            statement: statement.into(),
        }
    }
}

/// A versioned, reversible schema change.
///
/// Payload accessors may perform I/O on first use; implementations cache the
/// result for the lifetime of the descriptor. An empty snapshot means the
/// migration has no snapshot.
#[allow(async_fn_in_trait)]
pub trait Migration {
    fn version(&self) -> Version;

    async fn forward(&self) -> MigrateResult<String>;

    async fn backward(&self) -> MigrateResult<String>;

    async fn snapshot(&self) -> MigrateResult<String>;
}
