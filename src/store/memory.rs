//! In-memory applied-state store.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDateTime, Utc};

use super::{AppliedStore, AppliedVersion, Atomicity};
use crate::error::{MigrateError, MigrateResult};
use crate::migration::{Action, Direction, Version};

/// Keeps applied versions in memory. Useful for tests and dry runs.
///
/// Every action is trivially atomic: a failing action changes nothing.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    applied: BTreeMap<Version, NaiveDateTime>,
    executed: Vec<Action>,
    fail_on: BTreeSet<Version>,
    setups: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already has `versions` applied.
    pub fn with_applied(versions: impl IntoIterator<Item = Version>) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            applied: versions.into_iter().map(|v| (v, now)).collect(),
            ..Self::default()
        }
    }

    /// Make any action on `version` fail.
    pub fn fail_on(mut self, version: Version) -> Self {
        self.fail_on.insert(version);
        self
    }

    /// Actions that committed, in order.
    pub fn executed(&self) -> &[Action] {
        &self.executed
    }

    /// How many times bookkeeping setup ran (0 or 1).
    pub fn setups(&self) -> usize {
        self.setups
    }

    fn ensure_ready(&mut self) {
        if self.setups == 0 {
            self.setups = 1;
        }
    }
}

impl AppliedStore for MemoryStore {
    fn atomicity(&self) -> Atomicity {
        Atomicity::Transactional
    }

    async fn list(&mut self) -> MigrateResult<Vec<Version>> {
        self.ensure_ready();
        Ok(self.applied.keys().copied().collect())
    }

    async fn history(&mut self) -> MigrateResult<Vec<AppliedVersion>> {
        self.ensure_ready();
        Ok(self
            .applied
            .iter()
            .map(|(version, at)| AppliedVersion {
                version: *version,
                applied_at: Some(*at),
            })
            .collect())
    }

    async fn apply(&mut self, action: &Action) -> MigrateResult<()> {
        self.ensure_ready();
        if self.fail_on.contains(&action.version) {
            return Err(MigrateError::Database(format!(
                "injected failure for migration {}",
                action.version
            )));
        }

        match action.direction {
            Direction::Up => {
                if self.applied.contains_key(&action.version) {
                    return Err(MigrateError::Database(format!(
                        "migration {} is already applied",
                        action.version
                    )));
                }
                self.applied.insert(action.version, Utc::now().naive_utc());
            }
            Direction::Down => {
                self.applied.remove(&action.version);
            }
        }

        self.executed.push(action.clone());
        Ok(())
    }
}
