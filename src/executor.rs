//! Plan execution.
//!
//! Actions are handed to the store strictly one after another. Action *i+1*
//! starts only after action *i* has committed, and the first failure stops
//! the run. Actions committed before the failure stay committed.

use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};

use crate::error::{MigrateError, MigrateResult};
use crate::migration::{Action, Direction, Version};
use crate::store::AppliedStore;

/// Outcome of a fully executed plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    /// `None` when the plan was empty.
    pub direction: Option<Direction>,
    /// Versions applied (up) or reverted (down), in execution order.
    pub versions: Vec<Version>,
    pub duration_ms: u64,
}

impl ExecutionReport {
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

/// Apply `actions` in order, stopping at the first failure.
///
/// The error is [`MigrateError::Halted`], carrying the failing version and
/// the versions committed before it.
pub async fn execute<S: AppliedStore>(
    store: &mut S,
    actions: &[Action],
) -> MigrateResult<ExecutionReport> {
    let started = Instant::now();
    let mut report = ExecutionReport {
        direction: actions.first().map(|a| a.direction),
        ..Default::default()
    };

    for action in actions {
        let step = Instant::now();
        if let Err(e) = store.apply(action).await {
            error!(
                version = action.version,
                direction = %action.direction,
                committed = report.versions.len(),
                error = %e,
                "Migration failed, stopping"
            );
            return Err(MigrateError::Halted {
                version: action.version,
                direction: action.direction,
                completed: report.versions,
                source: Box::new(e),
            });
        }

        info!(
            version = action.version,
            direction = %action.direction,
            elapsed_ms = step.elapsed().as_millis() as u64,
            "Migration committed"
        );
        report.versions.push(action.version);
    }

    report.duration_ms = started.elapsed().as_millis() as u64;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_execute_all() {
        let mut store = MemoryStore::new();
        let actions = vec![Action::up(1, "a"), Action::up(2, "b")];
        let report = execute(&mut store, &actions).await.unwrap();
        assert_eq!(report.versions, vec![1, 2]);
        assert_eq!(report.direction, Some(Direction::Up));
        assert_eq!(store.executed(), actions.as_slice());
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let mut store = MemoryStore::new();
        let report = execute(&mut store, &[]).await.unwrap();
        assert!(report.is_empty());
        assert_eq!(report.direction, None);
    }

    #[tokio::test]
    async fn test_halt_on_failure() {
        let mut store = MemoryStore::new().fail_on(2);
        let actions = vec![Action::up(1, "a"), Action::up(2, "b"), Action::up(3, "c")];

        let err = execute(&mut store, &actions).await.unwrap_err();
        match err {
            MigrateError::Halted {
                version, completed, ..
            } => {
                assert_eq!(version, 2);
                assert_eq!(completed, vec![1]);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(store.executed(), &actions[..1]);
        assert_eq!(store.list().await.unwrap(), vec![1]);
    }
}
