//! Migration planner.
//!
//! Reconciles the migration catalog against the applied-version set and
//! produces the ordered list of [`Action`]s needed to reach a target version.
//!
//! # Rules
//!
//! - An empty catalog always yields an empty plan.
//! - Moving up, the catalog is walked in ascending order up to the target.
//!   When nothing has been applied yet, a migration with a snapshot replaces
//!   every action accumulated before it.
//! - Reaching a migration that is already applied discards the actions
//!   accumulated so far: a lower version must never be replayed after a
//!   higher one. The discarded versions are reported as a [`PlanNote`].
//! - Moving down, applied versions above the target are reverted in
//!   descending order. Applied versions missing from the catalog are skipped.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{MigrateError, MigrateResult};
use crate::migration::{Action, Direction, Migration, Payload, Version};

/// Ordered, single-direction list of actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Version the plan was computed for.
    pub target: Version,
    /// Highest applied version when the plan was computed.
    pub current: Version,
    /// `None` when there is nothing to do.
    pub direction: Option<Direction>,
    pub actions: Vec<Action>,
    /// Informational notes. They never change `actions`.
    pub notes: Vec<PlanNote>,
}

/// Something the planner decided silently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanNote {
    /// Candidate actions were dropped because a higher version is already applied.
    OutOfOrder {
        dropped: Vec<Version>,
        applied: Version,
    },
    /// An applied version has no catalog entry, so it cannot be reverted.
    MissingBackward { version: Version },
}

impl Plan {
    fn empty(current: Version, target: Version) -> Self {
        Self {
            target,
            current,
            direction: None,
            actions: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Versions touched by the plan, in execution order.
    pub fn versions(&self) -> Vec<Version> {
        self.actions.iter().map(|a| a.version).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

/// Compute the actions needed to move from `applied` to `target`.
///
/// Pure apart from payload resolution: the only failure is a migration
/// whose text could not be loaded.
pub async fn plan<M: Migration>(
    catalog: &[M],
    applied: &[Version],
    target: Version,
) -> MigrateResult<Plan> {
    let applied: BTreeSet<Version> = applied.iter().copied().collect();
    let current = applied.last().copied().unwrap_or(0);
    let mut plan = Plan::empty(current, target);

    if catalog.is_empty() {
        // Without migrations there is nothing we can safely do.
        debug!("Empty catalog, nothing to plan");
        return Ok(plan);
    }

    let mut sorted: Vec<&M> = catalog.iter().collect();
    sorted.sort_by_key(|m| m.version());

    if target > current {
        plan.actions = plan_up(&sorted, &applied, target, &mut plan.notes).await?;
        plan.direction = Some(Direction::Up);
    } else if target < current {
        plan.actions = plan_down(&sorted, &applied, target, &mut plan.notes).await?;
        plan.direction = Some(Direction::Down);
    }

    if plan.actions.is_empty() {
        plan.direction = None;
    }

    debug!(
        current,
        target,
        actions = plan.actions.len(),
        "Computed migration plan"
    );
    Ok(plan)
}

async fn plan_up<M: Migration>(
    sorted: &[&M],
    applied: &BTreeSet<Version>,
    target: Version,
    notes: &mut Vec<PlanNote>,
) -> MigrateResult<Vec<Action>> {
    let fresh = applied.is_empty();
    let mut actions: Vec<Action> = Vec::new();

    for migration in sorted {
        let version = migration.version();
        if version > target {
            break;
        }

        if applied.contains(&version) {
            if !actions.is_empty() {
                let dropped: Vec<Version> = actions.iter().map(|a| a.version).collect();
                warn!(
                    applied = version,
                    ?dropped,
                    "Skipping unapplied migrations older than an applied one"
                );
                notes.push(PlanNote::OutOfOrder {
                    dropped,
                    applied: version,
                });
                actions.clear();
            }
            continue;
        }

        if fresh {
            let snapshot = migration
                .snapshot()
                .await
                .map_err(|e| MigrateError::payload(version, Payload::Snapshot, e))?;
            if !snapshot.is_empty() {
                debug!(version, replaced = actions.len(), "Using snapshot");
                actions.clear();
                actions.push(Action::up(version, snapshot));
                continue;
            }
        }

        let forward = migration
            .forward()
            .await
            .map_err(|e| MigrateError::payload(version, Payload::Forward, e))?;
        actions.push(Action::up(version, forward));
    }

    Ok(actions)
}

async fn plan_down<M: Migration>(
    sorted: &[&M],
    applied: &BTreeSet<Version>,
    target: Version,
    notes: &mut Vec<PlanNote>,
) -> MigrateResult<Vec<Action>> {
    let by_version: BTreeMap<Version, &M> = sorted.iter().map(|m| (m.version(), *m)).collect();
    let mut actions = Vec::new();

    for &version in applied.iter().rev().take_while(|v| **v > target) {
        let Some(migration) = by_version.get(&version) else {
            warn!(version, "Applied migration not in catalog, cannot revert it");
            notes.push(PlanNote::MissingBackward { version });
            continue;
        };
        let backward = migration
            .backward()
            .await
            .map_err(|e| MigrateError::payload(version, Payload::Backward, e))?;
        actions.push(Action::down(version, backward));
    }

    Ok(actions)
}
