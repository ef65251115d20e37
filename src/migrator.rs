//! Migration orchestrator.
//!
//! [`Migrator`] ties a [`MigrationSource`] and an [`AppliedStore`] together
//! and exposes version queries, planning and execution.
//!
//! Only one migrator may act on a given store at a time. Nothing here takes
//! a lock; callers running several processes must serialize them externally
//! (for example with a database advisory lock).

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use crate::error::MigrateResult;
use crate::executor::{self, ExecutionReport};
use crate::migration::{Migration, Version};
use crate::planner::{self, Plan};
use crate::source::MigrationSource;
use crate::store::{AppliedStore, AppliedVersion, Atomicity};

/// Combined view of the catalog and the applied state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub current: Version,
    pub latest: Version,
    pub applied: Vec<AppliedVersion>,
    /// Catalog versions above `current` that are not applied yet.
    pub pending: Vec<Version>,
    /// Applied versions with no catalog entry.
    pub unknown: Vec<Version>,
    pub atomicity: Atomicity,
}

/// Highest version a source offers, or 0 when it is empty.
///
/// Needs no store, so it works without a database connection.
pub async fn latest_version<S: MigrationSource>(source: &S) -> MigrateResult<Version> {
    let list = source
        .list()
        .await
        .map_err(|e| e.context("unable to find latest version"))?;
    Ok(list.iter().map(|m| m.version()).max().unwrap_or(0))
}

pub struct Migrator<S, D> {
    source: S,
    store: D,
}

impl<S, D> Migrator<S, D>
where
    S: MigrationSource,
    D: AppliedStore,
{
    pub fn new(source: S, store: D) -> Self {
        Self { source, store }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    pub fn into_parts(self) -> (S, D) {
        (self.source, self.store)
    }

    /// Highest version in the catalog, or 0 when it is empty.
    pub async fn latest_version(&self) -> MigrateResult<Version> {
        latest_version(&self.source).await
    }

    /// Applied versions, ascending.
    pub async fn applied_versions(&mut self) -> MigrateResult<Vec<Version>> {
        self.store
            .list()
            .await
            .map_err(|e| e.context("unable to read applied versions"))
    }

    /// Highest applied version, or 0 when nothing is applied.
    pub async fn current_version(&mut self) -> MigrateResult<Version> {
        let list = self
            .store
            .list()
            .await
            .map_err(|e| e.context("unable to find current version"))?;
        Ok(list.into_iter().max().unwrap_or(0))
    }

    /// Compute the actions needed to reach `target` without running them.
    ///
    /// A target above the latest version stops at the latest version.
    pub async fn plan(&mut self, target: Version) -> MigrateResult<Plan> {
        self.compute_plan(target)
            .await
            .map_err(|e| e.context("unable to prepare migration plan"))
    }

    /// Move the store to `target`, applying one action per atomic unit.
    ///
    /// Stops at the first failing action. Earlier actions stay committed.
    pub async fn migrate(&mut self, target: Version) -> MigrateResult<ExecutionReport> {
        let plan = self.plan(target).await?;
        self.apply(&plan).await
    }

    /// Execute a plan returned by [`Migrator::plan`].
    pub async fn apply(&mut self, plan: &Plan) -> MigrateResult<ExecutionReport> {
        if plan.is_empty() {
            info!(target = plan.target, "Already at target version");
        }
        executor::execute(&mut self.store, &plan.actions)
            .await
            .map_err(|e| e.context("unable to apply migrations"))
    }

    pub async fn status(&mut self) -> MigrateResult<Status> {
        let source = &self.source;
        let store = &mut self.store;
        let (catalog, applied) = tokio::try_join!(
            async {
                source
                    .list()
                    .await
                    .map_err(|e| e.context("unable to list migrations"))
            },
            async {
                store
                    .history()
                    .await
                    .map_err(|e| e.context("unable to read applied versions"))
            },
        )?;

        let known: BTreeSet<Version> = catalog.iter().map(|m| m.version()).collect();
        let applied_set: BTreeSet<Version> = applied.iter().map(|a| a.version).collect();
        let current = applied_set.last().copied().unwrap_or(0);
        let latest = known.last().copied().unwrap_or(0);

        Ok(Status {
            current,
            latest,
            pending: known
                .iter()
                .copied()
                .filter(|v| *v > current && !applied_set.contains(v))
                .collect(),
            unknown: applied_set.difference(&known).copied().collect(),
            applied,
            atomicity: self.store.atomicity(),
        })
    }

    async fn compute_plan(&mut self, target: Version) -> MigrateResult<Plan> {
        // Both listings are read-only, so they may run side by side.
        let (catalog, applied) = tokio::try_join!(self.source.list(), self.store.list())?;
        planner::plan(&catalog, &applied, target).await
    }
}
