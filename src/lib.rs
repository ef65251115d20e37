//! # sqlshift: versioned SQL migrations
//!
//! > **Plan first. Apply one step at a time. Never half-apply a step.**
//!
//! sqlshift moves a database from its applied version set to a target
//! version, up or down, using migrations that carry pre-written SQL.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use sqlshift::prelude::*;
//!
//! let source = FileSource::new("migrations");
//! let store = SqlStore::connect("postgres://localhost/app").await?;
//! let mut migrator = Migrator::new(source, store);
//!
//! // Inspect what would run
//! let plan = migrator.plan(5).await?;
//!
//! // Run it
//! let report = migrator.migrate(5).await?;
//! ```
//!
//! ## Migration files
//!
//! | Marker         | Section  | Used for                                  |
//! |----------------|----------|-------------------------------------------|
//! | `--UP--`       | forward  | applying the migration                    |
//! | `--DOWN--`     | backward | reverting the migration                   |
//! | `--SNAPSHOT--` | snapshot | building this version from an empty store |
//!
//! ## Deployment
//!
//! Run a single migrator per database at a time. sqlshift takes no lock of
//! its own; serialize concurrent deploys externally.

pub mod config;
pub mod error;
pub mod executor;
pub mod migration;
pub mod migrator;
pub mod planner;
pub mod source;
pub mod store;

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::*;
    pub use crate::executor::ExecutionReport;
    pub use crate::migration::{Action, Direction, Migration, Payload, Version};
    pub use crate::migrator::{Migrator, Status};
    pub use crate::planner::{Plan, PlanNote};
    pub use crate::source::{FileSource, MemoryMigration, MemorySource, MigrationSource};
    pub use crate::store::{AppliedStore, AppliedVersion, Atomicity, MemoryStore, SqlStore};
}

pub use migrator::Migrator;
pub use planner::plan;
