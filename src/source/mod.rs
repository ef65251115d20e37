//! Migration sources.
//!
//! A source yields the full catalog of available migrations. Payload text is
//! resolved lazily by each [`Migration`], so listing stays cheap.

mod file;
mod memory;

pub use file::{FileMigration, FileSource, Sections, parse_file_name, parse_sections};
pub use memory::{MemoryMigration, MemorySource};

use crate::error::MigrateResult;
use crate::migration::Migration;

/// Yields the catalog of available migrations, in discovery order.
#[allow(async_fn_in_trait)]
pub trait MigrationSource {
    type Migration: Migration;

    async fn list(&self) -> MigrateResult<Vec<Self::Migration>>;
}
