//! In-memory migration source for tests and embedding.

use super::MigrationSource;
use crate::error::{MigrateError, MigrateResult};
use crate::migration::{Migration, Payload, Version};

/// A migration whose payloads are held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryMigration {
    version: Version,
    up: String,
    down: String,
    snapshot: String,
    broken: Option<Payload>,
}

impl MemoryMigration {
    pub fn new(version: Version, up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            version,
            up: up.into(),
            down: down.into(),
            ..Default::default()
        }
    }

    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot = snapshot.into();
        self
    }

    /// Make resolving `payload` fail.
    pub fn failing(mut self, payload: Payload) -> Self {
        self.broken = Some(payload);
        self
    }

    fn resolve(&self, payload: Payload, text: &str) -> MigrateResult<String> {
        if self.broken == Some(payload) {
            return Err(MigrateError::Catalog(format!(
                "{} text of migration {} is unavailable",
                payload, self.version
            )));
        }
        Ok(text.to_string())
    }
}

impl Migration for MemoryMigration {
    fn version(&self) -> Version {
        self.version
    }

    async fn forward(&self) -> MigrateResult<String> {
        self.resolve(Payload::Forward, &self.up)
    }

    async fn backward(&self) -> MigrateResult<String> {
        self.resolve(Payload::Backward, &self.down)
    }

    async fn snapshot(&self) -> MigrateResult<String> {
        self.resolve(Payload::Snapshot, &self.snapshot)
    }
}

/// A fixed catalog of [`MemoryMigration`]s.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    migrations: Vec<MemoryMigration>,
    failure: Option<String>,
}

impl MemorySource {
    pub fn new(migrations: Vec<MemoryMigration>) -> Self {
        Self {
            migrations,
            failure: None,
        }
    }

    /// A source whose listing always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            migrations: Vec::new(),
            failure: Some(message.into()),
        }
    }

    pub fn push(&mut self, migration: MemoryMigration) {
        self.migrations.push(migration);
    }
}

impl MigrationSource for MemorySource {
    type Migration = MemoryMigration;

    async fn list(&self) -> MigrateResult<Vec<MemoryMigration>> {
        match &self.failure {
            Some(message) => Err(MigrateError::Catalog(message.clone())),
            None => Ok(self.migrations.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_payload_only_affects_that_payload() {
        let m = MemoryMigration::new(1, "up", "down").failing(Payload::Backward);
        assert_eq!(m.forward().await.unwrap(), "up");
        assert_eq!(m.snapshot().await.unwrap(), "");
        assert!(m.backward().await.is_err());
    }

    #[tokio::test]
    async fn test_failing_source() {
        let err = MemorySource::failing("offline").list().await.unwrap_err();
        assert_eq!(err.to_string(), "Catalog error: offline");
    }
}
