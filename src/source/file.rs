//! File-based migration source.
//!
//! Each migration is one file named `<version>[_<label>].<ext>`:
//!
//! ```text
//! 0003_add_orders.sql
//! ─┬── ─────┬──── ─┬─
//!  │        │      └── Extension (default `sql`)
//!  │        └── Optional label
//!  └── Version (leading zeros allowed)
//! ```
//!
//! File content is split into sections by marker lines:
//!
//! ```sql
//! -- anything before the first marker is ignored
//! --UP--
//! CREATE TABLE orders (id BIGINT PRIMARY KEY);
//! --DOWN--
//! DROP TABLE orders;
//! --SNAPSHOT--
//! CREATE TABLE users (...); CREATE TABLE orders (...);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nom::{
    IResult,
    bytes::complete::take_while1,
    character::complete::{char, digit1},
    combinator::{opt, rest},
    sequence::{preceded, tuple},
};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::debug;

use super::MigrationSource;
use crate::error::{MigrateError, MigrateResult};
use crate::migration::{Migration, Version};

const UP_MARKER: &str = "--UP--";
const DOWN_MARKER: &str = "--DOWN--";
const SNAPSHOT_MARKER: &str = "--SNAPSHOT--";

/// Reads migrations from a directory.
#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
    extension: String,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: "sql".to_string(),
        }
    }

    /// Use a file extension other than `sql`.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Scaffold the next migration file and return its path.
    ///
    /// The new version is one past the highest version in the directory,
    /// which is created if missing.
    pub async fn create(&self, label: &str) -> MigrateResult<PathBuf> {
        if label.is_empty() || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(MigrateError::Config(format!(
                "Invalid migration label '{}': use letters, digits and '_'",
                label
            )));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let next = self
            .list()
            .await?
            .iter()
            .map(|m| m.version())
            .max()
            .unwrap_or(0)
            + 1;

        let path = self
            .dir
            .join(format!("{:04}_{}.{}", next, label, self.extension));
        let template = format!(
            "-- Migration {}: {}\n\n{}\n\n{}\n\n{}\n",
            next, label, UP_MARKER, DOWN_MARKER, SNAPSHOT_MARKER
        );

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(template.as_bytes()).await?;
        file.flush().await?;

        Ok(path)
    }
}

impl MigrationSource for FileSource {
    type Migration = FileMigration;

    async fn list(&self) -> MigrateResult<Vec<FileMigration>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            MigrateError::Catalog(format!("cannot read {}: {}", self.dir.display(), e))
        })?;

        let mut seen: BTreeMap<Version, PathBuf> = BTreeMap::new();
        let mut migrations = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }

            let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
                MigrateError::Catalog(format!("cannot read {}: {}", path.display(), e))
            })?;
            if !metadata.is_file() {
                continue;
            }

            let invalid = || MigrateError::InvalidFileName {
                path: path.clone(),
                extension: self.extension.clone(),
            };
            let name = name.to_str().ok_or_else(invalid)?;

            let (version, label) = parse_file_name(name, &self.extension).ok_or_else(invalid)?;
            if version < 1 {
                return Err(MigrateError::InvalidVersion { path, version });
            }
            if let Some(first) = seen.insert(version, path.clone()) {
                return Err(MigrateError::DuplicateVersion {
                    version,
                    first,
                    second: path,
                });
            }

            migrations.push(FileMigration {
                path,
                version,
                label: label.map(str::to_string),
                sections: OnceCell::new(),
            });
        }

        debug!(dir = %self.dir.display(), count = migrations.len(), "Listed migration files");
        Ok(migrations)
    }
}

/// A migration backed by a file. Content is read on first access and cached.
#[derive(Debug)]
pub struct FileMigration {
    path: PathBuf,
    version: Version,
    label: Option<String>,
    sections: OnceCell<Sections>,
}

/// The three payloads of a migration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections {
    pub up: String,
    pub down: String,
    pub snapshot: String,
}

impl FileMigration {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    async fn sections(&self) -> MigrateResult<&Sections> {
        self.sections
            .get_or_try_init(|| async {
                let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
                    MigrateError::Io(std::io::Error::new(
                        e.kind(),
                        format!("{}: {}", self.path.display(), e),
                    ))
                })?;
                Ok::<_, MigrateError>(parse_sections(&content))
            })
            .await
    }
}

impl Migration for FileMigration {
    fn version(&self) -> Version {
        self.version
    }

    async fn forward(&self) -> MigrateResult<String> {
        Ok(self.sections().await?.up.clone())
    }

    async fn backward(&self) -> MigrateResult<String> {
        Ok(self.sections().await?.down.clone())
    }

    async fn snapshot(&self) -> MigrateResult<String> {
        Ok(self.sections().await?.snapshot.clone())
    }
}

/// Parse `<digits>[_<label>].<ext>`.
fn file_name(input: &str) -> IResult<&str, (&str, Option<&str>, &str)> {
    tuple((
        digit1,
        opt(preceded(char('_'), take_while1(|c: char| c != '.'))),
        preceded(char('.'), rest),
    ))(input)
}

/// Extract version and label from a migration file name.
///
/// Returns `None` when the name does not match or the extension differs.
pub fn parse_file_name<'a>(name: &'a str, extension: &str) -> Option<(Version, Option<&'a str>)> {
    match file_name(name) {
        Ok(("", (digits, label, ext))) if ext == extension => {
            digits.parse::<Version>().ok().map(|v| (v, label))
        }
        _ => None,
    }
}

/// Split file content into up, down and snapshot sections.
pub fn parse_sections(content: &str) -> Sections {
    #[derive(Clone, Copy)]
    enum Section {
        Outside,
        Up,
        Down,
        Snapshot,
    }

    let mut current = Section::Outside;
    let mut sections = Sections::default();

    for line in content.lines() {
        match line.trim() {
            UP_MARKER => current = Section::Up,
            DOWN_MARKER => current = Section::Down,
            SNAPSHOT_MARKER => current = Section::Snapshot,
            _ => {
                let buf = match current {
                    Section::Outside => continue,
                    Section::Up => &mut sections.up,
                    Section::Down => &mut sections.down,
                    Section::Snapshot => &mut sections.snapshot,
                };
                buf.push_str(line);
                buf.push('\n');
            }
        }
    }

    for buf in [&mut sections.up, &mut sections.down, &mut sections.snapshot] {
        *buf = buf.trim().to_string();
    }

    sections
}
