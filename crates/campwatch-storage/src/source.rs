use crate::error::{Result, StorageError};
use crate::CycleSource;
use campwatch_common::types::{ExclusionTable, MetricSnapshot, RuleDefinition};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const DEFAULT_SNAPSHOT_FILE: &str = "snapshot.json";
pub const DEFAULT_RULES_FILE: &str = "rules.json";
pub const DEFAULT_EXCLUSIONS_FILE: &str = "exclusions.json";

/// Reads cycle inputs from JSON files in one directory, re-reading them on
/// every call so edits between cycles are picked up.
///
/// - snapshot: list of flat report records
/// - rules: list of `{name, formula}`
/// - exclusions: sparse `{entity, rule, excluded}` list or wide sheet rows
pub struct JsonDirSource {
    snapshot_path: PathBuf,
    rules_path: PathBuf,
    exclusions_path: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::with_files(
            dir.join(DEFAULT_SNAPSHOT_FILE),
            dir.join(DEFAULT_RULES_FILE),
            dir.join(DEFAULT_EXCLUSIONS_FILE),
        )
    }

    pub fn with_files(snapshot_path: PathBuf, rules_path: PathBuf, exclusions_path: PathBuf) -> Self {
        Self {
            snapshot_path,
            rules_path,
            exclusions_path,
        }
    }

    pub fn exclusions_path(&self) -> &Path {
        &self.exclusions_path
    }

    /// Overwrites the exclusions file, e.g. after appending rows for newly
    /// seen entities.
    pub fn write_exclusions(&self, table: &ExclusionTable) -> Result<()> {
        let body = serde_json::to_string_pretty(table)?;
        std::fs::write(&self.exclusions_path, body).map_err(|source| StorageError::Io {
            path: self.exclusions_path.clone(),
            source,
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &'static str) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| StorageError::InvalidSource {
        what,
        path: path.to_path_buf(),
        source,
    })
}

impl CycleSource for JsonDirSource {
    fn snapshot(&self, entity_column: &str) -> Result<MetricSnapshot> {
        let records: Vec<Map<String, Value>> = read_json(&self.snapshot_path, "snapshot")?;
        Ok(MetricSnapshot::from_records(entity_column, records))
    }

    fn rules(&self) -> Result<Vec<RuleDefinition>> {
        read_json(&self.rules_path, "rules")
    }

    fn exclusions(&self) -> Result<ExclusionTable> {
        if !self.exclusions_path.exists() {
            tracing::debug!(
                path = %self.exclusions_path.display(),
                "No exclusions file, nothing excluded"
            );
            return Ok(ExclusionTable::default());
        }
        read_json(&self.exclusions_path, "exclusions")
    }
}
