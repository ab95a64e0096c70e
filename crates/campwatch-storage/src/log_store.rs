use crate::error::{Result, StorageError};
use crate::AlertLogStore;
use campwatch_common::types::AlertLog;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Alert log kept as a JSON list of `{message, last_fired_at}` entries.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-write leaves the previous log intact.
pub struct JsonFileLogStore {
    path: PathBuf,
}

impl JsonFileLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl AlertLogStore for JsonFileLogStore {
    fn load(&self) -> Result<AlertLog> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No alert log yet, starting empty");
                return Ok(AlertLog::new());
            }
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| StorageError::LogCorruption {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, log: &AlertLog) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let body = serde_json::to_string_pretty(log)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, body).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::debug!(path = %self.path.display(), entries = log.len(), "Alert log saved");
        Ok(())
    }
}

/// Alert log held in process memory, for embedding and tests.
#[derive(Default)]
pub struct MemoryLogStore {
    log: Mutex<AlertLog>,
}

impl MemoryLogStore {
    pub fn new(log: AlertLog) -> Self {
        Self {
            log: Mutex::new(log),
        }
    }

    pub fn snapshot(&self) -> AlertLog {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl AlertLogStore for MemoryLogStore {
    fn load(&self) -> Result<AlertLog> {
        Ok(self.snapshot())
    }

    fn save(&self, log: &AlertLog) -> Result<()> {
        let mut guard = self
            .log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = log.clone();
        Ok(())
    }
}
