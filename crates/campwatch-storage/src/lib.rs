//! Persistence for the alert log and file-backed cycle inputs.
//!
//! The alert log is the only state that outlives a cycle. It is read at the
//! start of a cycle and written back at the end through an
//! [`AlertLogStore`]; [`log_store::JsonFileLogStore`] keeps it in a JSON file
//! and [`log_store::MemoryLogStore`] in process memory. Snapshots, rules and
//! exclusions come from a [`CycleSource`].

pub mod error;
pub mod log_store;
pub mod source;


use campwatch_common::types::{AlertLog, ExclusionTable, MetricSnapshot, RuleDefinition};
use error::Result;

/// Storage backend for the alert log.
///
/// Implementations must be `Send + Sync` so the runner can hold them across
/// `.await` points in its polling loop.
pub trait AlertLogStore: Send + Sync {
    /// Loads the log. A store that has never been written returns an empty
    /// log; a store whose content cannot be parsed returns
    /// [`error::StorageError::LogCorruption`].
    fn load(&self) -> Result<AlertLog>;

    /// Replaces the stored log.
    fn save(&self, log: &AlertLog) -> Result<()>;
}

/// Supplies one cycle's snapshot, rules and exclusions.
pub trait CycleSource: Send + Sync {
    fn snapshot(&self, entity_column: &str) -> Result<MetricSnapshot>;

    fn rules(&self) -> Result<Vec<RuleDefinition>>;

    /// Returns the exclusion table. No exclusion data means nothing is
    /// excluded.
    fn exclusions(&self) -> Result<ExclusionTable>;
}
