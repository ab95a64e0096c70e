//! Alert evaluation and deduplication for tabular metric snapshots.
//!
//! Each cycle the [`engine::AlertEngine`] annotates snapshot rows with
//! per-entity exclusions, evaluates every rule's formula against the rows
//! it is allowed to see, and merges the resulting candidate alerts into
//! the alert log so that a message is re-sent only after its cool-down.

pub mod dedup;
pub mod derive;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod exclusion;
pub mod rules;

#[cfg(test)]
mod tests;

pub use engine::{AlertEngine, CycleOutcome, Evaluation};
pub use error::{AlertError, RuleEvaluationError};
pub use exclusion::ExclusionSet;
