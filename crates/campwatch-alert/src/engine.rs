use crate::dedup::{prune_stale, reconcile, Suppressed};
use crate::derive::apply_derived;
use crate::error::{AlertError, Result, RuleEvaluationError};
use crate::evaluator::evaluate;
use crate::exclusion::{resolve, ExclusionSet};
use crate::rules::compile_rules;
use campwatch_common::types::{AlertLog, CandidateAlert, DerivedMetric, MetricSnapshot, RuleDefinition};
use chrono::{DateTime, Duration, Utc};

/// Default minimum gap between two sends of the same message.
pub const DEFAULT_COOL_DOWN_SECS: i64 = 3600;

/// Candidates produced from one snapshot, plus the rules that had to be
/// skipped.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub candidates: Vec<CandidateAlert>,
    pub rule_errors: Vec<RuleEvaluationError>,
}

/// Everything one cycle produced. `log` replaces the caller's log.
#[derive(Debug)]
pub struct CycleOutcome {
    pub candidates: Vec<CandidateAlert>,
    pub rule_errors: Vec<RuleEvaluationError>,
    pub to_send: Vec<String>,
    pub suppressed: Vec<Suppressed>,
    pub log: AlertLog,
    pub pruned: usize,
}

/// Stateless per-cycle pipeline: derive metrics, resolve exclusions,
/// evaluate rules, reconcile with the alert log.
///
/// The engine holds only configuration. The alert log is passed in and
/// returned by [`run`](Self::run) so the caller owns it between cycles.
pub struct AlertEngine {
    cool_down: Duration,
    retention: Option<Duration>,
    derived: Vec<DerivedMetric>,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_COOL_DOWN_SECS))
    }
}

impl AlertEngine {
    /// A negative `cool_down` is treated as zero.
    pub fn new(cool_down: Duration) -> Self {
        Self {
            cool_down: cool_down.max(Duration::zero()),
            retention: None,
            derived: Vec::new(),
        }
    }

    /// Enables pruning of log entries not sent for longer than `retention`.
    /// Never prunes inside the cool-down, whatever `retention` says.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention.max(self.cool_down));
        self
    }

    pub fn with_derived_metrics(mut self, derived: Vec<DerivedMetric>) -> Self {
        self.derived = derived;
        self
    }

    pub fn cool_down(&self) -> Duration {
        self.cool_down
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }

    /// Evaluates the rules against the snapshot.
    ///
    /// Fails as a whole only when the snapshot schema cannot support the
    /// cycle; an individual broken rule is logged, skipped and reported in
    /// [`Evaluation::rule_errors`].
    pub fn evaluate(
        &self,
        snapshot: MetricSnapshot,
        rules: &[RuleDefinition],
        exclusions: &ExclusionSet,
    ) -> Result<Evaluation> {
        if snapshot.is_empty() {
            tracing::debug!("Empty snapshot, no rules evaluated");
            return Ok(Evaluation::default());
        }

        let entity_column = snapshot.entity_column();
        if !snapshot.dimension_columns().contains(entity_column) {
            return Err(AlertError::SchemaMismatch {
                column: entity_column.to_string(),
                context: "entity identifiers".to_string(),
            });
        }

        let snapshot = apply_derived(snapshot, &self.derived)?;
        let compiled = compile_rules(rules, &snapshot);
        for err in &compiled.errors {
            tracing::warn!(rule = err.rule(), error = %err, "Skipping rule");
        }

        let rows = resolve(&snapshot, exclusions);
        let candidates = evaluate(&rows, &compiled.rules);

        tracing::debug!(
            rows = rows.len(),
            rules = compiled.rules.len(),
            candidates = candidates.len(),
            "Rules evaluated"
        );

        Ok(Evaluation {
            candidates,
            rule_errors: compiled.errors,
        })
    }

    /// Runs one full cycle and returns the messages to send together with
    /// the updated log.
    pub fn run(
        &self,
        snapshot: MetricSnapshot,
        rules: &[RuleDefinition],
        exclusions: &ExclusionSet,
        log: AlertLog,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome> {
        let rows = snapshot.len();
        let evaluation = self.evaluate(snapshot, rules, exclusions)?;
        let reconciled = reconcile(&evaluation.candidates, log, now, self.cool_down);

        let mut log = reconciled.log;
        let pruned = match self.retention {
            Some(retention) => prune_stale(&mut log, now, retention),
            None => 0,
        };

        tracing::info!(
            rows,
            rules = rules.len(),
            skipped_rules = evaluation.rule_errors.len(),
            candidates = evaluation.candidates.len(),
            sent = reconciled.to_send.len(),
            suppressed = reconciled.suppressed.len(),
            log_entries = log.len(),
            pruned,
            "Alert cycle evaluated"
        );

        Ok(CycleOutcome {
            candidates: evaluation.candidates,
            rule_errors: evaluation.rule_errors,
            to_send: reconciled.to_send,
            suppressed: reconciled.suppressed,
            log,
            pruned,
        })
    }
}
