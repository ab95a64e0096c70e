use crate::config::{CorruptLogPolicy, RunnerConfig};
use anyhow::{Context, Result};
use campwatch_alert::rules::check_syntax;
use campwatch_alert::{AlertEngine, ExclusionSet, RuleEvaluationError};
use campwatch_common::types::{AlertLog, ExclusionTable};
use campwatch_notify::manager::{DeliveryReport, NotificationManager};
use campwatch_notify::plugin::ChannelRegistry;
use campwatch_storage::error::StorageError;
use campwatch_storage::log_store::JsonFileLogStore;
use campwatch_storage::source::JsonDirSource;
use campwatch_storage::{AlertLogStore, CycleSource};
use chrono::{DateTime, Utc};

/// Everything a cycle needs, built once at startup.
pub struct CycleContext {
    pub engine: AlertEngine,
    pub source: Box<dyn CycleSource>,
    pub log_store: Box<dyn AlertLogStore>,
    pub notifier: NotificationManager,
    pub entity_column: String,
    pub on_corrupt_log: CorruptLogPolicy,
}

impl CycleContext {
    /// Builds the file-backed context described by `config`, instantiating
    /// notification channels through `registry`.
    pub fn from_config(config: &RunnerConfig, registry: &ChannelRegistry) -> Result<Self> {
        let mut channels = Vec::with_capacity(config.channels.len());
        for channel in &config.channels {
            let created = registry
                .create_channel(&channel.channel_type, &channel.config)
                .with_context(|| format!("configuring {} channel", channel.channel_type))?;
            if let Some(plugin) = registry.get_plugin(&channel.channel_type) {
                tracing::info!(
                    channel = %channel.channel_type,
                    config = %plugin.redact_config(&channel.config),
                    "Notification channel configured"
                );
            }
            channels.push(created);
        }
        if channels.is_empty() {
            tracing::warn!("No notification channels configured, alerts will only be logged");
        }

        let mut engine = AlertEngine::new(config.cool_down()).with_derived_metrics(config.derived_metrics.clone());
        if let Some(retention) = config.log_retention() {
            engine = engine.with_retention(retention);
        }

        Ok(Self {
            engine,
            source: Box::new(dir_source(config)),
            log_store: Box::new(JsonFileLogStore::new(config.alert_log_path())),
            notifier: NotificationManager::new(channels),
            entity_column: config.entity_column.clone(),
            on_corrupt_log: config.on_corrupt_log,
        })
    }
}

pub fn dir_source(config: &RunnerConfig) -> JsonDirSource {
    JsonDirSource::with_files(config.snapshot_path(), config.rules_path(), config.exclusions_path())
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub candidates: usize,
    pub sent: Vec<String>,
    pub suppressed: usize,
    pub skipped_rules: usize,
    pub pruned: usize,
    pub delivery: DeliveryReport,
    /// The stored log was corrupt and the cycle started from an empty one.
    pub log_reset: bool,
}

/// True when `err` was caused by an unreadable alert log.
pub fn is_log_corruption(err: &anyhow::Error) -> bool {
    err.downcast_ref::<StorageError>()
        .is_some_and(StorageError::is_log_corruption)
}

fn load_log(ctx: &CycleContext) -> Result<(AlertLog, bool)> {
    match ctx.log_store.load() {
        Ok(log) => Ok((log, false)),
        Err(e) if e.is_log_corruption() && ctx.on_corrupt_log == CorruptLogPolicy::Reset => {
            tracing::error!(error = %e, "Alert log is corrupt, starting from an empty log");
            Ok((AlertLog::new(), true))
        }
        Err(e) => Err(anyhow::Error::new(e).context("loading alert log")),
    }
}

/// Runs one cycle: load state, evaluate, deliver, persist.
///
/// Any error before delivery leaves the stored log untouched and sends
/// nothing. Delivery failures are logged per channel and do not fail the
/// cycle; the log still records the send so the message is not retried
/// before its cool-down.
pub async fn run_cycle(ctx: &CycleContext, now: DateTime<Utc>) -> Result<CycleReport> {
    let (log, log_reset) = load_log(ctx)?;

    let snapshot = ctx.source.snapshot(&ctx.entity_column).context("loading snapshot")?;
    let rules = ctx.source.rules().context("loading rules")?;
    let table = ctx.source.exclusions().context("loading exclusions")?;
    let exclusions = ExclusionSet::from_table(&ctx.entity_column, &table)?;

    let outcome = ctx.engine.run(snapshot, &rules, &exclusions, log, now)?;

    for message in &outcome.to_send {
        tracing::info!(alert = %message, "Sending alert");
    }
    let delivery = ctx.notifier.notify_all(&outcome.to_send).await;

    ctx.log_store.save(&outcome.log).context("saving alert log")?;

    Ok(CycleReport {
        candidates: outcome.candidates.len(),
        sent: outcome.to_send,
        suppressed: outcome.suppressed.len(),
        skipped_rules: outcome.rule_errors.len(),
        pruned: outcome.pruned,
        delivery,
        log_reset,
    })
}

/// Result of compiling the rule table against the current snapshot.
#[derive(Debug, Default)]
pub struct RuleCheck {
    pub rules: usize,
    pub rows: usize,
    pub candidates: usize,
    pub errors: Vec<RuleEvaluationError>,
}

/// Compiles and evaluates every rule against the current snapshot without
/// touching the alert log or sending anything. With an empty snapshot only
/// formula syntax is checked.
pub fn check_rules(ctx: &CycleContext) -> Result<RuleCheck> {
    let snapshot = ctx.source.snapshot(&ctx.entity_column).context("loading snapshot")?;
    let rules = ctx.source.rules().context("loading rules")?;
    let table = ctx.source.exclusions().context("loading exclusions")?;
    let exclusions = ExclusionSet::from_table(&ctx.entity_column, &table)?;

    let rows = snapshot.len();
    if snapshot.is_empty() {
        tracing::warn!("Snapshot is empty, only formula syntax can be checked");
        return Ok(RuleCheck {
            rules: rules.len(),
            rows,
            candidates: 0,
            errors: check_syntax(&rules),
        });
    }
    let evaluation = ctx.engine.evaluate(snapshot, &rules, &exclusions)?;

    Ok(RuleCheck {
        rules: rules.len(),
        rows,
        candidates: evaluation.candidates.len(),
        errors: evaluation.rule_errors,
    })
}

/// Appends a blank exclusion row for every snapshot entity the table does
/// not list yet and writes the table back. Returns the number of rows added.
///
/// A missing or empty table is started in the sheet layout. A non-empty
/// sparse table has no blank-row form and is left unchanged.
pub fn sync_exclusions(source: &JsonDirSource, entity_column: &str) -> Result<usize> {
    let snapshot = source.snapshot(entity_column).context("loading snapshot")?;
    let mut table = source.exclusions().context("loading exclusions")?;
    let unlisted = ExclusionSet::from_table(entity_column, &table)?.unlisted_entities(&snapshot);

    if unlisted.is_empty() {
        return Ok(0);
    }
    if matches!(&table, ExclusionTable::Sparse(entries) if entries.is_empty()) {
        table = ExclusionTable::Wide(Vec::new());
    }

    let added = table.append_blank_rows(entity_column, &unlisted);
    if added == 0 {
        tracing::warn!(
            unlisted = unlisted.len(),
            "Exclusion table uses the sparse layout, new entities not added"
        );
        return Ok(0);
    }

    source.write_exclusions(&table).context("writing exclusions")?;
    tracing::info!(added, entities = ?unlisted, "Exclusion table extended");
    Ok(added)
}
