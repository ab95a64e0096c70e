use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Entity id assigned to rows whose entity dimension has no value.
pub const MISSING_ENTITY: &str = "None";

/// One row of a metric snapshot: dimension values plus numeric metrics.
///
/// A metric stored as `None` (or a NaN that slipped through) is the
/// "no value" marker; it is never read back as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    #[serde(default)]
    pub dimensions: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, Option<f64>>,
}

impl MetricRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, name: &str, value: &str) -> Self {
        self.dimensions.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        let value = if value.is_nan() { None } else { Some(value) };
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn with_missing(mut self, name: &str) -> Self {
        self.metrics.insert(name.to_string(), None);
        self
    }

    /// Returns the metric value, or `None` when it is absent, null or NaN.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .get(name)
            .copied()
            .flatten()
            .filter(|v| !v.is_nan())
    }

    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions.get(name).map(String::as_str)
    }
}

/// Whether a snapshot column carries dimension text or numeric metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Dimension,
    Metric,
}

/// A single cycle's table of metric rows together with its column schema.
///
/// # Examples
///
/// ```
/// use campwatch_common::types::{ColumnKind, MetricRow, MetricSnapshot};
///
/// let rows = vec![
///     MetricRow::new().with_dimension("campaign", "E1").with_metric("playerload", 10.0),
///     MetricRow::new().with_metric("playerload", 4.0),
/// ];
/// let snapshot = MetricSnapshot::new("campaign", rows);
/// assert_eq!(snapshot.column_kind("playerload"), Some(ColumnKind::Metric));
/// assert_eq!(snapshot.entity_of(&snapshot.rows()[0]), "E1");
/// assert_eq!(snapshot.entity_of(&snapshot.rows()[1]), "None");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    entity_column: String,
    dimensions: BTreeSet<String>,
    metrics: BTreeSet<String>,
    rows: Vec<MetricRow>,
}

impl MetricSnapshot {
    /// Builds a snapshot whose schema is the union of the columns seen in `rows`.
    pub fn new(entity_column: &str, rows: Vec<MetricRow>) -> Self {
        let mut dimensions = BTreeSet::new();
        let mut metrics = BTreeSet::new();
        for row in &rows {
            dimensions.extend(row.dimensions.keys().cloned());
            metrics.extend(row.metrics.keys().cloned());
        }
        Self {
            entity_column: entity_column.to_string(),
            dimensions,
            metrics,
            rows,
        }
    }

    /// Builds a snapshot from flat report records such as
    /// `{"campaign": "dogs", "playerload": 120, "prerollplay": null}`.
    ///
    /// A column holding any string or boolean is a dimension; the remaining
    /// columns are metrics. `null` is read as "no value". The entity column
    /// is always a dimension.
    pub fn from_records(entity_column: &str, records: Vec<Map<String, Value>>) -> Self {
        let mut dimensions = BTreeSet::new();
        let mut metrics = BTreeSet::new();
        for record in &records {
            for (name, value) in record {
                match value {
                    Value::Null | Value::Number(_) => {
                        metrics.insert(name.clone());
                    }
                    _ => {
                        dimensions.insert(name.clone());
                    }
                }
            }
        }
        if metrics.remove(entity_column) {
            dimensions.insert(entity_column.to_string());
        }
        metrics.retain(|name| !dimensions.contains(name));

        let rows = records
            .into_iter()
            .map(|record| {
                let mut row = MetricRow::new();
                for (name, value) in record {
                    if dimensions.contains(&name) {
                        let text = match value {
                            Value::Null => continue,
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        row.dimensions.insert(name, text);
                    } else {
                        let number = value.as_f64().filter(|v| !v.is_nan());
                        row.metrics.insert(name, number);
                    }
                }
                row
            })
            .collect();

        Self {
            entity_column: entity_column.to_string(),
            dimensions,
            metrics,
            rows,
        }
    }

    pub fn entity_column(&self) -> &str {
        &self.entity_column
    }

    pub fn rows(&self) -> &[MetricRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dimension_columns(&self) -> &BTreeSet<String> {
        &self.dimensions
    }

    pub fn metric_columns(&self) -> &BTreeSet<String> {
        &self.metrics
    }

    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        if self.metrics.contains(name) {
            Some(ColumnKind::Metric)
        } else if self.dimensions.contains(name) {
            Some(ColumnKind::Dimension)
        } else {
            None
        }
    }

    /// Every column name in the schema, dimensions first.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.dimensions
            .iter()
            .chain(self.metrics.iter())
            .map(String::as_str)
    }

    /// Entity id of a row, falling back to [`MISSING_ENTITY`].
    pub fn entity_of<'a>(&self, row: &'a MetricRow) -> &'a str {
        row.dimension(&self.entity_column).unwrap_or(MISSING_ENTITY)
    }

    /// Distinct entity ids present in the snapshot.
    pub fn entities(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .map(|row| self.entity_of(row).to_string())
            .collect()
    }

    /// Returns a new snapshot with one more metric column. `values` is
    /// aligned with [`rows`](Self::rows); missing trailing values read as
    /// "no value".
    pub fn with_metric_column(self, name: &str, values: Vec<Option<f64>>) -> Self {
        let Self {
            entity_column,
            mut dimensions,
            mut metrics,
            rows,
        } = self;
        let mut values = values.into_iter();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                let value = values.next().flatten().filter(|v| !v.is_nan());
                row.dimensions.remove(name);
                row.metrics.insert(name.to_string(), value);
                row
            })
            .collect();
        dimensions.remove(name);
        metrics.insert(name.to_string());
        Self {
            entity_column,
            dimensions,
            metrics,
            rows,
        }
    }
}

/// A rule as it arrives from the rule sheet: a unique name plus a boolean
/// formula over snapshot columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    #[serde(alias = "alertName")]
    pub name: String,
    pub formula: String,
}

impl RuleDefinition {
    pub fn new(name: &str, formula: &str) -> Self {
        Self {
            name: name.to_string(),
            formula: formula.to_string(),
        }
    }
}

/// A numeric column computed from other columns before rules run
/// (e.g. `preroll/playerload = prerollplay / playerload`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub name: String,
    pub formula: String,
}

/// One cell of the sparse exclusion table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionEntry {
    #[serde(alias = "campaign")]
    pub entity: String,
    pub rule: String,
    #[serde(default = "default_excluded")]
    pub excluded: bool,
}

fn default_excluded() -> bool {
    true
}

/// The exclusion table in either of its stored layouts.
///
/// `Sparse` is a list of [`ExclusionEntry`] cells. `Wide` is the sheet
/// layout: one row per entity, one column per rule, `x` marking exclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExclusionTable {
    Sparse(Vec<ExclusionEntry>),
    Wide(Vec<BTreeMap<String, String>>),
}

impl Default for ExclusionTable {
    fn default() -> Self {
        Self::Sparse(Vec::new())
    }
}

impl ExclusionTable {
    /// Appends a blank wide-layout row for each entity so it shows up for
    /// review. Sparse tables have no notion of a blank row and are left as is.
    pub fn append_blank_rows(&mut self, entity_column: &str, entities: &[String]) -> usize {
        match self {
            Self::Sparse(_) => 0,
            Self::Wide(rows) => {
                rows.extend(entities.iter().map(|entity| {
                    BTreeMap::from([(entity_column.to_string(), entity.clone())])
                }));
                entities.len()
            }
        }
    }
}

/// Formats the alert text for a rule and its affected entities.
///
/// The text is the alert's identity in the log, so entities are always
/// rendered in lexicographic order.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeSet;
/// use campwatch_common::types::format_alert_message;
///
/// let entities: BTreeSet<String> = ["E2", "E1"].iter().map(|s| s.to_string()).collect();
/// assert_eq!(
///     format_alert_message("no-fill", &entities),
///     "no-fill: check entities: 'E1, E2'"
/// );
/// ```
pub fn format_alert_message(rule_name: &str, entities: &BTreeSet<String>) -> String {
    let joined = entities
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{rule_name}: check entities: '{joined}'")
}

/// A rule that holds on at least one non-excluded row this cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAlert {
    pub rule_name: String,
    pub entities: BTreeSet<String>,
    pub message: String,
}

impl CandidateAlert {
    pub fn new(rule_name: &str, entities: BTreeSet<String>) -> Self {
        let message = format_alert_message(rule_name, &entities);
        Self {
            rule_name: rule_name.to_string(),
            entities,
            message,
        }
    }
}

/// When an alert message was last actually sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLogEntry {
    pub message: String,
    pub last_fired_at: DateTime<Utc>,
}

/// Alert history keyed by message text. Serialized as a list of entries;
/// a list that repeats a message is rejected on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<AlertLogEntry>", try_from = "Vec<AlertLogEntry>")]
pub struct AlertLog {
    entries: BTreeMap<String, AlertLogEntry>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, message: &str) -> Option<&AlertLogEntry> {
        self.entries.get(message)
    }

    pub fn contains(&self, message: &str) -> bool {
        self.entries.contains_key(message)
    }

    /// Inserts or replaces the entry for `entry.message`.
    pub fn insert(&mut self, entry: AlertLogEntry) -> Option<AlertLogEntry> {
        self.entries.insert(entry.message.clone(), entry)
    }

    pub fn remove(&mut self, message: &str) -> Option<AlertLogEntry> {
        self.entries.remove(message)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&AlertLogEntry) -> bool) {
        self.entries.retain(|_, entry| keep(entry));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlertLogEntry> {
        self.entries.values()
    }
}

impl From<AlertLog> for Vec<AlertLogEntry> {
    fn from(log: AlertLog) -> Self {
        log.entries.into_values().collect()
    }
}

impl TryFrom<Vec<AlertLogEntry>> for AlertLog {
    type Error = String;

    fn try_from(entries: Vec<AlertLogEntry>) -> Result<Self, Self::Error> {
        let mut log = AlertLog::new();
        for entry in entries {
            let message = entry.message.clone();
            if log.insert(entry).is_some() {
                return Err(format!("duplicate alert log entry for message: {message}"));
            }
        }
        Ok(log)
    }
}
