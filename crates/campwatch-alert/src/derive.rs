use crate::error::{AlertError, FormulaError, Result};
use crate::rules::formula::compile_numeric;
use campwatch_common::types::{DerivedMetric, MetricSnapshot};

/// Appends each derived metric as a new column, in order, so later
/// definitions may build on earlier ones.
pub fn apply_derived(mut snapshot: MetricSnapshot, derived: &[DerivedMetric]) -> Result<MetricSnapshot> {
    for metric in derived {
        let expr = compile_numeric(&metric.formula, &snapshot).map_err(|e| match e {
            FormulaError::UnknownField(column) => AlertError::SchemaMismatch {
                column,
                context: format!("derived metric '{}'", metric.name),
            },
            other => AlertError::InvalidDerivedMetric {
                name: metric.name.clone(),
                reason: other.to_string(),
            },
        })?;
        let values = snapshot.rows().iter().map(|row| expr.eval(row)).collect();
        snapshot = snapshot.with_metric_column(&metric.name, values);
    }
    Ok(snapshot)
}
