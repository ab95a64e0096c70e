use crate::exclusion::AnnotatedRow;
use crate::rules::Rule;
use campwatch_common::types::CandidateAlert;
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Evaluates every rule against the annotated rows and returns one
/// candidate per rule that holds somewhere, in rule order.
///
/// Rules only share read access to `rows`, so they run in parallel.
pub fn evaluate(rows: &[AnnotatedRow<'_>], rules: &[Rule]) -> Vec<CandidateAlert> {
    rules
        .par_iter()
        .filter_map(|rule| evaluate_rule(rows, rule))
        .collect()
}

/// Exclusions are applied before the condition: an excluded row never
/// joins the holding set, whatever its values.
pub fn evaluate_rule(rows: &[AnnotatedRow<'_>], rule: &Rule) -> Option<CandidateAlert> {
    let entities: BTreeSet<String> = rows
        .iter()
        .filter(|row| !row.is_excluded_for(rule.name()))
        .filter(|row| rule.holds(row.row()))
        .map(|row| row.entity().to_string())
        .collect();

    if entities.is_empty() {
        return None;
    }

    tracing::debug!(rule = rule.name(), entities = entities.len(), "Rule holds");
    Some(CandidateAlert::new(rule.name(), entities))
}
