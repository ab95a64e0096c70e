use crate::dedup::reconcile;
use crate::engine::AlertEngine;
use crate::error::{AlertError, RuleEvaluationError};
use crate::evaluator::evaluate;
use crate::exclusion::{resolve, ExclusionSet};
use crate::rules::Rule;
use campwatch_common::types::{
    AlertLog, AlertLogEntry, CandidateAlert, DerivedMetric, MetricRow, MetricSnapshot, RuleDefinition,
};
use chrono::{DateTime, Duration, Utc};

const NO_FILL: &str = "no-fill: check entities: 'E1'";

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn ratio_row(entity: &str, ratio: f64) -> MetricRow {
    MetricRow::new()
        .with_dimension("campaign", entity)
        .with_metric("preroll/playerload", ratio)
        .with_metric("playerload", 100.0)
}

fn scenario_snapshot() -> MetricSnapshot {
    MetricSnapshot::new("campaign", vec![ratio_row("E1", 0.1), ratio_row("E2", 0.5)])
}

fn no_fill_rule() -> Vec<RuleDefinition> {
    vec![RuleDefinition::new("no-fill", "preroll/playerload < 0.2")]
}

fn engine() -> AlertEngine {
    AlertEngine::new(Duration::seconds(3600))
}

#[test]
fn cool_down_scenario_sends_suppresses_then_resends() {
    let engine = engine();
    let exclusions = ExclusionSet::new();

    let first = engine
        .run(scenario_snapshot(), &no_fill_rule(), &exclusions, AlertLog::new(), at(0))
        .unwrap();
    assert_eq!(first.to_send, vec![NO_FILL.to_string()]);
    assert_eq!(first.log.get(NO_FILL).unwrap().last_fired_at, at(0));

    let second = engine
        .run(scenario_snapshot(), &no_fill_rule(), &exclusions, first.log, at(1800))
        .unwrap();
    assert!(second.to_send.is_empty());
    assert_eq!(second.suppressed.len(), 1);
    assert_eq!(second.suppressed[0].message, NO_FILL);
    assert_eq!(second.suppressed[0].remaining, Duration::seconds(1800));
    assert_eq!(second.log.get(NO_FILL).unwrap().last_fired_at, at(0));

    let third = engine
        .run(scenario_snapshot(), &no_fill_rule(), &exclusions, second.log, at(3700))
        .unwrap();
    assert_eq!(third.to_send, vec![NO_FILL.to_string()]);
    assert_eq!(third.log.get(NO_FILL).unwrap().last_fired_at, at(3700));
}

#[test]
fn newly_excluded_entity_drops_candidate_and_keeps_log_entry() {
    let engine = engine();

    let first = engine
        .run(scenario_snapshot(), &no_fill_rule(), &ExclusionSet::new(), AlertLog::new(), at(0))
        .unwrap();
    assert_eq!(first.to_send.len(), 1);

    let mut exclusions = ExclusionSet::new();
    exclusions.exclude("E1", "no-fill");
    let second = engine
        .run(scenario_snapshot(), &no_fill_rule(), &exclusions, first.log.clone(), at(1800))
        .unwrap();

    assert!(second.candidates.is_empty());
    assert!(second.to_send.is_empty());
    assert!(second.suppressed.is_empty());
    assert_eq!(second.log, first.log);
}

#[test]
fn exclusion_applies_to_named_rule_only() {
    let rules = vec![
        RuleDefinition::new("no-fill", "preroll/playerload < 0.2"),
        RuleDefinition::new("broken-player", "playerload > 50"),
    ];
    let mut exclusions = ExclusionSet::new();
    exclusions.exclude("E1", "no-fill");

    let evaluation = engine()
        .evaluate(scenario_snapshot(), &rules, &exclusions)
        .unwrap();

    assert_eq!(evaluation.candidates.len(), 1);
    let candidate = &evaluation.candidates[0];
    assert_eq!(candidate.rule_name, "broken-player");
    assert!(candidate.entities.contains("E1"));
    assert!(candidate.entities.contains("E2"));
    assert_eq!(candidate.message, "broken-player: check entities: 'E1, E2'");
}

#[test]
fn excluded_row_never_joins_holding_set_even_when_condition_is_always_true() {
    let snapshot = scenario_snapshot();
    let mut exclusions = ExclusionSet::new();
    exclusions.exclude("E1", "always");
    exclusions.exclude("E2", "always");

    let rows = resolve(&snapshot, &exclusions);
    let rules = vec![Rule::new("always", |_: &MetricRow| true)];
    assert!(evaluate(&rows, &rules).is_empty());
}

#[test]
fn broken_rule_does_not_block_other_rules() {
    let rules = vec![
        RuleDefinition::new("broken", "prerollz > 1"),
        RuleDefinition::new("no-fill", "preroll/playerload < 0.2"),
    ];

    let evaluation = engine()
        .evaluate(scenario_snapshot(), &rules, &ExclusionSet::new())
        .unwrap();

    assert_eq!(evaluation.candidates.len(), 1);
    assert_eq!(evaluation.candidates[0].message, NO_FILL);
    assert_eq!(
        evaluation.rule_errors,
        vec![RuleEvaluationError::UnknownField {
            rule: "broken".into(),
            field: "prerollz".into(),
        }]
    );
}

#[test]
fn malformed_and_duplicate_rules_are_reported() {
    let rules = vec![
        RuleDefinition::new("no-fill", "preroll/playerload < 0.2"),
        RuleDefinition::new("no-fill", "playerload > 1"),
        RuleDefinition::new("bad", "playerload >"),
    ];

    let evaluation = engine()
        .evaluate(scenario_snapshot(), &rules, &ExclusionSet::new())
        .unwrap();

    assert_eq!(evaluation.candidates.len(), 1);
    assert_eq!(evaluation.candidates[0].message, NO_FILL);
    assert_eq!(evaluation.rule_errors.len(), 2);
    assert!(matches!(
        &evaluation.rule_errors[0],
        RuleEvaluationError::DuplicateName { rule } if rule == "no-fill"
    ));
    assert!(matches!(
        &evaluation.rule_errors[1],
        RuleEvaluationError::Malformed { rule, .. } if rule == "bad"
    ));
}

#[test]
fn suppression_depends_on_gap_versus_cool_down() {
    let cool_down = Duration::seconds(600);
    let candidate = CandidateAlert::new("r", ["a".to_string()].into_iter().collect());

    for (gap, expected_sends) in [(0, 1), (1, 1), (599, 1), (600, 2), (601, 2), (86_400, 2)] {
        let first = reconcile(std::slice::from_ref(&candidate), AlertLog::new(), at(0), cool_down);
        let second = reconcile(std::slice::from_ref(&candidate), first.log, at(gap), cool_down);
        let sends = first.to_send.len() + second.to_send.len();
        assert_eq!(sends, expected_sends, "gap {gap}s");
    }
}

#[test]
fn changed_entity_set_is_a_new_alert() {
    let engine = engine();
    let first = engine
        .run(scenario_snapshot(), &no_fill_rule(), &ExclusionSet::new(), AlertLog::new(), at(0))
        .unwrap();

    let wider = MetricSnapshot::new(
        "campaign",
        vec![ratio_row("E1", 0.1), ratio_row("E2", 0.5), ratio_row("E3", 0.05)],
    );
    let second = engine
        .run(wider, &no_fill_rule(), &ExclusionSet::new(), first.log, at(60))
        .unwrap();

    assert_eq!(second.to_send, vec!["no-fill: check entities: 'E1, E3'".to_string()]);
    assert_eq!(second.log.len(), 2);
    assert_eq!(second.log.get(NO_FILL).unwrap().last_fired_at, at(0));
}

#[test]
fn identical_inputs_give_identical_output() {
    let rules = vec![
        RuleDefinition::new("no-fill", "preroll/playerload < 0.6"),
        RuleDefinition::new("busy", "playerload >= 100"),
    ];
    let mut log = AlertLog::new();
    log.insert(AlertLogEntry {
        message: "busy: check entities: 'E1, E2'".into(),
        last_fired_at: at(-100),
    });

    let run = || {
        engine()
            .run(scenario_snapshot(), &rules, &ExclusionSet::new(), log.clone(), at(0))
            .unwrap()
    };
    let a = run();
    let b = run();

    assert_eq!(a.to_send, b.to_send);
    assert_eq!(a.log, b.log);
    assert_eq!(a.to_send, vec!["no-fill: check entities: 'E1, E2'".to_string()]);
}

#[test]
fn candidates_follow_rule_order() {
    let rules: Vec<RuleDefinition> = (0..64)
        .map(|i| RuleDefinition::new(&format!("rule-{i:02}"), "playerload > 0"))
        .collect();

    let evaluation = engine()
        .evaluate(scenario_snapshot(), &rules, &ExclusionSet::new())
        .unwrap();

    let names: Vec<&str> = evaluation.candidates.iter().map(|c| c.rule_name.as_str()).collect();
    let expected: Vec<String> = (0..64).map(|i| format!("rule-{i:02}")).collect();
    assert_eq!(names, expected);
}

#[test]
fn missing_entity_column_aborts_cycle() {
    let snapshot = MetricSnapshot::new("campaign", vec![MetricRow::new().with_metric("playerload", 1.0)]);
    let err = engine()
        .run(snapshot, &no_fill_rule(), &ExclusionSet::new(), AlertLog::new(), at(0))
        .unwrap_err();
    assert!(matches!(err, AlertError::SchemaMismatch { ref column, .. } if column == "campaign"));
}

#[test]
fn missing_metric_values_never_fire() {
    let snapshot = MetricSnapshot::new(
        "campaign",
        vec![
            MetricRow::new()
                .with_dimension("campaign", "E1")
                .with_missing("preroll/playerload"),
            MetricRow::new()
                .with_dimension("campaign", "E2")
                .with_metric("preroll/playerload", f64::NAN),
        ],
    );
    let evaluation = engine()
        .evaluate(snapshot, &no_fill_rule(), &ExclusionSet::new())
        .unwrap();
    assert!(evaluation.candidates.is_empty());
    assert!(evaluation.rule_errors.is_empty());
}

#[test]
fn derived_metrics_feed_rules() {
    let snapshot = MetricSnapshot::new(
        "campaign",
        vec![
            MetricRow::new()
                .with_dimension("campaign", "E1")
                .with_metric("prerollplay", 1.0)
                .with_metric("playerload", 10.0),
            MetricRow::new()
                .with_dimension("campaign", "E2")
                .with_metric("prerollplay", 5.0)
                .with_metric("playerload", 10.0),
        ],
    );
    let engine = engine().with_derived_metrics(vec![DerivedMetric {
        name: "preroll/playerload".into(),
        formula: "prerollplay / playerload".into(),
    }]);

    let outcome = engine
        .run(snapshot, &no_fill_rule(), &ExclusionSet::new(), AlertLog::new(), at(0))
        .unwrap();
    assert_eq!(outcome.to_send, vec![NO_FILL.to_string()]);
}

#[test]
fn empty_snapshot_carries_log_forward() {
    let mut log = AlertLog::new();
    log.insert(AlertLogEntry {
        message: NO_FILL.into(),
        last_fired_at: at(0),
    });
    let outcome = engine()
        .run(
            MetricSnapshot::new("campaign", Vec::new()),
            &no_fill_rule(),
            &ExclusionSet::new(),
            log.clone(),
            at(10),
        )
        .unwrap();
    assert!(outcome.to_send.is_empty());
    assert_eq!(outcome.log, log);
}

#[test]
fn retention_prunes_entries_that_stopped_firing() {
    let mut log = AlertLog::new();
    log.insert(AlertLogEntry {
        message: "stale: check entities: 'X'".into(),
        last_fired_at: at(-10_000),
    });
    let engine = engine().with_retention(Duration::seconds(7200));
    assert_eq!(engine.retention(), Some(Duration::seconds(7200)));

    let outcome = engine
        .run(scenario_snapshot(), &no_fill_rule(), &ExclusionSet::new(), log, at(0))
        .unwrap();
    assert_eq!(outcome.pruned, 1);
    assert!(outcome.log.contains(NO_FILL));
    assert_eq!(outcome.log.len(), 1);
}

#[test]
fn retention_never_shorter_than_cool_down() {
    let engine = engine().with_retention(Duration::seconds(60));
    assert_eq!(engine.retention(), Some(Duration::seconds(3600)));
}

#[test]
fn negative_cool_down_is_clamped_to_zero() {
    assert_eq!(AlertEngine::new(Duration::seconds(-30)).cool_down(), Duration::zero());
}
