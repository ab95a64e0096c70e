//! Rules and the restricted formula language they are written in.
//!
//! Formulas are parsed once per cycle into a typed expression tree and
//! validated against the snapshot schema, so a reference to an unknown
//! column surfaces as a [`RuleEvaluationError`] before any row is looked at.

pub mod formula;
pub(crate) mod lexer;
pub(crate) mod parser;

use crate::error::RuleEvaluationError;
use campwatch_common::types::{MetricRow, MetricSnapshot, RuleDefinition};
use formula::BoolExpr;
use std::collections::HashSet;

/// A side-effect free predicate over one metric row.
pub trait RowCondition: Send + Sync {
    fn holds(&self, row: &MetricRow) -> bool;
}

impl RowCondition for BoolExpr {
    fn holds(&self, row: &MetricRow) -> bool {
        self.eval(row)
    }
}

impl<F> RowCondition for F
where
    F: Fn(&MetricRow) -> bool + Send + Sync,
{
    fn holds(&self, row: &MetricRow) -> bool {
        self(row)
    }
}

/// A named condition ready to be evaluated against annotated rows.
pub struct Rule {
    name: String,
    condition: Box<dyn RowCondition>,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Rule {
    pub fn new(name: &str, condition: impl RowCondition + 'static) -> Self {
        Self {
            name: name.to_string(),
            condition: Box::new(condition),
        }
    }

    /// Compiles a rule definition against the snapshot's schema.
    pub fn compile(
        definition: &RuleDefinition,
        schema: &MetricSnapshot,
    ) -> Result<Self, RuleEvaluationError> {
        let name = definition.name.trim();
        if name.is_empty() {
            return Err(RuleEvaluationError::Malformed {
                rule: definition.name.clone(),
                reason: "rule name is empty".to_string(),
            });
        }
        let condition = formula::compile_condition(&definition.formula, schema)
            .map_err(|e| RuleEvaluationError::from_formula(name, e))?;
        Ok(Self::new(name, condition))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn holds(&self, row: &MetricRow) -> bool {
        self.condition.holds(row)
    }
}

/// Outcome of compiling a rule set: the usable rules plus one error per
/// rule that had to be skipped.
#[derive(Debug, Default)]
pub struct CompiledRules {
    pub rules: Vec<Rule>,
    pub errors: Vec<RuleEvaluationError>,
}

/// Compiles every definition independently. A broken rule never prevents
/// the others from loading; a repeated name keeps the first definition.
pub fn compile_rules(definitions: &[RuleDefinition], schema: &MetricSnapshot) -> CompiledRules {
    let mut compiled = CompiledRules::default();
    let mut seen = HashSet::new();

    for definition in definitions {
        let name = definition.name.trim();
        if !name.is_empty() && !seen.insert(name.to_string()) {
            compiled.errors.push(RuleEvaluationError::DuplicateName {
                rule: name.to_string(),
            });
            continue;
        }
        match Rule::compile(definition, schema) {
            Ok(rule) => compiled.rules.push(rule),
            Err(e) => compiled.errors.push(e),
        }
    }

    compiled
}

/// Checks that every formula parses, without a schema to resolve names
/// against. Used when no snapshot is available; unknown fields and type
/// errors are not detected here.
pub fn check_syntax(definitions: &[RuleDefinition]) -> Vec<RuleEvaluationError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for definition in definitions {
        let name = definition.name.trim();
        if name.is_empty() {
            errors.push(RuleEvaluationError::Malformed {
                rule: definition.name.clone(),
                reason: "rule name is empty".to_string(),
            });
            continue;
        }
        if !seen.insert(name.to_string()) {
            errors.push(RuleEvaluationError::DuplicateName {
                rule: name.to_string(),
            });
            continue;
        }
        if let Err(e) = lexer::tokenize(&definition.formula, &[]).and_then(parser::parse) {
            errors.push(RuleEvaluationError::from_formula(name, e));
        }
    }

    errors
}
