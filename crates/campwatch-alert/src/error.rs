/// Problems found while turning formula text into an evaluable expression.
///
/// These carry no rule name; [`RuleEvaluationError`] and
/// [`AlertError::InvalidDerivedMetric`] attach the owner.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("type error: {0}")]
    Type(String),
}

/// A single rule could not be evaluated. Fatal to that rule only.
///
/// # Examples
///
/// ```rust
/// use campwatch_alert::error::RuleEvaluationError;
///
/// let err = RuleEvaluationError::UnknownField {
///     rule: "no-fill".to_string(),
///     field: "prerolls".to_string(),
/// };
/// assert_eq!(err.rule(), "no-fill");
/// assert!(err.to_string().contains("prerolls"));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleEvaluationError {
    /// The formula references a column the snapshot does not have.
    #[error("rule '{rule}' references unknown field '{field}'")]
    UnknownField { rule: String, field: String },

    /// The formula does not parse or does not type-check as a condition.
    #[error("rule '{rule}' has a malformed formula: {reason}")]
    Malformed { rule: String, reason: String },

    /// Another rule with the same name was already loaded this cycle.
    #[error("rule '{rule}' is defined more than once")]
    DuplicateName { rule: String },
}

impl RuleEvaluationError {
    pub fn rule(&self) -> &str {
        match self {
            Self::UnknownField { rule, .. }
            | Self::Malformed { rule, .. }
            | Self::DuplicateName { rule } => rule,
        }
    }

    pub(crate) fn from_formula(rule: &str, err: FormulaError) -> Self {
        match err {
            FormulaError::UnknownField(field) => Self::UnknownField {
                rule: rule.to_string(),
                field,
            },
            other => Self::Malformed {
                rule: rule.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Errors that abort an evaluation cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AlertError {
    /// The snapshot lacks a column the cycle cannot do without. No alerts
    /// are produced rather than risking false negatives.
    #[error("Alert: snapshot is missing column '{column}' required by {context}")]
    SchemaMismatch { column: String, context: String },

    /// A derived metric formula is malformed.
    #[error("Alert: derived metric '{name}' is invalid: {reason}")]
    InvalidDerivedMetric { name: String, reason: String },
}

/// Convenience `Result` alias for alert engine operations.
pub type Result<T> = std::result::Result<T, AlertError>;
