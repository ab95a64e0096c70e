use crate::error::FormulaError;
use crate::rules::lexer::tokenize;
use crate::rules::parser::{parse, Node};
use campwatch_common::types::{ColumnKind, MetricRow, MetricSnapshot};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" | "greater_than" | "gt" => Ok(Self::GreaterThan),
            "<" | "less_than" | "lt" => Ok(Self::LessThan),
            ">=" | "greater_equal" | "gte" => Ok(Self::GreaterEqual),
            "<=" | "less_equal" | "lte" => Ok(Self::LessEqual),
            "==" | "equal" | "eq" => Ok(Self::Equal),
            "!=" | "not_equal" | "ne" => Ok(Self::NotEqual),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreaterThan => write!(f, ">"),
            Self::LessThan => write!(f, "<"),
            Self::GreaterEqual => write!(f, ">="),
            Self::LessEqual => write!(f, "<="),
            Self::Equal => write!(f, "=="),
            Self::NotEqual => write!(f, "!="),
        }
    }
}

impl CompareOp {
    fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
            Self::Equal => value == threshold,
            Self::NotEqual => value != threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    fn apply(&self, lhs: f64, rhs: f64) -> Option<f64> {
        let value = match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div if rhs == 0.0 => return None,
            Self::Div => lhs / rhs,
        };
        value.is_finite().then_some(value)
    }
}

/// Numeric expression over metric columns. Evaluates to `None` when any
/// operand has no value or the arithmetic has no finite result.
#[derive(Debug, Clone, PartialEq)]
pub enum NumExpr {
    Field(String),
    Literal(f64),
    Neg(Box<NumExpr>),
    Binary {
        op: ArithOp,
        lhs: Box<NumExpr>,
        rhs: Box<NumExpr>,
    },
}

impl NumExpr {
    pub fn eval(&self, row: &MetricRow) -> Option<f64> {
        match self {
            Self::Field(name) => row.metric(name),
            Self::Literal(v) => Some(*v),
            Self::Neg(inner) => inner.eval(row).map(|v| -v),
            Self::Binary { op, lhs, rhs } => op.apply(lhs.eval(row)?, rhs.eval(row)?),
        }
    }
}

/// Text expression over dimension columns.
#[derive(Debug, Clone, PartialEq)]
pub enum TextExpr {
    Field(String),
    Literal(String),
}

impl TextExpr {
    fn eval<'a>(&'a self, row: &'a MetricRow) -> Option<&'a str> {
        match self {
            Self::Field(name) => row.dimension(name),
            Self::Literal(s) => Some(s.as_str()),
        }
    }
}

/// A type-checked boolean condition. Any comparison with a missing operand
/// is false.
#[derive(Debug, Clone, PartialEq)]
pub enum BoolExpr {
    Compare {
        op: CompareOp,
        lhs: NumExpr,
        rhs: NumExpr,
    },
    TextEquals {
        negated: bool,
        lhs: TextExpr,
        rhs: TextExpr,
    },
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
    Not(Box<BoolExpr>),
}

impl BoolExpr {
    pub fn eval(&self, row: &MetricRow) -> bool {
        match self {
            Self::Compare { op, lhs, rhs } => match (lhs.eval(row), rhs.eval(row)) {
                (Some(l), Some(r)) => op.check(l, r),
                _ => false,
            },
            Self::TextEquals { negated, lhs, rhs } => match (lhs.eval(row), rhs.eval(row)) {
                (Some(l), Some(r)) => (l == r) != *negated,
                _ => false,
            },
            Self::And(l, r) => l.eval(row) && r.eval(row),
            Self::Or(l, r) => l.eval(row) || r.eval(row),
            Self::Not(inner) => !inner.eval(row),
        }
    }
}

/// Parses `source` as a boolean condition and validates every field it
/// references against the snapshot schema.
pub fn compile_condition(source: &str, schema: &MetricSnapshot) -> Result<BoolExpr, FormulaError> {
    let node = parse_source(source, schema)?;
    Checker { schema }.boolean(node)
}

/// Parses `source` as a numeric expression over metric columns.
pub fn compile_numeric(source: &str, schema: &MetricSnapshot) -> Result<NumExpr, FormulaError> {
    let node = parse_source(source, schema)?;
    Checker { schema }.numeric(node)
}

fn parse_source(source: &str, schema: &MetricSnapshot) -> Result<Node, FormulaError> {
    let columns: Vec<&str> = schema.columns().collect();
    let tokens = tokenize(source, &columns)?;
    parse(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueType {
    Number,
    Text,
    Bool,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number => write!(f, "numeric"),
            Self::Text => write!(f, "text"),
            Self::Bool => write!(f, "boolean"),
        }
    }
}

struct Checker<'a> {
    schema: &'a MetricSnapshot,
}

impl Checker<'_> {
    fn field_kind(&self, name: &str) -> Result<ColumnKind, FormulaError> {
        self.schema
            .column_kind(name)
            .ok_or_else(|| FormulaError::UnknownField(name.to_string()))
    }

    fn type_of(&self, node: &Node) -> Result<ValueType, FormulaError> {
        Ok(match node {
            Node::Number(_) | Node::Neg(_) | Node::Arith(..) => ValueType::Number,
            Node::Text(_) => ValueType::Text,
            Node::Field(name) => match self.field_kind(name)? {
                ColumnKind::Metric => ValueType::Number,
                ColumnKind::Dimension => ValueType::Text,
            },
            Node::Compare(..) | Node::And(..) | Node::Or(..) | Node::Not(_) => ValueType::Bool,
        })
    }

    fn boolean(&self, node: Node) -> Result<BoolExpr, FormulaError> {
        match node {
            Node::And(l, r) => Ok(BoolExpr::And(
                Box::new(self.boolean(*l)?),
                Box::new(self.boolean(*r)?),
            )),
            Node::Or(l, r) => Ok(BoolExpr::Or(
                Box::new(self.boolean(*l)?),
                Box::new(self.boolean(*r)?),
            )),
            Node::Not(inner) => Ok(BoolExpr::Not(Box::new(self.boolean(*inner)?))),
            Node::Compare(op, l, r) => self.comparison(op, *l, *r),
            other => {
                let found = self.type_of(&other)?;
                Err(FormulaError::Type(format!(
                    "expected a boolean condition, found a {found} expression"
                )))
            }
        }
    }

    fn comparison(&self, op: CompareOp, lhs: Node, rhs: Node) -> Result<BoolExpr, FormulaError> {
        match (self.type_of(&lhs)?, self.type_of(&rhs)?) {
            (ValueType::Number, ValueType::Number) => Ok(BoolExpr::Compare {
                op,
                lhs: self.numeric(lhs)?,
                rhs: self.numeric(rhs)?,
            }),
            (ValueType::Text, ValueType::Text) => {
                let negated = match op {
                    CompareOp::Equal => false,
                    CompareOp::NotEqual => true,
                    other => {
                        return Err(FormulaError::Type(format!(
                            "text values only support '==' and '!=', not '{other}'"
                        )))
                    }
                };
                Ok(BoolExpr::TextEquals {
                    negated,
                    lhs: self.text(lhs)?,
                    rhs: self.text(rhs)?,
                })
            }
            (l, r) => Err(FormulaError::Type(format!(
                "cannot compare a {l} value with a {r} value"
            ))),
        }
    }

    fn numeric(&self, node: Node) -> Result<NumExpr, FormulaError> {
        match node {
            Node::Number(v) => Ok(NumExpr::Literal(v)),
            Node::Field(name) => match self.field_kind(&name)? {
                ColumnKind::Metric => Ok(NumExpr::Field(name)),
                ColumnKind::Dimension => Err(FormulaError::Type(format!(
                    "field '{name}' is a dimension and cannot be used in arithmetic"
                ))),
            },
            Node::Neg(inner) => Ok(NumExpr::Neg(Box::new(self.numeric(*inner)?))),
            Node::Arith(op, l, r) => Ok(NumExpr::Binary {
                op,
                lhs: Box::new(self.numeric(*l)?),
                rhs: Box::new(self.numeric(*r)?),
            }),
            other => {
                let found = self.type_of(&other)?;
                Err(FormulaError::Type(format!(
                    "expected a numeric expression, found a {found} expression"
                )))
            }
        }
    }

    fn text(&self, node: Node) -> Result<TextExpr, FormulaError> {
        match node {
            Node::Text(s) => Ok(TextExpr::Literal(s)),
            Node::Field(name) => Ok(TextExpr::Field(name)),
            _ => Err(FormulaError::Type("expected a text value".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> MetricSnapshot {
        MetricSnapshot::new(
            "campaign",
            vec![MetricRow::new()
                .with_dimension("campaign", "dogs")
                .with_metric("prerollplay", 10.0)
                .with_metric("playerload", 100.0)
                .with_metric("preroll/playerload", 0.1)],
        )
    }

    fn row(prerollplay: f64, playerload: f64) -> MetricRow {
        MetricRow::new()
            .with_dimension("campaign", "dogs")
            .with_metric("prerollplay", prerollplay)
            .with_metric("playerload", playerload)
    }

    #[test]
    fn ratio_condition_holds() {
        let expr = compile_condition("prerollplay / playerload < 0.2", &schema()).unwrap();
        assert!(expr.eval(&row(10.0, 100.0)));
        assert!(!expr.eval(&row(50.0, 100.0)));
    }

    #[test]
    fn column_name_with_slash_matches_whole_column() {
        let expr = compile_condition("preroll/playerload < 0.2", &schema()).unwrap();
        assert_eq!(
            expr,
            BoolExpr::Compare {
                op: CompareOp::LessThan,
                lhs: NumExpr::Field("preroll/playerload".into()),
                rhs: NumExpr::Literal(0.2),
            }
        );
    }

    #[test]
    fn division_by_zero_is_no_value() {
        let expr = compile_condition("prerollplay / playerload < 0.2", &schema()).unwrap();
        assert!(!expr.eval(&row(0.0, 0.0)));
        assert!(!expr.eval(&row(5.0, 0.0)));
    }

    #[test]
    fn missing_metric_makes_comparison_false() {
        let expr = compile_condition("playerload > 1000", &schema()).unwrap();
        let row = MetricRow::new().with_missing("playerload");
        assert!(!expr.eval(&row));

        let negated = compile_condition("not playerload > 1000", &schema()).unwrap();
        assert!(negated.eval(&row));
    }

    #[test]
    fn legacy_subscript_syntax_and_pandas_operators() {
        let expr = compile_condition(
            r#"(data["playerload"] > 50) & (data['prerollplay'] < 20)"#,
            &schema(),
        )
        .unwrap();
        assert!(expr.eval(&row(10.0, 100.0)));
        assert!(!expr.eval(&row(30.0, 100.0)));
    }

    #[test]
    fn dimension_equality() {
        let expr = compile_condition("campaign == 'dogs' and playerload > 1", &schema()).unwrap();
        assert!(expr.eval(&row(1.0, 2.0)));
        let expr = compile_condition("campaign != \"dogs\"", &schema()).unwrap();
        assert!(!expr.eval(&row(1.0, 2.0)));
    }

    #[test]
    fn unknown_field_is_reported() {
        let err = compile_condition("prerolls / playerload < 0.2", &schema()).unwrap_err();
        assert_eq!(err, FormulaError::UnknownField("prerolls".into()));
    }

    #[test]
    fn type_errors_are_reported() {
        assert!(matches!(
            compile_condition("playerload", &schema()),
            Err(FormulaError::Type(_))
        ));
        assert!(matches!(
            compile_condition("campaign < 'x'", &schema()),
            Err(FormulaError::Type(_))
        ));
        assert!(matches!(
            compile_condition("campaign + 1 > 2", &schema()),
            Err(FormulaError::Type(_))
        ));
        assert!(matches!(
            compile_condition("playerload == 'x'", &schema()),
            Err(FormulaError::Type(_))
        ));
    }

    #[test]
    fn numeric_expression_evaluates() {
        let expr = compile_numeric("-(prerollplay - playerload) * 2", &schema()).unwrap();
        assert_eq!(expr.eval(&row(10.0, 100.0)), Some(180.0));
    }

    #[test]
    fn compare_op_from_str_round_trips() {
        for op in ["<", "<=", ">", ">=", "==", "!="] {
            let parsed: CompareOp = op.parse().unwrap();
            assert_eq!(parsed.to_string(), op);
        }
        assert!("~=".parse::<CompareOp>().is_err());
    }
}
