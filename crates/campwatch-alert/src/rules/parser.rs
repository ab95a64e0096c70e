use crate::error::FormulaError;
use crate::rules::formula::{ArithOp, CompareOp};
use crate::rules::lexer::Token;

/// Untyped syntax tree; [`crate::rules::formula`] type-checks it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Number(f64),
    Text(String),
    Field(String),
    Neg(Box<Node>),
    Arith(ArithOp, Box<Node>, Box<Node>),
    Compare(CompareOp, Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
}

/// Precedence, loosest first: `or`, `and`, `not`, comparison, `+ -`,
/// `* /`, unary minus. Comparisons do not chain.
pub(crate) fn parse(tokens: Vec<Token>) -> Result<Node, FormulaError> {
    if tokens.is_empty() {
        return Err(FormulaError::Syntax("formula is empty".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.or_expr()?;
    match parser.peek() {
        None => Ok(node),
        Some(token) => Err(FormulaError::Syntax(format!(
            "unexpected {} after end of expression",
            describe(token)
        ))),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<Node, FormulaError> {
        let mut node = self.and_expr()?;
        while self.eat(&Token::Or) {
            let rhs = self.and_expr()?;
            node = Node::Or(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn and_expr(&mut self) -> Result<Node, FormulaError> {
        let mut node = self.not_expr()?;
        while self.eat(&Token::And) {
            let rhs = self.not_expr()?;
            node = Node::And(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn not_expr(&mut self) -> Result<Node, FormulaError> {
        if self.eat(&Token::Not) {
            return Ok(Node::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Node, FormulaError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Compare(op)) => *op,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        if let Some(Token::Compare(_)) = self.peek() {
            return Err(FormulaError::Syntax(
                "chained comparisons are not supported; combine them with 'and'".to_string(),
            ));
        }
        Ok(Node::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Node, FormulaError> {
        let mut node = self.term()?;
        while let Some(Token::Arith(op @ (ArithOp::Add | ArithOp::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.term()?;
            node = Node::Arith(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn term(&mut self) -> Result<Node, FormulaError> {
        let mut node = self.unary()?;
        while let Some(Token::Arith(op @ (ArithOp::Mul | ArithOp::Div))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.unary()?;
            node = Node::Arith(op, Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn unary(&mut self) -> Result<Node, FormulaError> {
        if self.eat(&Token::Arith(ArithOp::Sub)) {
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Arith(ArithOp::Add)) {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Node, FormulaError> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Node::Number(v)),
            Some(Token::Text(s)) => Ok(Node::Text(s)),
            Some(Token::Field(name)) => Ok(Node::Field(name)),
            Some(Token::LParen) => {
                let node = self.or_expr()?;
                if self.eat(&Token::RParen) {
                    Ok(node)
                } else {
                    Err(FormulaError::Syntax("missing closing ')'".to_string()))
                }
            }
            Some(other) => Err(FormulaError::Syntax(format!(
                "unexpected {}",
                describe(&other)
            ))),
            None => Err(FormulaError::Syntax("unexpected end of formula".to_string())),
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(v) => format!("number {v}"),
        Token::Text(s) => format!("string '{s}'"),
        Token::Field(name) => format!("field '{name}'"),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Arith(op) => format!("operator {op:?}"),
        Token::Compare(op) => format!("operator '{op}'"),
        Token::And => "'and'".to_string(),
        Token::Or => "'or'".to_string(),
        Token::Not => "'not'".to_string(),
    }
}
