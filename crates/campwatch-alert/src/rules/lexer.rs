use crate::error::FormulaError;
use crate::rules::formula::{ArithOp, CompareOp};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Text(String),
    Field(String),
    LParen,
    RParen,
    Arith(ArithOp),
    Compare(CompareOp),
    And,
    Or,
    Not,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn take_while(s: &str, pred: impl Fn(char) -> bool) -> &str {
    let end = s.find(|c: char| !pred(c)).unwrap_or(s.len());
    &s[..end]
}

/// Longest schema column that `rest` starts with and that ends on a word
/// boundary. Lets column names such as `preroll/playerload` be written bare.
fn longest_column<'c>(rest: &str, columns: &[&'c str]) -> Option<&'c str> {
    columns
        .iter()
        .copied()
        .filter(|col| !col.is_empty() && rest.starts_with(col))
        .filter(|col| {
            rest[col.len()..]
                .chars()
                .next()
                .map_or(true, |c| !is_ident_continue(c))
        })
        .max_by_key(|col| col.len())
}

/// Reads a quoted literal starting at the opening quote. Returns the
/// unescaped text and the number of bytes consumed.
fn read_quoted(rest: &str) -> Result<(String, usize), FormulaError> {
    let mut chars = rest.char_indices();
    let quote = match chars.next() {
        Some((_, q)) => q,
        None => return Err(FormulaError::Syntax("expected a quoted string".to_string())),
    };
    let mut out = String::new();
    let mut escaped = false;
    for (i, c) in chars {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((out, i + c.len_utf8()));
        } else {
            out.push(c);
        }
    }
    Err(FormulaError::Syntax(format!("unterminated string starting with {quote}")))
}

/// Parses `data["name"]` / `data['name']` after the `data` keyword.
/// Returns `None` when `rest` is not a subscript.
fn read_subscript(rest: &str) -> Result<Option<(String, usize)>, FormulaError> {
    let trimmed = rest.trim_start();
    if !trimmed.starts_with('[') {
        return Ok(None);
    }
    let mut consumed = rest.len() - trimmed.len() + 1;
    let inner = &rest[consumed..];
    let inner_trimmed = inner.trim_start();
    consumed += inner.len() - inner_trimmed.len();
    if !inner_trimmed.starts_with(['"', '\'']) {
        return Err(FormulaError::Syntax(
            "expected a quoted column name inside data[...]".to_string(),
        ));
    }
    let (name, used) = read_quoted(inner_trimmed)?;
    consumed += used;
    let tail = &rest[consumed..];
    let tail_trimmed = tail.trim_start();
    if !tail_trimmed.starts_with(']') {
        return Err(FormulaError::Syntax("expected ']' after column name".to_string()));
    }
    consumed += tail.len() - tail_trimmed.len() + 1;
    Ok(Some((name, consumed)))
}

fn read_number(rest: &str) -> Result<(f64, usize), FormulaError> {
    let mut end = take_while(rest, |c| c.is_ascii_digit() || c == '.').len();
    let after = &rest[end..];
    if after.starts_with(['e', 'E']) {
        let exp = &after[1..];
        let sign = usize::from(exp.starts_with(['+', '-']));
        let digits = take_while(&exp[sign..], |c| c.is_ascii_digit()).len();
        if digits > 0 {
            end += 1 + sign + digits;
        }
    }
    let text = &rest[..end];
    text.parse::<f64>()
        .map(|v| (v, end))
        .map_err(|_| FormulaError::Syntax(format!("invalid number '{text}'")))
}

/// Splits formula text into tokens. `columns` are the snapshot's column
/// names, used to recognise bare names that contain operator characters.
pub(crate) fn tokenize(source: &str, columns: &[&str]) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(c) = source[pos..].chars().next() {
        let rest = &source[pos..];

        if c.is_whitespace() {
            pos += c.len_utf8();
            continue;
        }

        if is_ident_start(c) {
            let word = take_while(rest, is_ident_continue);
            if word == "data" {
                if let Some((name, used)) = read_subscript(&rest[word.len()..])? {
                    tokens.push(Token::Field(name));
                    pos += word.len() + used;
                    continue;
                }
            }
            if let Some(column) = longest_column(rest, columns) {
                tokens.push(Token::Field(column.to_string()));
                pos += column.len();
                continue;
            }
            tokens.push(match word {
                "and" | "AND" => Token::And,
                "or" | "OR" => Token::Or,
                "not" | "NOT" => Token::Not,
                _ => Token::Field(word.to_string()),
            });
            pos += word.len();
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && rest[1..].starts_with(|d: char| d.is_ascii_digit())) {
            let (value, used) = read_number(rest)?;
            tokens.push(Token::Number(value));
            pos += used;
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, used) = read_quoted(rest)?;
            tokens.push(Token::Text(text));
            pos += used;
            continue;
        }

        if c == '`' {
            let end = rest[1..]
                .find('`')
                .ok_or_else(|| FormulaError::Syntax("unterminated `quoted` column".to_string()))?;
            tokens.push(Token::Field(rest[1..1 + end].to_string()));
            pos += end + 2;
            continue;
        }

        let (token, used) = match c {
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '+' => (Token::Arith(ArithOp::Add), 1),
            '-' => (Token::Arith(ArithOp::Sub), 1),
            '*' => (Token::Arith(ArithOp::Mul), 1),
            '/' => (Token::Arith(ArithOp::Div), 1),
            '~' => (Token::Not, 1),
            '<' if rest.starts_with("<=") => (Token::Compare(CompareOp::LessEqual), 2),
            '<' => (Token::Compare(CompareOp::LessThan), 1),
            '>' if rest.starts_with(">=") => (Token::Compare(CompareOp::GreaterEqual), 2),
            '>' => (Token::Compare(CompareOp::GreaterThan), 1),
            '=' if rest.starts_with("==") => (Token::Compare(CompareOp::Equal), 2),
            '=' => {
                return Err(FormulaError::Syntax(
                    "use '==' to compare for equality".to_string(),
                ))
            }
            '!' if rest.starts_with("!=") => (Token::Compare(CompareOp::NotEqual), 2),
            '!' => (Token::Not, 1),
            '&' if rest.starts_with("&&") => (Token::And, 2),
            '&' => (Token::And, 1),
            '|' if rest.starts_with("||") => (Token::Or, 2),
            '|' => (Token::Or, 1),
            other => {
                return Err(FormulaError::Syntax(format!(
                    "unexpected character '{other}' at offset {pos}"
                )))
            }
        };
        tokens.push(token);
        pos += used;
    }

    Ok(tokens)
}
