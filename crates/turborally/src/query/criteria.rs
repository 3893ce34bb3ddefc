//! Query criteria normalization
//!
//! Callers can express filters as a condition string (with or without
//! parentheses, possibly joining several conditions with `AND`/`OR`), as a
//! field-to-value mapping, or as a list of condition strings. Every shape is
//! parsed into one expression tree and rendered in the fully parenthesized
//! form WSAPI requires, e.g. `((State = Submitted) AND (FormattedID != US100))`.
//! Equivalent inputs therefore produce byte-identical query strings.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{Error, Result};

/// Filter criteria as supplied by the caller, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conditions {
    /// One string holding one or more conditions
    Text(String),
    /// Field-to-value pairs, each an equality test, AND-combined
    Map(Vec<(String, String)>),
    /// Condition strings, AND-combined
    List(Vec<String>),
}

impl From<&str> for Conditions {
    fn from(value: &str) -> Self {
        Conditions::Text(value.to_string())
    }
}

impl From<String> for Conditions {
    fn from(value: String) -> Self {
        Conditions::Text(value)
    }
}

impl From<Vec<&str>> for Conditions {
    fn from(value: Vec<&str>) -> Self {
        Conditions::List(value.into_iter().map(String::from).collect())
    }
}

impl From<Vec<String>> for Conditions {
    fn from(value: Vec<String>) -> Self {
        Conditions::List(value)
    }
}

impl<const N: usize> From<[&str; N]> for Conditions {
    fn from(value: [&str; N]) -> Self {
        Conditions::List(value.into_iter().map(String::from).collect())
    }
}

impl<K: Into<String>, V: Into<String>> From<BTreeMap<K, V>> for Conditions {
    fn from(value: BTreeMap<K, V>) -> Self {
        Conditions::Map(value.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>> From<HashMap<K, V>> for Conditions {
    fn from(value: HashMap<K, V>) -> Self {
        let mut pairs: Vec<(String, String)> =
            value.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        pairs.sort();
        Conditions::Map(pairs)
    }
}

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `contains`
    Contains,
    /// `!contains`
    NotContains,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Contains => "contains",
            Operator::NotContains => "!contains",
        })
    }
}

/// Boolean join between two expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    /// `AND`
    And,
    /// `OR`
    Or,
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Join::And => "AND",
            Join::Or => "OR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Operand {
    text: String,
    quoted: bool,
}

impl Operand {
    /// A value from a condition string; `was_quoted` keeps quotes on
    /// keyword-like values.
    fn new(text: String, was_quoted: bool) -> Self {
        Self {
            quoted: needs_quotes(&text) || (was_quoted && is_keyword(&text)),
            text,
        }
    }

    /// A literal value from a field/value pair. Join and operator words are
    /// quoted; `null`, `true` and `false` stay bare.
    fn literal(text: String) -> Self {
        let reserved = join_keyword(&text).is_some() || operator_keyword(&text).is_some();
        Self {
            quoted: needs_quotes(&text) || reserved,
            text,
        }
    }
}

/// Values the tokenizer would split or misread when left bare.
fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || text.starts_with(['"', '\''])
        || text
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '=' | '<' | '>'))
}

fn is_keyword(text: &str) -> bool {
    join_keyword(text).is_some()
        || operator_keyword(text).is_some()
        || ["null", "true", "false"]
            .iter()
            .any(|k| text.eq_ignore_ascii_case(k))
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted {
            let escaped = self.text.replace('\\', "\\\\").replace('"', "\\\"");
            write!(f, "\"{}\"", escaped)
        } else {
            f.write_str(&self.text)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Condition {
        field: String,
        op: Operator,
        value: Operand,
    },
    Binary {
        join: Join,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Condition { field, op, value } => write!(f, "({} {} {})", field, op, value),
            Expr::Binary { join, lhs, rhs } => write!(f, "({} {} {})", lhs, join, rhs),
        }
    }
}

/// Normalized filter criteria, rendered as a WSAPI `query` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    expr: Expr,
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.expr.fmt(f)
    }
}

impl Criteria {
    /// Normalize any accepted input shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidQuery`] for empty input, unbalanced
    /// parentheses, or conditions missing a field, operator or value.
    pub fn normalize(conditions: &Conditions) -> Result<Self> {
        match conditions {
            Conditions::Text(text) => Self::parse(text),
            Conditions::Map(pairs) => Self::from_pairs(pairs.iter().map(|(k, v)| (k, v))),
            Conditions::List(items) => Self::all(items),
        }
    }

    /// Parse one condition string.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(Error::InvalidQuery("empty criteria".to_string()));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression()?;
        if let Some(token) = parser.peek() {
            return Err(Error::InvalidQuery(format!(
                "unexpected {} in '{}'",
                token.describe(),
                text
            )));
        }
        Ok(Self { expr })
    }

    /// Equality conditions for each pair, AND-combined in the given order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self::combine(pairs.into_iter().map(|(field, value)| {
            let field = field.as_ref().trim();
            let reserved = join_keyword(field).is_some() || operator_keyword(field).is_some();
            if reserved || needs_quotes(field) || field.contains(['!', '\\']) {
                return Err(Error::InvalidQuery(format!("invalid field name '{}'", field)));
            }
            Ok(Self {
                expr: Expr::Condition {
                    field: field.to_string(),
                    op: Operator::Eq,
                    value: Operand::literal(value.as_ref().to_string()),
                },
            })
        }))
    }

    /// Parse each condition string and AND-combine them in order.
    pub fn all<S: AsRef<str>>(conditions: impl IntoIterator<Item = S>) -> Result<Self> {
        Self::combine(conditions.into_iter().map(|c| Self::parse(c.as_ref())))
    }

    /// `(self AND other)`
    pub fn and(self, other: Criteria) -> Self {
        self.join(Join::And, other)
    }

    /// `(self OR other)`
    pub fn or(self, other: Criteria) -> Self {
        self.join(Join::Or, other)
    }

    /// The canonical query string.
    pub fn as_query(&self) -> String {
        self.to_string()
    }

    fn join(self, join: Join, other: Criteria) -> Self {
        Self {
            expr: Expr::Binary {
                join,
                lhs: Box::new(self.expr),
                rhs: Box::new(other.expr),
            },
        }
    }

    fn combine(parts: impl Iterator<Item = Result<Criteria>>) -> Result<Self> {
        let mut combined: Option<Criteria> = None;
        for part in parts {
            let part = part?;
            combined = Some(match combined {
                Some(acc) => acc.and(part),
                None => part,
            });
        }
        combined.ok_or_else(|| Error::InvalidQuery("empty criteria".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Op(Operator),
    Quoted(String),
    Word(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Open => "'('".to_string(),
            Token::Close => "')'".to_string(),
            Token::Op(op) => format!("operator '{}'", op),
            Token::Quoted(s) => format!("\"{}\"", s),
            Token::Word(w) => format!("'{}'", w),
        }
    }

    fn join(&self) -> Option<Join> {
        match self {
            Token::Word(word) => join_keyword(word),
            _ => None,
        }
    }
}

fn join_keyword(word: &str) -> Option<Join> {
    if word.eq_ignore_ascii_case("and") {
        Some(Join::And)
    } else if word.eq_ignore_ascii_case("or") {
        Some(Join::Or)
    } else {
        None
    }
}

fn operator_keyword(word: &str) -> Option<Operator> {
    if word.eq_ignore_ascii_case("contains") {
        Some(Operator::Contains)
    } else if word.eq_ignore_ascii_case("!contains") {
        Some(Operator::NotContains)
    } else {
        None
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '"' | '\'' => {
                let (quoted, next) = quoted_token(&chars, i + 1, c).ok_or_else(|| {
                    Error::InvalidQuery(format!("unterminated quote in '{}'", text))
                })?;
                tokens.push(Token::Quoted(quoted));
                i = next;
            }
            '=' => {
                tokens.push(Token::Op(Operator::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(Operator::Ne));
                i += 2;
            }
            '<' | '>' => {
                let or_equal = chars.get(i + 1) == Some(&'=');
                let op = match (c, or_equal) {
                    ('<', true) => Operator::Le,
                    ('<', false) => Operator::Lt,
                    (_, true) => Operator::Ge,
                    (_, false) => Operator::Gt,
                };
                tokens.push(Token::Op(op));
                i += if or_equal { 2 } else { 1 };
            }
            _ => {
                let start = i;
                while i < chars.len() {
                    let ch = chars[i];
                    let ends_word = ch.is_whitespace()
                        || matches!(ch, '(' | ')' | '=' | '<' | '>')
                        || (ch == '!' && chars.get(i + 1) == Some(&'='));
                    if ends_word {
                        break;
                    }
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match operator_keyword(&word) {
                    Some(op) => Token::Op(op),
                    None => Token::Word(word),
                });
            }
        }
    }

    Ok(tokens)
}

/// Read a quoted value starting after the opening `quote`, honoring
/// backslash escapes. Returns the text and the index past the closing quote.
fn quoted_token(chars: &[char], start: usize, quote: char) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut i = start;
    while let Some(&ch) = chars.get(i) {
        match ch {
            '\\' if matches!(chars.get(i + 1), Some(&next) if next == quote || next == '\\') => {
                text.push(chars[i + 1]);
                i += 2;
            }
            ch if ch == quote => return Some((text, i + 1)),
            ch => {
                text.push(ch);
                i += 1;
            }
        }
    }
    None
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    // expression := term ((AND | OR) term)*, left-associative
    fn expression(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        while let Some(join) = self.peek().and_then(Token::join) {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary {
                join,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // term := '(' expression ')' | condition
    fn term(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Open) {
            self.pos += 1;
            let inner = self.expression()?;
            return match self.advance() {
                Some(Token::Close) => Ok(inner),
                Some(other) => Err(Error::InvalidQuery(format!(
                    "expected ')' but found {}",
                    other.describe()
                ))),
                None => Err(Error::InvalidQuery("unbalanced '('".to_string())),
            };
        }
        self.condition()
    }

    // condition := field operator value
    fn condition(&mut self) -> Result<Expr> {
        let field = match self.advance() {
            Some(Token::Word(field)) if join_keyword(&field).is_none() => field,
            Some(other) => {
                return Err(Error::InvalidQuery(format!(
                    "expected a field name but found {}",
                    other.describe()
                )));
            }
            None => return Err(Error::InvalidQuery("missing condition".to_string())),
        };

        let op = match self.advance() {
            Some(Token::Op(op)) => op,
            _ => {
                return Err(Error::InvalidQuery(format!(
                    "missing operator after '{}'",
                    field
                )));
            }
        };

        let value = if let Some(Token::Quoted(text)) = self.peek() {
            let operand = Operand::new(text.clone(), true);
            self.pos += 1;
            operand
        } else {
            let mut words = Vec::new();
            while let Some(Token::Word(word)) = self.peek() {
                if join_keyword(word).is_some() {
                    break;
                }
                words.push(word.clone());
                self.pos += 1;
            }
            if words.is_empty() {
                return Err(Error::InvalidQuery(format!("missing value for '{}'", field)));
            }
            Operand::new(words.join(" "), false)
        };

        Ok(Expr::Condition { field, op, value })
    }
}
