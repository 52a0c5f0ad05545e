//! Parameterized query specifications
//!
//! A [`QuerySpec`] is passed through to the backend untouched. Backends that
//! cannot hand the text to a server-side engine evaluate it with
//! [`ParsedQuery`], which understands the conjunctive equality dialect
//! `SELECT * FROM root [WHERE root.f = @p [AND root.g = "lit" ...]]`.

use serde_json::{Map, Value};

use crate::StorageError;

/// A named query parameter, e.g. `@pType`
#[derive(Debug, Clone, PartialEq)]
pub struct QueryParam {
    pub name: String,
    pub value: Value,
}

/// Query text plus its named parameters
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub query: String,
    pub parameters: Vec<QueryParam>,
}

impl QuerySpec {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter; `name` should include the leading `@`.
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(QueryParam {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Param(String),
    Str(String),
    Eq,
    Star,
}

fn tokenize(text: &str) -> Result<Vec<Token>, StorageError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => literal.push(ch),
                        None => {
                            return Err(StorageError::InvalidQuery(format!(
                                "unterminated string literal in `{}`",
                                text
                            )))
                        }
                    }
                }
                tokens.push(Token::Str(literal));
            }
            '@' => {
                let mut name = String::new();
                name.push(c);
                chars.next();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Param(name));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                        word.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            other => {
                return Err(StorageError::InvalidQuery(format!(
                    "unexpected character `{}` in `{}`",
                    other, text
                )))
            }
        }
    }

    Ok(tokens)
}

/// A query reduced to `field == value` conditions, all of which must hold
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    pub conditions: Vec<(String, Value)>,
}

impl ParsedQuery {
    /// Parse and bind `spec` against its parameters.
    pub fn parse(spec: &QuerySpec) -> Result<Self, StorageError> {
        let invalid = |msg: &str| StorageError::InvalidQuery(format!("{}: `{}`", msg, spec.query));

        let tokens = tokenize(&spec.query)?;
        let mut iter = tokens.into_iter();

        match (iter.next(), iter.next(), iter.next(), iter.next()) {
            (Some(Token::Word(select)), Some(Token::Star), Some(Token::Word(from)), Some(Token::Word(_)))
                if select.eq_ignore_ascii_case("select") && from.eq_ignore_ascii_case("from") => {}
            _ => return Err(invalid("expected `SELECT * FROM <alias>`")),
        }

        let mut conditions = Vec::new();
        match iter.next() {
            None => return Ok(Self { conditions }),
            Some(Token::Word(kw)) if kw.eq_ignore_ascii_case("where") => {}
            _ => return Err(invalid("expected WHERE")),
        }

        loop {
            let field = match iter.next() {
                Some(Token::Word(path)) => match path.split_once('.') {
                    Some((_, field)) if !field.is_empty() && !field.contains('.') => field.to_string(),
                    _ => return Err(invalid("expected `<alias>.<field>`")),
                },
                _ => return Err(invalid("expected a field reference")),
            };
            if iter.next() != Some(Token::Eq) {
                return Err(invalid("only equality comparisons are supported"));
            }
            let value = match iter.next() {
                Some(Token::Param(name)) => spec
                    .parameter(&name)
                    .cloned()
                    .ok_or_else(|| StorageError::InvalidQuery(format!("missing parameter {}", name)))?,
                Some(Token::Str(literal)) => Value::String(literal),
                _ => return Err(invalid("expected a parameter or string literal")),
            };
            conditions.push((field, value));

            match iter.next() {
                None => break,
                Some(Token::Word(kw)) if kw.eq_ignore_ascii_case("and") => continue,
                _ => return Err(invalid("expected AND")),
            }
        }

        Ok(Self { conditions })
    }

    /// Whether every condition holds for `document`. Missing properties never match.
    pub fn matches(&self, document: &Map<String, Value>) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }
}
