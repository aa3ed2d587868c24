//! Kubernetes style selector expressions, used both as node label selectors and
//! as annotation filters.
//!
//! A selector is a comma separated conjunction of requirements:
//!
//! ```text
//! key                 key must exist
//! !key                key must not exist
//! key=value           key == value (also `key==value`)
//! key!=value          key is absent or differs from value
//! key in (a, b)       key exists and its value is one of the set
//! key notin (a, b)    key is absent or its value is not in the set
//! ```
//!
//! Values may be empty: `key=`, `key in ()` and `key in (a,)` all name `""`.
//!
//! The empty selector matches everything.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use itertools::Itertools;
use thiserror::Error;

#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("invalid selector {selector:?} at position {position}: {reason}")]
pub struct ParseSelectorError {
    pub selector: String,
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Operator {
    Equals(String),
    NotEquals(String),
    In(BTreeSet<String>),
    NotIn(BTreeSet<String>),
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Requirement {
    key: String,
    operator: Operator,
}

impl Requirement {
    pub fn new(key: impl Into<String>, operator: Operator) -> Self {
        Self {
            key: key.into(),
            operator,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn matches(&self, set: &BTreeMap<String, String>) -> bool {
        let value = set.get(&self.key);

        match &self.operator {
            Operator::Equals(expect) => value == Some(expect),
            Operator::NotEquals(expect) => value != Some(expect),
            Operator::In(values) => value.map(|value| values.contains(value)).unwrap_or(false),
            Operator::NotIn(values) => value.map(|value| !values.contains(value)).unwrap_or(true),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.operator {
            Operator::Equals(value) => write!(f, "{}={}", self.key, value),
            Operator::NotEquals(value) => write!(f, "{}!={}", self.key, value),
            Operator::In(values) => write!(f, "{} in ({})", self.key, values.iter().join(",")),
            Operator::NotIn(values) => {
                write!(f, "{} notin ({})", self.key, values.iter().join(","))
            }
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Selector without requirements, matching every set.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Equality selector requiring every `key=value` pair of `set`.
    pub fn from_set<K, V, I>(set: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            requirements: set
                .into_iter()
                .map(|(key, value)| Requirement::new(key, Operator::Equals(value.into())))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn matches(&self, set: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|requirement| requirement.matches(set))
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.requirements.iter().join(","))
    }
}

impl FromStr for Selector {
    type Err = ParseSelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parser::new(s).parse()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum Token {
    Identifier(String),
    Not,
    Equals,
    DoubleEquals,
    NotEquals,
    OpenParen,
    CloseParen,
    Comma,
    In,
    NotIn,
    End,
}

fn is_special(c: char) -> bool {
    matches!(c, '!' | '=' | '(' | ')' | ',')
}

struct Lexer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    /// Returns the next token and the byte offset it started at.
    fn next_token(&mut self) -> (Token, usize) {
        let trimmed = self.rest().trim_start();
        self.position = self.input.len() - trimmed.len();

        let start = self.position;
        let mut chars = trimmed.chars();

        let token = match chars.next() {
            None => Token::End,

            Some('!') if trimmed.starts_with("!=") => Token::NotEquals,
            Some('!') => Token::Not,
            Some('=') if trimmed.starts_with("==") => Token::DoubleEquals,
            Some('=') => Token::Equals,
            Some('(') => Token::OpenParen,
            Some(')') => Token::CloseParen,
            Some(',') => Token::Comma,

            Some(_) => {
                let len = trimmed
                    .find(|c: char| c.is_whitespace() || is_special(c))
                    .unwrap_or(trimmed.len());
                let identifier = &trimmed[..len];

                self.position += len;

                return match identifier {
                    "in" => (Token::In, start),
                    "notin" => (Token::NotIn, start),
                    _ => (Token::Identifier(identifier.to_string()), start),
                };
            }
        };

        self.position += match token {
            Token::NotEquals | Token::DoubleEquals => 2,
            Token::End => 0,
            _ => 1,
        };

        (token, start)
    }
}

struct Parser<'a> {
    input: &'a str,
    lexer: Lexer<'a>,
    peeked: Option<(Token, usize)>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            lexer: Lexer::new(input),
            peeked: None,
        }
    }

    fn peek(&mut self) -> Token {
        let lexer = &mut self.lexer;

        self.peeked.get_or_insert_with(|| lexer.next_token()).0.clone()
    }

    fn next(&mut self) -> (Token, usize) {
        match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token(),
        }
    }

    fn error(&self, position: usize, reason: impl Into<String>) -> ParseSelectorError {
        ParseSelectorError {
            selector: self.input.to_string(),
            position,
            reason: reason.into(),
        }
    }

    fn parse(mut self) -> Result<Selector, ParseSelectorError> {
        let mut requirements = vec![];

        if self.peek() == Token::End {
            return Ok(Selector { requirements });
        }

        loop {
            requirements.push(self.parse_requirement()?);

            match self.next() {
                (Token::End, _) => break,
                (Token::Comma, _) => continue,
                (token, position) => {
                    return Err(self.error(position, format!("expected ',' but got {:?}", token)))
                }
            }
        }

        Ok(Selector { requirements })
    }

    fn parse_requirement(&mut self) -> Result<Requirement, ParseSelectorError> {
        if self.peek() == Token::Not {
            self.next();

            let key = self.parse_key()?;

            return Ok(Requirement::new(key, Operator::DoesNotExist));
        }

        let key = self.parse_key()?;

        let operator = match self.peek() {
            Token::Comma | Token::End => return Ok(Requirement::new(key, Operator::Exists)),

            Token::Equals | Token::DoubleEquals => {
                self.next();

                Operator::Equals(self.parse_value()?)
            }

            Token::NotEquals => {
                self.next();

                Operator::NotEquals(self.parse_value()?)
            }

            Token::In => {
                self.next();

                Operator::In(self.parse_values()?)
            }

            Token::NotIn => {
                self.next();

                Operator::NotIn(self.parse_values()?)
            }

            _ => {
                let (token, position) = self.next();

                return Err(self.error(position, format!("expected operator but got {:?}", token)));
            }
        };

        Ok(Requirement::new(key, operator))
    }

    fn parse_key(&mut self) -> Result<String, ParseSelectorError> {
        match self.next() {
            (Token::Identifier(key), _) => Ok(key),
            (token, position) => Err(self.error(position, format!("expected key but got {:?}", token))),
        }
    }

    /// A value after `=` or `!=` may be empty, `key=` selects an empty value.
    fn parse_value(&mut self) -> Result<String, ParseSelectorError> {
        match self.peek() {
            Token::Comma | Token::End => Ok(String::new()),

            _ => match self.next() {
                (Token::Identifier(value), _) => Ok(value),
                (token, position) => {
                    Err(self.error(position, format!("expected value but got {:?}", token)))
                }
            },
        }
    }

    /// Any slot of the list may be empty and stands for the empty value, so
    /// `key in ()` selects `key=`.
    fn parse_values(&mut self) -> Result<BTreeSet<String>, ParseSelectorError> {
        match self.next() {
            (Token::OpenParen, _) => {}
            (token, position) => {
                return Err(self.error(position, format!("expected '(' but got {:?}", token)))
            }
        }

        let mut values = BTreeSet::new();

        loop {
            match self.peek() {
                Token::Comma | Token::CloseParen => {
                    values.insert(String::new());
                }

                _ => match self.next() {
                    (Token::Identifier(value), _) => {
                        values.insert(value);
                    }

                    (token, position) => {
                        return Err(
                            self.error(position, format!("expected value but got {:?}", token))
                        )
                    }
                },
            }

            match self.next() {
                (Token::Comma, _) => continue,
                (Token::CloseParen, _) => break,
                (token, position) => {
                    return Err(self.error(
                        position,
                        format!("expected ',' or ')' but got {:?}", token),
                    ))
                }
            }
        }

        Ok(values)
    }
}
