//! Hostname templates such as `{{.Name}}.example.org`.
//!
//! Only field actions are supported: `{{ .Name }}` and `{{ .Namespace }}`.
//! Templates are validated when parsed, so expanding one never fails.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

const ACTION_START: &str = "{{";
const ACTION_END: &str = "}}";

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum TemplateError {
    #[error("unclosed action starting at position {0}")]
    Unclosed(usize),

    #[error("empty action at position {0}")]
    EmptyAction(usize),

    #[error("unsupported action {action:?} at position {position}, expected .Name or .Namespace")]
    UnsupportedAction { action: String, position: usize },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Field {
    Name,
    Namespace,
}

#[derive(Debug, Clone, Eq, PartialEq)]
enum Part {
    Literal(String),
    Field(Field),
}

/// The identity fields a template is expanded against. Node resources are
/// cluster scoped, so their namespace is empty.
#[derive(Debug, Copy, Clone, Default)]
pub struct TemplateData<'a> {
    pub name: &'a str,
    pub namespace: &'a str,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FqdnTemplate {
    source: String,
    parts: Vec<Part>,
}

impl FqdnTemplate {
    pub fn expand(&self, data: &TemplateData<'_>) -> String {
        self.parts
            .iter()
            .fold(String::new(), |mut hostname, part| {
                match part {
                    Part::Literal(text) => hostname.push_str(text),
                    Part::Field(Field::Name) => hostname.push_str(data.name),
                    Part::Field(Field::Namespace) => hostname.push_str(data.namespace),
                }

                hostname
            })
    }
}

impl Display for FqdnTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for FqdnTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = vec![];
        let mut offset = 0;

        while let Some(start) = s[offset..].find(ACTION_START) {
            let start = offset + start;
            if start > offset {
                parts.push(Part::Literal(s[offset..start].to_string()));
            }

            let body_start = start + ACTION_START.len();
            let body_len = s[body_start..]
                .find(ACTION_END)
                .ok_or(TemplateError::Unclosed(start))?;
            let action = s[body_start..body_start + body_len].trim();

            let field = match action {
                "" => return Err(TemplateError::EmptyAction(start)),
                ".Name" => Field::Name,
                ".Namespace" => Field::Namespace,
                _ => {
                    return Err(TemplateError::UnsupportedAction {
                        action: action.to_string(),
                        position: start,
                    })
                }
            };

            parts.push(Part::Field(field));
            offset = body_start + body_len + ACTION_END.len();
        }

        if offset < s.len() {
            parts.push(Part::Literal(s[offset..].to_string()));
        }

        Ok(Self {
            source: s.to_string(),
            parts,
        })
    }
}
