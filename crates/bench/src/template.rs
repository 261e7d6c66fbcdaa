//! Command templates
//!
//! Recipe and scorer commands are written as template strings with `$name` /
//! `${name}` placeholders (`$$` is a literal dollar). After substitution the
//! line is split into arguments; double quotes group a token.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use thiserror::Error;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:(\$)|([_A-Za-z][_A-Za-z0-9]*)|\{([_A-Za-z][_A-Za-z0-9]*)\}|)")
        .expect("placeholder pattern is valid")
});

/// Error type for template expansion
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    /// Placeholder names a variable that is not defined for this step
    #[error("unknown template variable '{name}' in `{template}`")]
    UnknownVariable { name: String, template: String },

    /// A `$` that is not followed by a name, `{name}` or `$`
    #[error("invalid placeholder at byte {offset} in `{template}`")]
    InvalidPlaceholder { offset: usize, template: String },

    /// Opening double quote without a closing one
    #[error("unterminated quote in `{0}`")]
    UnterminatedQuote(String),

    /// Nothing left to run after substitution
    #[error("template expands to an empty command")]
    Empty,
}

/// Variables available to a template expansion
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    vars: BTreeMap<&'static str, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &'static str, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name, value.into());
        self
    }

    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

/// Substitute every placeholder in `template`
pub fn substitute(template: &str, vars: &TemplateVars) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        if caps.get(1).is_some() {
            out.push('$');
            continue;
        }

        let name = match caps.get(2).or_else(|| caps.get(3)) {
            Some(m) => m.as_str(),
            None => {
                return Err(TemplateError::InvalidPlaceholder {
                    offset: whole.start(),
                    template: template.to_string(),
                })
            }
        };

        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => {
                return Err(TemplateError::UnknownVariable {
                    name: name.to_string(),
                    template: template.to_string(),
                })
            }
        }
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Split a command line on whitespace, keeping double-quoted runs together
///
/// Quotes are removed from the resulting tokens. There are no escapes.
pub fn split_command(line: &str) -> Result<Vec<String>, TemplateError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_quotes {
        return Err(TemplateError::UnterminatedQuote(line.to_string()));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
