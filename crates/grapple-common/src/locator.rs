//! Locator candidates and ordered fallback chains.
//!
//! A [`LocatorChain`] names one logical element and lists every way we know of
//! finding it, most specific first. Resolution walks the chain in order and the
//! first candidate that yields a usable element wins, so generic fallbacks such as
//! "any element containing this text" belong at the end.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How a candidate expression is interpreted by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Id,
    Css,
    #[serde(rename = "xpath")]
    XPath,
    LinkText,
    PartialText,
}

impl Strategy {
    /// Shorthand prefix used in `prefix=expression` notation.
    pub fn prefix(&self) -> &'static str {
        match self {
            Strategy::Id => "id",
            Strategy::Css => "css",
            Strategy::XPath => "xpath",
            Strategy::LinkText => "link",
            Strategy::PartialText => "text",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.trim().to_ascii_lowercase().as_str() {
            "id" => Some(Strategy::Id),
            "css" => Some(Strategy::Css),
            "xpath" => Some(Strategy::XPath),
            "link" | "link_text" => Some(Strategy::LinkText),
            "text" | "partial_text" => Some(Strategy::PartialText),
            _ => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Locator chain '{0}' has no candidates")]
    Empty(String),

    #[error("Invalid locator '{input}': {reason}")]
    InvalidCandidate { input: String, reason: String },
}

/// One way of finding an element. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CandidateRepr")]
pub struct LocatorCandidate {
    pub strategy: Strategy,
    pub expression: String,
    pub description: String,
}

/// Accepts both `"css=#login"` and `{strategy: css, expression: "#login"}` in YAML.
#[derive(Deserialize)]
#[serde(untagged)]
enum CandidateRepr {
    Shorthand(String),
    Full {
        strategy: Strategy,
        expression: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl TryFrom<CandidateRepr> for LocatorCandidate {
    type Error = ChainError;

    fn try_from(repr: CandidateRepr) -> Result<Self, Self::Error> {
        match repr {
            CandidateRepr::Shorthand(s) => s.parse(),
            CandidateRepr::Full {
                strategy,
                expression,
                description,
            } => {
                let candidate = LocatorCandidate::new(strategy, expression);
                Ok(match description {
                    Some(d) => candidate.with_description(d),
                    None => candidate,
                })
            }
        }
    }
}

impl LocatorCandidate {
    pub fn new(strategy: Strategy, expression: impl Into<String>) -> Self {
        let expression = expression.into();
        let description = format!("{}={}", strategy.prefix(), expression);
        Self {
            strategy,
            expression,
            description,
        }
    }

    pub fn id(expression: impl Into<String>) -> Self {
        Self::new(Strategy::Id, expression)
    }

    pub fn css(expression: impl Into<String>) -> Self {
        Self::new(Strategy::Css, expression)
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, expression)
    }

    pub fn link_text(expression: impl Into<String>) -> Self {
        Self::new(Strategy::LinkText, expression)
    }

    pub fn partial_text(expression: impl Into<String>) -> Self {
        Self::new(Strategy::PartialText, expression)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// XPath equivalent of a `PartialText` candidate: the innermost elements whose
    /// normalised text contains the expression.
    pub fn partial_text_xpath(&self) -> String {
        let literal = xpath_literal(&self.expression);
        format!(
            "//*[contains(normalize-space(.), {0}) and not(*[contains(normalize-space(.), {0})])]",
            literal
        )
    }
}

impl fmt::Display for LocatorCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl FromStr for LocatorCandidate {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ChainError::InvalidCandidate {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (prefix, expression) = s
            .split_once('=')
            .ok_or_else(|| invalid("expected 'strategy=expression'"))?;
        let strategy = Strategy::from_prefix(prefix).ok_or_else(|| invalid("unknown strategy"))?;
        if expression.trim().is_empty() {
            return Err(invalid("empty expression"));
        }
        Ok(LocatorCandidate::new(strategy, expression.trim()))
    }
}

/// Quote a string as an XPath 1.0 literal, falling back to `concat()` when it
/// contains both quote kinds.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{}'", value)
    } else if !value.contains('"') {
        format!("\"{}\"", value)
    } else {
        let parts: Vec<String> = value
            .split('\'')
            .map(|part| format!("'{}'", part))
            .collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Ordered, non-empty list of candidates for one logical element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocatorChain {
    name: String,
    candidates: Vec<LocatorCandidate>,
}

impl LocatorChain {
    pub fn new(
        name: impl Into<String>,
        candidates: Vec<LocatorCandidate>,
    ) -> Result<Self, ChainError> {
        let name = name.into();
        if candidates.is_empty() {
            return Err(ChainError::Empty(name));
        }
        Ok(Self { name, candidates })
    }

    /// Chain with a single candidate, named after the candidate itself.
    pub fn single(candidate: LocatorCandidate) -> Self {
        Self {
            name: candidate.description.clone(),
            candidates: vec![candidate],
        }
    }

    /// Parse a chain from shorthand strings, e.g. `["id=save", "text=Save"]`.
    pub fn parse<S: AsRef<str>>(name: impl Into<String>, specs: &[S]) -> Result<Self, ChainError> {
        let candidates = specs
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(name, candidates)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn candidates(&self) -> &[LocatorCandidate] {
        &self.candidates
    }

    pub fn get(&self, index: usize) -> Option<&LocatorCandidate> {
        self.candidates.get(index)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Always false for a constructed chain.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocatorCandidate> {
        self.candidates.iter()
    }
}

impl fmt::Display for LocatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
