//! Declarative table of logical element names to locator chains.
//!
//! ```yaml
//! save_button:
//!   - id=save
//!   - css=button[type='submit']
//!   - text=Save
//! ```

use crate::locator::{ChainError, LocatorCandidate, LocatorChain};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Unknown element '{0}'")]
    UnknownElement(String),

    #[error("Duplicate element '{0}'")]
    Duplicate(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("Failed to read locator table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse locator table: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Vec<LocatorCandidate>>")]
pub struct LocatorTable {
    chains: BTreeMap<String, LocatorChain>,
}

impl TryFrom<BTreeMap<String, Vec<LocatorCandidate>>> for LocatorTable {
    type Error = ChainError;

    fn try_from(raw: BTreeMap<String, Vec<LocatorCandidate>>) -> Result<Self, Self::Error> {
        let chains = raw
            .into_iter()
            .map(|(name, candidates)| {
                let chain = LocatorChain::new(name.clone(), candidates)?;
                Ok((name, chain))
            })
            .collect::<Result<BTreeMap<_, _>, ChainError>>()?;
        Ok(Self { chains })
    }
}

impl LocatorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, TableError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Register a chain under its own name.
    pub fn insert(&mut self, chain: LocatorChain) -> Result<(), TableError> {
        let name = chain.name().to_string();
        if self.chains.contains_key(&name) {
            return Err(TableError::Duplicate(name));
        }
        self.chains.insert(name, chain);
        Ok(())
    }

    /// Builder-style registration from shorthand specs.
    pub fn with<S: AsRef<str>>(mut self, name: &str, specs: &[S]) -> Result<Self, TableError> {
        self.insert(LocatorChain::parse(name, specs)?)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&LocatorChain, TableError> {
        self.chains
            .get(name)
            .ok_or_else(|| TableError::UnknownElement(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.chains.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Merge another table into this one; names already present are an error.
    pub fn extend(&mut self, other: LocatorTable) -> Result<(), TableError> {
        for (_, chain) in other.chains {
            self.insert(chain)?;
        }
        Ok(())
    }
}
