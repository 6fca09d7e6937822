//! Immutable registry of targets.

use std::collections::HashSet;

use thiserror::Error;

use super::models::*;

/// Registry error types.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("duplicate target name: {0}")]
    Duplicate(String),
    #[error("target name cannot be empty")]
    EmptyName,
}

/// The set of targets, fixed at construction and kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    /// Build a registry, rejecting empty or repeated names.
    pub fn new(targets: Vec<Target>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for target in &targets {
            if target.name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if !seen.insert(target.name.as_str()) {
                return Err(RegistryError::Duplicate(target.name.clone()));
            }
        }
        Ok(Self { targets })
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn critical(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter().filter(|t| t.is_critical())
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
