//! Target model types.

use serde::{Deserialize, Serialize};

/// Criticality tier of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Critical,
    Standard,
}

/// A monitored dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    /// Endpoint URL checked by the prober.
    pub endpoint: String,
    pub tier: Tier,
}

impl Target {
    pub fn new(name: &str, endpoint: &str, tier: Tier) -> Self {
        Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            tier,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.tier == Tier::Critical
    }
}
