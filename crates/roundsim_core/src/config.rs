use serde::{Deserialize, Serialize};

use crate::reliability::ReliabilityModel;

/// Run-level settings that are already resolved by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Edge churn applied between rounds; `None` keeps the topology fixed.
    #[serde(default)]
    pub reliability_model: Option<ReliabilityModel>,
    /// Base seed for every node and the updater. Drawn at random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub fn with_reliability(mut self, model: ReliabilityModel) -> Self {
        self.reliability_model = Some(model);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
