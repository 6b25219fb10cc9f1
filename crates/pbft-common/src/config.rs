use crate::errors::PbftError;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TX_THRESHOLD: usize = 5;
const DEFAULT_NUM_OF_NODES: usize = 3;

/// Protocol parameters, loaded from YAML.
///
/// ```yaml
/// tx_threshold: 5
/// num_of_nodes: 3
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PbftConfig {
    /// Waiting transactions that trigger a batch (and a block proposal).
    pub tx_threshold: usize,
    /// Size of the validator set.
    pub num_of_nodes: usize,
}

impl Default for PbftConfig {
    fn default() -> Self {
        PbftConfig {
            tx_threshold: DEFAULT_TX_THRESHOLD,
            num_of_nodes: DEFAULT_NUM_OF_NODES,
        }
    }
}

impl PbftConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PbftError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PbftError::ConfigError(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, PbftError> {
        let config: PbftConfig =
            serde_yaml::from_str(content).map_err(|e| PbftError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PbftError> {
        if self.num_of_nodes == 0 {
            return Err(PbftError::ConfigError(
                "num_of_nodes must be at least 1".to_string(),
            ));
        }
        if self.tx_threshold == 0 {
            return Err(PbftError::ConfigError(
                "tx_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn min_approvals(&self) -> usize {
        min_approvals(self.num_of_nodes)
    }
}

/// `2*floor(n/3) + 1`, which is `2f + 1` when `n = 3f + 1`.
pub fn min_approvals(num_of_nodes: usize) -> usize {
    2 * (num_of_nodes / 3) + 1
}
