//! Node configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use hush_mesh::MeshConfig;
use hush_protocol::limits::DEFAULT_MTU;

/// Maximum accepted channel name length in bytes.
pub const MAX_CHANNEL_NAME_LEN: usize = 64;

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds an unusable value.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// Why it is rejected.
        reason: String,
    },
}

/// Facade configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// MTU budget per transport write; larger packets fragment.
    pub mtu: usize,

    /// Payloads at or above this size are prepared on a blocking worker
    /// instead of the coordinator loop.
    pub offload_threshold: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            offload_threshold: 4 * 1024,
        }
    }
}

impl NodeConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the MTU budget.
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Override the worker offload threshold.
    pub fn with_offload_threshold(mut self, threshold: usize) -> Self {
        self.offload_threshold = threshold;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Below ~64 bytes even a minimal signed packet cannot fit a
        // fragment, so the engine could never make progress.
        if self.mtu < 64 {
            return Err(ConfigError::InvalidValue {
                field: "mtu",
                reason: format!("{} is below the 64-byte minimum", self.mtu),
            });
        }
        if self.offload_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "offload_threshold",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub(crate) fn mesh_config(&self) -> MeshConfig {
        MeshConfig {
            mtu: self.mtu,
            offload_threshold: self.offload_threshold,
        }
    }
}
