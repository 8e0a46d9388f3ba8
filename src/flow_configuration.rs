//! Configuration types for flow operations

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};

/// Default number of values the merge engine and the channel bridge buffer
pub const DEFAULT_BUFFER_SIZE: usize = 16;

/// Buffer and concurrency configuration for merging flows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Capacity of the overflow queue shared by all children. 0 is a rendezvous.
    pub buffer_size: usize,
    /// Maximum number of concurrently collected children, `None` for unbounded
    pub concurrency: Option<usize>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            concurrency: None,
        }
    }
}

impl MergeConfig {
    /// Create a new merge configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the overflow queue capacity
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Bound the number of children collected at the same time
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Check the configuration before it is used by an operator
    pub fn validate(&self) -> FlowResult<()> {
        if self.concurrency == Some(0) {
            return Err(FlowError::Config(
                "Merge concurrency should be positive, but was 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a configuration from JSON, missing fields take their defaults
    pub fn from_json(json: &str) -> FlowResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| FlowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration for flows fed by an external push source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Capacity of the buffer between the source and the collector. Every
    /// sender gets one extra slot on top of it.
    pub buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl ChannelConfig {
    /// Create a new channel configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the buffer capacity
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Check the configuration before it is used by an operator. Every buffer
    /// size is valid, 0 included.
    pub fn validate(&self) -> FlowResult<()> {
        Ok(())
    }

    /// Load a configuration from JSON, missing fields take their defaults
    pub fn from_json(json: &str) -> FlowResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| FlowError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
