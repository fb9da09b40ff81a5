//! Line buffer configuration

use logview_gzindex::GzIndexConfig;
use serde::{Deserialize, Serialize};

/// Lookahead used for an ordinary line read
pub const DEFAULT_LINE_BUFFER_SIZE: usize = 256 * 1024;

/// Hard ceiling on the cache, and so on the longest line
pub const MAX_LINE_BUFFER_SIZE: usize = 16 * DEFAULT_LINE_BUFFER_SIZE;

/// Cache capacities are rounded up to a multiple of this
pub const DEFAULT_GROWTH_INCREMENT: usize = 128 * 1024;

/// Configuration for [`LineBuffer`](crate::LineBuffer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineBufferConfig {
    /// Bytes requested when looking for the end of a line
    pub default_capacity: usize,
    /// Largest cache the engine will allocate
    pub max_capacity: usize,
    /// Capacity rounding unit
    pub growth_increment: usize,
    /// Grow-and-retry cycles after the first lookahead finds no delimiter.
    /// The last cycle always requests `max_capacity`.
    pub grow_retries: u32,
    /// Line delimiter
    pub delimiter: u8,
    /// Settings for gzip sources
    pub gz: GzIndexConfig,
}

impl Default for LineBufferConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_LINE_BUFFER_SIZE,
            max_capacity: MAX_LINE_BUFFER_SIZE,
            growth_increment: DEFAULT_GROWTH_INCREMENT,
            grow_retries: 1,
            delimiter: b'\n',
            gz: GzIndexConfig::default(),
        }
    }
}

impl LineBufferConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ordinary lookahead
    pub fn with_default_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = capacity;
        self
    }

    /// Set the hard ceiling on the cache
    pub fn with_max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = capacity;
        self
    }

    /// Set the capacity rounding unit
    pub fn with_growth_increment(mut self, increment: usize) -> Self {
        self.growth_increment = increment;
        self
    }

    /// Set the number of grow-and-retry cycles
    pub fn with_grow_retries(mut self, retries: u32) -> Self {
        self.grow_retries = retries;
        self
    }

    /// Set the line delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the gzip index configuration
    pub fn with_gz(mut self, gz: GzIndexConfig) -> Self {
        self.gz = gz;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.default_capacity == 0 {
            return Err("default_capacity must be greater than 0".to_string());
        }

        if self.max_capacity == 0 {
            return Err("max_capacity must be greater than 0".to_string());
        }

        if self.default_capacity > self.max_capacity {
            return Err(format!(
                "default_capacity ({}) must not exceed max_capacity ({})",
                self.default_capacity, self.max_capacity
            ));
        }

        if self.growth_increment == 0 {
            return Err("growth_increment must be greater than 0".to_string());
        }

        self.gz.validate()
    }
}
