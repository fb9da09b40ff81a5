//! Index tuning parameters

use serde::{Deserialize, Serialize};

/// Default minimum number of compressed bytes between two checkpoints
pub const DEFAULT_CHECKPOINT_SPACING: u64 = 1024 * 1024;

/// Default size of each positioned read of compressed input
pub const DEFAULT_INPUT_BUFFER_SIZE: usize = 32 * 1024;

/// Configuration for [`IndexedGzReader`](crate::IndexedGzReader)
///
/// Checkpoints are only ever captured at deflate block boundaries, so
/// `checkpoint_spacing` is a lower bound on their distance, not a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GzIndexConfig {
    /// Minimum compressed distance between checkpoints (0 captures at every
    /// eligible block boundary)
    pub checkpoint_spacing: u64,
    /// Bytes of compressed input requested per read
    pub input_buffer_size: usize,
    /// Verify gzip CRC-32 and ISIZE trailers for members inflated from
    /// their first byte
    pub verify_checksums: bool,
}

impl Default for GzIndexConfig {
    fn default() -> Self {
        Self {
            checkpoint_spacing: DEFAULT_CHECKPOINT_SPACING,
            input_buffer_size: DEFAULT_INPUT_BUFFER_SIZE,
            verify_checksums: true,
        }
    }
}

impl GzIndexConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum compressed distance between checkpoints
    pub fn with_checkpoint_spacing(mut self, spacing: u64) -> Self {
        self.checkpoint_spacing = spacing;
        self
    }

    /// Set the compressed read size
    pub fn with_input_buffer_size(mut self, size: usize) -> Self {
        self.input_buffer_size = size;
        self
    }

    /// Enable or disable trailer verification
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.input_buffer_size == 0 {
            return Err("input_buffer_size must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GzIndexConfig::default();
        assert_eq!(config.checkpoint_spacing, 1024 * 1024);
        assert!(config.verify_checksums);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_input_buffer_rejected() {
        let config = GzIndexConfig::new().with_input_buffer_size(0);
        assert!(config.validate().is_err());
    }
}
