//! Ordered store configuration

use meghaduta_durability::{DurabilityMode, WalConfig, WalConfigError};

/// Configuration for opening an [`OrderedStore`](crate::OrderedStore).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// When WAL writes reach disk
    pub durability: DurabilityMode,
    /// WAL segment sizing and sync thresholds
    pub wal_config: WalConfig,
}

impl StorageConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the durability mode.
    pub fn with_durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    /// Set the WAL configuration.
    pub fn with_wal_config(mut self, wal_config: WalConfig) -> Self {
        self.wal_config = wal_config;
        self
    }

    /// Small segments and fsync on every write, for tests.
    pub fn for_testing() -> Self {
        StorageConfig {
            durability: DurabilityMode::Always,
            wal_config: WalConfig::for_testing(),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), WalConfigError> {
        self.wal_config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = StorageConfig::new()
            .with_durability(DurabilityMode::Cache)
            .with_wal_config(WalConfig::for_testing());
        assert_eq!(config.durability, DurabilityMode::Cache);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_for_testing_is_strict() {
        assert!(StorageConfig::for_testing().durability.requires_immediate_fsync());
    }
}
