//! Universe configuration.

use serde::{Deserialize, Serialize};

/// Default entity capacity of worlds and component stores.
pub const DEFAULT_CAPACITY: usize = 1_000_000;

/// Default size of a serializer's scratch buffer.
pub const DEFAULT_MAX_BYTES: usize = 5_000_000;

/// Sizing defaults applied by a [`Universe`](crate::Universe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcsConfig {
    /// Capacity of worlds created with
    /// [`create_default_world`](crate::Universe::create_default_world) and of
    /// stores created with [`define_component`](crate::Universe::define_component).
    pub default_capacity: usize,
    /// Scratch buffer size of serializers created with
    /// [`Serializer::with_config`](crate::Serializer::with_config).
    pub default_max_bytes: usize,
}

impl EcsConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the default entity capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = capacity;
        self
    }

    /// Override the default serializer scratch size.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.default_max_bytes = max_bytes;
        self
    }
}

impl Default for EcsConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CAPACITY,
            default_max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = EcsConfig::new().with_capacity(64).with_max_bytes(1024);
        assert_eq!(config.default_capacity, 64);
        assert_eq!(config.default_max_bytes, 1024);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EcsConfig = serde_json::from_str(r#"{ "default_capacity": 10 }"#).unwrap();
        assert_eq!(config.default_capacity, 10);
        assert_eq!(config.default_max_bytes, DEFAULT_MAX_BYTES);
    }
}
