//! Runtime Configuration
//!
//! A small set of knobs that the reactive core and the scheduler consult.
//! Configuration is per thread, like the rest of the runtime state.

use std::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};

/// Largest nesting depth the dependency bitmarks can represent.
pub const MAX_MARKER_BITS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Effects nested deeper than this fall back to full unsubscribe and
    /// resubscribe on every run instead of bitmask pruning.
    pub max_marker_bits: u32,

    /// How many times one job may run within a single flush chain.
    pub recursion_limit: usize,

    /// Report duplicate keys found in keyed child lists.
    pub warn_duplicate_keys: bool,

    /// How many `null` slots one array write may pad before it is rejected.
    pub max_array_gap: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_marker_bits: MAX_MARKER_BITS,
            recursion_limit: 100,
            warn_duplicate_keys: true,
            max_array_gap: 1 << 16,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_marker_bits == 0 || self.max_marker_bits > MAX_MARKER_BITS {
            return Err(RuntimeError::InvalidConfig {
                reason: format!(
                    "max_marker_bits must be within 1..={MAX_MARKER_BITS}, got {}",
                    self.max_marker_bits
                ),
            });
        }
        if self.recursion_limit == 0 {
            return Err(RuntimeError::InvalidConfig {
                reason: "recursion_limit must be positive".to_string(),
            });
        }
        Ok(())
    }
}

thread_local! {
    static CONFIG: Cell<RuntimeConfig> = Cell::new(RuntimeConfig::default());
}

/// Install a configuration for the current thread.
pub fn configure(config: RuntimeConfig) -> Result<()> {
    config.validate()?;
    tracing::debug!(?config, "runtime configured");
    CONFIG.with(|c| c.set(config));
    Ok(())
}

/// The configuration active on the current thread.
pub fn config() -> RuntimeConfig {
    CONFIG.with(|c| c.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = RuntimeConfig::from_json(r#"{ "recursion_limit": 5 }"#).unwrap();
        assert_eq!(config.recursion_limit, 5);
        assert_eq!(config.max_marker_bits, MAX_MARKER_BITS);
        assert!(config.warn_duplicate_keys);
        assert_eq!(config.max_array_gap, 1 << 16);
    }

    #[test]
    fn rejects_marker_bits_out_of_range() {
        let err = RuntimeConfig::from_json(r#"{ "max_marker_bits": 31 }"#).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidConfig { .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = RuntimeConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn configure_is_per_thread() {
        let custom = RuntimeConfig {
            recursion_limit: 3,
            ..RuntimeConfig::default()
        };
        configure(custom).unwrap();
        assert_eq!(config().recursion_limit, 3);

        let other = std::thread::spawn(|| config().recursion_limit).join().unwrap();
        assert_eq!(other, 100);
    }
}
