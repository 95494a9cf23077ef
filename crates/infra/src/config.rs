//! Engine configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENV_TRANSFER_PREFIX: &str = "PHARMASTOCK_TRANSFER_PREFIX";
pub const ENV_TRANSFER_CODE_WIDTH: &str = "PHARMASTOCK_TRANSFER_CODE_WIDTH";
pub const ENV_DESTINATION_EXPIRY: &str = "PHARMASTOCK_DESTINATION_EXPIRY";

/// What to do when a transfer line gives no destination expiry date.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationExpiryMode {
    /// Copy the origin batch's expiry.
    #[default]
    Inherit,
    /// Reject the transfer.
    Require,
}

impl core::str::FromStr for DestinationExpiryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inherit" => Ok(Self::Inherit),
            "require" => Ok(Self::Require),
            other => Err(format!("expected `inherit` or `require`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub transfer_prefix: String,
    /// Minimum digits of the transfer number (zero-padded).
    pub transfer_code_width: usize,
    pub destination_expiry: DestinationExpiryMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transfer_prefix: "TRF".to_string(),
            transfer_code_width: 4,
            destination_expiry: DestinationExpiryMode::Inherit,
        }
    }
}

impl EngineConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults and
    /// unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(prefix) = lookup(ENV_TRANSFER_PREFIX) {
            let prefix = prefix.trim();
            if prefix.is_empty() {
                warn!(key = ENV_TRANSFER_PREFIX, "empty transfer prefix, using default");
            } else {
                config.transfer_prefix = prefix.to_string();
            }
        }

        if let Some(raw) = lookup(ENV_TRANSFER_CODE_WIDTH) {
            match raw.trim().parse::<usize>() {
                Ok(width) if (1..=12).contains(&width) => config.transfer_code_width = width,
                _ => warn!(key = ENV_TRANSFER_CODE_WIDTH, value = %raw, "invalid code width, using default"),
            }
        }

        if let Some(raw) = lookup(ENV_DESTINATION_EXPIRY) {
            match raw.parse() {
                Ok(mode) => config.destination_expiry = mode,
                Err(error) => warn!(key = ENV_DESTINATION_EXPIRY, %error, "invalid destination expiry mode, using default"),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(EngineConfig::from_lookup(|_| None), EngineConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_TRANSFER_PREFIX, "TX"),
            (ENV_TRANSFER_CODE_WIDTH, "6"),
            (ENV_DESTINATION_EXPIRY, "Require"),
        ]));
        assert_eq!(config.transfer_prefix, "TX");
        assert_eq!(config.transfer_code_width, 6);
        assert_eq!(config.destination_expiry, DestinationExpiryMode::Require);
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_TRANSFER_PREFIX, "  "),
            (ENV_TRANSFER_CODE_WIDTH, "wide"),
            (ENV_DESTINATION_EXPIRY, "sometimes"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }
}
