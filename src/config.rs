//! Engine configuration.
//!
//! Values come from an optional TOML file layered with `RENTCORE__`
//! environment variables, e.g. `RENTCORE__PRICING__SERVICE_RATE=0.06` or
//! `RENTCORE__LOGGING__LEVEL=debug`. Every field has a default so an empty
//! configuration yields the published rates.

use crate::domain::cancellation::CancellationPolicy;
use crate::domain::pricing::PricingPolicy;
use crate::error::{RentalError, Result};
use crate::infrastructure::gateway::SANDBOX_SECRET;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "RENTCORE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub pricing: PricingPolicy,
    #[serde(default)]
    pub cancellation: CancellationPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Wallet provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Shared secret the provider signs callbacks with.
    #[serde(default = "default_callback_secret")]
    pub callback_secret: String,
}

fn default_base_url() -> String {
    "https://sandbox.wallet.local/pay".to_string()
}

fn default_callback_secret() -> String {
    SANDBOX_SECRET.to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            callback_secret: default_callback_secret(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    /// `pretty` or `compact`.
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "compact".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

impl EngineConfig {
    /// Loads the configuration. A missing `path` means environment and
    /// defaults only; a `path` that does not exist is an error. Cancellation
    /// windows are range-checked before the policy is handed out.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = config.try_deserialize()?;
        config.cancellation.validate()?;
        if config.gateway.callback_secret.is_empty() {
            return Err(RentalError::Validation(
                "gateway.callback_secret must not be empty".to_string(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.pricing, PricingPolicy::default());
        assert_eq!(config.cancellation, CancellationPolicy::default());
    }

    #[test]
    fn test_file_overrides_only_named_fields() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[pricing]\nadd_on_daily_rate = 50000\n\n[cancellation]\ngrace_minutes = 30\n\n[logging]\nlevel = \"debug\""
        )
        .unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.pricing.add_on_daily_rate, Money::new(dec!(50000)));
        assert_eq!(config.pricing.fallback_deposit, Money::new(dec!(5000000)));
        assert_eq!(config.cancellation.grace_minutes, 30);
        assert_eq!(config.cancellation.notice_days, 7);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.gateway, GatewayConfig::default());
    }

    #[test]
    fn test_out_of_range_settings_are_rejected() {
        for body in [
            "[cancellation]\ngrace_minutes = -1",
            "[cancellation]\ngrace_minutes = 9223372036854775807",
            "[cancellation]\nnotice_days = 400000000000000",
            "[cancellation]\nlate_rate = 1.5",
            "[gateway]\ncallback_secret = \"\"",
        ] {
            let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
            writeln!(file, "{body}").unwrap();
            let err = EngineConfig::load(Some(file.path()));
            assert!(
                matches!(err, Err(RentalError::Validation(_))),
                "{body} was accepted"
            );
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = EngineConfig::load(Some(Path::new("/nonexistent/rentcore.toml")));
        assert!(err.is_err());
    }
}
