//! Configuration management for the Lexware rate limiter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{LexwareError, Result};
use crate::ratelimit::{LimitType, RateLimitTier};

/// Prefix of environment variables overriding file configuration.
pub const ENV_PREFIX: &str = "LEXWARE_RATELIMIT";

/// Default namespace of bucket keys in the store.
pub const DEFAULT_KEY_PREFIX: &str = "lexware_ratelimit";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LexwareConfig {
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Default identities used when the caller does not supply its own
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// What to assume about a bucket when the store cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFailurePolicy {
    /// Treat the bucket as full and let the request through
    #[default]
    Open,
    /// Treat the bucket as empty and deny the request
    Closed,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Namespace of bucket keys in the store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Snapshot TTL as a multiple of a tier's full refill time
    #[serde(default = "default_ttl_multiplier")]
    pub ttl_multiplier: u32,

    /// Behaviour when the store is unavailable
    #[serde(default)]
    pub store_failure_policy: StoreFailurePolicy,

    /// Per-connection quota
    #[serde(default = "RateLimitTier::connection_default")]
    pub connection: RateLimitTier,

    /// Per-client quota
    #[serde(default = "RateLimitTier::client_default")]
    pub client: RateLimitTier,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            ttl_multiplier: default_ttl_multiplier(),
            store_failure_policy: StoreFailurePolicy::default(),
            connection: RateLimitTier::connection_default(),
            client: RateLimitTier::client_default(),
        }
    }
}

impl RateLimitingConfig {
    /// Reject configurations the limiter cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            return Err(LexwareError::Config("key_prefix must not be empty".to_string()));
        }
        if self.ttl_multiplier == 0 {
            return Err(LexwareError::Config(
                "ttl_multiplier must be at least 1".to_string(),
            ));
        }
        self.connection.validate(LimitType::Connection)?;
        self.client.validate(LimitType::Client)?;
        Ok(())
    }
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_ttl_multiplier() -> u32 {
    60
}

/// Identities partitioning quotas between unrelated callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Connection (organization) identifier
    #[serde(default = "default_identity")]
    pub connection_id: String,

    /// Client (application) identifier
    #[serde(default = "default_identity")]
    pub client_id: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            connection_id: default_identity(),
            client_id: default_identity(),
        }
    }
}

fn default_identity() -> String {
    "default".to_string()
}

impl LexwareConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LexwareConfig = serde_yaml::from_str(yaml)
            .map_err(|e| LexwareError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file, then apply environment
    /// overrides such as `LEXWARE_RATELIMIT__RATE_LIMITING__CONNECTION__BURST_SIZE=10`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading rate limiter configuration");
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }

        let config: LexwareConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LexwareConfig::default();
        let limits = &config.rate_limiting;
        assert_eq!(limits.key_prefix, "lexware_ratelimit");
        assert_eq!(limits.ttl_multiplier, 60);
        assert_eq!(limits.store_failure_policy, StoreFailurePolicy::Open);
        assert_eq!(limits.connection, RateLimitTier::new(2.0, 5));
        assert_eq!(limits.client, RateLimitTier::new(5.0, 5));
        assert_eq!(config.identity.connection_id, "default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
rate_limiting:
  store_failure_policy: closed
  connection:
    rate_per_second: 1.5
    burst_size: 10
identity:
  connection_id: org-42
"#;
        let config = LexwareConfig::from_yaml(yaml).unwrap();
        let limits = &config.rate_limiting;
        assert_eq!(limits.store_failure_policy, StoreFailurePolicy::Closed);
        assert_eq!(limits.connection, RateLimitTier::new(1.5, 10));
        // Untouched sections keep their defaults
        assert_eq!(limits.client, RateLimitTier::client_default());
        assert_eq!(limits.key_prefix, DEFAULT_KEY_PREFIX);
        assert_eq!(config.identity.connection_id, "org-42");
        assert_eq!(config.identity.client_id, "default");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = LexwareConfig::from_yaml("{}").unwrap();
        assert_eq!(config.rate_limiting.connection, RateLimitTier::connection_default());
    }

    #[test]
    fn test_invalid_tier_is_rejected() {
        let yaml = r#"
rate_limiting:
  client:
    rate_per_second: 0
    burst_size: 5
"#;
        let err = LexwareConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, LexwareError::Config(ref msg) if msg.contains("client")));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let mut config = RateLimitingConfig::default();
        config.key_prefix = String::new();
        assert!(config.validate().is_err());

        let mut config = RateLimitingConfig::default();
        config.ttl_multiplier = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        let err = LexwareConfig::from_yaml("rate_limiting: [").unwrap_err();
        assert!(matches!(err, LexwareError::Config(_)));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = LexwareConfig::load(None).unwrap();
        assert_eq!(config.rate_limiting.key_prefix, DEFAULT_KEY_PREFIX);
        assert_eq!(config.rate_limiting.ttl_multiplier, 60);
    }

    #[test]
    fn test_missing_file() {
        let err = LexwareConfig::from_file("/nonexistent/lexware.yaml").unwrap_err();
        assert!(matches!(err, LexwareError::Io(_)));
    }
}
