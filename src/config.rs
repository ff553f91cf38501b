// src/config.rs

use crate::error::NilaOidcError;
use std::time::Duration;

/// Tuning for the discovery service: cache lifetimes, failure backoff and
/// outbound HTTP timeouts.
///
/// Construct it with [`DiscoveryConfigBuilder`], or use `Default` for the
/// production values.
#[derive(Clone, Debug)]
pub struct DiscoveryConfig {
    /// How long a fetched OpenID configuration stays cached.
    /// Defaults to 60 minutes.
    pub config_ttl: Duration,
    /// How long a fetched JWKS document stays cached. This bounds how long a
    /// key rotation can go unnoticed unless the cache is cleared.
    /// Defaults to 60 minutes.
    pub jwks_ttl: Duration,
    /// Minimum interval between outbound attempts for a resource that just
    /// failed. Defaults to 30 seconds.
    pub failure_backoff: Duration,
    /// Defaults to 5 seconds.
    pub connect_timeout: Duration,
    /// Total time allowed for one request, connect included.
    /// Defaults to 10 seconds.
    pub request_timeout: Duration,
    /// Tag mixed into every cache key so entries written by an older schema
    /// are never read back. Defaults to `"v2"`.
    pub cache_key_version: String,
    /// Upper bound on entries held by the in-memory cache.
    pub cache_capacity: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            config_ttl: Duration::from_secs(60 * 60),
            jwks_ttl: Duration::from_secs(60 * 60),
            failure_backoff: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            cache_key_version: "v2".to_string(),
            cache_capacity: 1_000,
        }
    }
}

/// A builder for creating a `DiscoveryConfig` instance.
#[derive(Default)]
pub struct DiscoveryConfigBuilder {
    config_ttl: Option<Duration>,
    jwks_ttl: Option<Duration>,
    failure_backoff: Option<Duration>,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
    cache_key_version: Option<String>,
    cache_capacity: Option<u64>,
}

impl DiscoveryConfigBuilder {
    /// Creates a new `DiscoveryConfigBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TTL for cached OpenID configuration documents.
    pub fn config_ttl(mut self, ttl: Duration) -> Self {
        self.config_ttl = Some(ttl);
        self
    }

    /// Sets the TTL for cached JWKS documents.
    pub fn jwks_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_ttl = Some(ttl);
        self
    }

    /// Sets the backoff window recorded after a failed fetch.
    pub fn failure_backoff(mut self, backoff: Duration) -> Self {
        self.failure_backoff = Some(backoff);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the cache key version tag. Bump it when the cached value shape
    /// changes so that a shared store never serves the old shape.
    pub fn cache_key_version(mut self, version: impl Into<String>) -> Self {
        self.cache_key_version = Some(version.into());
        self
    }

    pub fn cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Consumes the builder and returns a `DiscoveryConfig`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if any duration or the capacity is zero,
    /// or the connect timeout exceeds the request timeout. A blank cache
    /// version is `MissingConfiguration`.
    pub fn build(self) -> Result<DiscoveryConfig, NilaOidcError> {
        let defaults = DiscoveryConfig::default();
        let config = DiscoveryConfig {
            config_ttl: self.config_ttl.unwrap_or(defaults.config_ttl),
            jwks_ttl: self.jwks_ttl.unwrap_or(defaults.jwks_ttl),
            failure_backoff: self.failure_backoff.unwrap_or(defaults.failure_backoff),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            cache_key_version: self.cache_key_version.unwrap_or(defaults.cache_key_version),
            cache_capacity: self.cache_capacity.unwrap_or(defaults.cache_capacity),
        };

        for (name, value) in [
            ("config_ttl", config.config_ttl),
            ("jwks_ttl", config.jwks_ttl),
            ("failure_backoff", config.failure_backoff),
            ("connect_timeout", config.connect_timeout),
            ("request_timeout", config.request_timeout),
        ] {
            if value.is_zero() {
                return Err(NilaOidcError::InvalidConfiguration(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        if config.connect_timeout > config.request_timeout {
            return Err(NilaOidcError::InvalidConfiguration(
                "connect_timeout cannot exceed request_timeout".to_string(),
            ));
        }
        if config.cache_key_version.trim().is_empty() {
            return Err(NilaOidcError::MissingConfiguration(
                "cache_key_version".to_string(),
            ));
        }
        if config.cache_capacity == 0 {
            return Err(NilaOidcError::InvalidConfiguration(
                "cache_capacity must be greater than zero".to_string(),
            ));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_values() {
        let config = DiscoveryConfigBuilder::new().build().unwrap();
        assert_eq!(config.config_ttl, Duration::from_secs(3600));
        assert_eq!(config.jwks_ttl, Duration::from_secs(3600));
        assert_eq!(config.failure_backoff, Duration::from_secs(30));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.cache_key_version, "v2");
    }

    #[test]
    fn rejects_zero_backoff() {
        let result = DiscoveryConfigBuilder::new()
            .failure_backoff(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(NilaOidcError::InvalidConfiguration(_))));
    }

    #[test]
    fn rejects_connect_timeout_longer_than_request_timeout() {
        let result = DiscoveryConfigBuilder::new()
            .connect_timeout(Duration::from_secs(20))
            .request_timeout(Duration::from_secs(10))
            .build();
        assert!(matches!(result, Err(NilaOidcError::InvalidConfiguration(_))));
    }

    #[test]
    fn rejects_blank_cache_version() {
        let result = DiscoveryConfigBuilder::new().cache_key_version("  ").build();
        assert!(matches!(result, Err(NilaOidcError::MissingConfiguration(_))));
    }
}
