// src/discovery.rs

use crate::cache::{CacheKeys, KeyValueCache, MokaCache};
use crate::client::JsonFetcher;
use crate::config::DiscoveryConfig;
use crate::error::NilaOidcError;
use crate::jwk;
use crate::model::{JsonWebKeySet, KeyMap, OpenIdConfiguration, PublicKeyPem};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Strips trailing slashes so `https://idp/` and `https://idp` share cache
/// entries.
pub fn normalize_base_url(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// The provider's well-known configuration URL for `base_url`.
pub fn openid_configuration_url(base_url: &str) -> String {
    format!("{}{}", normalize_base_url(base_url), WELL_KNOWN_PATH)
}

/// Discovers OpenID configuration and JWKS key material for providers,
/// caching what it fetches.
///
/// None of the lookups fail: remote outages, malformed documents and keys
/// that cannot be converted are logged and surface as `None` or an empty
/// [`KeyMap`]. After a failed fetch the resource is not requested again until
/// the failure backoff expires or [`clear_cache`](Self::clear_cache) is
/// called.
#[derive(Clone)]
pub struct DiscoveryService {
    // The service is internally ref-counted to allow for cheap cloning.
    inner: Arc<Inner>,
}

struct Inner {
    config: DiscoveryConfig,
    fetcher: JsonFetcher,
    cache: Arc<dyn KeyValueCache>,
    keys: CacheKeys,
}

/// Converted keys plus the counts needed to explain an empty result.
#[derive(Debug, Clone, Default)]
pub struct KeySetReport {
    pub keys: KeyMap,
    /// Number of entries in the JWKS `keys` array; `None` when no JWKS could
    /// be obtained.
    pub published: Option<usize>,
    /// Entries dropped because they could not be converted.
    pub rejected: usize,
}

/// Where a document came from.
enum Lookup {
    Cached(Map<String, Value>),
    Fetched(Map<String, Value>),
}

impl Lookup {
    fn into_document(self) -> Map<String, Value> {
        match self {
            Lookup::Cached(document) | Lookup::Fetched(document) => document,
        }
    }
}

impl DiscoveryService {
    /// Creates a service backed by an in-memory cache.
    pub fn new(config: DiscoveryConfig) -> Result<Self, NilaOidcError> {
        let cache = Arc::new(MokaCache::new(config.cache_capacity));
        Self::with_cache(config, cache)
    }

    /// Creates a service over a caller-supplied cache, e.g. a store shared
    /// between processes.
    pub fn with_cache(
        config: DiscoveryConfig,
        cache: Arc<dyn KeyValueCache>,
    ) -> Result<Self, NilaOidcError> {
        let fetcher = JsonFetcher::new(&config)?;
        Ok(Self::from_parts(config, fetcher, cache))
    }

    pub fn from_parts(
        config: DiscoveryConfig,
        fetcher: JsonFetcher,
        cache: Arc<dyn KeyValueCache>,
    ) -> Self {
        let keys = CacheKeys::new(config.cache_key_version.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                cache,
                keys,
            }),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.inner.config
    }

    /// Returns the provider's OpenID configuration document.
    #[instrument(skip(self))]
    pub async fn get_openid_configuration(&self, base_url: &str) -> Option<OpenIdConfiguration> {
        let config_url = openid_configuration_url(base_url);
        let key = self.inner.keys.openid_config(&config_url);
        let lookup = self
            .cached_fetch(&key, &config_url, self.inner.config.config_ttl, "OpenID configuration")
            .await?;
        Some(OpenIdConfiguration::from(lookup.into_document()))
    }

    /// Returns the `jwks_uri` advertised in the provider's configuration.
    pub async fn get_jwks_uri(&self, base_url: &str) -> Option<String> {
        self.get_openid_configuration(base_url)
            .await?
            .jwks_uri()
            .map(str::to_owned)
    }

    /// Returns the provider's JWKS document.
    #[instrument(skip(self))]
    pub async fn get_jwks(&self, base_url: &str) -> Option<JsonWebKeySet> {
        let Some(jwks_uri) = self.get_jwks_uri(base_url).await else {
            error!(base_url, "JWKS URI not found in OpenID configuration");
            return None;
        };

        let key = self.inner.keys.jwks(&jwks_uri);
        let lookup = self
            .cached_fetch(&key, &jwks_uri, self.inner.config.jwks_ttl, "JWKS")
            .await?;

        let document = match lookup {
            Lookup::Fetched(document) => {
                let pointer = self
                    .inner
                    .keys
                    .jwks_uri_pointer(&openid_configuration_url(base_url));
                self.inner
                    .cache
                    .put(&pointer, Value::String(jwks_uri.clone()), self.inner.config.jwks_ttl)
                    .await;
                document
            }
            Lookup::Cached(document) => document,
        };

        let jwks = JsonWebKeySet::from_document(document);
        if jwks.is_none() {
            error!(base_url, uri = %jwks_uri, "JWKS document has no 'keys' array");
        }
        jwks
    }

    /// Converts every key in the provider's JWKS.
    ///
    /// Keys that cannot be converted are skipped with a warning; the rest are
    /// still returned. The map is empty when the JWKS is unavailable.
    pub async fn get_public_keys(&self, base_url: &str) -> KeyMap {
        self.inspect_public_keys(base_url).await.keys
    }

    /// Like [`get_public_keys`](Self::get_public_keys), but also reports how
    /// many keys were published and how many were rejected.
    #[instrument(skip(self))]
    pub async fn inspect_public_keys(&self, base_url: &str) -> KeySetReport {
        let mut report = KeySetReport::default();
        let Some(jwks) = self.get_jwks(base_url).await else {
            return report;
        };
        report.published = Some(jwks.keys.len());

        for (index, entry) in jwks.keys.iter().enumerate() {
            let kid = entry.get("kid").and_then(Value::as_str);
            match jwk::convert_value(entry) {
                Ok((jwk, pem)) => {
                    if report.keys.insert(jwk.kid, index, pem).is_some() {
                        warn!(base_url, kid, index, "Duplicate kid in JWKS; later key replaces earlier one");
                    }
                }
                Err(e) => {
                    report.rejected += 1;
                    warn!(base_url, kid, index, error = %e, "Skipping JWK that could not be converted");
                }
            }
        }

        if report.keys.is_empty() {
            error!(
                base_url,
                published = jwks.keys.len(),
                rejected = report.rejected,
                "JWKS yielded no usable public keys"
            );
        } else {
            debug!(base_url, count = report.keys.len(), "Converted JWKS public keys");
        }
        report
    }

    /// Returns the key published under `kid`.
    pub async fn get_public_key(&self, base_url: &str, kid: &str) -> Option<PublicKeyPem> {
        self.get_public_keys(base_url).await.get(kid).cloned()
    }

    /// Returns the first key in JWKS order, for providers that publish no
    /// `kid` or verifiers that accept a single key.
    pub async fn get_first_public_key(&self, base_url: &str) -> Option<PublicKeyPem> {
        self.get_public_keys(base_url).await.first().cloned()
    }

    /// Forgets cached configuration and JWKS entries for `base_url`, along
    /// with their failure markers.
    ///
    /// Never performs a network request: the JWKS URI to forget is read from
    /// what is already cached.
    #[instrument(skip(self))]
    pub async fn clear_cache(&self, base_url: &str) {
        let cache = &self.inner.cache;
        let keys = &self.inner.keys;
        let config_url = openid_configuration_url(base_url);
        let config_key = keys.openid_config(&config_url);
        let pointer_key = keys.jwks_uri_pointer(&config_url);

        let mut jwks_uris = Vec::with_capacity(2);
        if let Some(Value::String(uri)) = cache.get(&pointer_key).await {
            jwks_uris.push(uri);
        }
        if let Some(Value::Object(document)) = cache.get(&config_key).await {
            if let Some(uri) = OpenIdConfiguration::from(document).jwks_uri() {
                if !jwks_uris.iter().any(|known| known == uri) {
                    jwks_uris.push(uri.to_owned());
                }
            }
        }

        cache.forget(&config_key).await;
        cache.forget(&CacheKeys::failure(&config_key)).await;
        cache.forget(&CacheKeys::legacy_openid_config(&config_url)).await;
        cache.forget(&pointer_key).await;

        for uri in &jwks_uris {
            let jwks_key = keys.jwks(uri);
            cache.forget(&jwks_key).await;
            cache.forget(&CacheKeys::failure(&jwks_key)).await;
            cache.forget(&CacheKeys::legacy_jwks(uri)).await;
        }

        info!(base_url, jwks_uris = ?jwks_uris, "Cleared discovery cache");
    }

    /// Cache, then backoff marker, then network.
    async fn cached_fetch(
        &self,
        key: &str,
        url: &str,
        ttl: Duration,
        what: &'static str,
    ) -> Option<Lookup> {
        let cache = &self.inner.cache;

        // Anything other than an object (e.g. a null left by an older
        // release) counts as a miss.
        if let Some(Value::Object(document)) = cache.get(key).await {
            debug!(url, "{} cache hit", what);
            return Some(Lookup::Cached(document));
        }

        let failure_key = CacheKeys::failure(key);
        if cache.get(&failure_key).await == Some(Value::Bool(true)) {
            debug!(url, "{} fetch skipped: recent failure still in backoff", what);
            return None;
        }

        debug!(url, "{} cache miss, fetching", what);
        match self.inner.fetcher.fetch_json(url).await {
            Ok(document) => {
                cache.put(key, Value::Object(document.clone()), ttl).await;
                cache.forget(&failure_key).await;
                Some(Lookup::Fetched(document))
            }
            Err(e) => {
                error!(url, error = %e, "Failed to fetch {}", what);
                cache
                    .put(&failure_key, Value::Bool(true), self.inner.config.failure_backoff)
                    .await;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_url_ignores_trailing_slashes() {
        assert_eq!(
            openid_configuration_url("https://idp.example.com/"),
            "https://idp.example.com/.well-known/openid-configuration"
        );
        assert_eq!(
            openid_configuration_url("https://idp.example.com/realms/main//"),
            "https://idp.example.com/realms/main/.well-known/openid-configuration"
        );
    }
}
