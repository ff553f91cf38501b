// src/lib.rs

pub mod asn1;
pub mod cache;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod jwk;
pub mod model;
pub mod provider;

/// The public prelude for the `nila-oidc-discovery` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    #[cfg(feature = "redis-cache")]
    pub use crate::cache::RedisCache;
    pub use crate::cache::{KeyValueCache, MokaCache};
    pub use crate::config::{DiscoveryConfig, DiscoveryConfigBuilder};
    pub use crate::discovery::{DiscoveryService, KeySetReport};
    pub use crate::error::{ConversionError, FetchError, NilaOidcError};
    pub use crate::model::{JsonWebKey, JsonWebKeySet, KeyMap, OpenIdConfiguration, PublicKeyPem};
    pub use crate::provider::{
        resolve_service_config, resolve_verification, DisabledReason, EffectiveServiceConfig,
        EffectiveVerificationConfig, ProviderRecord, ProviderVerificationConfig,
    };
}
