// src/provider.rs

//! Decides what key material a provider's JWT verifier receives.
//!
//! The one rule enforced here: an [`EffectiveVerificationConfig`] never has
//! `verify_jwt` set without a non-empty `jwt_public_key`. When key material
//! cannot be obtained, verification is switched off in the derived config
//! (the stored provider settings are left alone) and the reason is kept.

use crate::discovery::DiscoveryService;
use crate::model::KeyMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, error, instrument};

/// A provider as stored by the hosting application.
#[derive(Clone, Deserialize)]
pub struct ProviderRecord {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub verify_jwt: bool,
    /// Off unless explicitly enabled, so records that predate discovery keep
    /// using their manual key.
    #[serde(default)]
    pub use_jwks_discovery: bool,
    #[serde(default)]
    pub jwt_public_key: Option<String>,
}

impl fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("verify_jwt", &self.verify_jwt)
            .field("use_jwks_discovery", &self.use_jwks_discovery)
            .field("has_manual_key", &self.jwt_public_key.is_some())
            .finish()
    }
}

impl ProviderRecord {
    pub fn verification(&self) -> ProviderVerificationConfig {
        ProviderVerificationConfig {
            verify_jwt: self.verify_jwt,
            use_jwks_discovery: self.use_jwks_discovery,
            jwt_public_key: self.jwt_public_key.clone(),
        }
    }
}

/// Per-provider verification settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderVerificationConfig {
    pub verify_jwt: bool,
    pub use_jwks_discovery: bool,
    pub jwt_public_key: Option<String>,
}

/// Why verification was switched off for a provider that asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisabledReason {
    /// The OpenID configuration could not be fetched or has no `jwks_uri`.
    JwksUriUnavailable,
    /// The JWKS document could not be fetched or has no `keys` array.
    JwksUnavailable,
    /// The JWKS was fetched but lists no keys.
    NoKeysPublished,
    /// Every published key failed conversion.
    AllKeysRejected { rejected: usize },
    /// Discovery is off and no manual key is configured.
    MissingManualKey,
}

impl fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JwksUriUnavailable => f.write_str("jwks_uri missing from OpenID configuration"),
            Self::JwksUnavailable => f.write_str("JWKS unreachable or without a keys array"),
            Self::NoKeysPublished => f.write_str("JWKS lists no keys"),
            Self::AllKeysRejected { rejected } => {
                write!(f, "all {} published keys failed conversion", rejected)
            }
            Self::MissingManualKey => f.write_str("manual jwt_public_key is missing"),
        }
    }
}

/// The verification settings handed to the JWT verifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveVerificationConfig {
    verify_jwt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    jwks_uri: Option<String>,
    #[serde(skip_serializing_if = "KeyMap::is_empty")]
    jwt_public_keys: KeyMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    jwt_public_key: Option<String>,
    #[serde(skip)]
    disabled_reason: Option<DisabledReason>,
}

impl EffectiveVerificationConfig {
    /// Verification was never requested.
    fn off() -> Self {
        Self {
            verify_jwt: false,
            jwks_uri: None,
            jwt_public_keys: KeyMap::new(),
            jwt_public_key: None,
            disabled_reason: None,
        }
    }

    fn disabled(reason: DisabledReason, jwks_uri: Option<String>) -> Self {
        Self {
            jwks_uri,
            disabled_reason: Some(reason),
            ..Self::off()
        }
    }

    fn manual(key: String) -> Self {
        Self {
            verify_jwt: true,
            jwt_public_key: Some(key),
            ..Self::off()
        }
    }

    pub fn verify_jwt(&self) -> bool {
        self.verify_jwt
    }

    pub fn jwks_uri(&self) -> Option<&str> {
        self.jwks_uri.as_deref()
    }

    /// All discovered keys, for verifiers that select by `kid`.
    pub fn jwt_public_keys(&self) -> &KeyMap {
        &self.jwt_public_keys
    }

    /// The single key for verifiers that accept only one.
    pub fn jwt_public_key(&self) -> Option<&str> {
        self.jwt_public_key.as_deref()
    }

    /// Set when verification was requested but had to be switched off.
    pub fn disabled_reason(&self) -> Option<&DisabledReason> {
        self.disabled_reason.as_ref()
    }
}

/// Computes the verifier's settings for one provider.
///
/// Never yields `verify_jwt == true` without key material.
#[instrument(skip(service, settings), fields(use_jwks_discovery = settings.use_jwks_discovery))]
pub async fn resolve_verification(
    service: &DiscoveryService,
    provider_id: &str,
    base_url: &str,
    settings: &ProviderVerificationConfig,
) -> EffectiveVerificationConfig {
    if !settings.verify_jwt {
        debug!("JWT verification not requested");
        return EffectiveVerificationConfig::off();
    }

    if settings.use_jwks_discovery {
        resolve_discovered(service, provider_id, base_url, settings).await
    } else {
        resolve_manual(provider_id, base_url, settings)
    }
}

async fn resolve_discovered(
    service: &DiscoveryService,
    provider_id: &str,
    base_url: &str,
    settings: &ProviderVerificationConfig,
) -> EffectiveVerificationConfig {
    let jwks_uri = service.get_jwks_uri(base_url).await;
    if jwks_uri.is_none() {
        error!(
            provider_id,
            base_url, "OIDC JWKS discovery failed: jwks_uri missing from OpenID configuration"
        );
    }

    let report = service.inspect_public_keys(base_url).await;
    let first_key = report
        .keys
        .first()
        .map(|pem| pem.as_str().to_owned())
        .filter(|pem| !pem.is_empty());

    let Some(first_key) = first_key else {
        let reason = match (jwks_uri.is_some(), report.published) {
            (false, _) => DisabledReason::JwksUriUnavailable,
            (true, None) => DisabledReason::JwksUnavailable,
            (true, Some(0)) => DisabledReason::NoKeysPublished,
            (true, Some(_)) => DisabledReason::AllKeysRejected {
                rejected: report.rejected,
            },
        };
        error!(
            provider_id,
            base_url,
            jwks_uri = jwks_uri.as_deref(),
            has_manual_key = settings.jwt_public_key.is_some(),
            reason = %reason,
            "OIDC JWT verification disabled: no usable public key material available"
        );
        return EffectiveVerificationConfig::disabled(reason, jwks_uri);
    };

    debug!(
        provider_id,
        keys = report.keys.len(),
        "Using discovered key material for JWT verification"
    );
    EffectiveVerificationConfig {
        verify_jwt: true,
        jwks_uri,
        jwt_public_keys: report.keys,
        jwt_public_key: Some(first_key),
        disabled_reason: None,
    }
}

fn resolve_manual(
    provider_id: &str,
    base_url: &str,
    settings: &ProviderVerificationConfig,
) -> EffectiveVerificationConfig {
    match settings.jwt_public_key.as_deref() {
        Some(key) if !key.trim().is_empty() => EffectiveVerificationConfig::manual(key.to_owned()),
        _ => {
            error!(
                provider_id,
                base_url, "OIDC JWT verification disabled: manual jwt_public_key is missing"
            );
            EffectiveVerificationConfig::disabled(DisabledReason::MissingManualKey, None)
        }
    }
}

/// The OAuth client configuration the hosting application builds for a
/// provider.
#[derive(Clone, Serialize)]
pub struct EffectiveServiceConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    #[serde(flatten)]
    pub verification: EffectiveVerificationConfig,
}

impl fmt::Debug for EffectiveServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectiveServiceConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("verification", &self.verification)
            .finish()
    }
}

/// Builds the full client configuration for `record`.
pub async fn resolve_service_config(
    service: &DiscoveryService,
    record: &ProviderRecord,
) -> EffectiveServiceConfig {
    let verification =
        resolve_verification(service, &record.id, &record.base_url, &record.verification()).await;
    EffectiveServiceConfig {
        client_id: record.client_id.clone(),
        client_secret: record.client_secret.clone(),
        base_url: record.base_url.clone(),
        verification,
    }
}
