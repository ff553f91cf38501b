// src/error.rs

use thiserror::Error;

/// Failure while retrieving a remote JSON document.
///
/// These never reach callers of the discovery service: they are logged at the
/// point of failure and turned into an absent result plus a backoff marker.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, timeout or body-read failure.
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with a non-2xx status.
    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    /// The body was not JSON, was not an object, or was an empty object.
    #[error("Response from {url} was not a non-empty JSON object")]
    NotJsonObject { url: String },

    /// The URL to fetch could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Failure while turning one JWK into PEM key material.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),

    /// A required member is missing, empty, or not valid base64url.
    #[error("Malformed JWK field '{field}': {reason}")]
    MalformedField { field: &'static str, reason: String },
}

impl ConversionError {
    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedField {
            field,
            reason: reason.into(),
        }
    }
}

/// The primary error type for the `nila-oidc-discovery` library.
///
/// Only construction-time operations (building a config, connecting a cache
/// backend, creating the HTTP client) return this. Discovery lookups report
/// failure as absent values instead.
#[derive(Debug, Error)]
pub enum NilaOidcError {
    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// The cache backend could not be reached or initialised.
    #[error("Cache backend error: {0}")]
    Cache(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}
