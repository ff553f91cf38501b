// src/client.rs

use crate::config::DiscoveryConfig;
use crate::error::{FetchError, NilaOidcError};
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use url::Url;

/// Fetches JSON documents from an OIDC provider.
///
/// Every call is bounded by the configured connect and total timeouts. There
/// is no retry here: the discovery service's failure backoff decides when a
/// failed resource may be tried again.
#[derive(Clone)]
pub struct JsonFetcher {
    // reqwest::Client is internally ref-counted, so cloning is cheap.
    http_client: reqwest::Client,
}

impl JsonFetcher {
    /// Creates a fetcher with the timeouts from `config`.
    pub fn new(config: &DiscoveryConfig) -> Result<Self, NilaOidcError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(NilaOidcError::HttpClient)?;
        Ok(Self { http_client })
    }

    /// Wraps an existing client. The caller is responsible for its timeouts.
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// GETs `url` and returns the body as a JSON object.
    ///
    /// Non-2xx statuses, bodies that are not JSON, JSON that is not an object
    /// and empty objects are all reported as errors.
    #[instrument(skip(self), err(level = "debug"))]
    pub async fn fetch_json(&self, url: &str) -> Result<Map<String, Value>, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        let response = self.http_client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(document)) if !document.is_empty() => {
                debug!("Fetched JSON document with {} members", document.len());
                Ok(document)
            }
            _ => Err(FetchError::NotJsonObject {
                url: url.to_string(),
            }),
        }
    }
}
