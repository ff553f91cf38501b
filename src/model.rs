// src/model.rs

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// A provider's `.well-known/openid-configuration` document.
///
/// Only `jwks_uri` is interpreted. Every other member is kept untouched in
/// `extra` so the document can be handed on or re-serialized as fetched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenIdConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OpenIdConfiguration {
    /// The JWKS location, if the provider advertised a non-empty string.
    pub fn jwks_uri(&self) -> Option<&str> {
        self.jwks_uri.as_deref().filter(|uri| !uri.is_empty())
    }
}

impl From<Map<String, Value>> for OpenIdConfiguration {
    fn from(mut document: Map<String, Value>) -> Self {
        // A non-string `jwks_uri` is treated as absent rather than rejecting
        // the whole document.
        let jwks_uri = match document.remove("jwks_uri") {
            Some(Value::String(uri)) => Some(uri),
            Some(other) => {
                document.insert("jwks_uri".to_string(), other);
                None
            }
            None => None,
        };
        Self {
            jwks_uri,
            extra: document,
        }
    }
}

/// Represents a JSON Web Key Set (JWKS) document.
///
/// Entries are kept as raw JSON so that one malformed key never prevents the
/// rest of the set from being read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JsonWebKeySet {
    /// Returns `None` when the document has no `keys` array.
    pub fn from_document(mut document: Map<String, Value>) -> Option<Self> {
        match document.remove("keys") {
            Some(Value::Array(keys)) => Some(Self {
                keys,
                extra: document,
            }),
            _ => None,
        }
    }
}

/// Represents a single JSON Web Key (JWK) as defined in RFC 7517.
///
/// Every member is optional at this layer; the converter decides which ones
/// a given `kty` requires.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct JsonWebKey {
    pub kty: Option<String>,
    pub kid: Option<String>,
    #[serde(rename = "use")]
    pub use_purpose: Option<String>,
    pub alg: Option<String>,
    // RSA
    pub n: Option<String>,
    pub e: Option<String>,
    // EC
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

/// A PEM-encoded SubjectPublicKeyInfo.
///
/// Only produced by [`crate::jwk::convert`], so holding one means the PEM is
/// well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PublicKeyPem(String);

impl PublicKeyPem {
    pub(crate) fn new(pem: String) -> Self {
        Self(pem)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PublicKeyPem {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKeyPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One converted key and where it came from in the JWKS.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEntry {
    pub kid: Option<String>,
    /// Position of the key in the source `keys` array.
    pub source_index: usize,
    pub pem: PublicKeyPem,
}

impl KeyEntry {
    /// The `kid`, or `#<source position>` for keys published without one.
    pub fn label(&self) -> String {
        match &self.kid {
            Some(kid) => kid.clone(),
            None => format!("#{}", self.source_index),
        }
    }
}

/// Converted keys of one JWKS, in source order.
///
/// Lookups by `kid` only match keys that carried one. A repeated `kid`
/// replaces the earlier key's material but keeps the earlier position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyMap {
    entries: Vec<KeyEntry>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key, returning the material it displaced when `kid` was
    /// already present.
    pub fn insert(
        &mut self,
        kid: Option<String>,
        source_index: usize,
        pem: PublicKeyPem,
    ) -> Option<PublicKeyPem> {
        if let Some(kid) = kid.as_deref() {
            if let Some(existing) = self
                .entries
                .iter_mut()
                .find(|entry| entry.kid.as_deref() == Some(kid))
            {
                existing.source_index = source_index;
                return Some(std::mem::replace(&mut existing.pem, pem));
            }
        }
        self.entries.push(KeyEntry {
            kid,
            source_index,
            pem,
        });
        None
    }

    pub fn get(&self, kid: &str) -> Option<&PublicKeyPem> {
        self.entries
            .iter()
            .find(|entry| entry.kid.as_deref() == Some(kid))
            .map(|entry| &entry.pem)
    }

    /// The first key in source order, whether or not it has a `kid`.
    pub fn first(&self) -> Option<&PublicKeyPem> {
        self.entries.first().map(|entry| &entry.pem)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyEntry> {
        self.entries.iter()
    }
}

impl Serialize for KeyMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        // A published kid always takes its label over a synthetic one.
        let mut labelled = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let label = entry.label();
            if entry.kid.is_none() && self.get(&label).is_some() {
                warn!(
                    label = %label,
                    source_index = entry.source_index,
                    "Key without kid clashes with a published kid; omitted from serialized key map"
                );
                continue;
            }
            labelled.push((label, &entry.pem));
        }

        let mut map = serializer.serialize_map(Some(labelled.len()))?;
        for (label, pem) in labelled {
            map.serialize_entry(&label, pem)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pem(tag: &str) -> PublicKeyPem {
        PublicKeyPem::new(format!("-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n", tag))
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected a JSON object"),
        }
    }

    #[test]
    fn openid_configuration_keeps_unknown_members() {
        let config = OpenIdConfiguration::from(object(json!({
            "issuer": "https://idp.example.com",
            "jwks_uri": "https://idp.example.com/jwks",
        })));
        assert_eq!(config.jwks_uri(), Some("https://idp.example.com/jwks"));
        assert_eq!(config.extra["issuer"], json!("https://idp.example.com"));
    }

    #[test]
    fn non_string_jwks_uri_is_absent() {
        let config = OpenIdConfiguration::from(object(json!({ "jwks_uri": 42 })));
        assert_eq!(config.jwks_uri(), None);
        assert_eq!(config.extra["jwks_uri"], json!(42));

        let empty = OpenIdConfiguration::from(object(json!({ "jwks_uri": "" })));
        assert_eq!(empty.jwks_uri(), None);
    }

    #[test]
    fn key_set_requires_keys_array() {
        assert!(JsonWebKeySet::from_document(object(json!({ "keys": {} }))).is_none());
        assert!(JsonWebKeySet::from_document(object(json!({}))).is_none());
        let set = JsonWebKeySet::from_document(object(json!({ "keys": [{ "kty": "RSA" }] }))).unwrap();
        assert_eq!(set.keys.len(), 1);
    }

    #[test]
    fn duplicate_kid_last_wins_in_first_position() {
        let mut keys = KeyMap::new();
        assert!(keys.insert(Some("a".into()), 0, pem("one")).is_none());
        keys.insert(Some("b".into()), 1, pem("two"));
        assert_eq!(keys.insert(Some("a".into()), 2, pem("three")), Some(pem("one")));

        assert_eq!(keys.len(), 2);
        assert_eq!(keys.get("a"), Some(&pem("three")));
        assert_eq!(keys.first(), Some(&pem("three")));
    }

    #[test]
    fn keys_without_kid_are_ordered_but_not_addressable() {
        let mut keys = KeyMap::new();
        keys.insert(None, 0, pem("anon"));
        keys.insert(Some("named".into()), 1, pem("named"));

        assert_eq!(keys.first(), Some(&pem("anon")));
        assert_eq!(keys.get("#0"), None);
        assert_eq!(keys.get("named"), Some(&pem("named")));

        let serialized = serde_json::to_value(&keys).unwrap();
        assert_eq!(serialized["#0"], json!(pem("anon").as_str()));
        assert_eq!(serialized["named"], json!(pem("named").as_str()));
    }

    #[test]
    fn numeric_kid_does_not_collide_with_position_label() {
        let mut keys = KeyMap::new();
        keys.insert(Some("1".into()), 0, pem("numeric"));
        keys.insert(None, 1, pem("anon"));

        let serialized = serde_json::to_value(&keys).unwrap();
        let object = serialized.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(object["1"], json!(pem("numeric").as_str()));
        assert_eq!(object["#1"], json!(pem("anon").as_str()));
    }

    #[test]
    fn published_kid_wins_over_synthetic_label() {
        let mut keys = KeyMap::new();
        keys.insert(None, 0, pem("anon"));
        keys.insert(Some("#0".into()), 1, pem("hash-kid"));

        assert_eq!(keys.len(), 2);
        let serialized = serde_json::to_value(&keys).unwrap();
        let object = serialized.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(object["#0"], json!(pem("hash-kid").as_str()));
    }
}
