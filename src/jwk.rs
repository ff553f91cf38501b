// src/jwk.rs

//! Conversion of a single JWK into a PEM `PUBLIC KEY` block.
//!
//! RSA keys become `rsaEncryption` SubjectPublicKeyInfo structures and EC keys
//! become `id-ecPublicKey` structures carrying the named curve. The output is
//! what PEM-based verifiers such as `jsonwebtoken::DecodingKey::from_rsa_pem`
//! or `from_ec_pem` accept.

use crate::asn1::{encode_bit_string, encode_integer, encode_sequence};
use crate::error::ConversionError;
use crate::model::{JsonWebKey, PublicKeyPem};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::Value;

/// AlgorithmIdentifier { rsaEncryption (1.2.840.113549.1.1.1), NULL }
const RSA_ALGORITHM_IDENTIFIER: [u8; 15] = [
    0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00,
];

/// OBJECT IDENTIFIER id-ecPublicKey (1.2.840.10045.2.1)
const EC_PUBLIC_KEY_OID: [u8; 9] = [0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];

const PEM_LINE_WIDTH: usize = 64;

/// The named curves accepted for `kty: "EC"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    P256,
    P384,
    P521,
}

impl Curve {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(Self::P256),
            "P-384" => Some(Self::P384),
            "P-521" => Some(Self::P521),
            _ => None,
        }
    }

    /// Byte length of one affine coordinate.
    pub fn coordinate_len(self) -> usize {
        match self {
            Self::P256 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    /// DER-encoded OBJECT IDENTIFIER of the curve.
    fn oid(self) -> &'static [u8] {
        match self {
            // 1.2.840.10045.3.1.7
            Self::P256 => &[0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07],
            // 1.3.132.0.34
            Self::P384 => &[0x06, 0x05, 0x2b, 0x81, 0x04, 0x00, 0x22],
            // 1.3.132.0.35
            Self::P521 => &[0x06, 0x05, 0x2b, 0x81, 0x04, 0x00, 0x23],
        }
    }
}

/// Converts one raw JWKS entry. Entries that are not JSON objects, or whose
/// members have the wrong JSON type, are reported as malformed.
pub fn convert_value(value: &Value) -> Result<(JsonWebKey, PublicKeyPem), ConversionError> {
    let jwk: JsonWebKey = serde_json::from_value(value.clone())
        .map_err(|e| ConversionError::malformed("jwk", e.to_string()))?;
    let pem = convert(&jwk)?;
    Ok((jwk, pem))
}

/// Converts a JWK into PEM-encoded SubjectPublicKeyInfo.
pub fn convert(jwk: &JsonWebKey) -> Result<PublicKeyPem, ConversionError> {
    let kty = required("kty", jwk.kty.as_deref())?;
    let der = match kty {
        "RSA" => rsa_spki(jwk)?,
        "EC" => ec_spki(jwk)?,
        other => return Err(ConversionError::UnsupportedKeyType(other.to_string())),
    };
    Ok(PublicKeyPem::new(to_pem(&der)))
}

fn rsa_spki(jwk: &JsonWebKey) -> Result<Vec<u8>, ConversionError> {
    let modulus = decode_field("n", jwk.n.as_deref())?;
    let exponent = decode_field("e", jwk.e.as_deref())?;

    let modulus = unsigned_integer("n", &modulus)?;
    let exponent = unsigned_integer("e", &exponent)?;

    let mut rsa_public_key = encode_integer(&modulus);
    rsa_public_key.extend_from_slice(&encode_integer(&exponent));
    let rsa_public_key = encode_sequence(&rsa_public_key);

    Ok(spki(&RSA_ALGORITHM_IDENTIFIER, &rsa_public_key))
}

fn ec_spki(jwk: &JsonWebKey) -> Result<Vec<u8>, ConversionError> {
    let crv = required("crv", jwk.crv.as_deref())?;
    let curve =
        Curve::from_name(crv).ok_or_else(|| ConversionError::UnsupportedCurve(crv.to_string()))?;

    let x = fixed_width("x", &decode_field("x", jwk.x.as_deref())?, curve.coordinate_len())?;
    let y = fixed_width("y", &decode_field("y", jwk.y.as_deref())?, curve.coordinate_len())?;

    let mut point = Vec::with_capacity(1 + 2 * curve.coordinate_len());
    point.push(0x04);
    point.extend_from_slice(&x);
    point.extend_from_slice(&y);

    let mut algorithm = EC_PUBLIC_KEY_OID.to_vec();
    algorithm.extend_from_slice(curve.oid());
    let algorithm = encode_sequence(&algorithm);

    Ok(spki(&algorithm, &point))
}

/// SubjectPublicKeyInfo ::= SEQUENCE { algorithm, subjectPublicKey BIT STRING }
fn spki(algorithm: &[u8], public_key: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(public_key.len() + 1);
    bits.push(0x00);
    bits.extend_from_slice(public_key);

    let mut body = algorithm.to_vec();
    body.extend_from_slice(&encode_bit_string(&bits));
    encode_sequence(&body)
}

fn to_pem(der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut pem = String::with_capacity(encoded.len() + encoded.len() / PEM_LINE_WIDTH + 64);
    pem.push_str("-----BEGIN PUBLIC KEY-----\n");
    // base64 output is ASCII, so byte chunks are valid UTF-8.
    for line in encoded.as_bytes().chunks(PEM_LINE_WIDTH) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, ConversionError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => Err(ConversionError::malformed(field, "empty value")),
        None => Err(ConversionError::malformed(field, "missing")),
    }
}

fn decode_field(field: &'static str, value: Option<&str>) -> Result<Vec<u8>, ConversionError> {
    let value = required(field, value)?;
    // Some providers pad their base64url values.
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| ConversionError::malformed(field, format!("invalid base64url: {}", e)))?;
    if bytes.is_empty() {
        return Err(ConversionError::malformed(field, "decodes to no bytes"));
    }
    Ok(bytes)
}

/// Minimal non-negative two's-complement content for an INTEGER.
fn unsigned_integer(field: &'static str, bytes: &[u8]) -> Result<Vec<u8>, ConversionError> {
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .ok_or_else(|| ConversionError::malformed(field, "value is zero"))?;
    let significant = &bytes[start..];

    let mut out = Vec::with_capacity(significant.len() + 1);
    if significant[0] & 0x80 != 0 {
        out.push(0x00);
    }
    out.extend_from_slice(significant);
    Ok(out)
}

/// Left-pads a coordinate to the curve width.
fn fixed_width(field: &'static str, bytes: &[u8], width: usize) -> Result<Vec<u8>, ConversionError> {
    let start = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len());
    let significant = &bytes[start..];
    if significant.len() > width {
        return Err(ConversionError::malformed(
            field,
            format!("coordinate is {} bytes, curve allows {}", significant.len(), width),
        ));
    }
    let mut out = vec![0u8; width - significant.len()];
    out.extend_from_slice(significant);
    Ok(out)
}
