// src/asn1.rs

//! The handful of DER primitives needed to assemble a SubjectPublicKeyInfo.
//!
//! Inputs always come from already-validated key material, so none of these
//! can fail.

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_SEQUENCE: u8 = 0x30;

/// Encodes a DER length: short form below 128, long form otherwise.
pub fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let be = len.to_be_bytes();
    let first = be.iter().position(|b| *b != 0).unwrap_or(be.len() - 1);
    let digits = &be[first..];
    let mut out = Vec::with_capacity(digits.len() + 1);
    out.push(0x80 | digits.len() as u8);
    out.extend_from_slice(digits);
    out
}

/// Wraps content that is already minimal two's-complement.
pub fn encode_integer(content: &[u8]) -> Vec<u8> {
    tlv(TAG_INTEGER, content)
}

/// The caller supplies the leading unused-bits byte.
pub fn encode_bit_string(content: &[u8]) -> Vec<u8> {
    tlv(TAG_BIT_STRING, content)
}

pub fn encode_sequence(content: &[u8]) -> Vec<u8> {
    tlv(TAG_SEQUENCE, content)
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let len = encode_length(content.len());
    let mut out = Vec::with_capacity(1 + len.len() + content.len());
    out.push(tag);
    out.extend_from_slice(&len);
    out.extend_from_slice(content);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_length() {
        assert_eq!(encode_length(0), vec![0x00]);
        assert_eq!(encode_length(127), vec![0x7f]);
    }

    #[test]
    fn long_form_length() {
        assert_eq!(encode_length(128), vec![0x81, 0x80]);
        assert_eq!(encode_length(255), vec![0x81, 0xff]);
        assert_eq!(encode_length(256), vec![0x82, 0x01, 0x00]);
        assert_eq!(encode_length(270), vec![0x82, 0x01, 0x0e]);
        assert_eq!(encode_length(0x01_00_00), vec![0x83, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn integer_and_sequence_framing() {
        let int = encode_integer(&[0x01, 0x00, 0x01]);
        assert_eq!(int, vec![0x02, 0x03, 0x01, 0x00, 0x01]);

        let seq = encode_sequence(&int);
        assert_eq!(seq[..2], [0x30, 0x05]);
        assert_eq!(&seq[2..], int.as_slice());
    }

    #[test]
    fn bit_string_keeps_unused_bits_byte() {
        let bits = encode_bit_string(&[0x00, 0xde, 0xad]);
        assert_eq!(bits, vec![0x03, 0x03, 0x00, 0xde, 0xad]);
    }

    #[test]
    fn large_content_uses_long_form() {
        let content = vec![0xaa; 300];
        let seq = encode_sequence(&content);
        assert_eq!(&seq[..4], &[0x30, 0x82, 0x01, 0x2c]);
        assert_eq!(seq.len(), 304);
    }
}
