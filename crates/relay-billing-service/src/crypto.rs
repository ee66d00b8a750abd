//! Cryptographic utilities for webhook verification.
//!
//! The payment provider signs each webhook delivery with HMAC-SHA256 over
//! the raw request body, hex-encoded in the `X-Signature` header. The body
//! must be verified as raw bytes, before any JSON parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over `message` and return the hex-encoded digest
/// (64 characters).
///
/// # Panics
///
/// Never panics in practice: HMAC-SHA256 accepts keys of any size per
/// RFC 2104, so `new_from_slice` only fails if the Hmac implementation is
/// broken.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC-SHA256 accepts any key size");
    mac.update(message);
    let result = mac.finalize();

    hex::encode(result.into_bytes())
}

/// Constant-time string comparison.
///
/// Signature verification must not leak how many leading characters
/// matched, so every byte is compared regardless of earlier mismatches.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Verify a hex-encoded HMAC-SHA256 signature over a raw body.
#[must_use]
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = hmac_sha256_hex(secret, body);
    constant_time_eq(&expected, signature)
}
