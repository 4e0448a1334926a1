//! HMAC-SHA256 payload signing and verification.
//!
//! The MAC is computed over the exact bytes that travel on the wire. The
//! receiver must verify the body as it was read, never a re-serialized copy,
//! or semantically identical payloads will fail verification.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Name of the request header carrying the base64 encoded MAC.
pub const HMAC_HEADER: &str = "HMAC";

/// Length in bytes of an HMAC-SHA256 tag.
pub const MAC_LEN: usize = 32;

/// The MAC could not be keyed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("MAC key material is empty")]
    Empty,
    #[error("MAC key rejected: {0}")]
    Invalid(String),
}

/// A payload failed its integrity check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("missing HMAC header")]
    Missing,
    #[error("malformed HMAC header: {0}")]
    Malformed(String),
    #[error("HMAC does not match payload")]
    Mismatch,
}

fn keyed(key: &[u8]) -> Result<HmacSha256, KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    HmacSha256::new_from_slice(key).map_err(|e| KeyError::Invalid(e.to_string()))
}

/// Computes the HMAC-SHA256 of `payload` under `key`.
pub fn generate(payload: &[u8], key: &[u8]) -> Result<Vec<u8>, KeyError> {
    let mut mac = keyed(key)?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Recomputes the MAC of `payload` and compares it with `candidate` in
/// constant time.
///
/// Returns `false` for unusable keys and wrong-length candidates instead of
/// failing.
pub fn verify(payload: &[u8], key: &[u8], candidate: &[u8]) -> bool {
    let Ok(mut mac) = keyed(key) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(candidate).is_ok()
}

/// Encodes MAC bytes for the `HMAC` header.
pub fn encode_mac(mac: &[u8]) -> String {
    STANDARD.encode(mac)
}

/// Decodes the `HMAC` header value back into MAC bytes.
pub fn decode_mac(header: &str) -> Result<Vec<u8>, IntegrityError> {
    STANDARD
        .decode(header.trim())
        .map_err(|e| IntegrityError::Malformed(e.to_string()))
}

/// The MAC a receiver expects for a payload it has just read.
#[derive(Clone, PartialEq, Eq)]
pub struct ExpectedMac(Vec<u8>);

impl ExpectedMac {
    /// Compares against the transmitted header value.
    ///
    /// An absent or undecodable header is a failure, same as a mismatch.
    pub fn check_header(&self, header: Option<&str>) -> Result<(), IntegrityError> {
        let header = header.ok_or(IntegrityError::Missing)?;
        let candidate = decode_mac(header)?;
        if candidate.len() != MAC_LEN {
            return Err(IntegrityError::Malformed(format!(
                "expected {MAC_LEN} bytes, got {}",
                candidate.len()
            )));
        }
        if bool::from(self.0.as_slice().ct_eq(&candidate)) {
            Ok(())
        } else {
            Err(IntegrityError::Mismatch)
        }
    }
}

impl std::fmt::Debug for ExpectedMac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ExpectedMac").field(&encode_mac(&self.0)).finish()
    }
}

/// Signs and checks payloads with a pre-shared secret.
///
/// The secret comes from configuration and is never sent on the wire.
#[derive(Clone)]
pub struct IntegrityCodec {
    key: Vec<u8>,
}

impl IntegrityCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, KeyError> {
        let key = secret.as_ref().to_vec();
        // Fail at construction rather than on the first request.
        keyed(&key)?;
        Ok(Self { key })
    }

    pub fn expected_mac(&self, payload: &[u8]) -> Result<ExpectedMac, KeyError> {
        generate(payload, &self.key).map(ExpectedMac)
    }

    /// Returns the base64 MAC to place in the `HMAC` header.
    pub fn sign(&self, payload: &[u8]) -> Result<String, KeyError> {
        generate(payload, &self.key).map(|mac| encode_mac(&mac))
    }
}

impl std::fmt::Debug for IntegrityCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityCodec")
            .field("key", &"<redacted>")
            .finish()
    }
}
