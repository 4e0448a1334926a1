//! The `integrity` module proves that a payload was produced by a holder of
//! the shared secret and was not altered in transit.
//!
//! Senders attach a base64 HMAC-SHA256 tag in the `HMAC` header; receivers
//! recompute the tag over the bytes they read and compare in constant time.

pub mod hmac_codec;

pub use hmac_codec::{
    ExpectedMac, HMAC_HEADER, IntegrityCodec, IntegrityError, KeyError, MAC_LEN, decode_mac,
    encode_mac, generate, verify,
};
