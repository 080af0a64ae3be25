//! Peppered hashing for privacy-preserving token values
//!
//! BLAKE2b with a 16-byte digest. The domain string (e.g. `"username"`) is
//! bound as the personalization and the pepper as the salt, so the same
//! value hashes differently per domain and per pepper.

use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

/// Digest size in bytes
const DIGEST_LEN: usize = 16;

/// Size of a freshly generated pepper in bytes
pub const PEPPER_LEN: usize = 16;

/// Peppers are written without padding but may arrive with or without it
const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// Hash `value` within `domain`, salted with `pepper`
///
/// The domain and pepper are truncated to BLAKE2b's 16-byte personalization
/// and salt limits. No pepper means an all-zero salt. The output is the
/// URL-safe base64 digest without padding (22 characters).
///
/// # Example
/// ```
/// # use pkgident_core::ident::hash_string;
/// let a = hash_string("username", "alice", Some(b"pepper"));
/// assert_eq!(a, hash_string("username", "alice", Some(b"pepper")));
/// assert_ne!(a, hash_string("hostname", "alice", Some(b"pepper")));
/// ```
pub fn hash_string(domain: &str, value: &str, pepper: Option<&[u8]>) -> String {
    let personal = truncate(domain.as_bytes(), blake2b_simd::PERSONALBYTES);
    let salt = truncate(pepper.unwrap_or_default(), blake2b_simd::SALTBYTES);

    let hash = blake2b_simd::Params::new()
        .hash_length(DIGEST_LEN)
        .personal(personal)
        .salt(salt)
        .hash(value.as_bytes());

    URL_SAFE_NO_PAD.encode(hash.as_bytes())
}

fn truncate(bytes: &[u8], max: usize) -> &[u8] {
    &bytes[..bytes.len().min(max)]
}

/// Decode a base64 pepper from a configuration string
///
/// Accepts the URL-safe or the standard alphabet, padded or not. Returns
/// `None` for empty input or anything that does not decode.
pub fn decode_pepper(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let decoded = URL_SAFE_LENIENT
        .decode(text)
        .or_else(|_| STANDARD_LENIENT.decode(text));
    match decoded {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            debug!("Ignoring undecodable pepper: {}", e);
            None
        }
    }
}

/// Generate a fresh pepper, encoded for a configuration string
pub fn generate_pepper() -> String {
    let mut bytes = [0u8; PEPPER_LEN];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
