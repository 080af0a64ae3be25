//! Stable identifiers persisted across process runs
//!
//! A stable identifier is a random URL-safe string stored as the first line
//! of a small text file. Reads and writes never fail outward: a missing,
//! short, or unreadable file produces a fresh value, and a failed write only
//! means the value is not reused by the next process.
//!
//! Concurrent processes may race to create the file. The last write wins on
//! disk; each process keeps whatever value it resolved first.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Minimum length of a persisted client or machine identifier
pub const MIN_CLIENT_TOKEN_LEN: usize = 64;

/// Generate `nchar` random URL-safe base64 characters
///
/// Draws `ceil(nchar * 6 / 8)` bytes from the OS entropy source, encodes
/// them without padding and truncates to `nchar`.
///
/// # Example
/// ```
/// # use pkgident_core::ident::random_token;
/// let token = random_token(8);
/// assert_eq!(token.len(), 8);
/// ```
pub fn random_token(nchar: usize) -> String {
    let nbytes = (nchar * 6).div_ceil(8);
    let mut bytes = vec![0u8; nbytes];
    OsRng.fill_bytes(&mut bytes);
    let mut token = URL_SAFE_NO_PAD.encode(&bytes);
    token.truncate(nchar);
    token
}

/// Read the identifier at `path`, or create and persist a new one
///
/// A stored value is returned verbatim when its first line is at least
/// `min_length` characters long. Otherwise a new value of exactly
/// `min_length` characters is generated, written to `path` (parent
/// directories included) and returned whether or not the write succeeded.
pub fn get_or_create_identifier(path: &Path, min_length: usize) -> String {
    match read_first_line(path) {
        Ok(value) if value.len() >= min_length => {
            debug!("Retrieved identifier from {}", path.display());
            return value;
        }
        Ok(value) => {
            debug!(
                "Identifier in {} too short ({} < {}); regenerating",
                path.display(),
                value.len(),
                min_length
            );
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No identifier at {}", path.display());
        }
        Err(e) => {
            debug!("Unexpected error reading identifier {}: {}", path.display(), e);
        }
    }

    let value = random_token(min_length);
    match write_identifier(path, &value) {
        Ok(()) => debug!("Saved new identifier to {}", path.display()),
        Err(e) => debug!("Unable to save identifier {}: {}", path.display(), e),
    }
    value
}

fn read_first_line(path: &Path) -> io::Result<String> {
    let text = fs::read_to_string(path)?;
    Ok(text.lines().next().unwrap_or_default().to_string())
}

fn write_identifier(path: &Path, value: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, value)
}
