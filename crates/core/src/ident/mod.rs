//! Identifier sources for the token string
//!
//! - Stable identifiers persisted on disk (client, machine)
//! - Per-process session identifier
//! - Peppered hashing for privacy-preserving variants
//! - Host values (username, hostname, environment name)

pub mod hash;
pub mod host;
pub mod session;
pub mod stable;

pub use hash::{decode_pepper, generate_pepper, hash_string};
pub use host::{environment_name, HostValues, SystemHost};
pub use session::SessionIdentifier;
pub use stable::{get_or_create_identifier, random_token, MIN_CLIENT_TOKEN_LEN};
