//! age Vanity Key Generator Library
//!
//! This library generates age X25519 identities whose recipient starts with a
//! chosen prefix, searching key offsets on all CPU cores.

pub mod backend;
pub mod encoding;
pub mod identity;
pub mod x25519;

pub use backend::{CpuBackend, GeneratorError, SearchResult};
pub use encoding::{decode_prefix, encode, encode_checksummed, DecodedPrefix, PrefixError};
pub use identity::{combine, decode_recipient_prefix, generate_identity, normalize_prefix, Identity};
pub use x25519::KeyPair;
