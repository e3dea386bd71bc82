//! Search backend for vanity key generation
//!
//! This module holds the errors shared by the generation pipeline and the CPU
//! backend that races worker threads for a matching key offset.

mod cpu;

use num_bigint::BigUint;
use thiserror::Error;

use crate::encoding::{EncodeError, PrefixError};

pub use cpu::{CpuBackend, DEFAULT_BATCH_SIZE};

/// Errors that can occur during generation
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("empty prefix")]
    EmptyPrefix,

    #[error("prefix can not contain \"1\"")]
    SeparatorInPrefix,

    #[error("malformed public key prefix: {0}")]
    MalformedPrefix(#[from] PrefixError),

    #[error("malformed public key prefix human-readable part: {0:?}")]
    WrongHrp(String),

    #[error("random source failure: {0}")]
    Random(#[from] rand::Error),

    #[error("public key is not a point on the curve")]
    InvalidPublicKey,

    #[error("private key scalar out of range")]
    ScalarOutOfRange,

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodeError),

    #[error("generated key {recipient} does not start with {prefix}")]
    PrefixMismatch { prefix: String, recipient: String },

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Generation stopped by user")]
    Stopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// Winning offset; `None` if the search was stopped before any match.
    pub offset: Option<BigUint>,
    /// Candidates tested by all workers together
    pub attempts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            GeneratorError::SeparatorInPrefix.to_string(),
            "prefix can not contain \"1\""
        );
        assert_eq!(
            GeneratorError::WrongHrp("bc".into()).to_string(),
            "malformed public key prefix human-readable part: \"bc\""
        );
        assert_eq!(
            GeneratorError::from(PrefixError::MixedCase).to_string(),
            "malformed public key prefix: mixed case"
        );
    }
}
