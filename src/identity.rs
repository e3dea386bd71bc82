//! Vanity age identities
//!
//! Ties the pieces together: a prefix is normalized and decoded, a base key is
//! searched for a matching offset, and the offset is folded into the final key.

use chrono::{DateTime, SecondsFormat, TimeZone};
use crossbeam_channel::Receiver;
use log::{debug, info};
use num_bigint::BigUint;
use std::io::Write;
use std::time::{Duration, Instant};

use crate::backend::{CpuBackend, GeneratorError};
use crate::encoding::{decode_prefix, encode, encode_checksummed, DecodedPrefix, SEPARATOR};
use crate::x25519::{add_offset, has_prefix_bits, KeyPair};

/// Human-readable part of age X25519 recipients
pub const RECIPIENT_HRP: &str = "age";

/// Human-readable part of age X25519 identities
pub const SECRET_KEY_HRP: &str = "AGE-SECRET-KEY-";

/// A generated key pair together with how it was found
#[derive(Debug, Clone)]
pub struct Identity {
    key: KeyPair,
    prefix: String,
    elapsed: Duration,
    attempts: u64,
}

impl Identity {
    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    /// The normalized prefix, e.g. `age123456`
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Time spent searching
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Candidates tested by all workers
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// The public recipient, `age1...`
    pub fn recipient(&self) -> Result<String, GeneratorError> {
        Ok(encode_checksummed(RECIPIENT_HRP, self.key.public())?)
    }

    /// The secret identity, `AGE-SECRET-KEY-1...`
    pub fn secret_key(&self) -> Result<String, GeneratorError> {
        Ok(encode_checksummed(SECRET_KEY_HRP, self.key.secret())?.to_uppercase())
    }

    /// One line describing the search, e.g.
    /// `Found age123456... in 2s after 74446587 attempts (43327977 attempts/s)`
    pub fn summary(&self) -> String {
        let secs = self.elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            0.0
        };
        format!(
            "Found {}... in {} after {} attempts ({:.0} attempts/s)",
            self.prefix,
            format_elapsed(self.elapsed),
            self.attempts,
            rate
        )
    }

    /// Write the identity in the age key file format.
    pub fn write_key_file<W, Tz>(&self, out: &mut W, created: DateTime<Tz>) -> Result<(), GeneratorError>
    where
        W: Write,
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        writeln!(out, "# created: {}", created.to_rfc3339_opts(SecondsFormat::Secs, true))?;
        writeln!(out, "# public key: {}", self.recipient()?)?;
        writeln!(out, "{}", self.secret_key()?)?;
        Ok(())
    }
}

/// Format a duration rounded to whole seconds, e.g. `0s`, `1m30s`, `1h0m0s`
fn format_elapsed(elapsed: Duration) -> String {
    let secs = (elapsed.as_millis() + 500) / 1000;
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Normalize a user supplied prefix into a full `age1...` prefix.
///
/// The prefix is lower-cased and a leading `age1` is dropped. The characters
/// `b`, `i` and `o`, which are not in the Bech32 alphabet, are replaced by
/// `6`, `7` and `0`. A `1` is rejected since it can only be the separator.
pub fn normalize_prefix(prefix: &str) -> Result<String, GeneratorError> {
    if prefix.is_empty() {
        return Err(GeneratorError::EmptyPrefix);
    }

    let recipient_prefix = format!("{}{}", RECIPIENT_HRP, SEPARATOR);
    let prefix = prefix.to_lowercase();
    let prefix = prefix.strip_prefix(&recipient_prefix).unwrap_or(&prefix);
    if prefix.contains(SEPARATOR) {
        return Err(GeneratorError::SeparatorInPrefix);
    }

    let data: String = prefix
        .chars()
        .map(|c| match c {
            'b' => '6',
            'i' => '7',
            'o' => '0',
            c => c,
        })
        .collect();
    Ok(recipient_prefix + &data)
}

/// Decode a normalized prefix, requiring the `age` human-readable part.
pub fn decode_recipient_prefix(prefix: &str) -> Result<DecodedPrefix, GeneratorError> {
    let decoded = decode_prefix(prefix)?;
    if decoded.hrp.to_lowercase() != RECIPIENT_HRP {
        return Err(GeneratorError::WrongHrp(decoded.hrp));
    }
    Ok(decoded)
}

/// Fold a search offset into the base key.
///
/// The public key is derived again from the new private key rather than
/// computed from the base public key.
pub fn combine(base: &KeyPair, offset: &BigUint) -> Result<KeyPair, GeneratorError> {
    Ok(KeyPair::from_secret(add_offset(base.secret(), offset)?))
}

/// Generate an identity whose recipient starts with `prefix`.
///
/// Returns [`GeneratorError::Stopped`] if a message arrives on `stop_rx`
/// before a key is found.
pub fn generate_identity(
    prefix: &str,
    backend: &CpuBackend,
    stop_rx: &Receiver<()>,
) -> Result<Identity, GeneratorError> {
    let prefix = normalize_prefix(prefix)?;
    let decoded = decode_recipient_prefix(&prefix)?;
    debug!("searching for {} ({} bits)", prefix, decoded.bits);

    let base = KeyPair::generate()?;
    let matches = has_prefix_bits(&decoded.bytes, decoded.bits);

    let start = Instant::now();
    let result = backend.search_with_stop(base.public(), matches, stop_rx)?;
    let elapsed = start.elapsed();

    let offset = result.offset.ok_or(GeneratorError::Stopped)?;
    let key = combine(&base, &offset)?;

    let recipient = encode(RECIPIENT_HRP, key.public())?;
    if !recipient.starts_with(&prefix) {
        return Err(GeneratorError::PrefixMismatch { prefix, recipient });
    }
    info!("found {} after {} attempts", prefix, result.attempts);

    Ok(Identity {
        key,
        prefix,
        elapsed,
        attempts: result.attempts,
    })
}
