//! Bech32-alphabet encoding of keys and key prefixes
//!
//! A prefix is the leading part of a Bech32 string without its checksum:
//! `hrp || '1' || data`, where every data symbol carries 5 bits. Decoding a
//! prefix yields the bytes those bits cover and the exact number of bits that
//! a candidate key has to match.

use bech32::primitives::encode::Encoder;
use bech32::{Bech32, ByteIterExt, Fe32, Hrp, NoChecksum};
use thiserror::Error;

/// Separator between the human-readable part and the data part
pub const SEPARATOR: char = '1';

/// Errors produced while decoding a prefix
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrefixError {
    #[error("mixed case")]
    MixedCase,

    #[error("separator '1' at invalid position: pos={pos:?}, len={len}")]
    SeparatorPosition { pos: Option<usize>, len: usize },

    #[error("empty data part")]
    EmptyData,

    #[error("invalid character human-readable part: s[{pos}]={c}")]
    InvalidHrpChar { pos: usize, c: u32 },

    #[error("invalid character data part: s[{pos}]={c}")]
    InvalidDataChar { pos: usize, c: char },
}

/// Errors produced while encoding bytes
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("invalid human-readable part: {0}")]
    Hrp(#[from] bech32::primitives::hrp::Error),

    #[error(transparent)]
    Bech32(#[from] bech32::EncodeError),
}

/// A decoded prefix: the bit pattern a public key must start with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPrefix {
    pub hrp: String,
    /// Pattern bytes; bits past `bits` are zero padding.
    pub bytes: Vec<u8>,
    /// Number of significant leading bits in `bytes`.
    pub bits: usize,
}

/// Decode a checksum-free Bech32 prefix such as `age1qyz`.
///
/// The last `'1'` splits the human-readable part from the data. Upper-case
/// input is accepted as long as it is not mixed with lower-case.
pub fn decode_prefix(s: &str) -> Result<DecodedPrefix, PrefixError> {
    if s.to_lowercase() != s && s.to_uppercase() != s {
        return Err(PrefixError::MixedCase);
    }

    let pos = match s.rfind(SEPARATOR) {
        Some(pos) if pos >= 1 => pos,
        pos => return Err(PrefixError::SeparatorPosition { pos, len: s.len() }),
    };
    if pos + 1 == s.len() {
        return Err(PrefixError::EmptyData);
    }

    let hrp = &s[..pos];
    for (p, c) in hrp.chars().enumerate() {
        if !(33..=126).contains(&(c as u32)) {
            return Err(PrefixError::InvalidHrpChar { pos: p, c: c as u32 });
        }
    }

    let data = s[pos + 1..].to_lowercase();
    let symbols = data
        .chars()
        .enumerate()
        .map(|(p, c)| Fe32::from_char(c).map_err(|_| PrefixError::InvalidDataChar { pos: p, c }))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DecodedPrefix {
        hrp: hrp.to_string(),
        bytes: pack_fes(&symbols),
        bits: 5 * symbols.len(),
    })
}

/// Encode `data` as `hrp || '1' || symbols` without a checksum.
///
/// The result is lower-case regardless of the case of `hrp`.
pub fn encode(hrp: &str, data: &[u8]) -> Result<String, EncodeError> {
    let hrp = Hrp::parse(hrp)?;
    Ok(Encoder::<_, NoChecksum>::new(data.iter().copied().bytes_to_fes(), &hrp)
        .chars()
        .collect())
}

/// Encode `data` as a full Bech32 string, checksum included.
///
/// This is the form age uses for recipients and identities. The result is
/// lower-case regardless of the case of `hrp`.
pub fn encode_checksummed(hrp: &str, data: &[u8]) -> Result<String, EncodeError> {
    // The checksum is defined over the lower-case hrp.
    let hrp = Hrp::parse(&hrp.to_lowercase())?;
    Ok(bech32::encode::<Bech32>(hrp, data)?)
}

/// Pack 5-bit symbols into bytes, most significant bit first, padding the
/// last byte with zero bits.
///
/// `fes_to_bytes` from the bech32 crate drops a partial trailing byte, but a
/// prefix must keep every symbol it was given.
fn pack_fes(symbols: &[Fe32]) -> Vec<u8> {
    let mut out = Vec::with_capacity((symbols.len() * 5 + 7) / 8);
    let mut acc = 0u32;
    let mut bits = 0u32;
    for fe in symbols {
        acc = (acc << 5) | fe.to_u8() as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
        }
    }
    if bits > 0 {
        out.push((acc << (8 - bits)) as u8);
    }
    out
}
