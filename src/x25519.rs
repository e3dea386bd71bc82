//! X25519 key arithmetic used by the vanity search
//!
//! A private key `k` is used as the clamped scalar `s = clamp(k)`, which is
//! always a multiple of 8 in `[2^254, 2^255)`. Adding `8 * offset` keeps the
//! scalar clamped, and the matching public key is `P + offset * 8B`. The
//! search walks that sequence of points on the Edwards curve and only converts
//! each candidate to its Montgomery u-coordinate for matching.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::Scalar;
use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use x25519_dalek::{x25519, X25519_BASEPOINT_BYTES};

use crate::backend::GeneratorError;

/// Size in bytes of X25519 private and public keys
pub const KEY_SIZE: usize = 32;

/// An X25519 key pair
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    secret: [u8; KEY_SIZE],
    public: [u8; KEY_SIZE],
}

impl KeyPair {
    /// Generate a random key pair to start a search from.
    ///
    /// Keys whose Edwards point has a negative x-coordinate are redrawn, so the
    /// public u-coordinate always lifts back to the point `clamp(k) * B` and
    /// the offsets found by [`Walk`] apply to the secret as they are.
    pub fn generate() -> Result<Self, GeneratorError> {
        loop {
            let mut secret = [0u8; KEY_SIZE];
            OsRng.try_fill_bytes(&mut secret)?;
            let point = EdwardsPoint::mul_base(&Scalar::from_bytes_mod_order(clamp(secret)));
            if point.compress().as_bytes()[31] >> 7 == 0 {
                return Ok(Self::from_secret(secret));
            }
        }
    }

    /// Build a key pair from a private key, deriving its public key.
    pub fn from_secret(secret: [u8; KEY_SIZE]) -> Self {
        Self {
            secret,
            public: derive_public_key(&secret),
        }
    }

    pub fn secret(&self) -> &[u8; KEY_SIZE] {
        &self.secret
    }

    pub fn public(&self) -> &[u8; KEY_SIZE] {
        &self.public
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Derive the X25519 public key of a private key.
pub fn derive_public_key(secret: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    x25519(*secret, X25519_BASEPOINT_BYTES)
}

/// Add `offset` to a private key.
///
/// The result is the clamped scalar of `secret` plus `8 * offset`, which is
/// its own clamped form. Fails if the sum no longer fits below `2^255`.
pub fn add_offset(secret: &[u8; KEY_SIZE], offset: &BigUint) -> Result<[u8; KEY_SIZE], GeneratorError> {
    let sum = BigUint::from_bytes_le(&clamp(*secret)) + (offset << 3u32);
    if sum.bits() > 255 {
        return Err(GeneratorError::ScalarOutOfRange);
    }

    let mut out = [0u8; KEY_SIZE];
    let bytes = sum.to_bytes_le();
    out[..bytes.len()].copy_from_slice(&bytes);
    debug_assert_eq!(clamp(out), out);
    Ok(out)
}

/// Build a predicate matching keys whose first `bits` bits equal those of
/// `pattern`, compared most significant bit first.
pub fn has_prefix_bits(pattern: &[u8], bits: usize) -> impl Fn(&[u8]) -> bool + Send + Sync + Clone {
    let full = bits / 8;
    let rest = bits % 8;
    let pattern = pattern.to_vec();
    let mask = if rest == 0 { 0 } else { 0xffu8 << (8 - rest) };
    let tail = if rest == 0 { 0 } else { pattern[full] & mask };

    move |key: &[u8]| {
        key.len() * 8 >= bits
            && key[..full] == pattern[..full]
            && (rest == 0 || key[full] & mask == tail)
    }
}

/// Result of probing one batch of candidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Offset of the first matching candidate, if any
    pub found: Option<BigUint>,
    /// Candidates tested in this batch
    pub attempts: u64,
}

/// A walk over the public keys `base + (seed + i) * 8B` for `i = 0, 1, ...`
pub struct Walk {
    point: EdwardsPoint,
    step: EdwardsPoint,
    seed: u64,
    steps: u64,
}

impl Walk {
    /// Start a walk at `base + seed * 8B`.
    ///
    /// `base` must be a public key from [`KeyPair::generate`]; other keys may
    /// lift to the negated point.
    pub fn new(base: &[u8; KEY_SIZE], seed: u64) -> Result<Self, GeneratorError> {
        let base = MontgomeryPoint(*base)
            .to_edwards(0)
            .ok_or(GeneratorError::InvalidPublicKey)?;
        let step = ED25519_BASEPOINT_POINT.mul_by_cofactor();
        let start = EdwardsPoint::mul_base(&(Scalar::from(seed) * Scalar::from(8u64)));

        Ok(Self {
            point: base + start,
            step,
            seed,
            steps: 0,
        })
    }

    /// Offset of the current candidate relative to the base key
    pub fn offset(&self) -> BigUint {
        BigUint::from(self.seed) + self.steps
    }

    /// Test up to `batch_size` candidates, stopping at the first match.
    ///
    /// A match is left as the current candidate, so probing again returns it
    /// once more.
    pub fn probe<F>(&mut self, batch_size: u64, matches: &F) -> Probe
    where
        F: Fn(&[u8]) -> bool + ?Sized,
    {
        for attempts in 1..=batch_size {
            if matches(self.point.to_montgomery().as_bytes()) {
                return Probe {
                    found: Some(self.offset()),
                    attempts,
                };
            }
            self.point += &self.step;
            self.steps += 1;
        }

        Probe {
            found: None,
            attempts: batch_size,
        }
    }
}

fn clamp(mut scalar: [u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
    scalar
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    // RFC 7748, section 6.1
    const ALICE_SECRET: [u8; 32] =
        hex!("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a");
    const ALICE_PUBLIC: [u8; 32] =
        hex!("8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a");

    #[test]
    fn test_derive_public_key() {
        assert_eq!(derive_public_key(&ALICE_SECRET), ALICE_PUBLIC);
        assert_eq!(KeyPair::from_secret(ALICE_SECRET).public(), &ALICE_PUBLIC);
    }

    #[test]
    fn test_generate() {
        let key = KeyPair::generate().unwrap();
        assert_eq!(key.public(), &derive_public_key(key.secret()));
        let point = MontgomeryPoint(*key.public()).to_edwards(0).unwrap();
        let expected = EdwardsPoint::mul_base(&Scalar::from_bytes_mod_order(clamp(*key.secret())));
        assert_eq!(point, expected);
    }

    #[test]
    fn test_add_offset_zero_is_clamp() {
        let secret = add_offset(&ALICE_SECRET, &BigUint::from(0u32)).unwrap();
        assert_eq!(secret, clamp(ALICE_SECRET));
        assert_eq!(derive_public_key(&secret), ALICE_PUBLIC);
    }

    #[test]
    fn test_add_offset_out_of_range() {
        let secret = [0xff; 32];
        // clamp(secret) = 2^255 - 8, so one more step overflows
        assert!(matches!(
            add_offset(&secret, &BigUint::from(1u32)),
            Err(GeneratorError::ScalarOutOfRange)
        ));
    }

    #[test]
    fn test_walk_matches_add_offset() {
        let key = KeyPair::generate().unwrap();
        let seed = 0xdead_beef_u64;
        let mut walk = Walk::new(key.public(), seed).unwrap();

        let probe = walk.probe(3, &|_: &[u8]| false);
        assert_eq!(probe, Probe { found: None, attempts: 3 });
        assert_eq!(walk.offset(), BigUint::from(seed + 3));

        let secret = add_offset(key.secret(), &walk.offset()).unwrap();
        let expected = derive_public_key(&secret);
        let probe = walk.probe(1, &|candidate: &[u8]| candidate == &expected[..]);
        assert_eq!(probe.found, Some(BigUint::from(seed + 3)));
        assert_eq!(probe.attempts, 1);
    }

    #[test]
    fn test_walk_rejects_invalid_point() {
        // u = 2^255 - 20 - 1 = p - 1 maps to y = (u - 1) / (u + 1) with u + 1 = 0
        let mut u = [0xff; 32];
        u[0] = 0xec;
        u[31] = 0x7f;
        assert!(matches!(
            Walk::new(&u, 0),
            Err(GeneratorError::InvalidPublicKey)
        ));
    }

    #[test]
    fn test_has_prefix_bits() {
        let matches = has_prefix_bits(&[0xab, 0xc0], 10);
        assert!(matches(&[0xab, 0xc0]));
        assert!(matches(&[0xab, 0xff, 0x00]));
        assert!(!matches(&[0xab, 0x80]));
        assert!(!matches(&[0xaa, 0xc0]));
        assert!(!matches(&[0xab]));

        let matches = has_prefix_bits(&[0x12, 0x34], 16);
        assert!(matches(&[0x12, 0x34, 0x56]));
        assert!(!matches(&[0x12, 0x35]));

        let matches = has_prefix_bits(&[], 0);
        assert!(matches(&[0x00]));
    }
}
