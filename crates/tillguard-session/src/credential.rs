//! PIN credentials: salted, key-stretched, one-way.
//!
//! A PIN is never stored, encrypted or otherwise. [`derive`] turns it into a
//! [`Credential`] (random salt + stretched digest) and [`verify`] recomputes
//! the digest for a candidate PIN and compares in constant time.
//!
//! # Cost
//!
//! There are only 10 000 possible PINs; online guessing is bounded by the
//! lockout tracker, not by this module. Each guess against a copied store
//! costs `rounds` SHA-256 invocations, and the per-credential salt means
//! no single precomputed table covers every profile.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Number of digits in a PIN.
pub const PIN_LENGTH: usize = 4;

/// SHA-256 iterations for new credentials.
pub const DEFAULT_STRETCH_ROUNDS: u32 = 100_000;

/// Credentials claiming more rounds than this are treated as tampered,
/// and configuration asking for more is clamped down to it.
pub const MAX_STRETCH_ROUNDS: u32 = 10 * DEFAULT_STRETCH_ROUNDS;

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

/// The stored form of a PIN.
///
/// Salt and hash are hex strings so the record serializes cleanly into any
/// JSON-backed store. The round count is stored alongside so changing the
/// configured stretching cost never invalidates existing profiles.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    hash: String,
    salt: String,
    rounds: u32,
}

/// Never print the digest, even in debug logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("rounds", &self.rounds)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// How many SHA-256 rounds this credential was derived with.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}

/// Returns `true` if `pin` is exactly four ASCII digits.
pub fn validate_pin_format(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit())
}

/// Derives a fresh credential for `pin` with a new random salt.
///
/// Two calls with the same PIN produce different salts and therefore
/// different hashes. The PIN shape is the caller's concern; this accepts
/// any string.
pub fn derive(pin: &str, rounds: u32) -> Credential {
    let rounds = rounds.clamp(1, MAX_STRETCH_ROUNDS);
    // 16 bytes from the thread-local CSPRNG (seeded from the OS).
    let salt: [u8; SALT_LEN] = rand::random();
    let digest = stretch(&salt, pin.as_bytes(), rounds);
    Credential {
        hash: hex::encode(digest),
        salt: hex::encode(salt),
        rounds,
    }
}

/// Checks `pin` against a stored credential.
///
/// Never panics: a credential with undecodable hex, a wrong-length hash, or
/// an absurd round count simply fails verification.
pub fn verify(pin: &str, credential: &Credential) -> bool {
    if credential.rounds == 0 || credential.rounds > MAX_STRETCH_ROUNDS {
        return false;
    }
    let Ok(salt) = hex::decode(&credential.salt) else {
        return false;
    };
    let Ok(expected) = hex::decode(&credential.hash) else {
        return false;
    };
    if expected.len() != DIGEST_LEN {
        return false;
    }

    let actual = stretch(&salt, pin.as_bytes(), credential.rounds);
    // `ct_eq` touches every byte regardless of where the first mismatch
    // is, so response time doesn't reveal how much of the digest matched.
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

/// Iterated SHA-256: `d₀ = H(salt ‖ pin)`, `dᵢ = H(dᵢ₋₁ ‖ salt ‖ pin)`.
fn stretch(salt: &[u8], pin: &[u8], rounds: u32) -> [u8; DIGEST_LEN] {
    let mut digest: [u8; DIGEST_LEN] = Sha256::new()
        .chain_update(salt)
        .chain_update(pin)
        .finalize()
        .into();
    for _ in 1..rounds {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt)
            .chain_update(pin)
            .finalize()
            .into();
    }
    digest
}
