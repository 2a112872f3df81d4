//! Fingerprint primitives used to derive structural node hashes.
//!
//! Every node carries two fingerprints built from these helpers: a local hash that identifies the
//! operation configuration, and a subgraph hash that folds in the fingerprints of all operands in
//! argument order. [`hash_combine`] is deliberately non-commutative so that operand position is part
//! of the identity.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

const FNV1A_OFFSET: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;
const GOLDEN_RATIO: u64 = 0x9e3779b97f4a7c15;

/// Fixed-width structural fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct HashValue(u64);

impl HashValue {
    pub const fn from_raw(raw: u64) -> Self {
        HashValue(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for HashValue {
    fn from(raw: u64) -> Self {
        HashValue(raw)
    }
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashValue({:016x})", self.0)
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Streaming FNV-1a hasher for attribute values that implement [`Hash`].
///
/// Integers are fed in native byte order, so fingerprints are stable across builds for a given
/// target but not between targets of different endianness or pointer width.
pub struct FingerprintHasher {
    state: u64,
}

impl FingerprintHasher {
    pub fn new() -> Self {
        Self {
            state: fnv1a_init(),
        }
    }

    pub fn write_value<T: Hash + ?Sized>(&mut self, value: &T) {
        value.hash(self);
    }

    pub fn fingerprint(&self) -> HashValue {
        HashValue(self.state)
    }
}

impl Hasher for FingerprintHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.state = fnv1a_bytes(self.state, bytes);
    }

    fn finish(&self) -> u64 {
        self.state
    }
}

impl Default for FingerprintHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hashes any [`Hash`] value into a fingerprint.
pub fn hash_value<T: Hash + ?Sized>(value: &T) -> HashValue {
    let mut hasher = FingerprintHasher::new();
    hasher.write_value(value);
    hasher.fingerprint()
}

/// Hashes the UTF-8 bytes of `value` with FNV-1a.
pub fn hash_str(value: &str) -> HashValue {
    HashValue(fnv1a_hash(value.as_bytes()))
}

/// Mixes `value` into `seed`. The result depends on argument order.
pub fn hash_combine(seed: HashValue, value: HashValue) -> HashValue {
    let a = seed.0;
    let mixed = value
        .0
        .wrapping_add(GOLDEN_RATIO)
        .wrapping_add(a << 6)
        .wrapping_add(a >> 2);
    HashValue(a ^ mixed)
}

/// Folds an ordered sequence of fingerprints into `seed`.
pub fn hash_sequence<I>(seed: HashValue, hashes: I) -> HashValue
where
    I: IntoIterator<Item = HashValue>,
{
    hashes.into_iter().fold(seed, hash_combine)
}

pub fn fnv1a_init() -> u64 {
    FNV1A_OFFSET
}

pub fn fnv1a_bytes(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV1A_PRIME);
    }
    hash
}

pub fn fnv1a_hash(bytes: &[u8]) -> u64 {
    fnv1a_bytes(fnv1a_init(), bytes)
}
