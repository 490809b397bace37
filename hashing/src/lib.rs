//! SHA-256 helpers with fixed-shape inputs.
//!
//! Consensus code hashes a small set of input shapes over and over (a seed followed by a round
//! number and a position, two sibling nodes, and so on). Each shape gets its own function so that
//! call sites do not have to assemble byte buffers by hand.

use ethereum_types::H256;
use once_cell::sync::Lazy;
use sha2::{Digest as _, Sha256};

/// Depth of the deepest Merkle tree hashed in the workspace plus one.
///
/// Lists bounded by `VALIDATOR_REGISTRY_LIMIT` (2⁴⁰) need 40 levels.
pub const ZERO_HASHES_COUNT: usize = 41;

/// `ZERO_HASHES[n]` is the root of a Merkle tree of depth `n` with all leaves zeroed.
pub static ZERO_HASHES: Lazy<[H256; ZERO_HASHES_COUNT]> = Lazy::new(|| {
    let mut hashes = [H256::zero(); ZERO_HASHES_COUNT];

    for depth in 1..ZERO_HASHES_COUNT {
        hashes[depth] = hash_256_256(hashes[depth - 1], hashes[depth - 1]);
    }

    hashes
});

#[inline]
#[must_use]
pub fn hash(bytes: impl AsRef<[u8]>) -> H256 {
    H256(Sha256::digest(bytes).into())
}

#[inline]
#[must_use]
pub fn hash_64(value: u64) -> H256 {
    hash(value.to_le_bytes())
}

#[inline]
#[must_use]
pub fn hash_256(bytes: H256) -> H256 {
    hash(bytes)
}

#[inline]
#[must_use]
pub fn hash_256_8(a: H256, b: u8) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update([b]);
    H256(hasher.finalize().into())
}

#[inline]
#[must_use]
pub fn hash_256_8_32(a: H256, b: u8, c: u32) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update([b]);
    hasher.update(c.to_le_bytes());
    H256(hasher.finalize().into())
}

#[inline]
#[must_use]
pub fn hash_256_64(a: H256, b: u64) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b.to_le_bytes());
    H256(hasher.finalize().into())
}

#[inline]
#[must_use]
pub fn hash_32_64_256(a: [u8; 4], b: u64, c: H256) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(a);
    hasher.update(b.to_le_bytes());
    hasher.update(c);
    H256(hasher.finalize().into())
}

#[inline]
#[must_use]
pub fn hash_256_256(left: H256, right: H256) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    H256(hasher.finalize().into())
}
