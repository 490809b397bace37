use core::fmt::{Debug, Formatter, Result as FmtResult};

use derivative::Derivative;
use once_cell::race::OnceBox;
use serde::{Deserialize, Serialize};

use crate::{error::Error, public_key::PublicKey, public_key_bytes::PublicKeyBytes};

/// Compressed public key that remembers its decompressed form.
///
/// Decompression dominates the cost of verifying a single signature,
/// so keys stored in the validator registry are decompressed at most once.
#[derive(Default, Derivative, Deserialize, Serialize)]
#[derivative(PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CachedPublicKey {
    bytes: PublicKeyBytes,
    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    #[serde(skip)]
    decompressed: OnceBox<PublicKey>,
}

// `OnceBox` does not implement `Clone`.
impl Clone for CachedPublicKey {
    fn clone(&self) -> Self {
        let cached = Self::from(self.bytes);

        if let Some(public_key) = self.decompressed.get() {
            let _ = cached.decompressed.set(Box::new(*public_key));
        }

        cached
    }
}

impl Debug for CachedPublicKey {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter
            .debug_tuple("CachedPublicKey")
            .field(&self.bytes)
            .finish()
    }
}

impl From<PublicKeyBytes> for CachedPublicKey {
    #[inline]
    fn from(bytes: PublicKeyBytes) -> Self {
        Self {
            bytes,
            decompressed: OnceBox::new(),
        }
    }
}

impl From<PublicKey> for CachedPublicKey {
    #[inline]
    fn from(public_key: PublicKey) -> Self {
        let cached = Self::from(PublicKeyBytes::from(public_key));
        let _ = cached.decompressed.set(Box::new(public_key));
        cached
    }
}

impl ssz::Encode for CachedPublicKey {
    #[inline]
    fn is_ssz_fixed_len() -> bool {
        true
    }

    #[inline]
    fn ssz_fixed_len() -> usize {
        <PublicKeyBytes as ssz::Encode>::ssz_fixed_len()
    }

    #[inline]
    fn ssz_bytes_len(&self) -> usize {
        self.bytes.ssz_bytes_len()
    }

    #[inline]
    fn ssz_append(&self, buf: &mut Vec<u8>) {
        self.bytes.ssz_append(buf);
    }
}

impl ssz::Decode for CachedPublicKey {
    #[inline]
    fn is_ssz_fixed_len() -> bool {
        true
    }

    #[inline]
    fn ssz_fixed_len() -> usize {
        <PublicKeyBytes as ssz::Decode>::ssz_fixed_len()
    }

    fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, ssz::DecodeError> {
        PublicKeyBytes::from_ssz_bytes(bytes).map(Self::from)
    }
}

impl tree_hash::TreeHash for CachedPublicKey {
    fn tree_hash_type() -> tree_hash::TreeHashType {
        PublicKeyBytes::tree_hash_type()
    }

    fn tree_hash_packed_encoding(&self) -> tree_hash::PackedEncoding {
        self.bytes.tree_hash_packed_encoding()
    }

    fn tree_hash_packing_factor() -> usize {
        PublicKeyBytes::tree_hash_packing_factor()
    }

    fn tree_hash_root(&self) -> tree_hash::Hash256 {
        self.bytes.tree_hash_root()
    }
}

impl CachedPublicKey {
    #[inline]
    #[must_use]
    pub const fn to_bytes(&self) -> PublicKeyBytes {
        self.bytes
    }

    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &PublicKeyBytes {
        &self.bytes
    }

    #[inline]
    pub fn decompress(&self) -> Result<&PublicKey, Error> {
        self.decompressed
            .get_or_try_init(|| self.bytes.try_into().map(Box::new))
    }
}
