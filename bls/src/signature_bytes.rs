use fixed_hash::construct_fixed_hash;
use impl_serde::impl_fixed_hash_serde;

use crate::fixed_bytes::impl_ssz_for_fixed_bytes;

pub const COMPRESSED_SIZE: usize = 96;

construct_fixed_hash! {
    #[derive(derive_more::AsRef)]
    pub struct SignatureBytes(COMPRESSED_SIZE);
}

impl_fixed_hash_serde!(SignatureBytes, COMPRESSED_SIZE);

impl_ssz_for_fixed_bytes!(SignatureBytes, COMPRESSED_SIZE);

impl SignatureBytes {
    /// The compressed point at infinity.
    ///
    /// This is the signature of an empty sync aggregate.
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        let mut bytes = Self::zero();
        bytes.as_mut()[0] = 0xc0;
        bytes
    }

    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::empty()
    }
}
