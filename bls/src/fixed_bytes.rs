// Compressed keys and signatures are SSZ `ByteVector`s.
// Their hash tree roots are computed by merkleizing the raw bytes.
macro_rules! impl_ssz_for_fixed_bytes {
    ($name: ident, $size: expr) => {
        impl ssz::Encode for $name {
            #[inline]
            fn is_ssz_fixed_len() -> bool {
                true
            }

            #[inline]
            fn ssz_fixed_len() -> usize {
                $size
            }

            #[inline]
            fn ssz_bytes_len(&self) -> usize {
                $size
            }

            #[inline]
            fn ssz_append(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(self.as_bytes());
            }
        }

        impl ssz::Decode for $name {
            #[inline]
            fn is_ssz_fixed_len() -> bool {
                true
            }

            #[inline]
            fn ssz_fixed_len() -> usize {
                $size
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, ssz::DecodeError> {
                if bytes.len() == $size {
                    Ok(Self::from_slice(bytes))
                } else {
                    Err(ssz::DecodeError::InvalidByteLength {
                        len: bytes.len(),
                        expected: $size,
                    })
                }
            }
        }

        impl tree_hash::TreeHash for $name {
            fn tree_hash_type() -> tree_hash::TreeHashType {
                tree_hash::TreeHashType::Vector
            }

            fn tree_hash_packed_encoding(&self) -> tree_hash::PackedEncoding {
                unreachable!("byte vectors longer than a chunk are never packed")
            }

            fn tree_hash_packing_factor() -> usize {
                unreachable!("byte vectors longer than a chunk are never packed")
            }

            fn tree_hash_root(&self) -> tree_hash::Hash256 {
                tree_hash::merkle_root(self.as_bytes(), 0)
            }
        }
    };
}

pub(crate) use impl_ssz_for_fixed_bytes;
