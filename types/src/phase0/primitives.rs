use fixed_hash::construct_fixed_hash;
use impl_serde::impl_fixed_hash_serde;
use ssz::{Decode, DecodeError, Encode};
use tree_hash::{PackedEncoding, TreeHash, TreeHashType};

pub use ethereum_types::{H160, H256, U256};

pub type CommitteeIndex = u64;
pub type DepositIndex = u64;
pub type Domain = H256;
pub type DomainType = H32;
pub type Epoch = u64;
pub type ExecutionAddress = H160;
pub type ExecutionBlockHash = H256;
pub type ExecutionBlockNumber = u64;
pub type Gwei = u64;
pub type Slot = u64;
pub type Uint256 = U256;
pub type UnixSeconds = u64;
pub type ValidatorIndex = u64;
pub type Version = H32;

construct_fixed_hash! {
    pub struct H32(4);
}

impl_fixed_hash_serde!(H32, 4);

impl Encode for H32 {
    fn is_ssz_fixed_len() -> bool {
        true
    }

    fn ssz_fixed_len() -> usize {
        Self::len_bytes()
    }

    fn ssz_bytes_len(&self) -> usize {
        Self::len_bytes()
    }

    fn ssz_append(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

impl Decode for H32 {
    fn is_ssz_fixed_len() -> bool {
        true
    }

    fn ssz_fixed_len() -> usize {
        Self::len_bytes()
    }

    fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != Self::len_bytes() {
            return Err(DecodeError::InvalidByteLength {
                len: bytes.len(),
                expected: Self::len_bytes(),
            });
        }

        Ok(Self::from_slice(bytes))
    }
}

impl TreeHash for H32 {
    fn tree_hash_type() -> TreeHashType {
        TreeHashType::Vector
    }

    fn tree_hash_packed_encoding(&self) -> PackedEncoding {
        unreachable!("Vector should never be packed")
    }

    fn tree_hash_packing_factor() -> usize {
        unreachable!("Vector should never be packed")
    }

    fn tree_hash_root(&self) -> tree_hash::Hash256 {
        tree_hash::merkle_root(self.as_bytes(), 0)
    }
}
