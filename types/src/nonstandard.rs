use core::mem::size_of;

use enum_map::Enum;
use serde_with::{DisplayFromStr, PickFirst, Same};
use smallvec::SmallVec;
use static_assertions::assert_eq_size;

use crate::phase0::primitives::Gwei;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Enum)]
pub enum RelativeEpoch {
    Previous,
    Current,
    Next,
}

impl From<AttestationEpoch> for RelativeEpoch {
    fn from(attestation_epoch: AttestationEpoch) -> Self {
        match attestation_epoch {
            AttestationEpoch::Previous => Self::Previous,
            AttestationEpoch::Current => Self::Current,
        }
    }
}

/// Epochs an attestation included in a block may target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AttestationEpoch {
    Previous,
    Current,
}

/// Serializes integers as decimal strings and accepts either form when deserializing.
pub type Quoted = PickFirst<(DisplayFromStr, Same)>;

// Inline capacity is chosen to make `GweiVec` no larger than `Vec<Gwei>`.
pub type GweiVec = SmallVec<[Gwei; 2 * size_of::<usize>() / size_of::<Gwei>()]>;

assert_eq_size!(GweiVec, Vec<Gwei>);
