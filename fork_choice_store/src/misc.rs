use std::sync::Arc;

use types::{
    bellatrix::{beacon_state::BeaconState, containers::SignedBeaconBlock},
    phase0::{
        containers::{Attestation, AttestationData},
        primitives::{Epoch, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
};

#[derive(Debug)]
pub enum BlockAction<P: Preset> {
    Accept(H256),
    /// The block has been seen before. Nothing was changed.
    Ignore(H256),
    Defer(Arc<SignedBeaconBlock<P>>, DeferReason),
}

#[derive(Debug)]
pub enum AttestationAction<P: Preset> {
    Accept,
    Defer(Arc<Attestation<P>>, DeferReason),
}

/// A block that passed validation along with its post-state.
///
/// Produced by [`Store::validate_block`] and consumed by [`Store::apply_block`].
///
/// [`Store::validate_block`]: crate::Store::validate_block
/// [`Store::apply_block`]: crate::Store::apply_block
#[derive(Debug)]
pub struct ValidBlock<P: Preset> {
    pub block_root: H256,
    pub block: Arc<SignedBeaconBlock<P>>,
    pub state: Arc<BeaconState<P>>,
}

#[derive(Debug)]
pub enum BlockValidation<P: Preset> {
    Valid(ValidBlock<P>),
    Done(BlockAction<P>),
}

#[derive(Debug)]
pub struct ValidAttestation {
    pub data: AttestationData,
    pub attesting_indices: Vec<ValidatorIndex>,
}

#[derive(Debug)]
pub enum AttestationValidation<P: Preset> {
    Valid(ValidAttestation),
    Done(AttestationAction<P>),
}

/// What a deferred object is waiting for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeferReason {
    FutureSlot(Slot),
    UnknownParent(H256),
    UnknownBlock(H256),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AttestationOrigin {
    Gossip,
    Block,
}

impl AttestationOrigin {
    #[must_use]
    pub const fn is_from_block(self) -> bool {
        matches!(self, Self::Block)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LatestMessage {
    pub epoch: Epoch,
    pub root: H256,
}
