use std::sync::Arc;

use thiserror::Error;
use types::{
    bellatrix::containers::SignedBeaconBlock,
    phase0::{
        containers::{Attestation, AttesterSlashing, Checkpoint},
        primitives::{Epoch, Slot, H256},
    },
    preset::Preset,
};

#[derive(Debug, Error)]
pub enum Error<P: Preset> {
    #[error(
        "anchor block does not commit to anchor state \
         (in_block: {in_block:?}, computed: {computed:?})"
    )]
    AnchorStateRootMismatch { in_block: H256, computed: H256 },
    #[error(
        "attestation votes for a block from the future \
         (attestation: {attestation:?}, block: {block:?})"
    )]
    AttestationForFutureBlock {
        attestation: Arc<Attestation<P>>,
        block: Arc<SignedBeaconBlock<P>>,
    },
    #[error(
        "attestation targets epoch {target_epoch}, which is neither \
         the current epoch ({current_epoch}) nor the previous one"
    )]
    AttestationFromWrongEpoch {
        target_epoch: Epoch,
        current_epoch: Epoch,
    },
    #[error("attestation votes for a checkpoint in the wrong epoch: {attestation:?}")]
    AttestationTargetsWrongEpoch { attestation: Arc<Attestation<P>> },
    #[error("attester slashing is not slashable: {attester_slashing:?}")]
    AttesterSlashingNotSlashable {
        attester_slashing: Arc<AttesterSlashing<P>>,
    },
    #[error(
        "block is not a descendant of the finalized block \
         (block: {block:?}, finalized_checkpoint: {finalized_checkpoint:?})"
    )]
    BlockNotDescendantOfFinalized {
        block: Arc<SignedBeaconBlock<P>>,
        finalized_checkpoint: Checkpoint,
    },
    #[error("block is not newer than finalized slot {finalized_slot}: {block:?}")]
    BlockNotNewerThanFinalized {
        block: Arc<SignedBeaconBlock<P>>,
        finalized_slot: Slot,
    },
    #[error("LMD GHOST vote is inconsistent with FFG vote target (attestation: {attestation:?})")]
    LmdGhostInconsistentWithFfgTarget { attestation: Arc<Attestation<P>> },
    #[error("state of block {block_root:?} is not in the store")]
    StateNotFound { block_root: H256 },
    #[error("block {block_root:?} is not in the store")]
    UnknownBlock { block_root: H256 },
}
