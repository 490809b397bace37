use anyhow::{ensure, Error as AnyhowError, Result};
use bit_field::BitField as _;
use itertools::Itertools as _;
use types::{
    bellatrix::{beacon_state::BeaconState, containers::BeaconBlockBody},
    config::Config,
    phase0::{
        consts::FAR_FUTURE_EPOCH,
        containers::{AttestationData, IndexedAttestation, Validator},
        primitives::{Epoch, H256},
    },
    preset::Preset,
};

use crate::{
    accessors,
    error::{Error, SignatureKind},
    signing::SignForSingleFork as _,
    verifier::Verifier,
};

// > Check if ``validator`` is active.
#[inline]
#[must_use]
pub const fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.activation_epoch <= epoch && epoch < validator.exit_epoch
}

// > Check if ``validator`` is eligible to be placed into the activation queue.
#[must_use]
pub const fn is_eligible_for_activation_queue<P: Preset>(validator: &Validator) -> bool {
    validator.activation_eligibility_epoch == FAR_FUTURE_EPOCH
        && validator.effective_balance == P::MAX_EFFECTIVE_BALANCE
}

// > Check if ``validator`` is eligible for activation.
#[must_use]
pub fn is_eligible_for_activation<P: Preset>(state: &BeaconState<P>, validator: &Validator) -> bool {
    // > Placement in queue is finalized
    validator.activation_eligibility_epoch <= state.finalized_checkpoint.epoch
        // > Has not yet been activated
        && validator.activation_epoch == FAR_FUTURE_EPOCH
}

#[inline]
#[must_use]
pub const fn is_eligible_for_penalties(validator: &Validator, previous_epoch: Epoch) -> bool {
    is_active_validator(validator, previous_epoch)
        || (validator.slashed && previous_epoch + 1 < validator.withdrawable_epoch)
}

// > Check if ``validator`` is slashable.
#[inline]
#[must_use]
pub const fn is_slashable_validator(validator: &Validator, epoch: Epoch) -> bool {
    !validator.slashed
        && epoch < validator.withdrawable_epoch
        && validator.activation_epoch <= epoch
}

// > Check if ``data_1`` and ``data_2`` are slashable according to Casper FFG rules.
#[inline]
#[must_use]
pub fn is_slashable_attestation_data(data_1: AttestationData, data_2: AttestationData) -> bool {
    // > Double vote
    (data_1 != data_2 && data_1.target.epoch == data_2.target.epoch)
        // > Surround vote
        || (data_1.source.epoch < data_2.source.epoch && data_2.target.epoch < data_1.target.epoch)
}

// This doesn't verify the signature when called directly with `MultiVerifier`.
// When calling directly, use `SingleVerifier` or call `finish` manually.
pub fn validate_constructed_indexed_attestation<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    indexed_attestation: &IndexedAttestation<P>,
    verifier: impl Verifier,
) -> Result<()> {
    validate_indexed_attestation_with_options(config, state, indexed_attestation, verifier, false)
}

pub fn validate_indexed_attestation<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    indexed_attestation: &IndexedAttestation<P>,
    verifier: impl Verifier,
) -> Result<()> {
    validate_indexed_attestation_with_options(config, state, indexed_attestation, verifier, true)
}

// Attestations built by `accessors::get_indexed_attestation` are sorted by construction.
fn validate_indexed_attestation_with_options<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    indexed_attestation: &IndexedAttestation<P>,
    mut verifier: impl Verifier,
    validate_indices_sorted_and_unique: bool,
) -> Result<()> {
    let indices = &indexed_attestation.attesting_indices;

    ensure!(!indices.is_empty(), Error::AttestationHasNoAttestingIndices);

    if validate_indices_sorted_and_unique {
        // > Verify indices are sorted and unique
        ensure!(
            indices.iter().tuple_windows().all(|(a, b)| a < b),
            Error::AttestingIndicesNotSortedAndUnique,
        );
    }

    // > Verify aggregate signature
    itertools::process_results(
        indices.iter().copied().map(|validator_index| {
            accessors::public_key(state, validator_index)?
                .decompress()
                .map_err(AnyhowError::new)
        }),
        |public_keys| {
            verifier.verify_aggregate(
                indexed_attestation.data.signing_root(config, state),
                indexed_attestation.signature,
                public_keys,
                SignatureKind::Attestation,
            )
        },
    )?
}

/// Checks a Merkle proof of `leaf` at position `index` among the leaves of a tree with `root`.
///
/// `index` counts leaves only. It is not a generalized index.
#[must_use]
pub fn is_valid_merkle_branch(
    leaf: H256,
    branch: impl IntoIterator<Item = H256>,
    index: u64,
    root: H256,
) -> bool {
    let mut hash = leaf;

    for (height, node) in branch.into_iter().enumerate() {
        if index.get_bit(height) {
            hash = hashing::hash_256_256(node, hash);
        } else {
            hash = hashing::hash_256_256(hash, node);
        }
    }

    hash == root
}

#[must_use]
pub fn is_in_inactivity_leak<P: Preset>(state: &BeaconState<P>) -> bool {
    accessors::get_finality_delay(state) > P::MIN_EPOCHS_TO_INACTIVITY_PENALTY
}

#[must_use]
pub fn is_merge_transition_complete<P: Preset>(state: &BeaconState<P>) -> bool {
    !state.latest_execution_payload_header.is_default_payload()
}

#[must_use]
pub fn is_merge_transition_block<P: Preset>(
    state: &BeaconState<P>,
    body: &BeaconBlockBody<P>,
) -> bool {
    !is_merge_transition_complete(state) && !body.execution_payload.is_default_payload()
}

/// Blocks built before the merge carry a default payload and skip execution processing.
#[must_use]
pub fn is_execution_enabled<P: Preset>(state: &BeaconState<P>, body: &BeaconBlockBody<P>) -> bool {
    is_merge_transition_complete(state) || !body.execution_payload.is_default_payload()
}
