use anyhow::Result;
use execution_engine::ExecutionEngine;
use helper_functions::{
    accessors,
    error::SignatureKind,
    misc, predicates,
    signing::{RandaoEpoch, SignForSingleFork as _},
    verifier::{MultiVerifier, NullVerifier, Verifier},
};
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use types::{
    bellatrix::{beacon_state::BeaconState, containers::SignedBeaconBlock},
    config::Config,
    preset::Preset,
};

use super::{block_processing, slot_processing};
use crate::{
    altair,
    unphased::{ProcessSlots, StateRootPolicy},
};

/// Applies `signed_block` to `state`.
///
/// Signatures are checked against a copy of the pre-block state on the `rayon` pool while the
/// block itself is processed. `state` may be left partially modified on failure.
/// See [`combined`](crate::combined) for variants that leave it untouched.
pub fn state_transition<P: Preset, V: Verifier + Send>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    process_slots: ProcessSlots,
    state_root_policy: StateRootPolicy,
    execution_engine: impl ExecutionEngine<P> + Send,
    verifier: V,
) -> Result<()> {
    let block = &signed_block.message;

    // > Process slots (including those with no blocks) since block
    if process_slots.should_process(state, block) {
        slot_processing::process_slots(config, state, block.slot)?;
    }

    let process_block = |state: &mut BeaconState<P>| {
        // > Process block
        block_processing::process_block(config, state, block, execution_engine, NullVerifier)?;

        // > Verify state root
        state_root_policy.verify(state, block)
    };

    if V::IS_NULL {
        return process_block(state);
    }

    let pre_state = state.clone();

    // > Verify signature
    let (signature_result, block_result) = rayon::join(
        || verify_signatures(config, &pre_state, signed_block, verifier),
        || process_block(state),
    );

    signature_result.and(block_result)
}

/// Checks every BLS signature in `block` against `state`, which must already be advanced to the
/// slot of the block.
///
/// Deposit signatures are not included. Invalid ones do not make a block invalid.
pub fn verify_signatures<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    block: &SignedBeaconBlock<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    let message = &block.message;
    let body = &message.body;
    let proposer_public_key = accessors::public_key(state, message.proposer_index)?;
    let epoch = misc::compute_epoch_at_slot::<P>(message.slot);

    verifier.reserve(count_required_signatures(block));

    verifier.verify_singular(
        message.signing_root(config, state),
        block.signature,
        proposer_public_key,
        SignatureKind::Block,
    )?;

    verifier.verify_singular(
        RandaoEpoch::from(epoch).signing_root(config, state),
        body.randao_reveal,
        proposer_public_key,
        SignatureKind::Randao,
    )?;

    let slashed_headers = body.proposer_slashings.iter().flat_map(|proposer_slashing| {
        [
            proposer_slashing.signed_header_1,
            proposer_slashing.signed_header_2,
        ]
    });

    for signed_header in slashed_headers {
        verifier.verify_singular(
            signed_header.message.signing_root(config, state),
            signed_header.signature,
            accessors::public_key(state, signed_header.message.proposer_index)?,
            SignatureKind::Block,
        )?;
    }

    for attester_slashing in body.attester_slashings.iter() {
        predicates::validate_indexed_attestation(
            config,
            state,
            &attester_slashing.attestation_1,
            &mut verifier,
        )?;

        predicates::validate_indexed_attestation(
            config,
            state,
            &attester_slashing.attestation_2,
            &mut verifier,
        )?;
    }

    let attestations: &[_] = &body.attestations;

    accessors::initialize_shuffled_indices(state, attestations)?;

    // Committees are looked up in parallel. Each attestation gets its own verifier.
    let attestation_verifiers = attestations
        .par_iter()
        .map(|attestation| {
            let indexed_attestation = accessors::get_indexed_attestation(state, attestation)?;
            let mut attestation_verifier = MultiVerifier::default();

            predicates::validate_constructed_indexed_attestation(
                config,
                state,
                &indexed_attestation,
                &mut attestation_verifier,
            )?;

            Ok(attestation_verifier)
        })
        .collect::<Result<Vec<_>>>()?;

    verifier.extend(
        attestation_verifiers
            .into_iter()
            .flat_map(MultiVerifier::into_triples),
        SignatureKind::Attestation,
    )?;

    for voluntary_exit in body.voluntary_exits.iter() {
        verifier.verify_singular(
            voluntary_exit.message.signing_root(config, state),
            voluntary_exit.signature,
            accessors::public_key(state, voluntary_exit.message.validator_index)?,
            SignatureKind::VoluntaryExit,
        )?;
    }

    altair::verify_sync_aggregate_signature(config, state, &body.sync_aggregate, &mut verifier)?;

    verifier.finish()
}

fn count_required_signatures(block: &SignedBeaconBlock<impl Preset>) -> usize {
    let body = &block.message.body;

    // Block signature, RANDAO reveal and sync aggregate.
    3 + 2 * body.proposer_slashings.len()
        + 2 * body.attester_slashings.len()
        + body.attestations.len()
        + body.voluntary_exits.len()
}
