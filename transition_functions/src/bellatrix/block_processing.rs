use anyhow::{ensure, Result};
use execution_engine::ExecutionEngine;
use helper_functions::{
    accessors::{get_current_epoch, get_randao_mix, initialize_shuffled_indices},
    error::SignatureKind,
    misc::compute_timestamp_at_slot,
    mutators::slash_validator,
    predicates::{is_execution_enabled, is_merge_transition_complete},
    verifier::{MultiVerifier, Verifier},
};
use log::debug;
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use typenum::Unsigned as _;
use types::{
    bellatrix::{
        beacon_state::BeaconState,
        consts::{GAS_LIMIT_DENOMINATOR, MIN_GAS_LIMIT},
        containers::{BeaconBlock, BeaconBlockBody},
        primitives::Gas,
    },
    config::Config,
    phase0::containers::{AttesterSlashing, ProposerSlashing},
    preset::Preset,
};

use crate::{
    altair,
    unphased::{self, Error},
};

/// Runs every block-level check and mutation for `block` on a `state` already advanced to
/// `block.slot`.
///
/// Signatures are submitted to `verifier` and checked by [`Verifier::finish`] before returning.
/// The proposer signature over the whole block is not part of this. See
/// [`verify_signatures`](crate::bellatrix::verify_signatures).
pub fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    execution_engine: impl ExecutionEngine<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    debug_assert_eq!(state.slot, block.slot);

    verifier.reserve(count_required_signatures(block));

    unphased::process_block_header(state, block)?;

    if is_execution_enabled(state, &block.body) {
        process_execution_payload(config, state, &block.body, execution_engine)?;
    }

    unphased::process_randao(config, state, &block.body, &mut verifier)?;
    unphased::process_eth1_data(state, &block.body)?;

    process_operations(config, state, &block.body, &mut verifier)?;

    altair::process_sync_aggregate(config, state, &block.body.sync_aggregate, &mut verifier)?;

    verifier.finish()
}

pub fn process_execution_payload<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
    execution_engine: impl ExecutionEngine<P>,
) -> Result<()> {
    let payload = &body.execution_payload;
    let merge_transition_complete = is_merge_transition_complete(state);

    // > Verify consistency of the parent hash with respect to the previous execution payload header
    if merge_transition_complete {
        let parent = &state.latest_execution_payload_header;

        let in_state = parent.block_hash;
        let in_block = payload.parent_hash;

        ensure!(
            in_state == in_block,
            Error::<P>::ExecutionPayloadParentHashMismatch { in_state, in_block },
        );

        let in_state = parent.block_number + 1;
        let in_block = payload.block_number;

        ensure!(
            in_state == in_block,
            Error::<P>::ExecutionPayloadBlockNumberMismatch { in_state, in_block },
        );

        let parent_gas_limit = parent.gas_limit;
        let in_block = payload.gas_limit;

        ensure!(
            is_valid_gas_limit(parent_gas_limit, in_block),
            Error::<P>::ExecutionPayloadGasLimitOutOfBounds {
                parent_gas_limit,
                in_block,
            },
        );
    }

    // > Verify prev_randao
    let in_state = get_randao_mix(state, get_current_epoch(state));
    let in_block = payload.prev_randao;

    ensure!(
        in_state == in_block,
        Error::<P>::ExecutionPayloadPrevRandaoMismatch { in_state, in_block },
    );

    // > Verify timestamp
    let computed = compute_timestamp_at_slot(config, state, state.slot);
    let in_block = payload.timestamp;

    ensure!(
        computed == in_block,
        Error::<P>::ExecutionPayloadTimestampMismatch { computed, in_block },
    );

    let gas_used = payload.gas_used;
    let gas_limit = payload.gas_limit;

    ensure!(
        gas_used <= gas_limit,
        Error::<P>::ExecutionPayloadGasUsedExceedsLimit {
            gas_used,
            gas_limit,
        },
    );

    // > Verify the execution payload is valid
    let status = execution_engine.notify_new_payload(payload)?.status;

    ensure!(
        !status.is_invalid(),
        Error::<P>::ExecutionPayloadInvalid {
            block_hash: payload.block_hash,
            status,
        },
    );

    if !status.is_valid() {
        debug!(
            "execution payload {:?} optimistically accepted with status {status:?}",
            payload.block_hash,
        );
    }

    // > Cache execution payload header
    state.latest_execution_payload_header = payload.to_header();

    Ok(())
}

pub fn process_operations<P: Preset, V: Verifier>(
    config: &Config,
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
    mut verifier: V,
) -> Result<()> {
    // > Verify that outstanding deposits are processed up to the maximum number of deposits
    let outstanding = state
        .eth1_data
        .deposit_count
        .checked_sub(state.eth1_deposit_index)
        .ok_or(Error::<P>::DepositIndexBeyondDepositCount {
            eth1_deposit_index: state.eth1_deposit_index,
            deposit_count: state.eth1_data.deposit_count,
        })?;

    let computed = P::MaxDeposits::U64.min(outstanding);
    let in_block = body.deposits.len().try_into()?;

    ensure!(
        computed == in_block,
        Error::<P>::DepositCountMismatch { computed, in_block },
    );

    for proposer_slashing in body.proposer_slashings.iter().copied() {
        process_proposer_slashing(config, state, proposer_slashing, &mut verifier)?;
    }

    for attester_slashing in body.attester_slashings.iter() {
        process_attester_slashing(config, state, attester_slashing, &mut verifier)?;
    }

    // Rayon overhead outweighs the remaining checks when signatures are not being collected.
    if V::IS_NULL {
        for attestation in body.attestations.iter() {
            unphased::validate_attestation_with_verifier(
                config,
                state,
                attestation,
                &mut verifier,
            )?;
        }
    } else {
        initialize_shuffled_indices(state, body.attestations.iter())?;

        let attestations: &[_] = &body.attestations;

        let collected = attestations
            .par_iter()
            .map(|attestation| {
                let mut attestation_verifier = MultiVerifier::default();

                unphased::validate_attestation_with_verifier(
                    config,
                    state,
                    attestation,
                    &mut attestation_verifier,
                )?;

                Ok(attestation_verifier)
            })
            .collect::<Result<Vec<_>>>()?;

        verifier.extend(
            collected.into_iter().flat_map(MultiVerifier::into_triples),
            SignatureKind::Attestation,
        )?;
    }

    for attestation in body.attestations.iter() {
        altair::apply_attestation(state, attestation)?;
    }

    if !body.deposits.is_empty() {
        let combined_deposits =
            unphased::validate_deposits(config, state, body.deposits.iter().cloned())?;

        altair::apply_deposits(state, body.deposits.len(), combined_deposits)?;
    }

    for voluntary_exit in body.voluntary_exits.iter().copied() {
        unphased::process_voluntary_exit(config, state, voluntary_exit, &mut verifier)?;
    }

    Ok(())
}

pub fn process_proposer_slashing<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    proposer_slashing: ProposerSlashing,
    verifier: impl Verifier,
) -> Result<()> {
    unphased::validate_proposer_slashing_with_verifier(config, state, proposer_slashing, verifier)?;

    let index = proposer_slashing.signed_header_1.message.proposer_index;

    debug!("slashing proposer {index} at slot {}", state.slot);

    slash_validator(config, state, index, None)
}

pub fn process_attester_slashing<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    attester_slashing: &AttesterSlashing<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let slashable_indices = unphased::validate_attester_slashing_with_verifier(
        config,
        state,
        attester_slashing,
        verifier,
    )?;

    debug!(
        "slashing attesters {slashable_indices:?} at slot {}",
        state.slot,
    );

    for validator_index in slashable_indices {
        slash_validator(config, state, validator_index, None)?;
    }

    Ok(())
}

fn is_valid_gas_limit(parent_gas_limit: Gas, gas_limit: Gas) -> bool {
    let max_delta = parent_gas_limit / GAS_LIMIT_DENOMINATOR;

    gas_limit.abs_diff(parent_gas_limit) < max_delta && gas_limit >= MIN_GAS_LIMIT
}

fn count_required_signatures<P: Preset>(block: &BeaconBlock<P>) -> usize {
    let body = &block.body;

    // RANDAO reveal and sync aggregate.
    2 + 2 * body.proposer_slashings.len()
        + 2 * body.attester_slashings.len()
        + body.attestations.len()
        + body.deposits.len()
        + body.voluntary_exits.len()
}

#[cfg(test)]
mod tests {
    use execution_engine::{MockExecutionEngine, NullExecutionEngine, PayloadValidationStatus};
    use helper_functions::verifier::NullVerifier;
    use test_case::test_case;
    use types::{
        bellatrix::containers::{ExecutionPayload, ExecutionPayloadHeader},
        phase0::primitives::H256,
        preset::Minimal,
    };

    use super::*;

    fn post_merge_state() -> BeaconState<Minimal> {
        BeaconState {
            genesis_time: 1_000,
            slot: 3,
            latest_execution_payload_header: ExecutionPayloadHeader {
                block_hash: H256::repeat_byte(1),
                block_number: 10,
                gas_limit: 30_000_000,
                ..ExecutionPayloadHeader::default()
            },
            ..BeaconState::default()
        }
    }

    fn body_extending(state: &BeaconState<Minimal>) -> BeaconBlockBody<Minimal> {
        let config = Config::minimal();
        let parent = &state.latest_execution_payload_header;

        BeaconBlockBody {
            execution_payload: ExecutionPayload {
                parent_hash: parent.block_hash,
                block_number: parent.block_number + 1,
                gas_limit: parent.gas_limit,
                gas_used: parent.gas_limit / 2,
                timestamp: compute_timestamp_at_slot(&config, state, state.slot),
                block_hash: H256::repeat_byte(2),
                ..ExecutionPayload::default()
            },
            ..BeaconBlockBody::default()
        }
    }

    #[test]
    fn valid_payload_is_cached_and_sent_to_engine() -> Result<()> {
        let config = Config::minimal();
        let mut state = post_merge_state();
        let body = body_extending(&state);
        let engine = MockExecutionEngine::<Minimal>::default();

        process_execution_payload(&config, &mut state, &body, &engine)?;

        assert_eq!(
            state.latest_execution_payload_header,
            body.execution_payload.to_header(),
        );
        assert_eq!(engine.notified_payloads(), [body.execution_payload]);

        Ok(())
    }

    #[test]
    fn payload_rejected_by_engine_is_invalid() {
        let config = Config::minimal();
        let mut state = post_merge_state();
        let body = body_extending(&state);
        let engine = MockExecutionEngine::<Minimal>::new(PayloadValidationStatus::Invalid);

        let error = process_execution_payload(&config, &mut state, &body, &engine)
            .expect_err("engine rejects the payload");

        assert!(matches!(
            error.downcast_ref::<Error<Minimal>>(),
            Some(Error::ExecutionPayloadInvalid { .. }),
        ));
        assert_eq!(state.latest_execution_payload_header.block_number, 10);
    }

    #[test]
    fn syncing_engine_accepts_payload_optimistically() -> Result<()> {
        let config = Config::minimal();
        let mut state = post_merge_state();
        let body = body_extending(&state);
        let engine = MockExecutionEngine::<Minimal>::new(PayloadValidationStatus::Syncing);

        process_execution_payload(&config, &mut state, &body, &engine)?;

        assert_eq!(state.latest_execution_payload_header.block_number, 11);

        Ok(())
    }

    #[test]
    fn payload_with_wrong_parent_is_rejected() {
        let config = Config::minimal();
        let mut state = post_merge_state();
        let mut body = body_extending(&state);

        body.execution_payload.parent_hash = H256::repeat_byte(9);

        let error = process_execution_payload(&config, &mut state, &body, NullExecutionEngine)
            .expect_err("parent hash does not match");

        assert!(matches!(
            error.downcast_ref::<Error<Minimal>>(),
            Some(Error::ExecutionPayloadParentHashMismatch { .. }),
        ));
    }

    #[test]
    fn payload_using_more_gas_than_limit_is_rejected() {
        let config = Config::minimal();
        let mut state = post_merge_state();
        let mut body = body_extending(&state);

        body.execution_payload.gas_used = body.execution_payload.gas_limit + 1;

        let error = process_execution_payload(&config, &mut state, &body, NullExecutionEngine)
            .expect_err("gas used exceeds gas limit");

        assert!(matches!(
            error.downcast_ref::<Error<Minimal>>(),
            Some(Error::ExecutionPayloadGasUsedExceedsLimit { .. }),
        ));
    }

    #[test_case(30_000_000, 30_000_000 => true; "unchanged")]
    #[test_case(30_000_000, 30_029_295 => true; "largest increase")]
    #[test_case(30_000_000, 29_970_705 => true; "largest decrease")]
    #[test_case(30_000_000, 30_029_296 => false; "increase too large")]
    #[test_case(30_000_000, 29_970_704 => false; "decrease too large")]
    #[test_case(5_000, 4_999 => false; "below minimum")]
    fn gas_limit_bounds(parent_gas_limit: Gas, gas_limit: Gas) -> bool {
        is_valid_gas_limit(parent_gas_limit, gas_limit)
    }

    #[test]
    fn deposit_index_beyond_voted_deposit_count_is_rejected() {
        let config = Config::minimal();

        let mut state = BeaconState::<Minimal> {
            eth1_deposit_index: 5,
            ..BeaconState::default()
        };

        state.eth1_data.deposit_count = 3;

        let error =
            process_operations(&config, &mut state, &BeaconBlockBody::default(), NullVerifier)
                .expect_err("eth1_data cannot roll back processed deposits");

        assert!(matches!(
            error.downcast_ref::<Error<Minimal>>(),
            Some(Error::DepositIndexBeyondDepositCount {
                eth1_deposit_index: 5,
                deposit_count: 3,
            }),
        ));
    }

    #[test]
    fn execution_is_disabled_before_merge_for_empty_payloads() {
        let state = BeaconState::<Minimal>::default();
        let body = BeaconBlockBody::default();

        assert!(!is_execution_enabled(&state, &body));
    }
}
