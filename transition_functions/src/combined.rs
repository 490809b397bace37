//! Entry points for callers outside this crate.
//!
//! Every function here either applies all of its changes to the state or none of them.

use anyhow::Result;
use execution_engine::{ExecutionEngine, NullExecutionEngine};
use helper_functions::verifier::{MultiVerifier, NullVerifier, Verifier};
use log::debug;
use types::{
    bellatrix::{
        beacon_state::BeaconState,
        containers::{BeaconBlock, SignedBeaconBlock},
    },
    config::Config,
    phase0::{
        containers::DepositData,
        primitives::{Slot, ValidatorIndex},
    },
    preset::Preset,
};

use crate::{
    altair, bellatrix,
    unphased::{ProcessSlots, StateRootPolicy},
};

/// Applies a block received from an untrusted source. All signatures and the state root are
/// checked.
pub fn untrusted_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
) -> Result<()> {
    custom_state_transition(
        config,
        state,
        signed_block,
        ProcessSlots::Always,
        StateRootPolicy::Verify,
        NullExecutionEngine,
        MultiVerifier::default(),
    )
}

/// Applies a block that has already been validated, skipping signatures and the state root.
pub fn trusted_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
) -> Result<()> {
    custom_state_transition(
        config,
        state,
        signed_block,
        ProcessSlots::IfNeeded,
        StateRootPolicy::Trust,
        NullExecutionEngine,
        NullVerifier,
    )
}

pub fn custom_state_transition<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    process_slots: ProcessSlots,
    state_root_policy: StateRootPolicy,
    execution_engine: impl ExecutionEngine<P> + Send,
    verifier: impl Verifier + Send,
) -> Result<()> {
    let mut post_state = state.clone();

    bellatrix::state_transition(
        config,
        &mut post_state,
        signed_block,
        process_slots,
        state_root_policy,
        execution_engine,
        verifier,
    )
    .inspect_err(|error| {
        debug!(
            "block at slot {} rejected: {error:?}",
            signed_block.message.slot,
        );
    })?;

    *state = post_state;

    Ok(())
}

/// Checks the signatures in `signed_block` without applying it.
///
/// `state` must already be at the slot of the block.
pub fn verify_signatures<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    verifier: impl Verifier,
) -> Result<()> {
    bellatrix::verify_signatures(config, state, signed_block, verifier)
}

/// Advances `state` through empty slots up to `slot`.
pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    slot: Slot,
) -> Result<()> {
    let mut post_state = state.clone();

    bellatrix::process_slots(config, &mut post_state, slot)?;

    *state = post_state;

    Ok(())
}

pub fn process_epoch<P: Preset>(config: &Config, state: &mut BeaconState<P>) -> Result<()> {
    let mut post_state = state.clone();

    bellatrix::process_epoch(config, &mut post_state)?;

    *state = post_state;

    Ok(())
}

/// Applies an unsigned block to a state already at its slot, checking every signature inside.
///
/// Used when computing the state root for a block being proposed.
pub fn process_untrusted_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
) -> Result<()> {
    process_block(config, state, block, MultiVerifier::default())
}

pub fn process_trusted_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
) -> Result<()> {
    process_block(config, state, block, NullVerifier)
}

fn process_block<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    block: &BeaconBlock<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let mut post_state = state.clone();

    bellatrix::process_block(config, &mut post_state, block, NullExecutionEngine, verifier)?;

    *state = post_state;

    Ok(())
}

pub fn process_deposit_data<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    deposit_data: DepositData,
) -> Result<Option<ValidatorIndex>> {
    altair::process_deposit_data(config, state, deposit_data)
}
