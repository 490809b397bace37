use anyhow::Result;
use arithmetic::{NonZeroExt as _, U64Ext as _};
use helper_functions::{
    accessors::{
        absolute_epoch, get_block_root, get_current_epoch, get_next_epoch, get_randao_mix,
        get_validator_churn_limit,
    },
    misc::compute_activation_exit_epoch,
    mutators::{decrease_balance, increase_balance, initiate_validator_exit},
    predicates::{is_active_validator, is_eligible_for_activation, is_eligible_for_activation_queue},
};
use itertools::Itertools as _;
use log::debug;
use ssz_types::{BitVector, VariableList};
use tree_hash::TreeHash as _;
use types::{
    bellatrix::beacon_state::BeaconState,
    collections::{BitVectorExt as _, ListExt as _, VectorExt as _},
    config::Config,
    nonstandard::AttestationEpoch,
    phase0::{
        consts::{JustificationBitsLength, GENESIS_EPOCH},
        containers::{Checkpoint, HistoricalBatch},
        primitives::Gwei,
    },
    preset::Preset,
};

use crate::unphased::{EpochDeltas, ValidatorSummary};

pub fn process_rewards_and_penalties<P: Preset>(
    state: &mut BeaconState<P>,
    deltas: impl IntoIterator<Item = impl EpochDeltas>,
) {
    if !should_process_rewards_and_penalties(state) {
        return;
    }

    let mut deltas = deltas.into_iter();

    for balance in state.balances.iter_mut() {
        let deltas = deltas
            .next()
            .expect("deltas should have as many elements as there are validators");

        increase_balance(balance, deltas.combined_reward());
        decrease_balance(balance, deltas.combined_penalty());
    }
}

pub fn process_registry_updates<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    summaries: &mut [impl ValidatorSummary],
) -> Result<()> {
    let current_epoch = get_current_epoch(state);
    let next_epoch = get_next_epoch(state);

    // The indices collected in these do not overlap.
    let mut eligible_for_activation_queue = vec![];
    let mut ejections = vec![];
    let mut activation_queue = vec![];

    for (validator, validator_index) in state.validators.iter().zip(0..) {
        if is_eligible_for_activation_queue::<P>(validator) {
            eligible_for_activation_queue.push(validator_index);
        }

        if is_active_validator(validator, current_epoch)
            && validator.effective_balance <= config.ejection_balance
        {
            ejections.push(validator_index);
        }

        if is_eligible_for_activation(state, validator) {
            activation_queue.push((validator_index, validator.activation_eligibility_epoch));
        }
    }

    // > Process activation eligibility and ejections
    for validator_index in eligible_for_activation_queue {
        state
            .validators
            .try_get_mut(validator_index)?
            .activation_eligibility_epoch = next_epoch;
    }

    for validator_index in ejections {
        let index = usize::try_from(validator_index)?;

        initiate_validator_exit(config, state, validator_index)?;

        // `process_slashings` depends on `Validator.withdrawable_epoch`,
        // which may have been modified by `initiate_validator_exit`.
        summaries[index].update_from(state.validators.try_get(validator_index)?);

        debug!("ejected validator {validator_index} in epoch {current_epoch}");
    }

    // > Queue validators eligible for activation and not yet dequeued for activation
    let activation_queue = activation_queue
        .into_iter()
        // > Order by the sequence of activation_eligibility_epoch setting and then index
        .sorted_unstable_by_key(|&(validator_index, activation_eligibility_epoch)| {
            (activation_eligibility_epoch, validator_index)
        })
        .map(|(validator_index, _)| validator_index);

    // > Dequeued validators for activation up to churn limit
    let churn_limit = get_validator_churn_limit(config, state).try_into()?;
    let activation_exit_epoch = compute_activation_exit_epoch::<P>(current_epoch);

    for validator_index in activation_queue.take(churn_limit) {
        state
            .validators
            .try_get_mut(validator_index)?
            .activation_epoch = activation_exit_epoch;
    }

    Ok(())
}

pub fn process_eth1_data_reset<P: Preset>(state: &mut BeaconState<P>) {
    let next_epoch = get_next_epoch(state);

    // > Reset eth1 data votes
    if next_epoch.is_multiple_of_nonzero(P::EpochsPerEth1VotingPeriod::non_zero()) {
        state.eth1_data_votes = VariableList::default();
    }
}

pub fn process_effective_balance_updates<P: Preset>(state: &mut BeaconState<P>) {
    let hysteresis_increment = P::EFFECTIVE_BALANCE_INCREMENT.get() / P::HYSTERESIS_QUOTIENT;
    let downward_threshold = hysteresis_increment * P::HYSTERESIS_DOWNWARD_MULTIPLIER;
    let upward_threshold = hysteresis_increment * P::HYSTERESIS_UPWARD_MULTIPLIER;

    // > Update effective balances with hysteresis
    for (validator, balance) in state.validators.iter_mut().zip(state.balances.iter().copied()) {
        let below = balance + downward_threshold < validator.effective_balance;
        let above = validator.effective_balance + upward_threshold < balance;

        if below || above {
            validator.effective_balance = balance
                .prev_multiple_of(P::EFFECTIVE_BALANCE_INCREMENT)
                .min(P::MAX_EFFECTIVE_BALANCE);
        }
    }
}

pub fn process_slashings_reset<P: Preset>(state: &mut BeaconState<P>) {
    let next_epoch = get_next_epoch(state);

    // > Reset slashings
    *state.slashings.mod_index_mut(next_epoch) = 0;
}

pub fn process_randao_mixes_reset<P: Preset>(state: &mut BeaconState<P>) {
    let current_epoch = get_current_epoch(state);
    let next_epoch = get_next_epoch(state);

    // > Set randao mix
    *state.randao_mixes.mod_index_mut(next_epoch) = get_randao_mix(state, current_epoch);
}

pub fn process_historical_roots_update<P: Preset>(state: &mut BeaconState<P>) -> Result<()> {
    let next_epoch = get_next_epoch(state);

    // > Set historical root accumulator
    if next_epoch.is_multiple_of_nonzero(P::EpochsPerHistoricalRoot::non_zero()) {
        let historical_batch = HistoricalBatch::<P> {
            block_roots: state.block_roots.clone(),
            state_roots: state.state_roots.clone(),
        };

        state
            .historical_roots
            .try_push(historical_batch.tree_hash_root())?;
    }

    Ok(())
}

pub fn weigh_justification_and_finalization<P: Preset>(
    state: &mut BeaconState<P>,
    current_epoch_active_balance: Gwei,
    previous_epoch_target_balance: Gwei,
    current_epoch_target_balance: Gwei,
) -> Result<()> {
    let old_previous_justified_checkpoint = state.previous_justified_checkpoint;
    let old_current_justified_checkpoint = state.current_justified_checkpoint;
    let old_finalized_checkpoint = state.finalized_checkpoint;

    // > Process justifications
    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    state.justification_bits = shift_up_by_1(&state.justification_bits)?;

    for (attestation_epoch, bit, target_balance) in [
        (AttestationEpoch::Previous, 1, previous_epoch_target_balance),
        (AttestationEpoch::Current, 0, current_epoch_target_balance),
    ] {
        if target_balance * 3 >= current_epoch_active_balance * 2 {
            // `get_block_root` can only fail in the first slot of an epoch.
            // This is called at the end of one.
            let root = get_block_root(state, attestation_epoch)?;

            state.current_justified_checkpoint = Checkpoint {
                epoch: absolute_epoch(state, attestation_epoch.into()),
                root,
            };

            state.justification_bits.try_set(bit, true)?;
        }
    }

    // > Process finalizations
    let bits = &state.justification_bits;
    let all_set = |range: core::ops::Range<usize>| range.into_iter().all(|bit| bits.bit(bit));
    let current_epoch = get_current_epoch(state);
    let mut finalized_checkpoint = old_finalized_checkpoint;

    // > The 2nd/3rd/4th most recent epochs are justified, the 2nd using the 4th as source
    if all_set(1..4) && old_previous_justified_checkpoint.epoch + 3 == current_epoch {
        finalized_checkpoint = old_previous_justified_checkpoint;
    }

    // > The 2nd/3rd most recent epochs are justified, the 2nd using the 3rd as source
    if all_set(1..3) && old_previous_justified_checkpoint.epoch + 2 == current_epoch {
        finalized_checkpoint = old_previous_justified_checkpoint;
    }

    // > The 1st/2nd/3rd most recent epochs are justified, the 1st using the 3rd as source
    if all_set(0..3) && old_current_justified_checkpoint.epoch + 2 == current_epoch {
        finalized_checkpoint = old_current_justified_checkpoint;
    }

    // > The 1st/2nd most recent epochs are justified, the 1st using the 2nd as source
    if all_set(0..2) && old_current_justified_checkpoint.epoch + 1 == current_epoch {
        finalized_checkpoint = old_current_justified_checkpoint;
    }

    state.finalized_checkpoint = finalized_checkpoint;

    if state.current_justified_checkpoint != old_current_justified_checkpoint {
        debug!(
            "justified checkpoint updated at epoch {current_epoch}: {:?}",
            state.current_justified_checkpoint,
        );
    }

    if finalized_checkpoint != old_finalized_checkpoint {
        debug!("finalized checkpoint updated at epoch {current_epoch}: {finalized_checkpoint:?}");
    }

    Ok(())
}

fn shift_up_by_1(
    bits: &BitVector<JustificationBitsLength>,
) -> Result<BitVector<JustificationBitsLength>> {
    let mut shifted = BitVector::new();

    for bit in 1..bits.len() {
        shifted.try_set(bit, bits.bit(bit - 1))?;
    }

    Ok(shifted)
}

pub fn should_process_justification_and_finalization<P: Preset>(state: &BeaconState<P>) -> bool {
    // > Initial FFG checkpoint values have a `0x00` stub for `root`.
    // > Skip FFG updates in the first two epochs to avoid
    // > corner cases that might result in modifying this stub.
    GENESIS_EPOCH + 1 < get_current_epoch(state)
}

pub fn should_process_rewards_and_penalties<P: Preset>(state: &BeaconState<P>) -> bool {
    // > No rewards are applied at the end of `GENESIS_EPOCH`
    // > because rewards are for work done in the previous epoch
    GENESIS_EPOCH < get_current_epoch(state)
}
