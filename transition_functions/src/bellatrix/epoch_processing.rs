use core::{cell::LazyCell, ops::Mul as _};

use anyhow::Result;
use helper_functions::{
    accessors::{get_current_epoch, get_total_active_balance},
    mutators::decrease_balance,
};
use log::debug;
use typenum::Unsigned as _;
use types::{
    bellatrix::beacon_state::BeaconState, config::Config, phase0::primitives::Gwei,
    preset::Preset,
};

use crate::{
    altair::{self, AltairValidatorSummary},
    unphased,
};

pub fn process_epoch<P: Preset>(config: &Config, state: &mut BeaconState<P>) -> Result<()> {
    debug!("processing epoch {}", get_current_epoch(state));

    let (statistics, mut summaries, participation) = altair::statistics(state);

    altair::process_justification_and_finalization(state, statistics)?;

    altair::process_inactivity_updates(
        config,
        state,
        summaries.iter().copied(),
        participation.iter().copied(),
    );

    // Deltas depend on the finalized checkpoint and inactivity scores updated above.
    let epoch_deltas = altair::epoch_deltas(
        config,
        state,
        statistics,
        summaries.iter().copied(),
        participation,
    );

    unphased::process_rewards_and_penalties(state, epoch_deltas);
    unphased::process_registry_updates(config, state, summaries.as_mut_slice())?;
    process_slashings(state, summaries);
    unphased::process_eth1_data_reset(state);
    unphased::process_effective_balance_updates(state);
    unphased::process_slashings_reset(state);
    unphased::process_randao_mixes_reset(state);
    unphased::process_historical_roots_update(state)?;
    altair::process_participation_flag_updates(state)?;
    altair::process_sync_committee_updates(state)?;

    state.cache.advance_epoch();

    Ok(())
}

pub fn process_slashings<P: Preset>(
    state: &mut BeaconState<P>,
    summaries: impl IntoIterator<Item = AltairValidatorSummary>,
) {
    let current_epoch = get_current_epoch(state);
    let total_active_balance = get_total_active_balance(state);
    let slashings = &state.slashings;

    // Most epochs slash nobody.
    let adjusted_total_slashing_balance = LazyCell::new(|| {
        slashings
            .iter()
            .sum::<Gwei>()
            .mul(P::PROPORTIONAL_SLASHING_MULTIPLIER_BELLATRIX)
            .min(total_active_balance)
    });

    let mut summaries = summaries.into_iter();

    for balance in state.balances.iter_mut() {
        let AltairValidatorSummary {
            effective_balance,
            slashed,
            withdrawable_epoch,
            ..
        } = summaries
            .next()
            .expect("list of validators and list of balances should have the same length");

        if !slashed {
            continue;
        }

        if current_epoch + P::EpochsPerSlashingsVector::U64 / 2 != withdrawable_epoch {
            continue;
        }

        // > Factored out from penalty numerator to avoid uint64 overflow
        let increment = P::EFFECTIVE_BALANCE_INCREMENT;
        let penalty_numerator = effective_balance / increment * *adjusted_total_slashing_balance;
        let penalty = penalty_numerator / total_active_balance * increment.get();

        decrease_balance(balance, penalty);
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools as _;
    use types::{
        collections::{ListExt as _, VecExt as _, VectorExt as _},
        phase0::{consts::FAR_FUTURE_EPOCH, containers::Validator, primitives::H256},
        preset::Minimal,
    };

    use super::*;

    const MAX_EFFECTIVE_BALANCE: Gwei = <Minimal as Preset>::MAX_EFFECTIVE_BALANCE;

    fn state_with_active_validators(count: usize) -> Result<BeaconState<Minimal>> {
        let validators = core::iter::repeat_with(|| Validator {
            effective_balance: MAX_EFFECTIVE_BALANCE,
            activation_eligibility_epoch: 0,
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        })
        .take(count)
        .collect_vec();

        Ok(BeaconState {
            validators: validators.into_variable_list()?,
            balances: vec![MAX_EFFECTIVE_BALANCE; count].into_variable_list()?,
            previous_epoch_participation: vec![0; count].into_variable_list()?,
            current_epoch_participation: vec![0b111; count].into_variable_list()?,
            inactivity_scores: vec![0; count].into_variable_list()?,
            ..BeaconState::default()
        })
    }

    #[test]
    fn slashed_validator_is_penalized_halfway_to_withdrawal() -> Result<()> {
        let mut state = state_with_active_validators(8)?;
        let halfway = <Minimal as Preset>::EpochsPerSlashingsVector::U64 / 2;

        let validator = state.validators.try_get_mut(2)?;
        validator.slashed = true;
        validator.withdrawable_epoch = halfway;

        let validator = state.validators.try_get_mut(5)?;
        validator.slashed = true;
        validator.withdrawable_epoch = halfway + 1;

        *state.slashings.mod_index_mut(0) = 2 * MAX_EFFECTIVE_BALANCE;

        let (_, summaries, _) = altair::statistics(&state);

        process_slashings(&mut state, summaries);

        // 64 ETH of slashings tripled against 256 ETH of active balance.
        let total_active_balance = 8 * MAX_EFFECTIVE_BALANCE;
        let increment = <Minimal as Preset>::EFFECTIVE_BALANCE_INCREMENT.get();
        let penalty = MAX_EFFECTIVE_BALANCE / increment * (6 * MAX_EFFECTIVE_BALANCE)
            / total_active_balance
            * increment;

        assert_eq!(*state.balances.try_get(2)?, MAX_EFFECTIVE_BALANCE - penalty);
        assert_eq!(*state.balances.try_get(5)?, MAX_EFFECTIVE_BALANCE);
        assert_eq!(*state.balances.try_get(0)?, MAX_EFFECTIVE_BALANCE);

        Ok(())
    }

    #[test]
    fn process_epoch_rotates_participation_and_mixes() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_active_validators(64)?;

        state.slot = 7;
        *state.randao_mixes.mod_index_mut(0) = H256::repeat_byte(3);
        *state.slashings.mod_index_mut(1) = 5;

        process_epoch(&config, &mut state)?;

        assert!(state
            .previous_epoch_participation
            .iter()
            .all(|flags| *flags == 0b111));
        assert!(state.current_epoch_participation.iter().all(|flags| *flags == 0));
        assert_eq!(*state.randao_mixes.mod_index(1), H256::repeat_byte(3));
        assert_eq!(*state.slashings.mod_index(1), 0);

        // No rewards or penalties in the genesis epoch.
        assert!(state
            .balances
            .iter()
            .all(|balance| *balance == MAX_EFFECTIVE_BALANCE));

        assert!(state.registry_lengths_consistent());

        Ok(())
    }
}
