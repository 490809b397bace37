use core::cmp::Ordering;

use anyhow::Result;
use typenum::Unsigned as _;
use types::{
    altair::consts::{PROPOSER_WEIGHT, WEIGHT_DENOMINATOR},
    bellatrix::beacon_state::BeaconState,
    collections::{ListExt as _, VectorExt as _},
    config::Config,
    phase0::{
        consts::FAR_FUTURE_EPOCH,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
};

use crate::{
    accessors::{get_beacon_proposer_index, get_current_epoch, get_validator_churn_limit},
    error::Error,
    misc::compute_activation_exit_epoch,
};

pub fn balance<P: Preset>(
    state: &mut BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<&mut Gwei> {
    state
        .balances
        .try_get_mut(validator_index)
        .map_err(Into::into)
}

#[inline]
pub fn increase_balance(balance: &mut Gwei, delta: Gwei) {
    *balance += delta;
}

#[inline]
pub fn decrease_balance(balance: &mut Gwei, delta: Gwei) {
    *balance = balance.saturating_sub(delta);
}

pub fn initiate_validator_exit<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<()> {
    // > Return if validator already initiated exit
    if state.validators.try_get(validator_index)?.exit_epoch != FAR_FUTURE_EPOCH {
        return Ok(());
    }

    // > Compute exit queue epoch
    let mut exit_queue_epoch = compute_activation_exit_epoch::<P>(get_current_epoch(state));
    let mut exit_queue_churn = 0;

    for validator in state.validators.iter() {
        let exit_epoch = validator.exit_epoch;

        if exit_epoch == FAR_FUTURE_EPOCH {
            continue;
        }

        match exit_epoch.cmp(&exit_queue_epoch) {
            Ordering::Less => {}
            Ordering::Equal => exit_queue_churn += 1,
            Ordering::Greater => {
                exit_queue_epoch = exit_epoch;
                exit_queue_churn = 1;
            }
        }
    }

    if exit_queue_churn >= get_validator_churn_limit(config, state) {
        exit_queue_epoch += 1;
    }

    // > Set validator exit epoch and withdrawable epoch
    let validator = state.validators.try_get_mut(validator_index)?;

    validator.exit_epoch = exit_queue_epoch;

    validator.withdrawable_epoch = exit_queue_epoch
        .checked_add(config.min_validator_withdrawability_delay)
        .ok_or(Error::EpochOverflow)?;

    Ok(())
}

/// Slashes `slashed_index` and rewards the whistleblower, who defaults to the block proposer.
pub fn slash_validator<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    slashed_index: ValidatorIndex,
    whistleblower_index: Option<ValidatorIndex>,
) -> Result<()> {
    let epoch = get_current_epoch(state);

    initiate_validator_exit(config, state, slashed_index)?;

    let validator = state.validators.try_get_mut(slashed_index)?;
    let effective_balance = validator.effective_balance;

    validator.slashed = true;
    validator.withdrawable_epoch = validator
        .withdrawable_epoch
        .max(epoch + P::EpochsPerSlashingsVector::U64);

    *state.slashings.mod_index_mut(epoch) += effective_balance;

    decrease_balance(
        balance(state, slashed_index)?,
        effective_balance / P::MIN_SLASHING_PENALTY_QUOTIENT_ALTAIR,
    );

    // > Apply proposer and whistleblower rewards
    let proposer_index = get_beacon_proposer_index(state)?;
    let whistleblower_index = whistleblower_index.unwrap_or(proposer_index);
    let whistleblower_reward = effective_balance / P::WHISTLEBLOWER_REWARD_QUOTIENT;
    let proposer_reward = whistleblower_reward * PROPOSER_WEIGHT / WEIGHT_DENOMINATOR;

    increase_balance(balance(state, proposer_index)?, proposer_reward);

    increase_balance(
        balance(state, whistleblower_index)?,
        whistleblower_reward - proposer_reward,
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use itertools::Itertools as _;
    use types::{
        collections::VecExt as _,
        phase0::containers::Validator,
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
            current_epoch_participation: vec![0; count].into_variable_list()?,
            inactivity_scores: vec![0; count].into_variable_list()?,
            ..BeaconState::default()
        })
    }

    #[test]
    fn decrease_balance_saturates_at_zero() {
        let mut balance = 5;

        decrease_balance(&mut balance, 7);

        assert_eq!(balance, 0);

        increase_balance(&mut balance, 3);

        assert_eq!(balance, 3);
    }

    #[test]
    fn initiate_validator_exit_is_idempotent() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_active_validators(4)?;

        initiate_validator_exit(&config, &mut state, 1)?;

        let exited = state.validators.try_get(1)?.clone();

        initiate_validator_exit(&config, &mut state, 1)?;

        assert_eq!(*state.validators.try_get(1)?, exited);
        assert_eq!(exited.exit_epoch, compute_activation_exit_epoch::<Minimal>(0));
        assert_eq!(
            exited.withdrawable_epoch,
            exited.exit_epoch + config.min_validator_withdrawability_delay,
        );

        Ok(())
    }

    #[test]
    fn exits_beyond_the_churn_limit_are_delayed() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_active_validators(8)?;
        let churn_limit = get_validator_churn_limit(&config, &state);
        let first_exit_epoch = compute_activation_exit_epoch::<Minimal>(0);

        for validator_index in 0..=churn_limit {
            initiate_validator_exit(&config, &mut state, validator_index)?;
        }

        let exit_epochs = state
            .validators
            .iter()
            .take(usize::try_from(churn_limit)? + 1)
            .map(|validator| validator.exit_epoch)
            .collect_vec();

        assert!(exit_epochs[..exit_epochs.len() - 1]
            .iter()
            .all(|epoch| *epoch == first_exit_epoch));

        assert_eq!(exit_epochs.last().copied(), Some(first_exit_epoch + 1));

        Ok(())
    }

    #[test]
    fn slash_validator_penalizes_and_rewards() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_active_validators(16)?;
        let proposer_index = get_beacon_proposer_index(&state)?;
        let slashed_index = (proposer_index + 1) % 16;
        let whistleblower_index = (proposer_index + 2) % 16;

        slash_validator(&config, &mut state, slashed_index, Some(whistleblower_index))?;

        let slashed = state.validators.try_get(slashed_index)?;
        let whistleblower_reward = MAX_EFFECTIVE_BALANCE / 512;
        let proposer_reward = whistleblower_reward * 8 / 64;

        assert!(slashed.slashed);
        assert_eq!(
            slashed.withdrawable_epoch,
            (compute_activation_exit_epoch::<Minimal>(0) + config.min_validator_withdrawability_delay)
                .max(<Minimal as Preset>::EpochsPerSlashingsVector::U64),
        );
        assert_eq!(*state.slashings.mod_index(0), MAX_EFFECTIVE_BALANCE);
        assert_eq!(
            *state.balances.try_get(slashed_index)?,
            MAX_EFFECTIVE_BALANCE - MAX_EFFECTIVE_BALANCE / 64,
        );
        assert_eq!(
            *state.balances.try_get(proposer_index)?,
            MAX_EFFECTIVE_BALANCE + proposer_reward,
        );
        assert_eq!(
            *state.balances.try_get(whistleblower_index)?,
            MAX_EFFECTIVE_BALANCE + whistleblower_reward - proposer_reward,
        );

        Ok(())
    }

    #[test]
    fn slash_validator_rewards_proposer_without_whistleblower() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_active_validators(16)?;
        let proposer_index = get_beacon_proposer_index(&state)?;
        let slashed_index = (proposer_index + 1) % 16;

        slash_validator(&config, &mut state, slashed_index, None)?;

        assert_eq!(
            *state.balances.try_get(proposer_index)?,
            MAX_EFFECTIVE_BALANCE + MAX_EFFECTIVE_BALANCE / 512,
        );

        Ok(())
    }
}
