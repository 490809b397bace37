use bit_field::BitField as _;
use helper_functions::{
    accessors::{
        compute_base_reward, get_base_reward_per_increment, get_current_epoch, get_previous_epoch,
        get_total_active_balance,
    },
    predicates::{is_active_validator, is_eligible_for_penalties, is_in_inactivity_leak},
};
use itertools::izip;
use rayon::iter::{IndexedParallelIterator as _, IntoParallelRefIterator as _, ParallelIterator as _};
use static_assertions::assert_eq_size;
use types::{
    altair::{
        consts::{
            TIMELY_HEAD_FLAG_INDEX, TIMELY_HEAD_WEIGHT, TIMELY_SOURCE_FLAG_INDEX,
            TIMELY_SOURCE_WEIGHT, TIMELY_TARGET_FLAG_INDEX, TIMELY_TARGET_WEIGHT,
            WEIGHT_DENOMINATOR,
        },
        primitives::ParticipationFlags,
    },
    bellatrix::beacon_state::BeaconState,
    config::Config,
    phase0::{
        containers::Validator,
        primitives::{Epoch, Gwei},
    },
    preset::Preset,
};

use crate::unphased::{EpochDeltas, ValidatorSummary};

// Registries smaller than this are summarized on the calling thread.
const PARALLEL_SUMMARY_THRESHOLD: usize = 1 << 14;

/// Participation flags of a validator in the previous and current epochs.
#[derive(Clone, Copy, Default, Debug)]
pub struct Participation {
    previous: ParticipationFlags,
    current: ParticipationFlags,
}

impl Participation {
    #[must_use]
    pub fn previous_epoch_matching_source(self) -> bool {
        self.previous.get_bit(TIMELY_SOURCE_FLAG_INDEX)
    }

    #[must_use]
    pub fn previous_epoch_matching_target(self) -> bool {
        self.previous.get_bit(TIMELY_TARGET_FLAG_INDEX)
    }

    #[must_use]
    pub fn previous_epoch_matching_head(self) -> bool {
        self.previous.get_bit(TIMELY_HEAD_FLAG_INDEX)
    }

    #[must_use]
    pub fn current_epoch_matching_target(self) -> bool {
        self.current.get_bit(TIMELY_TARGET_FLAG_INDEX)
    }
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(test, derive(Default))]
pub struct AltairValidatorSummary {
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub withdrawable_epoch: Epoch,
    pub active_in_previous_epoch: bool,
    pub active_in_current_epoch: bool,
    pub eligible_for_penalties: bool,
}

assert_eq_size!(AltairValidatorSummary, [u64; 3]);

impl ValidatorSummary for AltairValidatorSummary {
    // This does not update derived fields because `process_slashings` does not use them.
    fn update_from(&mut self, validator: &Validator) {
        self.effective_balance = validator.effective_balance;
        self.slashed = validator.slashed;
        self.withdrawable_epoch = validator.withdrawable_epoch;
    }
}

// The active balance in the current epoch is not stored here.
// It is cached in `Cache.total_active_balance` by the time epoch processing starts.
#[derive(Clone, Copy, Default, Debug)]
pub struct Statistics {
    pub previous_epoch_source_participating_balance: Gwei,
    pub previous_epoch_target_participating_balance: Gwei,
    pub previous_epoch_head_participating_balance: Gwei,
    pub current_epoch_target_participating_balance: Gwei,
}

impl Statistics {
    fn clamp_balances<P: Preset>(&mut self) {
        let minimum = P::EFFECTIVE_BALANCE_INCREMENT.get();

        for balance in [
            &mut self.previous_epoch_source_participating_balance,
            &mut self.previous_epoch_target_participating_balance,
            &mut self.previous_epoch_head_participating_balance,
            &mut self.current_epoch_target_participating_balance,
        ] {
            *balance = (*balance).max(minimum);
        }
    }

    fn add(&mut self, summary: AltairValidatorSummary, participation: Participation) {
        let AltairValidatorSummary {
            effective_balance,
            slashed,
            active_in_previous_epoch,
            active_in_current_epoch,
            ..
        } = summary;

        if slashed {
            return;
        }

        if active_in_previous_epoch {
            if participation.previous_epoch_matching_source() {
                self.previous_epoch_source_participating_balance += effective_balance;
            }

            if participation.previous_epoch_matching_target() {
                self.previous_epoch_target_participating_balance += effective_balance;
            }

            if participation.previous_epoch_matching_head() {
                self.previous_epoch_head_participating_balance += effective_balance;
            }
        }

        if active_in_current_epoch && participation.current_epoch_matching_target() {
            self.current_epoch_target_participating_balance += effective_balance;
        }
    }
}

#[derive(Clone, Copy, Default, Debug)]
pub struct EpochDeltasForTransition {
    pub reward: Gwei,
    pub penalty: Gwei,
}

impl EpochDeltas for EpochDeltasForTransition {
    fn combined_reward(self) -> Gwei {
        self.reward
    }

    fn combined_penalty(self) -> Gwei {
        self.penalty
    }
}

/// Summarizes the registry and participation in one pass.
///
/// Summaries are computed in parallel for large registries.
pub fn statistics<P: Preset>(
    state: &BeaconState<P>,
) -> (Statistics, Vec<AltairValidatorSummary>, Vec<Participation>) {
    let current_epoch = get_current_epoch(state);
    let previous_epoch = get_previous_epoch(state);

    let participation = state
        .previous_epoch_participation
        .iter()
        .zip(state.current_epoch_participation.iter())
        .map(|(previous, current)| Participation {
            previous: *previous,
            current: *current,
        })
        .collect::<Vec<_>>();

    let summarize = |validator: &Validator| AltairValidatorSummary {
        effective_balance: validator.effective_balance,
        slashed: validator.slashed,
        withdrawable_epoch: validator.withdrawable_epoch,
        active_in_previous_epoch: is_active_validator(validator, previous_epoch),
        active_in_current_epoch: is_active_validator(validator, current_epoch),
        eligible_for_penalties: is_eligible_for_penalties(validator, previous_epoch),
    };

    let validators: &[Validator] = &state.validators;

    let summaries = if validators.len() < PARALLEL_SUMMARY_THRESHOLD {
        validators.iter().map(summarize).collect::<Vec<_>>()
    } else {
        validators
            .par_iter()
            .with_min_len(PARALLEL_SUMMARY_THRESHOLD / 4)
            .map(summarize)
            .collect()
    };

    let mut statistics = Statistics::default();

    for (summary, participation) in summaries.iter().zip(participation.iter()) {
        statistics.add(*summary, *participation);
    }

    statistics.clamp_balances::<P>();

    (statistics, summaries, participation)
}

pub fn epoch_deltas<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    statistics: Statistics,
    summaries: impl IntoIterator<Item = AltairValidatorSummary>,
    participation: impl IntoIterator<Item = Participation>,
) -> Vec<EpochDeltasForTransition> {
    let in_inactivity_leak = is_in_inactivity_leak(state);
    let base_reward_per_increment = get_base_reward_per_increment(state);

    let increment = P::EFFECTIVE_BALANCE_INCREMENT;
    let source_increments = statistics.previous_epoch_source_participating_balance / increment;
    let target_increments = statistics.previous_epoch_target_participating_balance / increment;
    let head_increments = statistics.previous_epoch_head_participating_balance / increment;
    let active_increments = get_total_active_balance(state) / increment;

    let inactivity_penalty_denominator =
        config.inactivity_score_bias.get() * P::INACTIVITY_PENALTY_QUOTIENT_BELLATRIX.get();

    izip!(summaries, participation, state.inactivity_scores.iter().copied())
        .map(|(summary, participation, inactivity_score)| {
            let mut deltas = EpochDeltasForTransition::default();

            let AltairValidatorSummary {
                effective_balance,
                slashed,
                eligible_for_penalties,
                ..
            } = summary;

            if !eligible_for_penalties {
                return deltas;
            }

            let base_reward =
                compute_base_reward::<P>(effective_balance, base_reward_per_increment);

            let participation_component_reward = |weight, unslashed_participating_increments| {
                let reward_numerator = base_reward * weight * unslashed_participating_increments;
                let reward_denominator = active_increments * WEIGHT_DENOMINATOR.get();
                reward_numerator / reward_denominator
            };

            let participation_component_penalty =
                |weight| base_reward * weight / WEIGHT_DENOMINATOR;

            if !slashed && participation.previous_epoch_matching_source() {
                if !in_inactivity_leak {
                    deltas.reward +=
                        participation_component_reward(TIMELY_SOURCE_WEIGHT, source_increments);
                }
            } else {
                deltas.penalty += participation_component_penalty(TIMELY_SOURCE_WEIGHT);
            }

            if !slashed && participation.previous_epoch_matching_target() {
                if !in_inactivity_leak {
                    deltas.reward +=
                        participation_component_reward(TIMELY_TARGET_WEIGHT, target_increments);
                }
            } else {
                deltas.penalty += participation_component_penalty(TIMELY_TARGET_WEIGHT);
                deltas.penalty +=
                    effective_balance * inactivity_score / inactivity_penalty_denominator;
            }

            // There is no penalty for missing the head.
            if !slashed && participation.previous_epoch_matching_head() && !in_inactivity_leak {
                deltas.reward +=
                    participation_component_reward(TIMELY_HEAD_WEIGHT, head_increments);
            }

            deltas
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use bit_field::BitField as _;
    use types::{
        collections::VecExt as _,
        phase0::{consts::FAR_FUTURE_EPOCH, containers::Checkpoint},
        preset::Minimal,
    };

    use super::*;

    const MAX_EFFECTIVE_BALANCE: Gwei = <Minimal as Preset>::MAX_EFFECTIVE_BALANCE;

    fn flags(source: bool, target: bool, head: bool) -> ParticipationFlags {
        let mut flags: ParticipationFlags = 0;
        flags.set_bit(TIMELY_SOURCE_FLAG_INDEX, source);
        flags.set_bit(TIMELY_TARGET_FLAG_INDEX, target);
        flags.set_bit(TIMELY_HEAD_FLAG_INDEX, head);
        flags
    }

    // Validator 0 attested perfectly, validator 1 was slashed and validator 2 missed everything.
    fn state_in_epoch_2() -> Result<BeaconState<Minimal>> {
        let validator = Validator {
            effective_balance: MAX_EFFECTIVE_BALANCE,
            activation_eligibility_epoch: 0,
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        let slashed = Validator {
            slashed: true,
            withdrawable_epoch: 100,
            ..validator.clone()
        };

        let all = flags(true, true, true);
        let none = flags(false, false, false);

        Ok(BeaconState {
            slot: 2 * 8,
            validators: vec![validator.clone(), slashed, validator].into_variable_list()?,
            balances: vec![MAX_EFFECTIVE_BALANCE; 3].into_variable_list()?,
            previous_epoch_participation: vec![all, all, none].into_variable_list()?,
            current_epoch_participation: vec![all, none, none].into_variable_list()?,
            inactivity_scores: vec![0, 0, 8].into_variable_list()?,
            finalized_checkpoint: Checkpoint {
                epoch: 1,
                ..Default::default()
            },
            ..BeaconState::default()
        })
    }

    #[test]
    fn statistics_exclude_slashed_validators() -> Result<()> {
        let state = state_in_epoch_2()?;
        let (statistics, summaries, _) = statistics(&state);

        assert_eq!(summaries.len(), 3);
        assert!(summaries[1].slashed);
        assert_eq!(
            statistics.previous_epoch_source_participating_balance,
            MAX_EFFECTIVE_BALANCE,
        );
        assert_eq!(
            statistics.current_epoch_target_participating_balance,
            MAX_EFFECTIVE_BALANCE,
        );

        Ok(())
    }

    #[test]
    fn statistics_are_clamped_to_one_increment() -> Result<()> {
        let mut state = state_in_epoch_2()?;
        state.previous_epoch_participation = vec![0; 3].into_variable_list()?;
        state.current_epoch_participation = vec![0; 3].into_variable_list()?;

        let (statistics, _, _) = statistics(&state);

        assert_eq!(
            statistics.previous_epoch_head_participating_balance,
            <Minimal as Preset>::EFFECTIVE_BALANCE_INCREMENT.get(),
        );

        Ok(())
    }

    #[test]
    fn deltas_reward_participants_and_penalize_the_rest() -> Result<()> {
        let config = Config::minimal();
        let state = state_in_epoch_2()?;
        let (statistics, summaries, participation) = statistics(&state);
        let deltas = epoch_deltas(&config, &state, statistics, summaries, participation);

        let base_reward_per_increment = get_base_reward_per_increment(&state);
        let base_reward =
            compute_base_reward::<Minimal>(MAX_EFFECTIVE_BALANCE, base_reward_per_increment);

        assert!(deltas[0].reward > 0);
        assert_eq!(deltas[0].penalty, 0);

        // Slashed validators are penalized as if they had not participated.
        assert_eq!(deltas[1].reward, 0);
        assert_eq!(
            deltas[1].penalty,
            base_reward * (TIMELY_SOURCE_WEIGHT + TIMELY_TARGET_WEIGHT) / WEIGHT_DENOMINATOR,
        );

        let inactivity_penalty = MAX_EFFECTIVE_BALANCE * 8
            / (config.inactivity_score_bias.get()
                * <Minimal as Preset>::INACTIVITY_PENALTY_QUOTIENT_BELLATRIX.get());

        assert_eq!(deltas[2].reward, 0);
        assert_eq!(deltas[2].penalty, deltas[1].penalty + inactivity_penalty);

        Ok(())
    }
}
