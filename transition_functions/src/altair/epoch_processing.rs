use anyhow::Result;
use arithmetic::U64Ext as _;
use helper_functions::{
    accessors::{
        get_current_epoch, get_next_epoch, get_next_sync_committee, get_total_active_balance,
    },
    predicates::is_in_inactivity_leak,
};
use log::debug;
use types::{
    bellatrix::beacon_state::BeaconState,
    collections::{ListExt as _, VecExt as _},
    config::Config,
    phase0::consts::GENESIS_EPOCH,
    preset::Preset,
};

use super::epoch_intermediates::{AltairValidatorSummary, Participation, Statistics};
use crate::unphased;

pub fn process_justification_and_finalization<P: Preset>(
    state: &mut BeaconState<P>,
    statistics: Statistics,
) -> Result<()> {
    if !unphased::should_process_justification_and_finalization(state) {
        return Ok(());
    }

    unphased::weigh_justification_and_finalization(
        state,
        get_total_active_balance(state),
        statistics.previous_epoch_target_participating_balance,
        statistics.current_epoch_target_participating_balance,
    )
}

pub fn process_inactivity_updates<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    summaries: impl IntoIterator<Item = AltairValidatorSummary>,
    participation: impl IntoIterator<Item = Participation>,
) {
    if !should_process_inactivity_updates(state) {
        return;
    }

    let in_inactivity_leak = is_in_inactivity_leak(state);

    let mut summaries = summaries.into_iter();
    let mut participation = participation.into_iter();

    for inactivity_score in state.inactivity_scores.iter_mut() {
        let summary = summaries
            .next()
            .expect("summaries should have as many elements as there are validators");

        let participation = participation
            .next()
            .expect("participations should have as many elements as there are validators");

        if !summary.eligible_for_penalties {
            continue;
        }

        let unslashed_and_participating = !summary.slashed
            && summary.active_in_previous_epoch
            && participation.previous_epoch_matching_target();

        // > Increase the inactivity score of inactive validators
        if unslashed_and_participating {
            *inactivity_score = inactivity_score.saturating_sub(1);
        } else {
            *inactivity_score += config.inactivity_score_bias.get();
        }

        // > Decrease the inactivity score of all eligible validators during a leak-free epoch
        if !in_inactivity_leak {
            *inactivity_score =
                inactivity_score.saturating_sub(config.inactivity_score_recovery_rate);
        }
    }
}

pub fn process_participation_flag_updates<P: Preset>(state: &mut BeaconState<P>) -> Result<()> {
    // > Rotate current/previous epoch participation
    let zero_participation = vec![0; state.validator_count()].into_variable_list()?;

    state.previous_epoch_participation =
        core::mem::replace(&mut state.current_epoch_participation, zero_participation);

    Ok(())
}

pub fn process_sync_committee_updates<P: Preset>(state: &mut BeaconState<P>) -> Result<()> {
    let next_epoch = get_next_epoch(state);

    if next_epoch.is_multiple_of_nonzero(P::EPOCHS_PER_SYNC_COMMITTEE_PERIOD) {
        let committee = get_next_sync_committee(state)?;

        state.current_sync_committee =
            core::mem::replace(&mut state.next_sync_committee, committee);

        debug!("rotated sync committees for period starting at epoch {next_epoch}");
    }

    Ok(())
}

fn should_process_inactivity_updates<P: Preset>(state: &BeaconState<P>) -> bool {
    // > Skip the genesis epoch as score updates are based on the previous epoch participation
    GENESIS_EPOCH < get_current_epoch(state)
}
