//! Selection of the `Eth1Data` a block proposer votes for.

use core::cmp::Reverse;
use std::collections::HashMap;

use arithmetic::{NonZeroExt as _, U64Ext as _};
use log::debug;
use types::{
    bellatrix::beacon_state::BeaconState,
    config::Config,
    phase0::{
        containers::Eth1Data,
        primitives::{DepositIndex, ExecutionBlockHash, ExecutionBlockNumber, UnixSeconds, H256},
    },
    preset::Preset,
};

use crate::misc;

/// A block of the deposit chain along with the state of the deposit contract after it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Eth1Block {
    pub hash: ExecutionBlockHash,
    pub number: ExecutionBlockNumber,
    pub timestamp: UnixSeconds,
    pub deposit_root: H256,
    pub deposit_count: DepositIndex,
}

impl Eth1Block {
    #[must_use]
    pub const fn eth1_data(self) -> Eth1Data {
        Eth1Data {
            deposit_root: self.deposit_root,
            deposit_count: self.deposit_count,
            block_hash: self.hash,
        }
    }
}

#[must_use]
pub fn voting_period_start_time<P: Preset>(config: &Config, state: &BeaconState<P>) -> UnixSeconds {
    let eth1_voting_period_start_slot = state
        .slot
        .prev_multiple_of(P::SlotsPerEth1VotingPeriod::non_zero());

    misc::compute_timestamp_at_slot(config, state, eth1_voting_period_start_slot)
}

/// Blocks are candidates if they are at least `ETH1_FOLLOW_DISTANCE` blocks old
/// but not more than twice as old, measured in time at the start of the voting period.
#[must_use]
pub fn is_candidate_block(config: &Config, block: &Eth1Block, period_start: UnixSeconds) -> bool {
    let follow_time = config.seconds_per_eth1_block * config.eth1_follow_distance;

    block.timestamp + follow_time <= period_start
        && period_start <= block.timestamp + follow_time * 2
}

/// Picks the `Eth1Data` to include in a block proposed on top of `state`.
///
/// `eth1_chain` must be ordered by block number.
/// Votes already in `state.eth1_data_votes` win if they match a candidate block.
/// The most frequent one wins and ties go to the vote cast first in the period.
/// Without valid votes the latest candidate is chosen, falling back to `state.eth1_data`.
#[must_use]
pub fn get_eth1_vote<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    eth1_chain: &[Eth1Block],
) -> Eth1Data {
    let period_start = voting_period_start_time(config, state);

    let votes_to_consider = eth1_chain
        .iter()
        .filter(|block| is_candidate_block(config, block, period_start))
        .map(|block| block.eth1_data())
        // Ensure cannot move back to earlier deposit contract states.
        .filter(|eth1_data| eth1_data.deposit_count >= state.eth1_data.deposit_count)
        .collect::<Vec<_>>();

    let mut valid_votes = HashMap::<Eth1Data, (usize, usize)>::new();

    for (position, vote) in state.eth1_data_votes.iter().enumerate() {
        if votes_to_consider.contains(vote) {
            valid_votes
                .entry(*vote)
                .and_modify(|(count, _)| *count += 1)
                .or_insert((1, position));
        }
    }

    let default_vote = votes_to_consider
        .last()
        .copied()
        .unwrap_or(state.eth1_data);

    let vote = valid_votes
        .into_iter()
        .max_by_key(|(_, (count, position))| (*count, Reverse(*position)))
        .map_or(default_vote, |(vote, _)| vote);

    debug!(
        "eth1 vote at slot {}: {vote:?} ({} candidates)",
        state.slot,
        votes_to_consider.len(),
    );

    vote
}
