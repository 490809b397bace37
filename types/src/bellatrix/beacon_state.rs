use std::sync::Arc;

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use ssz_derive::{Decode, Encode};
use ssz_types::BitVector;
use tree_hash_derive::TreeHash;

use crate::{
    altair::containers::SyncCommittee,
    bellatrix::containers::ExecutionPayloadHeader,
    cache::Cache,
    collections::{
        Balances, EpochParticipation, Eth1DataVotes, HistoricalRoots, InactivityScores,
        RandaoMixes, RecentRoots, Slashings, Validators,
    },
    nonstandard::Quoted,
    phase0::{
        consts::JustificationBitsLength,
        containers::{BeaconBlockHeader, Checkpoint, Eth1Data, Fork},
        primitives::{DepositIndex, Slot, UnixSeconds, H256},
    },
    preset::Preset,
};

#[serde_as]
#[derive(Clone, Default, Debug, Derivative, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[derivative(PartialEq, Eq)]
#[serde(bound = "", deny_unknown_fields)]
pub struct BeaconState<P: Preset> {
    // > Versioning
    #[serde_as(as = "Quoted")]
    pub genesis_time: UnixSeconds,
    pub genesis_validators_root: H256,
    #[serde_as(as = "Quoted")]
    pub slot: Slot,
    pub fork: Fork,

    // > History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: RecentRoots<P>,
    pub state_roots: RecentRoots<P>,
    pub historical_roots: HistoricalRoots<P>,

    // > Eth1
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: Eth1DataVotes<P>,
    #[serde_as(as = "Quoted")]
    pub eth1_deposit_index: DepositIndex,

    // > Registry
    pub validators: Validators<P>,
    pub balances: Balances<P>,

    // > Randomness
    pub randao_mixes: RandaoMixes<P>,

    // > Slashings
    pub slashings: Slashings<P>,

    // > Participation
    pub previous_epoch_participation: EpochParticipation<P>,
    pub current_epoch_participation: EpochParticipation<P>,

    // > Finality
    pub justification_bits: BitVector<JustificationBitsLength>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,

    // > Inactivity
    pub inactivity_scores: InactivityScores<P>,

    // > Sync
    pub current_sync_committee: Arc<SyncCommittee<P>>,
    pub next_sync_committee: Arc<SyncCommittee<P>>,

    // > Execution
    pub latest_execution_payload_header: ExecutionPayloadHeader<P>,

    // Cache
    #[derivative(PartialEq = "ignore")]
    #[serde(skip)]
    #[ssz(skip_serializing, skip_deserializing)]
    #[tree_hash(skip_hashing)]
    pub cache: Cache,
}

impl<P: Preset> BeaconState<P> {
    /// Number of validators in the registry, which is also the length of every per-validator list.
    #[must_use]
    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Checks that all per-validator lists have the same length.
    #[must_use]
    pub fn registry_lengths_consistent(&self) -> bool {
        let count = self.validator_count();

        self.balances.len() == count
            && self.previous_epoch_participation.len() == count
            && self.current_epoch_participation.len() == count
            && self.inactivity_scores.len() == count
    }
}

#[cfg(test)]
mod tests {
    use ssz::{Decode as _, Encode as _};
    use tree_hash::TreeHash as _;

    use crate::preset::Minimal;

    use super::*;

    #[test]
    fn cache_is_excluded_from_encoding_hashing_and_equality() -> anyhow::Result<()> {
        let state = BeaconState::<Minimal>::default();
        let mut cached = state.clone();

        cached.cache.proposer_index.get_or_init(|| 5);

        assert_eq!(state, cached);
        assert_eq!(state.tree_hash_root(), cached.tree_hash_root());
        assert_eq!(state.as_ssz_bytes(), cached.as_ssz_bytes());

        let decoded = BeaconState::<Minimal>::from_ssz_bytes(&cached.as_ssz_bytes())
            .map_err(|error| anyhow::anyhow!("{error:?}"))?;

        assert_eq!(decoded, state);
        assert!(decoded.cache.proposer_index.get().is_none());

        Ok(())
    }

    #[test]
    fn default_state_has_consistent_registry_lengths() {
        assert!(BeaconState::<Minimal>::default().registry_lengths_consistent());
    }
}
