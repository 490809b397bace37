use tree_hash::TreeHash as _;
use types::{
    bellatrix::{beacon_state::BeaconState, containers::BeaconBlock},
    collections::VectorExt as _,
    preset::Preset,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcessSlots {
    Always,
    IfNeeded,
    Never,
}

impl ProcessSlots {
    #[must_use]
    pub fn should_process<P: Preset>(self, state: &BeaconState<P>, block: &BeaconBlock<P>) -> bool {
        match self {
            Self::Always => true,
            // The test for equality is intentional. It ensures that blocks attempting to "rewind"
            // the state are rejected early by `process_slots`.
            // `state.slot < block.slot` would also work, but the block would be rejected as invalid
            // later, while verifying the state root.
            Self::IfNeeded => state.slot != block.slot,
            Self::Never => false,
        }
    }
}

pub fn process_slot<P: Preset>(state: &mut BeaconState<P>) {
    let slot = state.slot;

    // > Cache state root
    let previous_state_root = state.tree_hash_root();
    *state.state_roots.mod_index_mut(slot) = previous_state_root;

    // > Cache latest block header state root
    if state.latest_block_header.state_root.is_zero() {
        state.latest_block_header.state_root = previous_state_root;
    }

    // > Cache block root
    let previous_block_root = state.latest_block_header.tree_hash_root();
    *state.block_roots.mod_index_mut(slot) = previous_block_root;

    state.cache.advance_slot();
}

#[cfg(test)]
mod tests {
    use types::{phase0::primitives::H256, preset::Minimal};

    use super::*;

    #[test]
    fn process_slot_caches_roots_and_fills_header_state_root() {
        let mut state = BeaconState::<Minimal> {
            slot: 3,
            ..BeaconState::default()
        };

        state.cache.proposer_index.get_or_init(|| 1);

        let state_root = state.tree_hash_root();

        process_slot(&mut state);

        assert_eq!(*state.state_roots.mod_index(3), state_root);
        assert_eq!(state.latest_block_header.state_root, state_root);
        assert_eq!(
            *state.block_roots.mod_index(3),
            state.latest_block_header.tree_hash_root(),
        );
        assert_ne!(*state.block_roots.mod_index(3), H256::zero());
        assert!(state.cache.proposer_index.get().is_none());
    }

    #[test]
    fn if_needed_skips_blocks_in_the_state_slot() {
        let state = BeaconState::<Minimal> {
            slot: 5,
            ..BeaconState::default()
        };

        let same_slot = BeaconBlock {
            slot: 5,
            ..BeaconBlock::default()
        };

        let later_slot = BeaconBlock {
            slot: 6,
            ..BeaconBlock::default()
        };

        assert!(!ProcessSlots::IfNeeded.should_process(&state, &same_slot));
        assert!(ProcessSlots::IfNeeded.should_process(&state, &later_slot));
        assert!(ProcessSlots::Always.should_process(&state, &same_slot));
        assert!(!ProcessSlots::Never.should_process(&state, &later_slot));
    }
}
