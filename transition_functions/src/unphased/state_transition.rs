use anyhow::{ensure, Result};
use tree_hash::TreeHash as _;
use types::{
    bellatrix::{beacon_state::BeaconState, containers::BeaconBlock},
    preset::Preset,
};

use crate::unphased::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StateRootPolicy {
    Verify,
    Trust,
}

impl StateRootPolicy {
    pub fn verify<P: Preset>(self, state: &BeaconState<P>, block: &BeaconBlock<P>) -> Result<()> {
        match self {
            Self::Verify => {
                let computed = state.tree_hash_root();
                let in_block = block.state_root;

                ensure!(
                    computed == in_block,
                    Error::<P>::StateRootMismatch { computed, in_block },
                );
            }
            Self::Trust => {}
        }

        Ok(())
    }
}
