use std::sync::Arc;

use bls::PublicKeyBytes;
use enum_map::EnumMap;
use im::HashMap;
use once_cell::sync::OnceCell;

use crate::{
    altair::primitives::NonZeroGwei, nonstandard::RelativeEpoch, phase0::primitives::ValidatorIndex,
};

/// Values derived from a `BeaconState` that are expensive to recompute.
///
/// The fields are ordered from short-lived to long-lived.
/// Entries for epochs are rotated by [`Cache::advance_epoch`] rather than recomputed.
#[derive(Clone, Default, Debug)]
pub struct Cache {
    pub proposer_index: OnceCell<ValidatorIndex>,
    pub active_validator_indices_ordered: EnumMap<RelativeEpoch, OnceCell<Arc<[ValidatorIndex]>>>,
    pub active_validator_indices_shuffled: EnumMap<RelativeEpoch, OnceCell<Arc<[ValidatorIndex]>>>,
    pub total_active_balance: EnumMap<RelativeEpoch, OnceCell<NonZeroGwei>>,
    pub validator_indices: OnceCell<HashMap<PublicKeyBytes, ValidatorIndex>>,
}

impl Cache {
    pub fn advance_slot(&mut self) {
        self.proposer_index.take();
    }

    pub fn advance_epoch(&mut self) {
        let ordered = &mut self.active_validator_indices_ordered;
        let shuffled = &mut self.active_validator_indices_shuffled;
        let balance = &mut self.total_active_balance;

        ordered[RelativeEpoch::Previous] = core::mem::take(&mut ordered[RelativeEpoch::Current]);
        shuffled[RelativeEpoch::Previous] = core::mem::take(&mut shuffled[RelativeEpoch::Current]);
        balance[RelativeEpoch::Previous] = core::mem::take(&mut balance[RelativeEpoch::Current]);

        ordered[RelativeEpoch::Current] = core::mem::take(&mut ordered[RelativeEpoch::Next]);
        shuffled[RelativeEpoch::Current] = core::mem::take(&mut shuffled[RelativeEpoch::Next]);
        balance[RelativeEpoch::Current] = core::mem::take(&mut balance[RelativeEpoch::Next]);
    }

    /// Records a validator appended to the registry.
    ///
    /// New validators are never active in the epoch they are added in,
    /// so only the public key map needs to change.
    pub fn register_validator(&mut self, pubkey: PublicKeyBytes, index: ValidatorIndex) {
        if let Some(validator_indices) = self.validator_indices.get_mut() {
            validator_indices.insert(pubkey, index);
        }
    }
}
