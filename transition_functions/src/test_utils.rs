use std::sync::Arc;

use anyhow::{Error as AnyhowError, Result};
use bls::{CachedPublicKey, PublicKeyBytes};
use itertools::Itertools as _;
use ssz_types::FixedVector;
use tree_hash::TreeHash as _;
use typenum::Unsigned as _;
use types::{
    altair::containers::SyncCommittee,
    bellatrix::{beacon_state::BeaconState, containers::BeaconBlockBody},
    collections::VecExt as _,
    phase0::{
        consts::FAR_FUTURE_EPOCH,
        containers::Validator,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::{Minimal, Preset},
};

pub const MAX_EFFECTIVE_BALANCE: Gwei = <Minimal as Preset>::MAX_EFFECTIVE_BALANCE;

/// Placeholder keys. They are never decompressed when signatures are skipped.
pub fn public_key(validator_index: ValidatorIndex) -> CachedPublicKey {
    PublicKeyBytes::from_low_u64_be(validator_index + 1).into()
}

/// A state at slot 0 in which `validator_count` validators have been active since genesis.
pub fn anchor_state(validator_count: u64) -> Result<BeaconState<Minimal>> {
    let count = usize::try_from(validator_count)?;

    let validators = (0..validator_count)
        .map(|validator_index| Validator {
            pubkey: public_key(validator_index),
            effective_balance: MAX_EFFECTIVE_BALANCE,
            activation_eligibility_epoch: 0,
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        })
        .collect_vec();

    let pubkeys = (0..<Minimal as Preset>::SyncCommitteeSize::U64)
        .map(|position| public_key(position % validator_count))
        .collect_vec();

    let sync_committee = Arc::new(SyncCommittee {
        pubkeys: FixedVector::new(pubkeys)
            .map_err(|error| AnyhowError::msg(format!("{error:?}")))?,
        aggregate_pubkey: PublicKeyBytes::zero(),
    });

    let mut state = BeaconState {
        genesis_time: 1_600_000_000,
        validators: validators.into_variable_list()?,
        balances: vec![MAX_EFFECTIVE_BALANCE; count].into_variable_list()?,
        previous_epoch_participation: vec![0; count].into_variable_list()?,
        current_epoch_participation: vec![0; count].into_variable_list()?,
        inactivity_scores: vec![0; count].into_variable_list()?,
        current_sync_committee: Arc::clone(&sync_committee),
        next_sync_committee: sync_committee,
        ..BeaconState::default()
    };

    state.latest_block_header.body_root = BeaconBlockBody::<Minimal>::default().tree_hash_root();

    Ok(state)
}
