use std::sync::Arc;

use anyhow::{Error as AnyhowError, Result};
use bls::{CachedPublicKey, PublicKeyBytes, SignatureBytes};
use helper_functions::accessors::{beacon_committee, get_beacon_proposer_index};
use itertools::Itertools as _;
use ssz_types::{BitList, FixedVector};
use transition_functions::combined;
use tree_hash::TreeHash as _;
use typenum::Unsigned as _;
use types::{
    altair::containers::SyncCommittee,
    bellatrix::{
        beacon_state::BeaconState,
        containers::{BeaconBlock, BeaconBlockBody, SignedBeaconBlock},
    },
    collections::VecExt as _,
    config::Config,
    phase0::{
        consts::FAR_FUTURE_EPOCH,
        containers::{Attestation, AttestationData, Checkpoint, Validator},
        primitives::{Slot, UnixSeconds, ValidatorIndex, H256},
    },
    preset::{Minimal, Preset},
};

use crate::{state_cache::StateCache, store::Store, store_config::StoreConfig};

pub const GENESIS_TIME: UnixSeconds = 1_600_000_000;

const VALIDATOR_COUNT: u64 = 64;

pub fn slot_start(slot: Slot) -> UnixSeconds {
    GENESIS_TIME + slot * Config::minimal().seconds_per_slot.get()
}

fn public_key(validator_index: ValidatorIndex) -> CachedPublicKey {
    PublicKeyBytes::from_low_u64_be(validator_index + 1).into()
}

pub fn genesis() -> Result<(Arc<SignedBeaconBlock<Minimal>>, Arc<BeaconState<Minimal>>)> {
    let count = usize::try_from(VALIDATOR_COUNT)?;
    let max_effective_balance = <Minimal as Preset>::MAX_EFFECTIVE_BALANCE;

    let validators = (0..VALIDATOR_COUNT)
        .map(|validator_index| Validator {
            pubkey: public_key(validator_index),
            effective_balance: max_effective_balance,
            activation_eligibility_epoch: 0,
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        })
        .collect_vec();

    let pubkeys = (0..<Minimal as Preset>::SyncCommitteeSize::U64)
        .map(|position| public_key(position % VALIDATOR_COUNT))
        .collect_vec();

    let sync_committee = Arc::new(SyncCommittee {
        pubkeys: FixedVector::new(pubkeys)
            .map_err(|error| AnyhowError::msg(format!("{error:?}")))?,
        aggregate_pubkey: PublicKeyBytes::zero(),
    });

    let mut state = BeaconState {
        genesis_time: GENESIS_TIME,
        validators: validators.into_variable_list()?,
        balances: vec![max_effective_balance; count].into_variable_list()?,
        previous_epoch_participation: vec![0; count].into_variable_list()?,
        current_epoch_participation: vec![0; count].into_variable_list()?,
        inactivity_scores: vec![0; count].into_variable_list()?,
        current_sync_committee: Arc::clone(&sync_committee),
        next_sync_committee: sync_committee,
        ..BeaconState::default()
    };

    state.latest_block_header.body_root = BeaconBlockBody::<Minimal>::default().tree_hash_root();

    let block = BeaconBlock {
        state_root: state.tree_hash_root(),
        ..BeaconBlock::default()
    }
    .with_signature(SignatureBytes::empty());

    Ok((Arc::new(block), Arc::new(state)))
}

pub fn new_store() -> Result<Store<Minimal>> {
    // Fails if another test already installed the logger.
    env_logger::builder().is_test(true).try_init().ok();

    let (block, state) = genesis()?;
    let checkpoint_states = Arc::new(StateCache::new(StoreConfig::minimal()));

    Store::new(Arc::new(Config::minimal()), block, state, checkpoint_states)
}

/// Builds a valid unsigned block on top of `parent_root`.
/// `graffiti` distinguishes blocks with the same parent and slot.
pub fn block_on(
    store: &Store<Minimal>,
    parent_root: H256,
    slot: Slot,
    graffiti: u8,
) -> Result<Arc<SignedBeaconBlock<Minimal>>> {
    let config = store.chain_config();

    let mut state = store
        .block_state(parent_root)
        .ok_or_else(|| AnyhowError::msg("parent state is not in the store"))?
        .as_ref()
        .clone();

    combined::process_slots(config, &mut state, slot)?;

    let block = BeaconBlock {
        slot,
        proposer_index: get_beacon_proposer_index(&state)?,
        parent_root,
        state_root: H256::zero(),
        body: BeaconBlockBody {
            graffiti: H256::repeat_byte(graffiti),
            ..BeaconBlockBody::default()
        },
    };

    combined::process_trusted_block(config, &mut state, &block)?;

    let block = block
        .with_state_root(state.tree_hash_root())
        .with_signature(SignatureBytes::empty());

    Ok(Arc::new(block))
}

/// Builds an attestation in which the whole first committee of `slot` votes for `beacon_block_root`.
pub fn full_attestation(
    store: &Store<Minimal>,
    slot: Slot,
    beacon_block_root: H256,
) -> Result<(Arc<Attestation<Minimal>>, Vec<ValidatorIndex>)> {
    let target = Checkpoint {
        epoch: 0,
        root: store.finalized_checkpoint().root,
    };

    let state = store.checkpoint_state(target)?;
    let committee = beacon_committee(&state, slot, 0)?.to_vec();

    let mut aggregation_bits = BitList::with_capacity(committee.len())
        .map_err(|error| AnyhowError::msg(format!("{error:?}")))?;

    for position in 0..committee.len() {
        aggregation_bits
            .set(position, true)
            .map_err(|error| AnyhowError::msg(format!("{error:?}")))?;
    }

    let attestation = Attestation {
        aggregation_bits,
        data: AttestationData {
            slot,
            index: 0,
            beacon_block_root,
            source: Checkpoint::default(),
            target,
        },
        signature: SignatureBytes::empty(),
    };

    Ok((Arc::new(attestation), committee))
}
