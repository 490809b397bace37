use core::{num::NonZeroU64, ops::Range};

use anyhow::Result;
use bls::PublicKeyBytes;
use arithmetic::U64Ext as _;
use tap::{Pipe as _, TryConv as _};
use tree_hash::TreeHash;
use typenum::Unsigned as _;
use types::{
    altair::primitives::SyncCommitteePeriod,
    bellatrix::beacon_state::BeaconState,
    collections::ListExt as _,
    config::Config,
    phase0::{
        consts::{BLS_WITHDRAWAL_PREFIX, GENESIS_SLOT},
        containers::{ForkData, SigningData},
        primitives::{
            Domain, DomainType, Epoch, Slot, UnixSeconds, ValidatorIndex, Version, H256,
        },
    },
    preset::Preset,
};

use crate::error::Error;

#[must_use]
pub fn compute_epoch_at_slot<P: Preset>(slot: Slot) -> Epoch {
    slot.div_typenum::<P::SlotsPerEpoch>()
}

#[must_use]
pub const fn compute_start_slot_at_epoch<P: Preset>(epoch: Epoch) -> Slot {
    epoch.saturating_mul(P::SlotsPerEpoch::U64)
}

#[must_use]
pub fn is_epoch_start<P: Preset>(slot: Slot) -> bool {
    slots_since_epoch_start::<P>(slot) == 0
}

/// Used both by fork choice (`compute_slots_since_epoch_start`) and by attestation duties.
#[must_use]
pub fn slots_since_epoch_start<P: Preset>(slot: Slot) -> u64 {
    slot.mod_typenum::<P::SlotsPerEpoch>()
}

#[must_use]
pub const fn slots_in_epoch<P: Preset>(epoch: Epoch) -> Range<Slot> {
    compute_start_slot_at_epoch::<P>(epoch)..compute_start_slot_at_epoch::<P>(epoch + 1)
}

#[must_use]
pub fn sync_committee_period<P: Preset>(epoch: Epoch) -> SyncCommitteePeriod {
    epoch / P::EPOCHS_PER_SYNC_COMMITTEE_PERIOD
}

// > Return the epoch during which validator activations and exits initiated in ``epoch`` take effect.
#[must_use]
pub const fn compute_activation_exit_epoch<P: Preset>(epoch: Epoch) -> Epoch {
    epoch + 1 + P::MAX_SEED_LOOKAHEAD
}

#[must_use]
pub fn compute_timestamp_at_slot<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    slot: Slot,
) -> UnixSeconds {
    let slots_since_genesis = slot - GENESIS_SLOT;
    state.genesis_time + slots_since_genesis * config.seconds_per_slot.get()
}

// > Return the 32-byte fork data root for the ``current_version`` and ``genesis_validators_root``.
// > This is used primarily in signature domains to avoid collisions across forks/chains.
#[must_use]
pub fn compute_fork_data_root(current_version: Version, genesis_validators_root: H256) -> H256 {
    ForkData {
        current_version,
        genesis_validators_root,
    }
    .tree_hash_root()
}

/// Computes a signature domain.
///
/// `fork_version` defaults to `config.genesis_fork_version`.
/// `genesis_validators_root` defaults to zero, which is what deposits are signed with.
#[must_use]
pub fn compute_domain(
    config: &Config,
    domain_type: DomainType,
    fork_version: Option<Version>,
    genesis_validators_root: Option<H256>,
) -> Domain {
    let fork_version = fork_version.unwrap_or(config.genesis_fork_version);
    let genesis_validators_root = genesis_validators_root.unwrap_or_else(H256::zero);
    let fork_data_root = compute_fork_data_root(fork_version, genesis_validators_root);

    let mut domain = Domain::zero();
    domain[..DomainType::len_bytes()].copy_from_slice(domain_type.as_bytes());
    domain[DomainType::len_bytes()..]
        .copy_from_slice(&fork_data_root[..H256::len_bytes() - DomainType::len_bytes()]);
    domain
}

#[must_use]
pub fn compute_signing_root(object: &(impl TreeHash + ?Sized), domain: Domain) -> H256 {
    SigningData {
        object_root: object.tree_hash_root(),
        domain,
    }
    .tree_hash_root()
}

pub fn compute_shuffled_index<P: Preset>(
    index: u64,
    index_count: NonZeroU64,
    seed: H256,
) -> Result<u64> {
    shuffling::shuffled_index::<P>(index, index_count, seed)
}

#[must_use]
pub fn committee_count_from_active_validator_count<P: Preset>(active_validator_count: u64) -> u64 {
    (active_validator_count / P::SlotsPerEpoch::U64 / P::TARGET_COMMITTEE_SIZE)
        .clamp(1, P::MAX_COMMITTEES_PER_SLOT.get())
}

/// Samples a proposer from `indices` weighted by effective balance.
///
/// Each attempt draws one random byte. A candidate is accepted with probability
/// `effective_balance / MAX_EFFECTIVE_BALANCE`, so the loop has no fixed bound but terminates
/// quickly as long as some active validator has a nonzero effective balance.
///
/// The loop is intentionally left unbounded. Capping the number of attempts would change which
/// validator is selected and therefore break consensus with other implementations.
pub fn compute_proposer_index<P: Preset>(
    state: &BeaconState<P>,
    indices: &[ValidatorIndex],
    seed: H256,
) -> Result<ValidatorIndex> {
    let total = indices
        .len()
        .try_conv::<u64>()?
        .pipe(NonZeroU64::new)
        .ok_or(Error::NoActiveValidators)?;

    sample_by_effective_balance::<P>(state, indices, total, seed, 1)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::FailedToSelectProposer.into())
}

/// Rejection sampling shared by proposer selection and sync committee selection.
///
/// Stops after `count` candidates have been accepted. Candidates may repeat.
pub(crate) fn sample_by_effective_balance<P: Preset>(
    state: &BeaconState<P>,
    indices: &[ValidatorIndex],
    total: NonZeroU64,
    seed: H256,
    count: usize,
) -> Result<Vec<ValidatorIndex>> {
    let max_random_byte = u64::from(u8::MAX);
    let mut selected = Vec::with_capacity(count);

    let random_bytes = (0..u64::MAX / H256::len_bytes() as u64).flat_map(|quotient| {
        hashing::hash_256_64(seed, quotient)
            .to_fixed_bytes()
            .into_iter()
            .map(u64::from)
    });

    for (random_byte, attempt) in random_bytes.zip(0_u64..) {
        if selected.len() == count {
            break;
        }

        let shuffled_index_of_index = compute_shuffled_index::<P>(attempt % total, total, seed)?
            .try_conv::<usize>()?;

        let candidate_index = indices[shuffled_index_of_index];
        let effective_balance = state.validators.try_get(candidate_index)?.effective_balance;

        if effective_balance * max_random_byte >= P::MAX_EFFECTIVE_BALANCE * random_byte {
            selected.push(candidate_index);
        }
    }

    Ok(selected)
}

/// `BLS_WITHDRAWAL_PREFIX` followed by the hash of `public_key` with its first byte dropped.
#[must_use]
pub fn bls_withdrawal_credentials(public_key: PublicKeyBytes) -> H256 {
    let mut withdrawal_credentials = hashing::hash(public_key.as_bytes());
    withdrawal_credentials[..BLS_WITHDRAWAL_PREFIX.len()].copy_from_slice(BLS_WITHDRAWAL_PREFIX);
    withdrawal_credentials
}
