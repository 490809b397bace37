use core::{num::NonZeroU64, ops::Div as _};
use std::sync::Arc;

use anyhow::{bail, ensure, Error as AnyhowError, Result};
use bit_field::BitField as _;
use bls::{AggregatePublicKey, CachedPublicKey, PublicKeyBytes};
use im::HashMap;
use itertools::{EitherOrBoth, Itertools as _};
use ssz_types::{BitList, FixedVector};
use tap::{Pipe as _, TryConv as _};
use tree_hash::TreeHash as _;
use typenum::Unsigned as _;
use types::{
    altair::{
        consts::{
            DOMAIN_SYNC_COMMITTEE, TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX,
            TIMELY_TARGET_FLAG_INDEX,
        },
        containers::SyncCommittee,
        primitives::ParticipationFlags,
    },
    bellatrix::beacon_state::BeaconState,
    collections::{ListExt as _, VecExt as _, VectorExt as _},
    config::Config,
    nonstandard::{AttestationEpoch, RelativeEpoch},
    phase0::{
        consts::{DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, GENESIS_EPOCH},
        containers::{Attestation, AttestationData, AttesterSlashing, IndexedAttestation},
        primitives::{CommitteeIndex, Domain, DomainType, Epoch, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
};

use crate::{error::Error, misc, predicates};

#[must_use]
pub fn get_previous_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    get_current_epoch(state)
        .saturating_sub(1)
        .max(GENESIS_EPOCH)
}

#[must_use]
pub fn get_current_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    misc::compute_epoch_at_slot::<P>(state.slot)
}

#[must_use]
pub fn get_next_epoch<P: Preset>(state: &BeaconState<P>) -> Epoch {
    get_current_epoch(state) + 1
}

#[must_use]
pub fn absolute_epoch<P: Preset>(state: &BeaconState<P>, relative_epoch: RelativeEpoch) -> Epoch {
    match relative_epoch {
        RelativeEpoch::Previous => get_previous_epoch(state),
        RelativeEpoch::Current => get_current_epoch(state),
        RelativeEpoch::Next => get_next_epoch(state),
    }
}

pub fn attestation_epoch<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
) -> Result<AttestationEpoch> {
    match get_current_epoch(state).checked_sub(epoch) {
        None => bail!(Error::EpochInTheFuture),
        Some(0) => Ok(AttestationEpoch::Current),
        Some(1) => Ok(AttestationEpoch::Previous),
        Some(_) => bail!(Error::EpochBeforePrevious),
    }
}

pub fn relative_epoch<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> Result<RelativeEpoch> {
    match get_next_epoch(state).checked_sub(epoch) {
        None => bail!(Error::EpochAfterNext),
        Some(0) => Ok(RelativeEpoch::Next),
        Some(1) => Ok(RelativeEpoch::Current),
        // At genesis the previous epoch is the current one.
        Some(2) => Ok(RelativeEpoch::Previous),
        Some(_) => bail!(Error::EpochBeforePrevious),
    }
}

#[must_use]
pub fn get_finality_delay<P: Preset>(state: &BeaconState<P>) -> u64 {
    get_previous_epoch(state) - state.finalized_checkpoint.epoch
}

pub fn get_block_root<P: Preset>(
    state: &BeaconState<P>,
    attestation_epoch: AttestationEpoch,
) -> Result<H256> {
    let epoch = absolute_epoch(state, attestation_epoch.into());
    let slot = misc::compute_start_slot_at_epoch::<P>(epoch);
    get_block_root_at_slot(state, slot)
}

pub fn get_block_root_at_slot<P: Preset>(state: &BeaconState<P>, slot: Slot) -> Result<H256> {
    ensure!(slot < state.slot, Error::SlotOutOfRange { slot });

    ensure!(
        state.slot <= slot + P::SlotsPerHistoricalRoot::U64,
        Error::SlotOutOfRange { slot },
    );

    Ok(*state.block_roots.mod_index(slot))
}

/// Root of the block most recently applied to `state`.
///
/// The header stored in the state has a zero `state_root` until the next slot is processed.
#[must_use]
pub fn latest_block_root<P: Preset>(state: &BeaconState<P>) -> H256 {
    let mut header = state.latest_block_header;

    if header.state_root.is_zero() {
        header.state_root = state.tree_hash_root();
    }

    header.tree_hash_root()
}

#[must_use]
pub fn get_randao_mix<P: Preset>(state: &BeaconState<P>, epoch: Epoch) -> H256 {
    *state.randao_mixes.mod_index(epoch)
}

pub fn public_key<P: Preset>(
    state: &BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<&CachedPublicKey> {
    Ok(&state.validators.try_get(validator_index)?.pubkey)
}

#[must_use]
pub fn index_of_public_key<P: Preset>(
    state: &BeaconState<P>,
    public_key: PublicKeyBytes,
) -> Option<ValidatorIndex> {
    get_or_init_validator_indices(state)
        .get(&public_key)
        .copied()
}

pub fn get_or_init_validator_indices<P: Preset>(
    state: &BeaconState<P>,
) -> &HashMap<PublicKeyBytes, ValidatorIndex> {
    state.cache.validator_indices.get_or_init(|| {
        state
            .validators
            .iter()
            .map(|validator| validator.pubkey.to_bytes())
            .zip(0..)
            .collect()
    })
}

pub fn get_active_validator_indices<P: Preset>(
    state: &BeaconState<P>,
    relative_epoch: RelativeEpoch,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    let epoch = absolute_epoch(state, relative_epoch);
    get_active_validator_indices_by_epoch(state, epoch)
}

pub fn get_active_validator_indices_by_epoch<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    (0..)
        .zip(state.validators.iter())
        .filter(move |(_, validator)| predicates::is_active_validator(validator, epoch))
        .map(|(index, _)| index)
}

// Proposer selection needs the indices in registry order.
// Committees are cut from the shuffled copy below.
pub fn active_validator_indices_ordered<P: Preset>(
    state: &BeaconState<P>,
    relative_epoch: RelativeEpoch,
) -> &[ValidatorIndex] {
    state.cache.active_validator_indices_ordered[relative_epoch].get_or_init(|| {
        let mut indices = Vec::with_capacity(state.validator_count());
        indices.extend(get_active_validator_indices(state, relative_epoch));
        indices.into()
    })
}

pub fn active_validator_indices_shuffled<P: Preset>(
    state: &BeaconState<P>,
    relative_epoch: RelativeEpoch,
) -> Result<&[ValidatorIndex]> {
    state.cache.active_validator_indices_shuffled[relative_epoch]
        .get_or_try_init(|| {
            let seed = get_seed(state, relative_epoch, DOMAIN_BEACON_ATTESTER);
            let mut shuffled = active_validator_indices_ordered(state, relative_epoch).to_vec();
            shuffling::shuffle_slice::<P, _>(&mut shuffled, seed)?;
            Ok::<_, AnyhowError>(Arc::from(shuffled))
        })
        .map(|indices| &**indices)
}

#[must_use]
pub fn active_validator_count<P: Preset>(
    state: &BeaconState<P>,
    relative_epoch: RelativeEpoch,
) -> u64 {
    // A slice of `u64`s cannot have more than `u64::MAX` elements.
    active_validator_indices_ordered(state, relative_epoch).len() as u64
}

#[must_use]
pub fn get_validator_churn_limit<P: Preset>(config: &Config, state: &BeaconState<P>) -> u64 {
    active_validator_count(state, RelativeEpoch::Current)
        .div(config.churn_limit_quotient)
        .max(config.min_per_epoch_churn_limit)
}

#[must_use]
pub fn get_seed<P: Preset>(
    state: &BeaconState<P>,
    relative_epoch: RelativeEpoch,
    domain_type: DomainType,
) -> H256 {
    let epoch = absolute_epoch(state, relative_epoch);
    get_seed_by_epoch(state, epoch, domain_type)
}

#[must_use]
pub fn get_seed_by_epoch<P: Preset>(
    state: &BeaconState<P>,
    epoch: Epoch,
    domain_type: DomainType,
) -> H256 {
    let mix = get_randao_mix(
        state,
        epoch + P::EpochsPerHistoricalVector::U64 - P::MIN_SEED_LOOKAHEAD - 1,
    );

    hashing::hash_32_64_256(domain_type.to_fixed_bytes(), epoch, mix)
}

#[must_use]
pub fn get_committee_count_per_slot<P: Preset>(
    state: &BeaconState<P>,
    relative_epoch: RelativeEpoch,
) -> u64 {
    let active_validator_count = active_validator_count(state, relative_epoch);
    misc::committee_count_from_active_validator_count::<P>(active_validator_count)
}

/// Returns the committee with index `committee_index` in `slot`.
///
/// Committees are contiguous slices of the shuffled active validator indices.
/// Slicing the cached shuffling is equivalent to computing each member with
/// [`shuffling::compute_committee`].
pub fn beacon_committee<P: Preset>(
    state: &BeaconState<P>,
    slot: Slot,
    committee_index: CommitteeIndex,
) -> Result<&[ValidatorIndex]> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);
    let relative_epoch = relative_epoch(state, epoch)?;
    let committees_per_slot = get_committee_count_per_slot(state, relative_epoch);

    ensure!(
        committee_index < committees_per_slot,
        Error::CommitteeIndexOutOfBounds {
            index: committee_index,
            count: committees_per_slot,
        },
    );

    let indices = active_validator_indices_shuffled(state, relative_epoch)?;
    let validator_count = indices.len().try_conv::<u64>()?;
    let slots_since_epoch_start = misc::slots_since_epoch_start::<P>(slot);
    let index_in_epoch = slots_since_epoch_start * committees_per_slot + committee_index;

    let committees_in_epoch = (committees_per_slot * P::SlotsPerEpoch::U64)
        .pipe(NonZeroU64::new)
        .ok_or(Error::NoActiveValidators)?;

    let start = shuffling::committee_boundary(validator_count, index_in_epoch, committees_in_epoch);
    let end = shuffling::committee_boundary(validator_count, index_in_epoch + 1, committees_in_epoch);

    Ok(&indices[start.try_conv::<usize>()?..end.try_conv::<usize>()?])
}

pub fn beacon_committees<P: Preset>(
    state: &BeaconState<P>,
    slot: Slot,
) -> Result<impl Iterator<Item = (CommitteeIndex, &[ValidatorIndex])>> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);
    let relative_epoch = relative_epoch(state, epoch)?;
    let committees_per_slot = get_committee_count_per_slot(state, relative_epoch);

    (0..committees_per_slot)
        .map(|committee_index| {
            beacon_committee(state, slot, committee_index)
                .map(|committee| (committee_index, committee))
        })
        .collect::<Result<Vec<_>>>()
        .map(Vec::into_iter)
}

pub fn get_beacon_proposer_index<P: Preset>(state: &BeaconState<P>) -> Result<ValidatorIndex> {
    state
        .cache
        .proposer_index
        .get_or_try_init(|| get_beacon_proposer_index_at_slot(state, state.slot))
        .copied()
}

pub fn get_beacon_proposer_index_at_slot<P: Preset>(
    state: &BeaconState<P>,
    slot: Slot,
) -> Result<ValidatorIndex> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);
    let relative_epoch = relative_epoch(state, epoch)?;
    let seed = get_seed(state, relative_epoch, DOMAIN_BEACON_PROPOSER);
    let indices = active_validator_indices_ordered(state, relative_epoch);
    let seed = hashing::hash_256_64(seed, slot);

    misc::compute_proposer_index(state, indices, seed)
}

#[must_use]
pub fn get_domain<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    domain_type: DomainType,
    epoch: Option<Epoch>,
) -> Domain {
    let epoch = epoch.unwrap_or_else(|| get_current_epoch(state));
    let fork = state.fork;

    let fork_version = if epoch < fork.epoch {
        fork.previous_version
    } else {
        fork.current_version
    };

    misc::compute_domain(
        config,
        domain_type,
        Some(fork_version),
        Some(state.genesis_validators_root),
    )
}

pub fn get_indexed_attestation<P: Preset>(
    state: &BeaconState<P>,
    attestation: &Attestation<P>,
) -> Result<IndexedAttestation<P>> {
    let mut attesting_indices =
        get_attesting_indices(state, attestation.data, &attestation.aggregation_bits)?
            .collect_vec();

    // Committees never contain duplicates, so sorting is enough.
    attesting_indices.sort_unstable();

    Ok(IndexedAttestation {
        attesting_indices: attesting_indices.into_variable_list()?,
        data: attestation.data,
        signature: attestation.signature,
    })
}

pub fn get_attesting_indices<'all, P: Preset>(
    state: &'all BeaconState<P>,
    attestation_data: AttestationData,
    aggregation_bits: &'all BitList<P::MaxValidatorsPerCommittee>,
) -> Result<impl Iterator<Item = ValidatorIndex> + 'all> {
    let committee = beacon_committee(state, attestation_data.slot, attestation_data.index)?;

    ensure!(
        committee.len() == aggregation_bits.len(),
        Error::CommitteeLengthMismatch {
            aggregation_bitlist_length: aggregation_bits.len(),
            committee_length: committee.len(),
        },
    );

    aggregation_bits
        .iter()
        .zip(committee.iter().copied())
        .filter_map(|(present, validator_index)| present.then_some(validator_index))
        .pipe(Ok)
}

/// Sums effective balances, returning at least `EFFECTIVE_BALANCE_INCREMENT`
/// to avoid division by zero.
pub fn get_total_balance<P: Preset>(
    state: &BeaconState<P>,
    indices: impl IntoIterator<Item = ValidatorIndex>,
) -> Result<Gwei> {
    let mut total = 0;

    for validator_index in indices {
        total += state.validators.try_get(validator_index)?.effective_balance;
    }

    Ok(total.max(P::EFFECTIVE_BALANCE_INCREMENT.get()))
}

#[must_use]
pub fn get_total_active_balance<P: Preset>(state: &BeaconState<P>) -> Gwei {
    state.cache.total_active_balance[RelativeEpoch::Current]
        .get_or_init(|| {
            let current_epoch = get_current_epoch(state);

            state
                .validators
                .iter()
                .filter(|validator| predicates::is_active_validator(validator, current_epoch))
                .map(|validator| validator.effective_balance)
                .sum::<Gwei>()
                .pipe(NonZeroU64::new)
                .unwrap_or(P::EFFECTIVE_BALANCE_INCREMENT)
                .max(P::EFFECTIVE_BALANCE_INCREMENT)
        })
        .get()
}

pub fn get_next_sync_committee_indices<P: Preset>(
    state: &BeaconState<P>,
) -> Result<Vec<ValidatorIndex>> {
    let next_epoch = get_next_epoch(state);
    let indices = get_active_validator_indices_by_epoch(state, next_epoch).collect_vec();

    let total = indices
        .len()
        .try_conv::<u64>()?
        .pipe(NonZeroU64::new)
        .ok_or(Error::NoActiveValidators)?;

    let seed = get_seed_by_epoch(state, next_epoch, DOMAIN_SYNC_COMMITTEE);

    misc::sample_by_effective_balance::<P>(
        state,
        &indices,
        total,
        seed,
        P::SyncCommitteeSize::USIZE,
    )
}

pub fn get_next_sync_committee<P: Preset>(state: &BeaconState<P>) -> Result<Arc<SyncCommittee<P>>> {
    let indices = get_next_sync_committee_indices(state)?;

    let pubkeys = indices
        .into_iter()
        .map(|validator_index| public_key(state, validator_index).cloned())
        .collect::<Result<Vec<_>>>()?;

    let aggregate_pubkey = itertools::process_results(
        pubkeys.iter().map(CachedPublicKey::decompress),
        |public_keys| AggregatePublicKey::aggregate_nonempty(public_keys.copied()),
    )??
    .into();

    Ok(Arc::new(SyncCommittee {
        pubkeys: FixedVector::from(pubkeys),
        aggregate_pubkey,
    }))
}

pub fn get_base_reward<P: Preset>(
    state: &BeaconState<P>,
    validator_index: ValidatorIndex,
    base_reward_per_increment: Gwei,
) -> Result<Gwei> {
    let effective_balance = state.validators.try_get(validator_index)?.effective_balance;

    Ok(compute_base_reward::<P>(
        effective_balance,
        base_reward_per_increment,
    ))
}

#[must_use]
pub fn compute_base_reward<P: Preset>(
    effective_balance: Gwei,
    base_reward_per_increment: Gwei,
) -> Gwei {
    let increments = effective_balance / P::EFFECTIVE_BALANCE_INCREMENT;
    increments * base_reward_per_increment
}

#[must_use]
pub fn get_base_reward_per_increment<P: Preset>(state: &BeaconState<P>) -> Gwei {
    compute_base_reward_per_increment::<P>(get_total_active_balance(state))
}

#[must_use]
pub fn compute_base_reward_per_increment<P: Preset>(total_active_balance: Gwei) -> Gwei {
    use arithmetic::U64Ext as _;

    P::EFFECTIVE_BALANCE_INCREMENT.get() * P::BASE_REWARD_FACTOR
        / total_active_balance.integer_sqrt().max(1)
}

/// Returns the participation flags earned by an attestation as a bitmask indexed by
/// `TIMELY_*_FLAG_INDEX`.
///
/// Fails if the attestation source does not match the justified checkpoint.
pub fn get_attestation_participation_flag_indices<P: Preset>(
    state: &BeaconState<P>,
    data: AttestationData,
    inclusion_delay: u64,
) -> Result<ParticipationFlags> {
    use arithmetic::U64Ext as _;

    let attestation_epoch = attestation_epoch(state, data.target.epoch)?;

    let justified_checkpoint = match attestation_epoch {
        AttestationEpoch::Previous => state.previous_justified_checkpoint,
        AttestationEpoch::Current => state.current_justified_checkpoint,
    };

    let expected_target = get_block_root(state, attestation_epoch)?;
    let expected_head = get_block_root_at_slot(state, data.slot)?;

    // > Matching roots
    let is_matching_source = data.source == justified_checkpoint;
    let is_matching_target = is_matching_source && data.target.root == expected_target;
    let is_matching_head = is_matching_target && data.beacon_block_root == expected_head;

    ensure!(is_matching_source, Error::AttestationSourceMismatch);

    let mut participation_flags: ParticipationFlags = 0;

    if is_matching_source && inclusion_delay <= P::SlotsPerEpoch::U64.integer_sqrt() {
        participation_flags.set_bit(TIMELY_SOURCE_FLAG_INDEX, true);
    }

    if is_matching_target && inclusion_delay <= P::SlotsPerEpoch::U64 {
        participation_flags.set_bit(TIMELY_TARGET_FLAG_INDEX, true);
    }

    if is_matching_head && inclusion_delay == P::MIN_ATTESTATION_INCLUSION_DELAY.get() {
        participation_flags.set_bit(TIMELY_HEAD_FLAG_INDEX, true);
    }

    Ok(participation_flags)
}

/// Indices of active, unslashed validators that earned `flag_index` in `attestation_epoch`.
pub fn get_unslashed_participating_indices<P: Preset>(
    state: &BeaconState<P>,
    flag_index: usize,
    attestation_epoch: AttestationEpoch,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    let epoch = absolute_epoch(state, attestation_epoch.into());

    let participation = match attestation_epoch {
        AttestationEpoch::Previous => &state.previous_epoch_participation,
        AttestationEpoch::Current => &state.current_epoch_participation,
    };

    (0..)
        .zip(state.validators.iter().zip(participation.iter()))
        .filter(move |(_, (validator, flags))| {
            predicates::is_active_validator(validator, epoch)
                && !validator.slashed
                && flags.get_bit(flag_index)
        })
        .map(|(validator_index, _)| validator_index)
}

/// Validators that attested to both conflicting attestations in `attester_slashing`.
///
/// Both index lists are sorted, so the intersection is computed with a merge.
pub fn slashable_indices<P: Preset>(
    attester_slashing: &AttesterSlashing<P>,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    let attesting_indices_1 = attester_slashing
        .attestation_1
        .attesting_indices
        .iter()
        .copied();

    let attesting_indices_2 = attester_slashing
        .attestation_2
        .attesting_indices
        .iter()
        .copied();

    attesting_indices_1
        .merge_join_by(attesting_indices_2, Ord::cmp)
        .filter_map(|either_or_both| match either_or_both {
            EitherOrBoth::Both(validator_index, _) => Some(validator_index),
            _ => None,
        })
}

/// Computes the shufflings needed by `attestations` in parallel.
///
/// Shufflings are stored in `OnceCell`s. Initializing them up front keeps threads that
/// validate attestations concurrently from blocking on the same cell.
pub fn initialize_shuffled_indices<'attestations, P: Preset>(
    state: &BeaconState<P>,
    attestations: impl IntoIterator<Item = &'attestations Attestation<P>>,
) -> Result<()> {
    let shuffled = &state.cache.active_validator_indices_shuffled;
    let have_previous = shuffled[RelativeEpoch::Previous].get().is_some();
    let have_current = shuffled[RelativeEpoch::Current].get().is_some();

    if have_previous && have_current {
        return Ok(());
    }

    let mut need_previous = false;
    let mut need_current = false;

    for attestation in attestations {
        match attestation_epoch(state, attestation.data.target.epoch)? {
            AttestationEpoch::Previous => need_previous = true,
            AttestationEpoch::Current => need_current = true,
        }
    }

    let initialize_previous = || {
        active_validator_indices_shuffled(state, RelativeEpoch::Previous).map(|_| ())
    };

    let initialize_current = || {
        active_validator_indices_shuffled(state, RelativeEpoch::Current).map(|_| ())
    };

    match (need_previous && !have_previous, need_current && !have_current) {
        (true, true) => {
            let (previous, current) = rayon::join(initialize_previous, initialize_current);
            previous?;
            current?;
        }
        (true, false) => initialize_previous()?,
        (false, true) => initialize_current()?,
        (false, false) => {}
    }

    Ok(())
}
