use std::sync::Arc;

use anyhow::Result;
use arithmetic::U64Ext as _;
use bit_field::BitField as _;
use bls::CachedPublicKey;
use helper_functions::{
    accessors::{
        attestation_epoch, get_attestation_participation_flag_indices, get_attesting_indices,
        get_base_reward, get_base_reward_per_increment, get_beacon_proposer_index,
        get_block_root_at_slot, get_total_active_balance, index_of_public_key,
    },
    error::SignatureKind,
    mutators::{balance, decrease_balance, increase_balance},
    signing::{SignForAllForks as _, SignForSingleForkAtSlot as _},
    verifier::Verifier,
};
use smallvec::smallvec;
use types::{
    altair::{
        consts::{
            PARTICIPATION_FLAG_WEIGHTS, PROPOSER_WEIGHT, SYNC_REWARD_WEIGHT, WEIGHT_DENOMINATOR,
        },
        containers::SyncAggregate,
    },
    bellatrix::beacon_state::BeaconState,
    collections::ListExt as _,
    config::Config,
    nonstandard::AttestationEpoch,
    phase0::{
        consts::FAR_FUTURE_EPOCH,
        containers::{Attestation, DepositData, DepositMessage, Validator},
        primitives::{DepositIndex, ValidatorIndex},
    },
    preset::Preset,
};

use crate::unphased::{CombinedDeposit, Error};

/// Sets participation flags for an attestation that has already been validated
/// and pays the proposer for every newly set flag.
pub fn apply_attestation<P: Preset>(
    state: &mut BeaconState<P>,
    attestation: &Attestation<P>,
) -> Result<()> {
    let Attestation {
        ref aggregation_bits,
        data,
        ..
    } = *attestation;

    // > Participation flag indices
    let inclusion_delay = state.slot - data.slot;
    let participation_flags =
        get_attestation_participation_flag_indices(state, data, inclusion_delay)?;

    // > Update epoch participation flags
    let base_reward_per_increment = get_base_reward_per_increment(state);

    let attesting_indices_with_base_rewards = get_attesting_indices(state, data, aggregation_bits)?
        .map(|validator_index| {
            let base_reward = get_base_reward(state, validator_index, base_reward_per_increment)?;
            Ok((validator_index, base_reward))
        })
        .collect::<Result<Vec<_>>>()?;

    let epoch_participation = match attestation_epoch(state, data.target.epoch)? {
        AttestationEpoch::Previous => &mut state.previous_epoch_participation,
        AttestationEpoch::Current => &mut state.current_epoch_participation,
    };

    let mut proposer_reward_numerator = 0;

    for (validator_index, base_reward) in attesting_indices_with_base_rewards {
        let flags = epoch_participation.try_get_mut(validator_index)?;

        for (flag_index, weight) in PARTICIPATION_FLAG_WEIGHTS {
            if participation_flags.get_bit(flag_index) && !flags.get_bit(flag_index) {
                proposer_reward_numerator += base_reward * weight;
            }
        }

        *flags |= participation_flags;
    }

    // > Reward proposer
    let proposer_index = get_beacon_proposer_index(state)?;
    let proposer_reward_denominator =
        (WEIGHT_DENOMINATOR.get() - PROPOSER_WEIGHT) * WEIGHT_DENOMINATOR.get() / PROPOSER_WEIGHT;
    let proposer_reward = proposer_reward_numerator / proposer_reward_denominator;

    increase_balance(balance(state, proposer_index)?, proposer_reward);

    Ok(())
}

// Genesis uses this instead of `validate_deposits` because it builds the proofs itself.
// Unlike deposits in blocks, this does not check `Deposit.proof`.
pub fn process_deposit_data<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    deposit_data: DepositData,
) -> Result<Option<ValidatorIndex>> {
    let DepositData {
        pubkey,
        withdrawal_credentials,
        amount,
        signature,
    } = deposit_data;

    if let Some(validator_index) = index_of_public_key(state, pubkey) {
        let combined_deposit = CombinedDeposit::TopUp {
            validator_index,
            amounts: smallvec![amount],
        };

        apply_deposits(state, 1, core::iter::once(combined_deposit))?;

        return Ok(Some(validator_index));
    }

    // > Verify the deposit signature (proof of possession)
    // > which is not checked by the deposit contract
    let deposit_message = DepositMessage::from(deposit_data);
    let cached_public_key = CachedPublicKey::from(pubkey);

    // > Fork-agnostic domain since deposits are valid across forks
    if deposit_message
        .verify(config, signature, &cached_public_key)
        .is_ok()
    {
        let validator_index = state.validators.len().try_into()?;

        let combined_deposit = CombinedDeposit::NewValidator {
            pubkey: cached_public_key,
            withdrawal_credentials,
            amounts: smallvec![amount],
        };

        apply_deposits(state, 1, core::iter::once(combined_deposit))?;

        return Ok(Some(validator_index));
    }

    apply_deposits(state, 1, core::iter::empty())?;

    Ok(None)
}

pub fn apply_deposits<P: Preset>(
    state: &mut BeaconState<P>,
    deposit_count: usize,
    combined_deposits: impl IntoIterator<Item = CombinedDeposit>,
) -> Result<()> {
    // > Deposits must be processed in order
    state.eth1_deposit_index += DepositIndex::try_from(deposit_count)?;

    for combined_deposit in combined_deposits {
        match combined_deposit {
            // > Add validator and balance entries
            CombinedDeposit::NewValidator {
                pubkey,
                withdrawal_credentials,
                amounts,
            } => {
                let public_key_bytes = pubkey.to_bytes();
                let first_amount = amounts[0];
                let total_amount = amounts.iter().sum();

                let effective_balance = first_amount
                    .prev_multiple_of(P::EFFECTIVE_BALANCE_INCREMENT)
                    .min(P::MAX_EFFECTIVE_BALANCE);

                let validator = Validator {
                    pubkey,
                    withdrawal_credentials,
                    effective_balance,
                    slashed: false,
                    activation_eligibility_epoch: FAR_FUTURE_EPOCH,
                    activation_epoch: FAR_FUTURE_EPOCH,
                    exit_epoch: FAR_FUTURE_EPOCH,
                    withdrawable_epoch: FAR_FUTURE_EPOCH,
                };

                let validator_index = state.validators.len().try_into()?;

                state.validators.try_push(validator)?;
                state.balances.try_push(total_amount)?;
                state.previous_epoch_participation.try_push(0)?;
                state.current_epoch_participation.try_push(0)?;
                state.inactivity_scores.try_push(0)?;
                state.cache.register_validator(public_key_bytes, validator_index);
            }
            // > Increase balance by deposit amount
            CombinedDeposit::TopUp {
                validator_index,
                amounts,
            } => {
                let total_amount = amounts.iter().sum();

                increase_balance(balance(state, validator_index)?, total_amount);
            }
        }
    }

    Ok(())
}

pub fn process_sync_aggregate<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    sync_aggregate: &SyncAggregate<P>,
    verifier: impl Verifier,
) -> Result<()> {
    // > Verify sync committee aggregate signature signing over the previous slot block root
    verify_sync_aggregate_signature(config, state, sync_aggregate, verifier)?;

    // > Compute participant and proposer rewards
    let total_active_increments =
        get_total_active_balance(state) / P::EFFECTIVE_BALANCE_INCREMENT;
    let total_base_rewards = get_base_reward_per_increment(state) * total_active_increments;
    let max_participant_rewards = (total_base_rewards * SYNC_REWARD_WEIGHT / WEIGHT_DENOMINATOR)
        .div_typenum::<P::SlotsPerEpoch>();
    let participant_reward = max_participant_rewards.div_typenum::<P::SyncCommitteeSize>();
    let proposer_reward =
        participant_reward * PROPOSER_WEIGHT / (WEIGHT_DENOMINATOR.get() - PROPOSER_WEIGHT);

    // > Apply participant and proposer rewards
    let proposer_index = get_beacon_proposer_index(state)?;
    let committee = Arc::clone(&state.current_sync_committee);

    let participants = committee
        .pubkeys
        .iter()
        .zip(sync_aggregate.sync_committee_bits.iter())
        .enumerate()
        .map(|(pubkey_index, (pubkey, participation_bit))| {
            let participant_index = index_of_public_key(state, pubkey.to_bytes())
                .ok_or(Error::<P>::SyncCommitteeMemberUnknown { pubkey_index })?;

            Ok((participant_index, participation_bit))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut participant_count = 0;

    for (participant_index, participation_bit) in participants {
        if participation_bit {
            increase_balance(balance(state, participant_index)?, participant_reward);
            participant_count += 1;
        } else {
            decrease_balance(balance(state, participant_index)?, participant_reward);
        }
    }

    increase_balance(
        balance(state, proposer_index)?,
        proposer_reward * participant_count,
    );

    Ok(())
}

pub fn verify_sync_aggregate_signature<P: Preset, V: Verifier>(
    config: &Config,
    state: &BeaconState<P>,
    sync_aggregate: &SyncAggregate<P>,
    mut verifier: V,
) -> Result<()> {
    if V::IS_NULL {
        return Ok(());
    }

    let participant_pubkeys = state
        .current_sync_committee
        .pubkeys
        .iter()
        .zip(sync_aggregate.sync_committee_bits.iter())
        .filter(|(_, bit)| *bit)
        .map(|(pubkey, _)| pubkey.decompress());

    // Blocks are never processed in slot 0, so the previous slot always exists.
    let previous_slot = state.slot.saturating_sub(1);
    let block_root = get_block_root_at_slot(state, previous_slot)?;
    let signing_root = block_root.signing_root(config, state, previous_slot);

    itertools::process_results(participant_pubkeys, |public_keys| {
        verifier.verify_aggregate_allowing_empty(
            signing_root,
            sync_aggregate.sync_committee_signature,
            public_keys,
            SignatureKind::SyncAggregate,
        )
    })?
}

#[cfg(test)]
mod tests {
    use bls::{PublicKeyBytes, SecretKey, SecretKeyBytes};
    use helper_functions::signing::SignForAllForks;
    use types::{
        phase0::primitives::{Gwei, H256},
        preset::Minimal,
    };

    use super::*;

    fn secret_key(byte: u8) -> SecretKey {
        SecretKeyBytes::from([byte; 32])
            .try_into()
            .expect("bytes encode a valid secret key")
    }

    fn signed_deposit_data(config: &Config, byte: u8, amount: Gwei) -> DepositData {
        let secret_key = secret_key(byte);
        let pubkey = PublicKeyBytes::from(secret_key.to_public_key());

        let message = DepositMessage {
            pubkey,
            withdrawal_credentials: H256::repeat_byte(byte),
            amount,
        };

        DepositData {
            pubkey,
            withdrawal_credentials: message.withdrawal_credentials,
            amount,
            signature: message.sign(config, &secret_key).into(),
        }
    }

    #[test]
    fn deposit_data_creates_validator_then_tops_it_up() -> Result<()> {
        let config = Config::minimal();
        let mut state = BeaconState::<Minimal>::default();
        let deposit_data = signed_deposit_data(&config, 1, 17_400_000_000);

        assert_eq!(process_deposit_data(&config, &mut state, deposit_data)?, Some(0));
        assert_eq!(process_deposit_data(&config, &mut state, deposit_data)?, Some(0));

        let validator = state.validators.try_get(0)?;

        assert_eq!(state.validator_count(), 1);
        assert_eq!(validator.effective_balance, 17_000_000_000);
        assert_eq!(validator.activation_epoch, FAR_FUTURE_EPOCH);
        assert_eq!(*state.balances.try_get(0)?, 2 * 17_400_000_000);
        assert_eq!(state.eth1_deposit_index, 2);
        assert!(state.registry_lengths_consistent());

        Ok(())
    }

    #[test]
    fn deposit_with_invalid_proof_of_possession_is_skipped() -> Result<()> {
        let config = Config::minimal();
        let mut state = BeaconState::<Minimal>::default();
        let mut deposit_data = signed_deposit_data(&config, 1, 32_000_000_000);

        deposit_data.signature = signed_deposit_data(&config, 2, 32_000_000_000).signature;

        assert_eq!(process_deposit_data(&config, &mut state, deposit_data)?, None);
        assert_eq!(state.validator_count(), 0);
        assert_eq!(state.eth1_deposit_index, 1);

        Ok(())
    }

    #[test]
    fn deposits_register_public_keys_in_cache() -> Result<()> {
        let config = Config::minimal();
        let mut state = BeaconState::<Minimal>::default();

        let first = signed_deposit_data(&config, 1, 32_000_000_000);
        let second = signed_deposit_data(&config, 2, 32_000_000_000);

        process_deposit_data(&config, &mut state, first)?;

        // The first lookup initializes the public key map.
        assert_eq!(index_of_public_key(&state, first.pubkey), Some(0));

        process_deposit_data(&config, &mut state, second)?;

        assert_eq!(index_of_public_key(&state, second.pubkey), Some(1));

        Ok(())
    }
}
