//! Construction of genesis states from deposits.
//!
//! [`Incremental`] follows `initialize_beacon_state_from_eth1` but accepts deposits one at a time,
//! which lets a caller watching the deposit contract check [`Incremental::validate`] after each
//! one. Chains built here start directly in Bellatrix.

use core::num::NonZeroU64;
use std::sync::Arc;

use anyhow::{ensure, Result};
use arithmetic::U64Ext as _;
use bls::SignatureBytes;
use helper_functions::accessors;
use log::{debug, warn};
use ssz_types::FixedVector;
use thiserror::Error;
use transition_functions::combined;
use tree_hash::TreeHash as _;
use types::{
    bellatrix::{
        beacon_state::BeaconState,
        containers::{BeaconBlock, BeaconBlockBody, ExecutionPayloadHeader, SignedBeaconBlock},
    },
    cache::Cache,
    collections::ListExt as _,
    config::Config,
    nonstandard::RelativeEpoch,
    phase0::{
        consts::{GENESIS_EPOCH, GENESIS_SLOT},
        containers::{BeaconBlockHeader, DepositData, Fork},
        primitives::{DepositIndex, ExecutionBlockHash, UnixSeconds},
    },
    preset::Preset,
};

pub use crate::deposit_tree::{DepositProof, DepositTree};

mod deposit_tree;

pub struct Incremental<'config, P: Preset> {
    config: &'config Config,
    beacon_state: BeaconState<P>,
    deposit_tree: DepositTree,
}

impl<'config, P: Preset> Incremental<'config, P> {
    /// <https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/bellatrix/beacon-chain.md#testing>
    #[must_use]
    pub fn new(config: &'config Config) -> Self {
        let version = config.bellatrix_fork_version;

        let fork = Fork {
            previous_version: version,
            current_version: version,
            epoch: GENESIS_EPOCH,
        };

        let latest_block_header = BeaconBlockHeader {
            slot: GENESIS_SLOT,
            body_root: BeaconBlockBody::<P>::default().tree_hash_root(),
            ..BeaconBlockHeader::default()
        };

        let beacon_state = BeaconState {
            slot: GENESIS_SLOT,
            fork,
            latest_block_header,
            ..BeaconState::default()
        };

        Self {
            config,
            beacon_state,
            deposit_tree: DepositTree::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_genesis_state(self.config, &self.beacon_state)
    }

    pub fn set_eth1_timestamp(&mut self, eth1_timestamp: UnixSeconds) {
        self.beacon_state.genesis_time = eth1_timestamp + self.config.genesis_delay;
    }

    pub fn add_deposit_data(
        &mut self,
        data: DepositData,
        deposit_index: DepositIndex,
    ) -> Result<()> {
        let eth1_data = &mut self.beacon_state.eth1_data;

        eth1_data.deposit_root = self
            .deposit_tree
            .push_and_compute_root(deposit_index, data)?;

        eth1_data.deposit_count = self.deposit_tree.deposit_count;

        let Some(validator_index) =
            combined::process_deposit_data(self.config, &mut self.beacon_state, data)?
        else {
            warn!("genesis deposit {deposit_index} skipped because its signature is invalid");
            return Ok(());
        };

        // > Process activations
        let balance = *self.beacon_state.balances.try_get(validator_index)?;
        let validator = self.beacon_state.validators.try_get_mut(validator_index)?;

        validator.effective_balance = balance
            .prev_multiple_of(P::EFFECTIVE_BALANCE_INCREMENT)
            .min(P::MAX_EFFECTIVE_BALANCE);

        if validator.effective_balance == P::MAX_EFFECTIVE_BALANCE {
            validator.activation_eligibility_epoch = GENESIS_EPOCH;
            validator.activation_epoch = GENESIS_EPOCH;
        }

        Ok(())
    }

    pub fn finish(
        self,
        eth1_block_hash: ExecutionBlockHash,
        execution_payload_header: Option<ExecutionPayloadHeader<P>>,
    ) -> Result<(BeaconState<P>, DepositTree)> {
        let Self {
            mut beacon_state,
            deposit_tree,
            ..
        } = self;

        beacon_state.eth1_data.block_hash = eth1_block_hash;

        // > Seed RANDAO with Eth1 entropy
        beacon_state.randao_mixes = FixedVector::from_elem(eth1_block_hash);

        // Activations in `add_deposit_data` bypass the cache.
        beacon_state.cache = Cache::default();

        // > Set genesis validators root for domain separation and chain versioning
        beacon_state.genesis_validators_root = beacon_state.validators.tree_hash_root();

        // > Note: A duplicate committee is assigned for the current and next committee at genesis
        let sync_committee = accessors::get_next_sync_committee(&beacon_state)?;
        beacon_state.current_sync_committee = Arc::clone(&sync_committee);
        beacon_state.next_sync_committee = sync_committee;

        // > If empty, will initialize a chain that has not yet gone through the Merge transition
        if let Some(header) = execution_payload_header {
            beacon_state.latest_execution_payload_header = header;
        }

        debug!(
            "genesis state built from {} deposits with {} validators",
            deposit_tree.deposit_count,
            beacon_state.validator_count(),
        );

        Ok((beacon_state, deposit_tree))
    }
}

#[derive(Debug, Error)]
enum GenesisTriggerError {
    #[error("too early ({actual_genesis_time} < {minimum_genesis_time})")]
    TooEarly {
        minimum_genesis_time: UnixSeconds,
        actual_genesis_time: UnixSeconds,
    },
    #[error("not enough active validators ({actual_validator_count} < {minimum_validator_count})")]
    NotEnoughActiveValidators {
        minimum_validator_count: NonZeroU64,
        actual_validator_count: u64,
    },
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/beacon-chain.md#genesis-block>
///
/// `body.eth1_data` is left empty rather than copied from the state.
#[must_use]
pub fn beacon_block<P: Preset>(genesis_state: &BeaconState<P>) -> SignedBeaconBlock<P> {
    BeaconBlock::default()
        .with_state_root(genesis_state.tree_hash_root())
        .with_signature(SignatureBytes::empty())
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/beacon-chain.md#genesis-state>
pub fn validate_genesis_state<P: Preset>(config: &Config, state: &BeaconState<P>) -> Result<()> {
    let minimum_genesis_time = config.min_genesis_time;
    let actual_genesis_time = state.genesis_time;

    ensure!(
        minimum_genesis_time <= actual_genesis_time,
        GenesisTriggerError::TooEarly {
            minimum_genesis_time,
            actual_genesis_time,
        },
    );

    let minimum_validator_count = config.min_genesis_active_validator_count;

    // The cached count cannot be used because candidate states are still being mutated.
    let actual_validator_count =
        accessors::get_active_validator_indices(state, RelativeEpoch::Current)
            .count()
            .try_into()?;

    ensure!(
        minimum_validator_count.get() <= actual_validator_count,
        GenesisTriggerError::NotEnoughActiveValidators {
            minimum_validator_count,
            actual_validator_count,
        },
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use bls::{SecretKey, SecretKeyBytes};
    use helper_functions::{misc, signing::SignForAllForks as _};
    use nonzero_ext::nonzero;
    use types::{
        phase0::{containers::DepositMessage, primitives::H256},
        preset::Minimal,
    };

    use super::*;

    const MAX_EFFECTIVE_BALANCE: u64 = <Minimal as Preset>::MAX_EFFECTIVE_BALANCE;

    fn secret_key(byte: u8) -> Result<SecretKey> {
        let mut bytes = [byte; 32];
        bytes[0] = 0x1f;
        Ok(SecretKey::try_from(SecretKeyBytes::from(bytes))?)
    }

    fn deposit_data(config: &Config, secret_key: &SecretKey, amount: u64) -> DepositData {
        let pubkey = secret_key.to_public_key().into();
        let withdrawal_credentials = misc::bls_withdrawal_credentials(pubkey);

        let signature = DepositMessage {
            pubkey,
            withdrawal_credentials,
            amount,
        }
        .sign(config, secret_key)
        .into();

        DepositData {
            pubkey,
            withdrawal_credentials,
            amount,
            signature,
        }
    }

    fn config_for_two_validators() -> Config {
        Config {
            min_genesis_active_validator_count: nonzero!(2_u64),
            ..Config::minimal()
        }
    }

    #[test]
    fn top_up_that_maxes_balance_activates_validator() -> Result<()> {
        let config = Config::minimal();
        let secret_key = secret_key(1)?;
        let half_deposit = deposit_data(&config, &secret_key, MAX_EFFECTIVE_BALANCE / 2);

        let mut incremental = Incremental::<Minimal>::new(&config);

        incremental.add_deposit_data(half_deposit, 0)?;

        assert_eq!(
            accessors::get_active_validator_indices(
                &incremental.beacon_state,
                RelativeEpoch::Current,
            )
            .count(),
            0,
        );

        incremental.add_deposit_data(half_deposit, 1)?;

        let (state, deposit_tree) = incremental.finish(ExecutionBlockHash::zero(), None)?;

        assert_eq!(state.validator_count(), 1);
        assert_eq!(state.eth1_deposit_index, 2);
        assert_eq!(deposit_tree.deposit_count, 2);
        assert_eq!(state.eth1_data.deposit_root, deposit_tree.root());
        assert_eq!(
            accessors::active_validator_count(&state, RelativeEpoch::Current),
            1,
        );

        Ok(())
    }

    #[test]
    fn deposit_with_invalid_signature_is_counted_but_skipped() -> Result<()> {
        let config = Config::minimal();
        let secret_key = secret_key(2)?;

        let deposit = DepositData {
            signature: SignatureBytes::empty(),
            ..deposit_data(&config, &secret_key, MAX_EFFECTIVE_BALANCE)
        };

        let mut incremental = Incremental::<Minimal>::new(&config);

        incremental.add_deposit_data(deposit, 0)?;

        assert_eq!(incremental.beacon_state.validator_count(), 0);
        assert_eq!(incremental.beacon_state.eth1_deposit_index, 1);
        assert_eq!(incremental.beacon_state.eth1_data.deposit_count, 1);

        Ok(())
    }

    #[test]
    fn deposits_with_wrong_index_are_rejected() -> Result<()> {
        let config = Config::minimal();
        let secret_key = secret_key(3)?;
        let deposit = deposit_data(&config, &secret_key, MAX_EFFECTIVE_BALANCE);

        let mut incremental = Incremental::<Minimal>::new(&config);

        incremental
            .add_deposit_data(deposit, 1)
            .expect_err("first deposit must have index 0");

        assert_eq!(incremental.beacon_state.eth1_deposit_index, 0);

        Ok(())
    }

    #[test]
    fn genesis_requires_enough_validators_and_late_enough_time() -> Result<()> {
        let config = config_for_two_validators();
        let mut incremental = Incremental::<Minimal>::new(&config);

        incremental.set_eth1_timestamp(config.min_genesis_time - config.genesis_delay - 1);

        let error = incremental.validate().expect_err("genesis time is too early");

        assert!(matches!(
            error.downcast_ref(),
            Some(GenesisTriggerError::TooEarly { .. }),
        ));

        incremental.set_eth1_timestamp(config.min_genesis_time);

        for deposit_index in 0..2 {
            let secret_key = secret_key(u8::try_from(deposit_index)? + 10)?;
            let deposit = deposit_data(&config, &secret_key, MAX_EFFECTIVE_BALANCE);

            let error = incremental
                .validate()
                .expect_err("not enough validators have been deposited yet");

            assert!(matches!(
                error.downcast_ref(),
                Some(GenesisTriggerError::NotEnoughActiveValidators { .. }),
            ));

            incremental.add_deposit_data(deposit, deposit_index)?;
        }

        incremental.validate()
    }

    #[test]
    fn finish_seeds_randao_and_commits_to_validators() -> Result<()> {
        let config = config_for_two_validators();
        let eth1_block_hash = H256::repeat_byte(0x42);
        let mut incremental = Incremental::<Minimal>::new(&config);

        for deposit_index in 0..2 {
            let secret_key = secret_key(u8::try_from(deposit_index)? + 20)?;
            let deposit = deposit_data(&config, &secret_key, MAX_EFFECTIVE_BALANCE);
            incremental.add_deposit_data(deposit, deposit_index)?;
        }

        let (state, _) = incremental.finish(eth1_block_hash, None)?;

        assert!(state.randao_mixes.iter().all(|mix| *mix == eth1_block_hash));
        assert_eq!(state.eth1_data.block_hash, eth1_block_hash);
        assert_eq!(state.genesis_validators_root, state.validators.tree_hash_root());
        assert_eq!(state.current_sync_committee, state.next_sync_committee);
        assert_eq!(state.fork.current_version, config.bellatrix_fork_version);
        assert!(state.latest_execution_payload_header.is_default_payload());

        let block = beacon_block(&state);

        assert_eq!(block.message.slot, GENESIS_SLOT);
        assert_eq!(block.message.state_root, state.tree_hash_root());
        assert_eq!(
            block.message.body.tree_hash_root(),
            state.latest_block_header.body_root,
        );

        Ok(())
    }
}
