//! Deterministic keys and genesis states for local test networks.
//!
//! <https://github.com/ethereum/eth2.0-pm/tree/b7c76e7a9d036ce73ca6aa0b7065db92f7728f41/interop/mocked_start>

use core::num::NonZeroU64;

use anyhow::Result;
use bls::{SecretKey, SecretKeyBytes};
use genesis::{DepositTree, Incremental};
use helper_functions::{misc, signing::SignForAllForks as _};
use hex_literal::hex;
use num_bigint::BigUint;
use tree_hash::TreeHash as _;
use types::{
    bellatrix::beacon_state::BeaconState,
    config::Config,
    phase0::{
        containers::{DepositData, DepositMessage},
        primitives::{UnixSeconds, ValidatorIndex, H256},
    },
    preset::Preset,
};

/// <https://github.com/ethereum/eth2.0-pm/tree/b7c76e7a9d036ce73ca6aa0b7065db92f7728f41/interop/mocked_start#create-genesis-state>
const QUICK_START_ETH1_BLOCK_HASH: H256 = H256([0x42; 32]);

/// <https://github.com/ethereum/eth2.0-pm/tree/b7c76e7a9d036ce73ca6aa0b7065db92f7728f41/interop/mocked_start#create-genesis-state>
///
/// The genesis time derived from this is overwritten with the one passed to
/// [`quick_start_beacon_state`].
const QUICK_START_ETH1_BLOCK_TIMESTAMP: UnixSeconds = 1 << 40;

const SECRET_KEY_SIZE: usize = 32;

/// Encoded in binary to avoid parsing a decimal string at runtime.
const CURVE_ORDER: &[u8] =
    &hex!("73eda753299d7d483339d80809a1d80553bda402fffe5bfeffffffff00000001");

/// <https://github.com/ethereum/eth2.0-pm/tree/b7c76e7a9d036ce73ca6aa0b7065db92f7728f41/interop/mocked_start#quick-start-genesis>
pub fn quick_start_beacon_state<P: Preset>(
    config: &Config,
    genesis_time: UnixSeconds,
    validator_count: NonZeroU64,
) -> Result<(BeaconState<P>, DepositTree)> {
    let mut incremental = Incremental::new(config);

    incremental.set_eth1_timestamp(QUICK_START_ETH1_BLOCK_TIMESTAMP);

    for index in 0..validator_count.get() {
        let deposit_data = quick_start_deposit_data::<P>(config, &secret_key(index));
        incremental.add_deposit_data(deposit_data, index)?;
    }

    // > Clients must not run is_valid_genesis_state as this state is already considered valid.

    let (mut genesis_state, deposit_tree) =
        incremental.finish(QUICK_START_ETH1_BLOCK_HASH, None)?;

    genesis_state.genesis_time = genesis_time;

    Ok((genesis_state, deposit_tree))
}

/// <https://github.com/ethereum/eth2.0-pm/tree/b7c76e7a9d036ce73ca6aa0b7065db92f7728f41/interop/mocked_start#pubkeyprivkey-generation>
#[must_use]
pub fn secret_key(validator_index: ValidatorIndex) -> SecretKey {
    let index_hash = hashing::hash_256(validator_index.tree_hash_root());
    let curve_order = BigUint::from_bytes_be(CURVE_ORDER);
    let secret_key_uint = BigUint::from_bytes_le(index_hash.as_bytes()) % &curve_order;
    let unpadded = secret_key_uint.to_bytes_be();
    let mut padded = [0; SECRET_KEY_SIZE];
    padded[SECRET_KEY_SIZE - unpadded.len()..].copy_from_slice(unpadded.as_slice());
    SecretKeyBytes::from(padded)
        .try_into()
        .expect("the algorithm given in the standard should produce valid secret keys")
}

/// <https://github.com/ethereum/eth2.0-pm/tree/b7c76e7a9d036ce73ca6aa0b7065db92f7728f41/interop/mocked_start#generate-deposits>
#[must_use]
pub fn quick_start_deposit_data<P: Preset>(config: &Config, secret_key: &SecretKey) -> DepositData {
    let pubkey = secret_key.to_public_key().into();
    let withdrawal_credentials = misc::bls_withdrawal_credentials(pubkey);
    let amount = P::MAX_EFFECTIVE_BALANCE;

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
