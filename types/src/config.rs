use core::num::NonZeroU64;
use std::{borrow::Cow, collections::BTreeMap};

use hex_literal::hex;
use nonzero_ext::nonzero;
use serde::{de::IgnoredAny, Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::{
    phase0::primitives::{ExecutionAddress, Gwei, UnixSeconds, Version, H160, H32},
    preset::PresetName,
};

/// Configuration variables customizable at runtime.
///
/// Numeric fields accept both native integers and decimal strings, since both appear in
/// published network configurations.
#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,
    pub preset_base: PresetName,

    // Genesis
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub genesis_delay: u64,
    pub genesis_fork_version: Version,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub min_genesis_active_validator_count: NonZeroU64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub min_genesis_time: UnixSeconds,

    // Forking
    pub bellatrix_fork_version: Version,

    // Time parameters
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub eth1_follow_distance: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub min_validator_withdrawability_delay: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub seconds_per_eth1_block: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub seconds_per_slot: NonZeroU64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub shard_committee_period: u64,

    // Validator cycle
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub churn_limit_quotient: NonZeroU64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub ejection_balance: Gwei,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub inactivity_score_bias: NonZeroU64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub inactivity_score_recovery_rate: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub min_per_epoch_churn_limit: u64,

    // Fork choice
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub proposer_score_boost: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub safe_slots_to_update_justified: u64,

    // Deposit contract
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub deposit_chain_id: u64,
    pub deposit_contract_address: ExecutionAddress,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub deposit_network_id: u64,

    // Variables belonging to other forks or to the networking layer.
    #[serde(flatten, skip_serializing)]
    pub unknown: BTreeMap<String, IgnoredAny>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("default"),
            preset_base: PresetName::Mainnet,

            // Genesis
            genesis_delay: 604_800,
            genesis_fork_version: H32(hex!("00000000")),
            min_genesis_active_validator_count: nonzero!(1_u64 << 14),
            min_genesis_time: 0,

            // Forking
            bellatrix_fork_version: H32(hex!("02000000")),

            // Time parameters
            eth1_follow_distance: 2048,
            min_validator_withdrawability_delay: 256,
            seconds_per_eth1_block: 14,
            seconds_per_slot: nonzero!(12_u64),
            shard_committee_period: 256,

            // Validator cycle
            churn_limit_quotient: nonzero!(1_u64 << 16),
            ejection_balance: 16_000_000_000,
            inactivity_score_bias: nonzero!(4_u64),
            inactivity_score_recovery_rate: 16,
            min_per_epoch_churn_limit: 4,

            // Fork choice
            proposer_score_boost: 40,
            safe_slots_to_update_justified: 8,

            // Deposit contract
            deposit_chain_id: 0,
            deposit_contract_address: ExecutionAddress::zero(),
            deposit_network_id: 0,

            unknown: BTreeMap::new(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("mainnet"),

            // Genesis
            min_genesis_time: 1_606_824_000,

            // Deposit contract
            deposit_chain_id: 1,
            deposit_contract_address: H160(hex!("00000000219ab540356cBB839Cbe05303d7705Fa")),
            deposit_network_id: 1,

            ..Self::default()
        }
    }

    #[must_use]
    pub fn minimal() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("minimal"),
            preset_base: PresetName::Minimal,

            // Genesis
            genesis_delay: 300,
            genesis_fork_version: H32(hex!("00000001")),
            min_genesis_active_validator_count: nonzero!(64_u64),
            min_genesis_time: 1_578_009_600,

            // Forking
            bellatrix_fork_version: H32(hex!("02000001")),

            // Time parameters
            eth1_follow_distance: 16,
            seconds_per_slot: nonzero!(6_u64),
            shard_committee_period: 64,

            // Validator cycle
            churn_limit_quotient: nonzero!(32_u64),
            min_per_epoch_churn_limit: 2,

            // Fork choice
            safe_slots_to_update_justified: 2,

            // Deposit contract
            deposit_chain_id: 5,
            deposit_contract_address: H160(hex!("1234567890123456789012345678901234567890")),
            deposit_network_id: 5,

            ..Self::default()
        }
    }

    /// Parses a configuration in the format of published `config.yaml` files.
    ///
    /// Missing variables take their values from [`Config::default`].
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Names of variables that were present in the parsed document but are not used.
    pub fn unknown_variables(&self) -> impl Iterator<Item = &str> {
        self.unknown.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_yaml_accepts_strings_and_integers() -> anyhow::Result<()> {
        let config = Config::from_yaml(
            "
            CONFIG_NAME: custom
            PRESET_BASE: minimal
            MIN_GENESIS_ACTIVE_VALIDATOR_COUNT: '128'
            SECONDS_PER_SLOT: 3
            GENESIS_FORK_VERSION: '0x10000038'
            ALTAIR_FORK_EPOCH: 0
            ",
        )?;

        assert_eq!(config.config_name, "custom");
        assert_eq!(config.preset_base, PresetName::Minimal);
        assert_eq!(config.min_genesis_active_validator_count.get(), 128);
        assert_eq!(config.seconds_per_slot.get(), 3);
        assert_eq!(config.genesis_fork_version, H32(hex!("10000038")));
        assert_eq!(config.churn_limit_quotient, Config::default().churn_limit_quotient);
        itertools::assert_equal(config.unknown_variables(), ["ALTAIR_FORK_EPOCH"]);

        Ok(())
    }

    #[test]
    fn config_survives_json_round_trip() -> anyhow::Result<()> {
        let minimal = Config::minimal();
        let json = serde_json::to_string(&minimal)?;
        let parsed = serde_json::from_str::<Config>(&json)?;

        assert_eq!(parsed.config_name, minimal.config_name);
        assert_eq!(parsed.shard_committee_period, minimal.shard_committee_period);
        assert_eq!(parsed.deposit_contract_address, minimal.deposit_contract_address);

        Ok(())
    }
}
