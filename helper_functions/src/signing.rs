use anyhow::Result;
use bls::{CachedPublicKey, SecretKey, Signature, SignatureBytes};
use derive_more::From;
use tree_hash::{PackedEncoding, TreeHash, TreeHashType};
use types::{
    altair::consts::DOMAIN_SYNC_COMMITTEE,
    bellatrix::{beacon_state::BeaconState, containers::BeaconBlock},
    config::Config,
    phase0::{
        consts::{
            DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, DOMAIN_DEPOSIT, DOMAIN_RANDAO,
            DOMAIN_VOLUNTARY_EXIT,
        },
        containers::{AttestationData, BeaconBlockHeader, DepositMessage, VoluntaryExit},
        primitives::{DomainType, Epoch, Slot, H256},
    },
    preset::Preset,
};

use crate::{
    accessors,
    error::SignatureKind,
    misc,
    verifier::{SingleVerifier, Verifier as _},
};

// This wrapper is needed to differentiate between `Epoch` and `Slot`.
// They are aliased to the same type and thus cannot have different trait implementations.
#[derive(Clone, Copy, From)]
pub struct RandaoEpoch(Epoch);

impl TreeHash for RandaoEpoch {
    fn tree_hash_type() -> TreeHashType {
        Epoch::tree_hash_type()
    }

    fn tree_hash_packed_encoding(&self) -> PackedEncoding {
        self.0.tree_hash_packed_encoding()
    }

    fn tree_hash_packing_factor() -> usize {
        Epoch::tree_hash_packing_factor()
    }

    fn tree_hash_root(&self) -> tree_hash::Hash256 {
        self.0.tree_hash_root()
    }
}

/// Objects signed with a domain that does not depend on the fork or genesis.
pub trait SignForAllForks: TreeHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn signing_root(&self, config: &Config) -> H256 {
        let domain = misc::compute_domain(config, Self::DOMAIN_TYPE, None, None);
        misc::compute_signing_root(self, domain)
    }

    fn sign(&self, config: &Config, secret_key: &SecretKey) -> Signature {
        secret_key.sign(self.signing_root(config))
    }

    fn verify(
        &self,
        config: &Config,
        signature_bytes: SignatureBytes,
        cached_public_key: &CachedPublicKey,
    ) -> Result<()> {
        SingleVerifier.verify_singular(
            self.signing_root(config),
            signature_bytes,
            cached_public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

/// Objects signed with the domain of the fork active at [`SignForSingleFork::epoch`].
pub trait SignForSingleFork<P: Preset>: TreeHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn epoch(&self) -> Epoch;

    fn signing_root(&self, config: &Config, beacon_state: &BeaconState<P>) -> H256 {
        let epoch = Some(self.epoch());
        let domain = accessors::get_domain(config, beacon_state, Self::DOMAIN_TYPE, epoch);
        misc::compute_signing_root(self, domain)
    }

    fn sign(
        &self,
        config: &Config,
        beacon_state: &BeaconState<P>,
        secret_key: &SecretKey,
    ) -> Signature {
        secret_key.sign(self.signing_root(config, beacon_state))
    }

    fn verify(
        &self,
        config: &Config,
        beacon_state: &BeaconState<P>,
        signature_bytes: SignatureBytes,
        cached_public_key: &CachedPublicKey,
    ) -> Result<()> {
        SingleVerifier.verify_singular(
            self.signing_root(config, beacon_state),
            signature_bytes,
            cached_public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

/// Objects that carry no slot of their own, like block roots signed by the sync committee.
pub trait SignForSingleForkAtSlot<P: Preset>: TreeHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn signing_root(&self, config: &Config, beacon_state: &BeaconState<P>, slot: Slot) -> H256 {
        let epoch = misc::compute_epoch_at_slot::<P>(slot);
        let domain = accessors::get_domain(config, beacon_state, Self::DOMAIN_TYPE, Some(epoch));
        misc::compute_signing_root(self, domain)
    }

    fn sign(
        &self,
        config: &Config,
        beacon_state: &BeaconState<P>,
        slot: Slot,
        secret_key: &SecretKey,
    ) -> Signature {
        secret_key.sign(self.signing_root(config, beacon_state, slot))
    }
}

impl SignForAllForks for DepositMessage {
    const DOMAIN_TYPE: DomainType = DOMAIN_DEPOSIT;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Deposit;
}

impl<P: Preset> SignForSingleFork<P> for AttestationData {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_ATTESTER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Attestation;

    fn epoch(&self) -> Epoch {
        self.target.epoch
    }
}

impl<P: Preset> SignForSingleFork<P> for BeaconBlock<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

// Block headers hash to the same root as the blocks they summarize,
// so proposer slashings can be checked against either.
impl<P: Preset> SignForSingleFork<P> for BeaconBlockHeader {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

impl<P: Preset> SignForSingleFork<P> for RandaoEpoch {
    const DOMAIN_TYPE: DomainType = DOMAIN_RANDAO;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Randao;

    fn epoch(&self) -> Epoch {
        self.0
    }
}

impl<P: Preset> SignForSingleFork<P> for VoluntaryExit {
    const DOMAIN_TYPE: DomainType = DOMAIN_VOLUNTARY_EXIT;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::VoluntaryExit;

    fn epoch(&self) -> Epoch {
        self.epoch
    }
}

impl<P: Preset> SignForSingleForkAtSlot<P> for H256 {
    const DOMAIN_TYPE: DomainType = DOMAIN_SYNC_COMMITTEE;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::SyncAggregate;
}

#[cfg(test)]
mod tests {
    use bls::SecretKeyBytes;
    use types::{phase0::containers::Fork, preset::Minimal};

    use super::*;

    fn secret_key() -> SecretKey {
        SecretKey::try_from(SecretKeyBytes::from([7; 32]))
            .expect("bytes encode a valid secret key")
    }

    #[test]
    fn randao_epoch_hashes_like_the_epoch_it_wraps() {
        assert_eq!(RandaoEpoch::from(5).tree_hash_root(), 5_u64.tree_hash_root());
    }

    #[test]
    fn deposit_message_signature_round_trips() -> Result<()> {
        let config = Config::minimal();
        let secret_key = secret_key();
        let public_key = secret_key.to_public_key();

        let message = DepositMessage {
            pubkey: public_key.into(),
            withdrawal_credentials: H256::repeat_byte(1),
            amount: 32_000_000_000,
        };

        let signature = message.sign(&config, &secret_key);

        message.verify(&config, signature.into(), &public_key.into())?;

        Ok(())
    }

    #[test]
    fn randao_reveal_is_bound_to_its_epoch() -> Result<()> {
        let config = Config::minimal();
        let state = BeaconState::<Minimal>::default();
        let secret_key = secret_key();
        let public_key = CachedPublicKey::from(secret_key.to_public_key());

        let reveal = SignForSingleFork::<Minimal>::sign(&RandaoEpoch(3), &config, &state, &secret_key);

        SignForSingleFork::<Minimal>::verify(
            &RandaoEpoch(3),
            &config,
            &state,
            reveal.into(),
            &public_key,
        )?;

        SignForSingleFork::<Minimal>::verify(
            &RandaoEpoch(4),
            &config,
            &state,
            reveal.into(),
            &public_key,
        )
        .expect_err("reveal for a different epoch should be rejected");

        Ok(())
    }

    #[test]
    fn signing_root_uses_previous_fork_version_before_fork_epoch() {
        let config = Config::minimal();

        let state = BeaconState::<Minimal> {
            fork: Fork {
                previous_version: config.genesis_fork_version,
                current_version: config.bellatrix_fork_version,
                epoch: 10,
            },
            ..BeaconState::default()
        };

        let before = VoluntaryExit {
            epoch: 9,
            validator_index: 0,
        };

        let after = VoluntaryExit {
            epoch: 10,
            validator_index: 0,
        };

        let root_before = before.signing_root(&config, &state);
        let root_after = after.signing_root(&config, &state);

        let domain_before = accessors::get_domain(&config, &state, DOMAIN_VOLUNTARY_EXIT, Some(9));
        let domain_after = accessors::get_domain(&config, &state, DOMAIN_VOLUNTARY_EXIT, Some(10));

        assert_ne!(domain_before, domain_after);
        assert_eq!(root_before, misc::compute_signing_root(&before, domain_before));
        assert_eq!(root_after, misc::compute_signing_root(&after, domain_after));
    }
}
