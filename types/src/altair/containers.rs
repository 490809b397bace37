use bls::{AggregateSignatureBytes, CachedPublicKey, PublicKeyBytes, SignatureBytes};
use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{BitVector, FixedVector};
use tree_hash_derive::TreeHash;

use crate::preset::Preset;

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "", deny_unknown_fields)]
pub struct SyncAggregate<P: Preset> {
    pub sync_committee_bits: BitVector<P::SyncCommitteeSize>,
    pub sync_committee_signature: AggregateSignatureBytes,
}

// An aggregate with no participants must carry the point at infinity to be valid.
impl<P: Preset> Default for SyncAggregate<P> {
    fn default() -> Self {
        Self {
            sync_committee_bits: BitVector::new(),
            sync_committee_signature: SignatureBytes::empty(),
        }
    }
}

#[derive(
    Clone, PartialEq, Default, Debug, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
#[serde(bound = "", deny_unknown_fields)]
pub struct SyncCommittee<P: Preset> {
    pub pubkeys: FixedVector<CachedPublicKey, P::SyncCommitteeSize>,
    pub aggregate_pubkey: PublicKeyBytes,
}
