use bls::{AggregateSignatureBytes, CachedPublicKey, PublicKeyBytes, SignatureBytes};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use ssz_derive::{Decode, Encode};
use ssz_types::{BitList, FixedVector, VariableList};
use tree_hash_derive::TreeHash;

use crate::{
    nonstandard::Quoted,
    phase0::{
        consts::DepositProofLength,
        primitives::{
            CommitteeIndex, DepositIndex, Epoch, ExecutionBlockHash, Gwei, Slot, ValidatorIndex,
            Version, H256,
        },
    },
    preset::Preset,
};

// Signatures and public keys are stored compressed and only decompressed when verified.
// Blocks from the network may contain bytes that are not valid curve points.

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "", deny_unknown_fields)]
pub struct Attestation<P: Preset> {
    pub aggregation_bits: BitList<P::MaxValidatorsPerCommittee>,
    pub data: AttestationData,
    pub signature: AggregateSignatureBytes,
}

#[serde_as]
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Debug,
    Deserialize,
    Serialize,
    Encode,
    Decode,
    TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct AttestationData {
    #[serde_as(as = "Quoted")]
    pub slot: Slot,
    #[serde_as(as = "Quoted")]
    pub index: CommitteeIndex,
    pub beacon_block_root: H256,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "", deny_unknown_fields)]
pub struct AttesterSlashing<P: Preset> {
    pub attestation_1: IndexedAttestation<P>,
    pub attestation_2: IndexedAttestation<P>,
}

#[serde_as]
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Debug,
    Deserialize,
    Serialize,
    Encode,
    Decode,
    TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct BeaconBlockHeader {
    #[serde_as(as = "Quoted")]
    pub slot: Slot,
    #[serde_as(as = "Quoted")]
    pub proposer_index: ValidatorIndex,
    pub parent_root: H256,
    pub state_root: H256,
    pub body_root: H256,
}

#[serde_as]
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Debug,
    Deserialize,
    Serialize,
    Encode,
    Decode,
    TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct Checkpoint {
    #[serde_as(as = "Quoted")]
    pub epoch: Epoch,
    pub root: H256,
}

#[derive(
    Clone, PartialEq, Default, Debug, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct Deposit {
    pub proof: FixedVector<H256, DepositProofLength>,
    pub data: DepositData,
}

#[serde_as]
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Debug,
    Deserialize,
    Serialize,
    Encode,
    Decode,
    TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct DepositData {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: H256,
    #[serde_as(as = "Quoted")]
    pub amount: Gwei,
    pub signature: SignatureBytes,
}

#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(deny_unknown_fields)]
pub struct DepositMessage {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: H256,
    #[serde_as(as = "Quoted")]
    pub amount: Gwei,
}

#[serde_as]
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Debug,
    Deserialize,
    Serialize,
    Encode,
    Decode,
    TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct Eth1Data {
    pub deposit_root: H256,
    #[serde_as(as = "Quoted")]
    pub deposit_count: DepositIndex,
    pub block_hash: ExecutionBlockHash,
}

#[serde_as]
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Debug,
    Deserialize,
    Serialize,
    Encode,
    Decode,
    TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct Fork {
    pub previous_version: Version,
    pub current_version: Version,
    #[serde_as(as = "Quoted")]
    pub epoch: Epoch,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(deny_unknown_fields)]
pub struct ForkData {
    pub current_version: Version,
    pub genesis_validators_root: H256,
}

#[derive(
    Clone, PartialEq, Default, Debug, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
#[serde(bound = "", deny_unknown_fields)]
pub struct HistoricalBatch<P: Preset> {
    pub block_roots: FixedVector<H256, P::SlotsPerHistoricalRoot>,
    pub state_roots: FixedVector<H256, P::SlotsPerHistoricalRoot>,
}

#[derive(
    Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
#[serde(bound = "", deny_unknown_fields)]
pub struct IndexedAttestation<P: Preset> {
    pub attesting_indices: VariableList<ValidatorIndex, P::MaxValidatorsPerCommittee>,
    pub data: AttestationData,
    pub signature: AggregateSignatureBytes,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(deny_unknown_fields)]
pub struct ProposerSlashing {
    pub signed_header_1: SignedBeaconBlockHeader,
    pub signed_header_2: SignedBeaconBlockHeader,
}

#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Debug,
    Deserialize,
    Serialize,
    Encode,
    Decode,
    TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct SignedBeaconBlockHeader {
    pub message: BeaconBlockHeader,
    pub signature: SignatureBytes,
}

#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Debug,
    Deserialize,
    Serialize,
    Encode,
    Decode,
    TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct SignedVoluntaryExit {
    pub message: VoluntaryExit,
    pub signature: SignatureBytes,
}

#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Debug,
    Deserialize,
    Serialize,
    Encode,
    Decode,
    TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct SigningData {
    pub object_root: H256,
    pub domain: H256,
}

#[serde_as]
#[derive(
    Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct Validator {
    pub pubkey: CachedPublicKey,
    pub withdrawal_credentials: H256,
    #[serde_as(as = "Quoted")]
    pub effective_balance: Gwei,
    pub slashed: bool,
    #[serde_as(as = "Quoted")]
    pub activation_eligibility_epoch: Epoch,
    #[serde_as(as = "Quoted")]
    pub activation_epoch: Epoch,
    #[serde_as(as = "Quoted")]
    pub exit_epoch: Epoch,
    #[serde_as(as = "Quoted")]
    pub withdrawable_epoch: Epoch,
}

#[serde_as]
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Debug,
    Deserialize,
    Serialize,
    Encode,
    Decode,
    TreeHash,
)]
#[serde(deny_unknown_fields)]
pub struct VoluntaryExit {
    #[serde_as(as = "Quoted")]
    pub epoch: Epoch,
    #[serde_as(as = "Quoted")]
    pub validator_index: ValidatorIndex,
}
