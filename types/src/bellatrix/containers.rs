use bls::SignatureBytes;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use ssz_derive::{Decode, Encode};
use ssz_types::{FixedVector, VariableList};
use tree_hash_derive::TreeHash;

use crate::{
    altair::containers::SyncAggregate,
    bellatrix::primitives::{Gas, Transaction},
    nonstandard::Quoted,
    phase0::{
        containers::{
            Attestation, AttesterSlashing, Deposit, Eth1Data, ProposerSlashing,
            SignedVoluntaryExit,
        },
        primitives::{
            ExecutionAddress, ExecutionBlockHash, ExecutionBlockNumber, Slot, Uint256,
            UnixSeconds, ValidatorIndex, H256,
        },
    },
    preset::Preset,
};

#[serde_as]
#[derive(
    Clone, PartialEq, Default, Debug, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
#[serde(bound = "", deny_unknown_fields)]
pub struct BeaconBlock<P: Preset> {
    #[serde_as(as = "Quoted")]
    pub slot: Slot,
    #[serde_as(as = "Quoted")]
    pub proposer_index: ValidatorIndex,
    pub parent_root: H256,
    pub state_root: H256,
    pub body: BeaconBlockBody<P>,
}

#[derive(
    Clone, PartialEq, Default, Debug, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
#[serde(bound = "", deny_unknown_fields)]
pub struct BeaconBlockBody<P: Preset> {
    pub randao_reveal: SignatureBytes,
    pub eth1_data: Eth1Data,
    pub graffiti: H256,
    pub proposer_slashings: VariableList<ProposerSlashing, P::MaxProposerSlashings>,
    pub attester_slashings: VariableList<AttesterSlashing<P>, P::MaxAttesterSlashings>,
    pub attestations: VariableList<Attestation<P>, P::MaxAttestations>,
    pub deposits: VariableList<Deposit, P::MaxDeposits>,
    pub voluntary_exits: VariableList<SignedVoluntaryExit, P::MaxVoluntaryExits>,
    pub sync_aggregate: SyncAggregate<P>,
    pub execution_payload: ExecutionPayload<P>,
}

#[serde_as]
#[derive(
    Clone, PartialEq, Default, Debug, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
#[serde(bound = "", deny_unknown_fields)]
pub struct ExecutionPayload<P: Preset> {
    pub parent_hash: ExecutionBlockHash,
    pub fee_recipient: ExecutionAddress,
    pub state_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: FixedVector<u8, P::BytesPerLogsBloom>,
    pub prev_randao: H256,
    #[serde_as(as = "Quoted")]
    pub block_number: ExecutionBlockNumber,
    #[serde_as(as = "Quoted")]
    pub gas_limit: Gas,
    #[serde_as(as = "Quoted")]
    pub gas_used: Gas,
    #[serde_as(as = "Quoted")]
    pub timestamp: UnixSeconds,
    pub extra_data: VariableList<u8, P::MaxExtraDataBytes>,
    pub base_fee_per_gas: Uint256,
    pub block_hash: ExecutionBlockHash,
    pub transactions: VariableList<Transaction<P>, P::MaxTransactionsPerPayload>,
}

#[serde_as]
#[derive(
    Clone, PartialEq, Default, Debug, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
#[serde(bound = "", deny_unknown_fields)]
pub struct ExecutionPayloadHeader<P: Preset> {
    pub parent_hash: ExecutionBlockHash,
    pub fee_recipient: ExecutionAddress,
    pub state_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: FixedVector<u8, P::BytesPerLogsBloom>,
    pub prev_randao: H256,
    #[serde_as(as = "Quoted")]
    pub block_number: ExecutionBlockNumber,
    #[serde_as(as = "Quoted")]
    pub gas_limit: Gas,
    #[serde_as(as = "Quoted")]
    pub gas_used: Gas,
    #[serde_as(as = "Quoted")]
    pub timestamp: UnixSeconds,
    pub extra_data: VariableList<u8, P::MaxExtraDataBytes>,
    pub base_fee_per_gas: Uint256,
    pub block_hash: ExecutionBlockHash,
    pub transactions_root: H256,
}

#[derive(
    Clone, PartialEq, Default, Debug, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
#[serde(bound = "", deny_unknown_fields)]
pub struct SignedBeaconBlock<P: Preset> {
    pub message: BeaconBlock<P>,
    pub signature: SignatureBytes,
}
