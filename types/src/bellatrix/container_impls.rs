use bls::SignatureBytes;
use tree_hash::TreeHash as _;

use crate::{
    bellatrix::containers::{
        BeaconBlock, ExecutionPayload, ExecutionPayloadHeader, SignedBeaconBlock,
    },
    phase0::{
        containers::{BeaconBlockHeader, SignedBeaconBlockHeader},
        primitives::H256,
    },
    preset::Preset,
};

impl<P: Preset> BeaconBlock<P> {
    #[must_use]
    pub fn to_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot,
            proposer_index: self.proposer_index,
            parent_root: self.parent_root,
            state_root: self.state_root,
            body_root: self.body.tree_hash_root(),
        }
    }

    #[must_use]
    pub fn with_state_root(mut self, state_root: H256) -> Self {
        self.state_root = state_root;
        self
    }

    #[must_use]
    pub fn with_signature(self, signature: SignatureBytes) -> SignedBeaconBlock<P> {
        SignedBeaconBlock {
            message: self,
            signature,
        }
    }
}

impl<P: Preset> SignedBeaconBlock<P> {
    #[must_use]
    pub fn to_header(&self) -> SignedBeaconBlockHeader {
        self.message.to_header().with_signature(self.signature)
    }
}

impl<P: Preset> ExecutionPayload<P> {
    #[must_use]
    pub fn is_default_payload(&self) -> bool {
        *self == Self::default()
    }

    #[must_use]
    pub fn to_header(&self) -> ExecutionPayloadHeader<P> {
        let Self {
            parent_hash,
            fee_recipient,
            state_root,
            receipts_root,
            logs_bloom,
            prev_randao,
            block_number,
            gas_limit,
            gas_used,
            timestamp,
            extra_data,
            base_fee_per_gas,
            block_hash,
            transactions,
        } = self;

        ExecutionPayloadHeader {
            parent_hash: *parent_hash,
            fee_recipient: *fee_recipient,
            state_root: *state_root,
            receipts_root: *receipts_root,
            logs_bloom: logs_bloom.clone(),
            prev_randao: *prev_randao,
            block_number: *block_number,
            gas_limit: *gas_limit,
            gas_used: *gas_used,
            timestamp: *timestamp,
            extra_data: extra_data.clone(),
            base_fee_per_gas: *base_fee_per_gas,
            block_hash: *block_hash,
            transactions_root: transactions.tree_hash_root(),
        }
    }
}

impl<P: Preset> ExecutionPayloadHeader<P> {
    #[must_use]
    pub fn is_default_payload(&self) -> bool {
        *self == Self::default()
    }
}
