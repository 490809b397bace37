#![expect(clippy::module_name_repetitions)]

use std::{collections::HashMap, sync::Arc};

use anyhow::{ensure, Result};
use ethereum_types::H64;
use log::debug;
use parking_lot::Mutex;
use thiserror::Error;
use types::{
    bellatrix::containers::ExecutionPayload, phase0::primitives::ExecutionBlockHash,
    preset::Preset,
};

use crate::types::{
    ForkChoiceState, PayloadAttributes, PayloadId, PayloadStatus, PayloadValidationStatus,
};

/// Operations every execution client supports since the merge.
pub trait ExecutionEngine<P: Preset> {
    const IS_NULL: bool;

    /// [`notify_new_payload`](https://github.com/ethereum/consensus-specs/blob/1bfefe301da592375e2e02f65849a96aadec1936/specs/bellatrix/beacon-chain.md#notify_new_payload)
    fn notify_new_payload(&self, payload: &ExecutionPayload<P>) -> Result<PayloadStatus>;

    /// [`notify_forkchoice_updated`](https://github.com/ethereum/consensus-specs/blob/1bfefe301da592375e2e02f65849a96aadec1936/specs/bellatrix/fork-choice.md#notify_forkchoice_updated)
    ///
    /// Returns the identifier of a payload build process if `payload_attributes` were supplied
    /// and the client started building.
    fn notify_forkchoice_updated(
        &self,
        fork_choice_state: ForkChoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<Option<PayloadId>>;
}

/// Operations added to the engine API after the core ones.
/// Callers that only validate blocks never need them.
pub trait ExecutionEngineV2<P: Preset>: ExecutionEngine<P> {
    fn get_payload(&self, payload_id: PayloadId) -> Result<ExecutionPayload<P>>;

    /// [`is_valid_block_hash`](https://github.com/ethereum/consensus-specs/blob/1bfefe301da592375e2e02f65849a96aadec1936/specs/deneb/beacon-chain.md#is_valid_block_hash)
    fn is_valid_block_hash(&self, payload: &ExecutionPayload<P>) -> bool;
}

impl<P: Preset, E: ExecutionEngine<P>> ExecutionEngine<P> for &E {
    const IS_NULL: bool = E::IS_NULL;

    fn notify_new_payload(&self, payload: &ExecutionPayload<P>) -> Result<PayloadStatus> {
        (*self).notify_new_payload(payload)
    }

    fn notify_forkchoice_updated(
        &self,
        fork_choice_state: ForkChoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<Option<PayloadId>> {
        (*self).notify_forkchoice_updated(fork_choice_state, payload_attributes)
    }
}

impl<P: Preset, E: ExecutionEngineV2<P>> ExecutionEngineV2<P> for &E {
    fn get_payload(&self, payload_id: PayloadId) -> Result<ExecutionPayload<P>> {
        (*self).get_payload(payload_id)
    }

    fn is_valid_block_hash(&self, payload: &ExecutionPayload<P>) -> bool {
        (*self).is_valid_block_hash(payload)
    }
}

impl<P: Preset, E: ExecutionEngine<P>> ExecutionEngine<P> for Arc<E> {
    const IS_NULL: bool = E::IS_NULL;

    fn notify_new_payload(&self, payload: &ExecutionPayload<P>) -> Result<PayloadStatus> {
        self.as_ref().notify_new_payload(payload)
    }

    fn notify_forkchoice_updated(
        &self,
        fork_choice_state: ForkChoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<Option<PayloadId>> {
        self.as_ref()
            .notify_forkchoice_updated(fork_choice_state, payload_attributes)
    }
}

impl<P: Preset, E: ExecutionEngineV2<P>> ExecutionEngineV2<P> for Arc<E> {
    fn get_payload(&self, payload_id: PayloadId) -> Result<ExecutionPayload<P>> {
        self.as_ref().get_payload(payload_id)
    }

    fn is_valid_block_hash(&self, payload: &ExecutionPayload<P>) -> bool {
        self.as_ref().is_valid_block_hash(payload)
    }
}

impl<P: Preset, E: ExecutionEngine<P>> ExecutionEngine<P> for Mutex<E> {
    const IS_NULL: bool = E::IS_NULL;

    fn notify_new_payload(&self, payload: &ExecutionPayload<P>) -> Result<PayloadStatus> {
        self.lock().notify_new_payload(payload)
    }

    fn notify_forkchoice_updated(
        &self,
        fork_choice_state: ForkChoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<Option<PayloadId>> {
        self.lock()
            .notify_forkchoice_updated(fork_choice_state, payload_attributes)
    }
}

impl<P: Preset, E: ExecutionEngineV2<P>> ExecutionEngineV2<P> for Mutex<E> {
    fn get_payload(&self, payload_id: PayloadId) -> Result<ExecutionPayload<P>> {
        self.lock().get_payload(payload_id)
    }

    fn is_valid_block_hash(&self, payload: &ExecutionPayload<P>) -> bool {
        self.lock().is_valid_block_hash(payload)
    }
}

/// Accepts every payload without contacting a client.
#[derive(Clone, Copy, Default, Debug)]
pub struct NullExecutionEngine;

impl<P: Preset> ExecutionEngine<P> for NullExecutionEngine {
    const IS_NULL: bool = true;

    fn notify_new_payload(&self, _payload: &ExecutionPayload<P>) -> Result<PayloadStatus> {
        Ok(PayloadStatus::new(PayloadValidationStatus::Valid))
    }

    fn notify_forkchoice_updated(
        &self,
        _fork_choice_state: ForkChoiceState,
        _payload_attributes: Option<PayloadAttributes>,
    ) -> Result<Option<PayloadId>> {
        Ok(None)
    }
}

impl<P: Preset> ExecutionEngineV2<P> for NullExecutionEngine {
    fn get_payload(&self, payload_id: PayloadId) -> Result<ExecutionPayload<P>> {
        Err(Error::UnknownPayloadId { payload_id }.into())
    }

    fn is_valid_block_hash(&self, _payload: &ExecutionPayload<P>) -> bool {
        true
    }
}

/// Engine for tests. Answers every payload with a fixed verdict and remembers what it was sent.
pub struct MockExecutionEngine<P: Preset> {
    verdict: PayloadValidationStatus,
    notified_payloads: Mutex<Vec<ExecutionPayload<P>>>,
    fork_choice_updates: Mutex<Vec<ForkChoiceState>>,
    payloads_being_built: Mutex<HashMap<PayloadId, ExecutionPayload<P>>>,
}

impl<P: Preset> Default for MockExecutionEngine<P> {
    fn default() -> Self {
        Self::new(PayloadValidationStatus::Valid)
    }
}

impl<P: Preset> ExecutionEngine<P> for MockExecutionEngine<P> {
    const IS_NULL: bool = false;

    fn notify_new_payload(&self, payload: &ExecutionPayload<P>) -> Result<PayloadStatus> {
        self.notified_payloads.lock().push(payload.clone());

        let latest_valid_hash = self.verdict.is_valid().then_some(payload.block_hash);

        Ok(PayloadStatus {
            status: self.verdict,
            latest_valid_hash,
            validation_error: None,
        })
    }

    fn notify_forkchoice_updated(
        &self,
        fork_choice_state: ForkChoiceState,
        payload_attributes: Option<PayloadAttributes>,
    ) -> Result<Option<PayloadId>> {
        let mut updates = self.fork_choice_updates.lock();

        updates.push(fork_choice_state);

        let Some(attributes) = payload_attributes else {
            return Ok(None);
        };

        ensure!(
            !self.verdict.is_invalid(),
            Error::HeadNotValid {
                head_block_hash: fork_choice_state.head_block_hash,
            },
        );

        let payload_id = PayloadId(H64::from_low_u64_be(updates.len() as u64));

        let payload = ExecutionPayload {
            parent_hash: fork_choice_state.head_block_hash,
            fee_recipient: attributes.suggested_fee_recipient,
            prev_randao: attributes.prev_randao,
            timestamp: attributes.timestamp,
            ..ExecutionPayload::default()
        };

        debug!("mock execution engine started building payload {payload_id:?}");

        self.payloads_being_built.lock().insert(payload_id, payload);

        Ok(Some(payload_id))
    }
}

impl<P: Preset> ExecutionEngineV2<P> for MockExecutionEngine<P> {
    fn get_payload(&self, payload_id: PayloadId) -> Result<ExecutionPayload<P>> {
        self.payloads_being_built
            .lock()
            .remove(&payload_id)
            .ok_or_else(|| Error::UnknownPayloadId { payload_id }.into())
    }

    fn is_valid_block_hash(&self, _payload: &ExecutionPayload<P>) -> bool {
        self.verdict != PayloadValidationStatus::InvalidBlockHash
    }
}

impl<P: Preset> MockExecutionEngine<P> {
    #[must_use]
    pub fn new(verdict: PayloadValidationStatus) -> Self {
        Self {
            verdict,
            notified_payloads: Mutex::default(),
            fork_choice_updates: Mutex::default(),
            payloads_being_built: Mutex::default(),
        }
    }

    #[must_use]
    pub fn notified_payloads(&self) -> Vec<ExecutionPayload<P>> {
        self.notified_payloads.lock().clone()
    }

    #[must_use]
    pub fn fork_choice_updates(&self) -> Vec<ForkChoiceState> {
        self.fork_choice_updates.lock().clone()
    }
}

#[derive(Debug, Error)]
enum Error {
    #[error("execution engine does not know payload {payload_id:?}")]
    UnknownPayloadId { payload_id: PayloadId },
    #[error("cannot build on invalid head {head_block_hash:?}")]
    HeadNotValid { head_block_hash: ExecutionBlockHash },
}
