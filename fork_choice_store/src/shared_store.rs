use std::sync::Arc;

use anyhow::Result;
use execution_engine::ExecutionEngine;
use helper_functions::verifier::Verifier;
use log::debug;
use parking_lot::{RwLock, RwLockReadGuard};
use types::{
    bellatrix::containers::SignedBeaconBlock,
    phase0::{
        containers::{Attestation, AttesterSlashing},
        primitives::{UnixSeconds, H256},
    },
    preset::Preset,
};

use crate::{
    misc::{
        AttestationAction, AttestationOrigin, AttestationValidation, BlockAction, BlockValidation,
    },
    store::Store,
};

/// A [`Store`] shared between threads.
///
/// Blocks, attestations and attester slashings are validated against a snapshot with no lock
/// held. The write lock is only taken to apply the result, so readers are not blocked by state
/// transitions or signature verification.
pub struct SharedStore<P: Preset> {
    store: Arc<RwLock<Store<P>>>,
}

impl<P: Preset> Clone for SharedStore<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<P: Preset> SharedStore<P> {
    #[must_use]
    pub fn new(store: Store<P>) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Store<P>> {
        self.store.read()
    }

    #[must_use]
    pub fn snapshot(&self) -> Store<P> {
        self.store.read().clone()
    }

    pub fn on_tick(&self, time: UnixSeconds) {
        self.store.write().on_tick(time)
    }

    pub fn on_block(
        &self,
        block: Arc<SignedBeaconBlock<P>>,
        execution_engine: impl ExecutionEngine<P> + Send,
        verifier: impl Verifier + Send,
    ) -> Result<BlockAction<P>> {
        match self
            .snapshot()
            .validate_block(block, execution_engine, verifier)?
        {
            BlockValidation::Valid(valid_block) => self.store.write().apply_block(valid_block),
            BlockValidation::Done(action) => Ok(action),
        }
    }

    pub fn on_attestation(
        &self,
        attestation: Arc<Attestation<P>>,
        origin: AttestationOrigin,
        verifier: impl Verifier,
    ) -> Result<AttestationAction<P>> {
        match self
            .snapshot()
            .validate_attestation(attestation, origin, verifier)?
        {
            AttestationValidation::Valid(valid_attestation) => {
                Ok(self.store.write().apply_attestation(valid_attestation))
            }
            AttestationValidation::Done(action) => Ok(action),
        }
    }

    pub fn on_attester_slashing(
        &self,
        attester_slashing: Arc<AttesterSlashing<P>>,
        verifier: impl Verifier,
    ) -> Result<usize> {
        let slashable_indices = self
            .snapshot()
            .validate_attester_slashing(attester_slashing, verifier)?;

        Ok(self
            .store
            .write()
            .apply_equivocating_indices(slashable_indices))
    }

    pub fn get_head(&self) -> Result<H256> {
        self.store.read().get_head()
    }

    /// Computes the head and reports it to the execution engine along with the justified and
    /// finalized blocks.
    pub fn update_head(&self, execution_engine: impl ExecutionEngine<P>) -> Result<H256> {
        let (head_root, fork_choice_state) = {
            let store = self.store.read();
            let head_root = store.get_head()?;
            (head_root, store.fork_choice_state(head_root)?)
        };

        execution_engine.notify_forkchoice_updated(fork_choice_state, None)?;

        debug!("head updated to {head_root:?}: {fork_choice_state:?}");

        Ok(head_root)
    }
}
