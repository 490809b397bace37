use std::sync::Arc;

use anyhow::Result;
use itertools::Itertools as _;
use lru::LruCache;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use types::{
    bellatrix::beacon_state::BeaconState,
    phase0::{containers::Checkpoint, primitives::Epoch},
    preset::Preset,
};

use crate::store_config::StoreConfig;

type Entry<P> = Arc<OnceCell<Arc<BeaconState<P>>>>;

/// Bounded cache of checkpoint states.
///
/// A checkpoint state is the state of `checkpoint.root` advanced through empty slots to the first
/// slot of `checkpoint.epoch`. Each entry is initialized at most once even when multiple threads
/// request it at the same time. The lock is only held while looking up the entry, not while the
/// state is being computed.
pub struct StateCache<P: Preset> {
    states: Mutex<LruCache<Checkpoint, Entry<P>>>,
}

impl<P: Preset> Default for StateCache<P> {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl<P: Preset> StateCache<P> {
    #[must_use]
    pub fn new(store_config: StoreConfig) -> Self {
        Self {
            states: Mutex::new(LruCache::new(store_config.checkpoint_state_capacity())),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.lock().is_empty()
    }

    #[must_use]
    pub fn get(&self, checkpoint: Checkpoint) -> Option<Arc<BeaconState<P>>> {
        self.states
            .lock()
            .get(&checkpoint)
            .and_then(|entry| entry.get())
            .cloned()
    }

    pub fn insert(&self, checkpoint: Checkpoint, state: Arc<BeaconState<P>>) {
        self.states
            .lock()
            .put(checkpoint, Arc::new(OnceCell::with_value(state)));
    }

    pub fn get_or_try_init(
        &self,
        checkpoint: Checkpoint,
        init: impl FnOnce() -> Result<Arc<BeaconState<P>>>,
    ) -> Result<Arc<BeaconState<P>>> {
        let entry = Arc::clone(self.states.lock().get_or_insert(checkpoint, Entry::<P>::default));

        entry.get_or_try_init(init).cloned()
    }

    /// Removes states of checkpoints older than `epoch`.
    pub fn prune(&self, epoch: Epoch) {
        let mut states = self.states.lock();

        let outdated = states
            .iter()
            .map(|(checkpoint, _)| *checkpoint)
            .filter(|checkpoint| checkpoint.epoch < epoch)
            .collect_vec();

        for checkpoint in outdated {
            states.pop(&checkpoint);
        }
    }
}
