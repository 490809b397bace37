use core::num::NonZeroUsize;

use derivative::Derivative;

#[derive(Clone, Copy, Debug, Derivative)]
#[derivative(Default)]
pub struct StoreConfig {
    /// Number of checkpoint states kept in [`StateCache`](crate::StateCache).
    ///
    /// Zero is treated as one.
    #[derivative(Default(value = "32"))]
    pub checkpoint_states_in_memory: usize,
}

impl StoreConfig {
    /// Smallest configuration that still lets `on_attestation` work across an epoch boundary.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            checkpoint_states_in_memory: 4,
        }
    }

    #[must_use]
    pub fn checkpoint_state_capacity(self) -> NonZeroUsize {
        NonZeroUsize::new(self.checkpoint_states_in_memory).unwrap_or(NonZeroUsize::MIN)
    }
}
