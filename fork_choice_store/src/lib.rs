//! Implementation of [Beacon Chain Fork Choice] (LMD GHOST with Casper FFG checkpoints).
//!
//! [`Store`] follows the structure of the Fork Choice specification closely. Blocks, block states
//! and latest messages are kept in persistent maps, which makes snapshots cheap. Checkpoint states
//! are memoized in an injected [`StateCache`] that is bounded by [`StoreConfig`].
//!
//! Python `assert`s are represented in one of two ways:
//! - Failures caused by objects that may become valid later (unknown parents or blocks, slots in
//!   the future) result in [`BlockAction::Defer`] or [`AttestationAction::Defer`].
//! - All other failures result in [`Err`] wrapping an [`Error`].
//!
//! Every mutating operation is split in two. `validate_*` methods take `&self` and do the expensive
//! work (state transitions, signature checks). `apply_*` methods take `&mut self`, re-check what
//! may have changed in the meantime and update the store. [`SharedStore`] relies on this to run
//! validation against a snapshot without holding the write lock.
//!
//! The store is never pruned implicitly. [`Store::prune_finalized`] must be called explicitly.
//!
//! [Beacon Chain Fork Choice]: https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md

pub use crate::{
    error::Error,
    misc::{
        AttestationAction, AttestationOrigin, AttestationValidation, BlockAction, BlockValidation,
        DeferReason, LatestMessage, ValidAttestation, ValidBlock,
    },
    shared_store::SharedStore,
    state_cache::StateCache,
    store::Store,
    store_config::StoreConfig,
};

mod error;
mod misc;
mod shared_store;
mod state_cache;
mod store;
mod store_config;

#[cfg(test)]
mod test_helpers;
