use std::{collections::HashSet as StdHashSet, sync::Arc};

use anyhow::{ensure, Result};
use execution_engine::{ExecutionEngine, ForkChoiceState};
use helper_functions::{
    accessors::{self, get_current_epoch, get_indexed_attestation, get_total_active_balance},
    misc::{
        compute_epoch_at_slot, compute_start_slot_at_epoch, is_epoch_start,
        slots_since_epoch_start,
    },
    predicates::{is_active_validator, is_slashable_attestation_data, validate_indexed_attestation},
    verifier::Verifier,
};
use im::{HashMap, HashSet};
use itertools::{EitherOrBoth, Itertools as _};
use log::{debug, info};
use transition_functions::{
    bellatrix,
    unphased::{ProcessSlots, StateRootPolicy},
};
use tree_hash::TreeHash as _;
use typenum::Unsigned as _;
use types::{
    bellatrix::{beacon_state::BeaconState, containers::SignedBeaconBlock},
    config::Config as ChainConfig,
    nonstandard::RelativeEpoch,
    phase0::{
        consts::{GENESIS_EPOCH, GENESIS_SLOT, INTERVALS_PER_SLOT},
        containers::{Attestation, AttestationData, AttesterSlashing, Checkpoint},
        primitives::{ExecutionBlockHash, Gwei, Slot, UnixSeconds, ValidatorIndex, H256},
    },
    preset::Preset,
};

use crate::{
    error::Error,
    misc::{
        AttestationAction, AttestationOrigin, AttestationValidation, BlockAction, BlockValidation,
        DeferReason, LatestMessage, ValidAttestation, ValidBlock,
    },
    state_cache::StateCache,
};

/// [`Store`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#store)
///
/// Maps are persistent, so cloning a `Store` to take a snapshot is cheap.
/// The checkpoint state cache is shared between clones.
#[derive(Clone)]
pub struct Store<P: Preset> {
    chain_config: Arc<ChainConfig>,
    time: UnixSeconds,
    genesis_time: UnixSeconds,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    best_justified_checkpoint: Checkpoint,
    proposer_boost_root: H256,
    equivocating_indices: HashSet<ValidatorIndex>,
    blocks: HashMap<H256, Arc<SignedBeaconBlock<P>>>,
    block_states: HashMap<H256, Arc<BeaconState<P>>>,
    checkpoint_states: Arc<StateCache<P>>,
    latest_messages: HashMap<ValidatorIndex, LatestMessage>,
}

impl<P: Preset> Store<P> {
    /// [`get_forkchoice_store`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#get_forkchoice_store)
    ///
    /// The anchor should be the genesis block or a block at the start of an epoch.
    pub fn new(
        chain_config: Arc<ChainConfig>,
        anchor_block: Arc<SignedBeaconBlock<P>>,
        anchor_state: Arc<BeaconState<P>>,
        checkpoint_states: Arc<StateCache<P>>,
    ) -> Result<Self> {
        let in_block = anchor_block.message.state_root;
        let computed = anchor_state.tree_hash_root();

        ensure!(
            in_block == computed,
            Error::<P>::AnchorStateRootMismatch { in_block, computed },
        );

        let anchor_root = anchor_block.message.tree_hash_root();

        let anchor_checkpoint = Checkpoint {
            epoch: get_current_epoch(&anchor_state),
            root: anchor_root,
        };

        let time = anchor_state.genesis_time
            + chain_config.seconds_per_slot.get() * (anchor_state.slot - GENESIS_SLOT);

        checkpoint_states.insert(anchor_checkpoint, Arc::clone(&anchor_state));

        debug!("fork choice store anchored at {anchor_checkpoint:?}");

        Ok(Self {
            chain_config,
            time,
            genesis_time: anchor_state.genesis_time,
            justified_checkpoint: anchor_checkpoint,
            finalized_checkpoint: anchor_checkpoint,
            best_justified_checkpoint: anchor_checkpoint,
            proposer_boost_root: H256::zero(),
            equivocating_indices: HashSet::new(),
            blocks: HashMap::unit(anchor_root, anchor_block),
            block_states: HashMap::unit(anchor_root, anchor_state),
            checkpoint_states,
            latest_messages: HashMap::new(),
        })
    }

    #[must_use]
    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain_config
    }

    #[must_use]
    pub const fn time(&self) -> UnixSeconds {
        self.time
    }

    #[must_use]
    pub const fn genesis_time(&self) -> UnixSeconds {
        self.genesis_time
    }

    #[must_use]
    pub const fn justified_checkpoint(&self) -> Checkpoint {
        self.justified_checkpoint
    }

    #[must_use]
    pub const fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    #[must_use]
    pub const fn best_justified_checkpoint(&self) -> Checkpoint {
        self.best_justified_checkpoint
    }

    #[must_use]
    pub const fn proposer_boost_root(&self) -> H256 {
        self.proposer_boost_root
    }

    #[must_use]
    pub fn block(&self, block_root: H256) -> Option<&Arc<SignedBeaconBlock<P>>> {
        self.blocks.get(&block_root)
    }

    #[must_use]
    pub fn block_state(&self, block_root: H256) -> Option<&Arc<BeaconState<P>>> {
        self.block_states.get(&block_root)
    }

    #[must_use]
    pub fn contains_block(&self, block_root: H256) -> bool {
        self.blocks.contains_key(&block_root)
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn latest_message(&self, validator_index: ValidatorIndex) -> Option<LatestMessage> {
        self.latest_messages.get(&validator_index).copied()
    }

    #[must_use]
    pub fn is_equivocating(&self, validator_index: ValidatorIndex) -> bool {
        self.equivocating_indices.contains(&validator_index)
    }

    /// [`get_current_slot`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#get_current_slot)
    #[must_use]
    pub fn get_current_slot(&self) -> Slot {
        self.slot_at(self.time)
    }

    fn slot_at(&self, time: UnixSeconds) -> Slot {
        GENESIS_SLOT + time.saturating_sub(self.genesis_time) / self.chain_config.seconds_per_slot
    }

    #[must_use]
    pub fn finalized_slot(&self) -> Slot {
        compute_start_slot_at_epoch::<P>(self.finalized_checkpoint.epoch)
    }

    /// [`get_ancestor`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#get_ancestor)
    ///
    /// Returns the root of the latest block at or before `slot` in the chain ending with
    /// `block_root`, or `None` if the chain leaves the store before reaching `slot`.
    #[must_use]
    pub fn get_ancestor(&self, mut block_root: H256, slot: Slot) -> Option<H256> {
        loop {
            let block = self.blocks.get(&block_root)?;

            if block.message.slot <= slot {
                return Some(block_root);
            }

            block_root = block.message.parent_root;
        }
    }

    fn is_descendant_of_finalized(&self, block_root: H256) -> bool {
        self.get_ancestor(block_root, self.finalized_slot()) == Some(self.finalized_checkpoint.root)
    }

    /// [`on_tick`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#on_tick)
    ///
    /// Times not later than the current one are ignored.
    /// Every slot boundary crossed is processed separately.
    pub fn on_tick(&mut self, time: UnixSeconds) {
        if time <= self.time {
            return;
        }

        let tick_slot = self.slot_at(time);

        while self.get_current_slot() < tick_slot {
            let next_slot = self.get_current_slot() + 1;
            let seconds_per_slot = self.chain_config.seconds_per_slot.get();
            self.apply_tick(self.genesis_time + next_slot * seconds_per_slot);
        }

        self.apply_tick(time);
    }

    fn apply_tick(&mut self, time: UnixSeconds) {
        let previous_slot = self.get_current_slot();

        self.time = time;

        let current_slot = self.get_current_slot();

        if current_slot <= previous_slot {
            return;
        }

        // > Reset store.proposer_boost_root if this is a new slot
        self.proposer_boost_root = H256::zero();

        if !is_epoch_start::<P>(current_slot) {
            return;
        }

        // > Update store.justified_checkpoint if a better checkpoint on the
        // > store.finalized_checkpoint chain
        if self.best_justified_checkpoint.epoch > self.justified_checkpoint.epoch
            && self.is_descendant_of_finalized(self.best_justified_checkpoint.root)
        {
            debug!(
                "promoting best justified checkpoint at slot {current_slot}: {:?}",
                self.best_justified_checkpoint,
            );

            self.justified_checkpoint = self.best_justified_checkpoint;
        }
    }

    /// [`on_block`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/bellatrix/fork-choice.md#on_block)
    ///
    /// Attestations and attester slashings contained in the block are not applied to the store.
    /// Pass them to [`Store::on_attestation`] with [`AttestationOrigin::Block`] and to
    /// [`Store::on_attester_slashing`] after the block is accepted.
    pub fn on_block(
        &mut self,
        block: Arc<SignedBeaconBlock<P>>,
        execution_engine: impl ExecutionEngine<P> + Send,
        verifier: impl Verifier + Send,
    ) -> Result<BlockAction<P>> {
        match self.validate_block(block, execution_engine, verifier)? {
            BlockValidation::Valid(valid_block) => self.apply_block(valid_block),
            BlockValidation::Done(action) => Ok(action),
        }
    }

    /// Runs every check in [`Store::on_block`] and computes the post-state without modifying
    /// the store.
    pub fn validate_block(
        &self,
        block: Arc<SignedBeaconBlock<P>>,
        execution_engine: impl ExecutionEngine<P> + Send,
        verifier: impl Verifier + Send,
    ) -> Result<BlockValidation<P>> {
        let block_root = block.message.tree_hash_root();
        let block_slot = block.message.slot;
        let parent_root = block.message.parent_root;

        if self.contains_block(block_root) {
            return Ok(BlockValidation::Done(BlockAction::Ignore(block_root)));
        }

        // > Parent block must be known
        let Some(parent_state) = self.block_states.get(&parent_root) else {
            return Ok(BlockValidation::Done(BlockAction::Defer(
                block,
                DeferReason::UnknownParent(parent_root),
            )));
        };

        // > Blocks cannot be in the future. If they are, their consideration
        // > must be delayed until they are in the past.
        if self.get_current_slot() < block_slot {
            return Ok(BlockValidation::Done(BlockAction::Defer(
                block,
                DeferReason::FutureSlot(block_slot),
            )));
        }

        let block = self.ensure_descends_from_finalized(block)?;

        // > Check the block is valid and compute the post-state
        let mut state = parent_state.as_ref().clone();

        bellatrix::state_transition(
            &self.chain_config,
            &mut state,
            &block,
            ProcessSlots::IfNeeded,
            StateRootPolicy::Verify,
            execution_engine,
            verifier,
        )?;

        Ok(BlockValidation::Valid(ValidBlock {
            block_root,
            block,
            state: Arc::new(state),
        }))
    }

    fn ensure_descends_from_finalized(
        &self,
        block: Arc<SignedBeaconBlock<P>>,
    ) -> Result<Arc<SignedBeaconBlock<P>>> {
        // > Check that block is later than the finalized epoch slot
        // > (optimization to reduce calls to get_ancestor)
        let finalized_slot = self.finalized_slot();

        ensure!(
            block.message.slot > finalized_slot,
            Error::BlockNotNewerThanFinalized {
                block,
                finalized_slot,
            },
        );

        // > Check block is a descendant of the finalized block at the checkpoint finalized slot
        ensure!(
            self.is_descendant_of_finalized(block.message.parent_root),
            Error::BlockNotDescendantOfFinalized {
                block,
                finalized_checkpoint: self.finalized_checkpoint,
            },
        );

        Ok(block)
    }

    /// Adds a block validated by [`Store::validate_block`] to the store.
    ///
    /// The store may have changed since the block was validated. The block is ignored if it was
    /// added in the meantime and rejected if it no longer descends from the finalized block.
    pub fn apply_block(&mut self, valid_block: ValidBlock<P>) -> Result<BlockAction<P>> {
        let ValidBlock {
            block_root,
            block,
            state,
        } = valid_block;

        if self.contains_block(block_root) {
            return Ok(BlockAction::Ignore(block_root));
        }

        let block = self.ensure_descends_from_finalized(block)?;
        let block_slot = block.message.slot;

        // > Add new block to the store
        self.blocks.insert(block_root, block);

        // > Add new state for this block to the store
        self.block_states.insert(block_root, Arc::clone(&state));

        // > Add proposer score boost if the block is timely
        let seconds_per_slot = self.chain_config.seconds_per_slot.get();
        let time_into_slot = self.time.saturating_sub(self.genesis_time) % seconds_per_slot;
        let is_before_attesting_interval = time_into_slot < seconds_per_slot / INTERVALS_PER_SLOT;

        if self.get_current_slot() == block_slot && is_before_attesting_interval {
            self.proposer_boost_root = block_root;
        }

        self.update_checkpoints(&state);

        debug!("block accepted (block_root: {block_root:?}, slot: {block_slot})");

        Ok(BlockAction::Accept(block_root))
    }

    fn update_checkpoints(&mut self, state: &BeaconState<P>) {
        let justified_checkpoint = state.current_justified_checkpoint;
        let finalized_checkpoint = state.finalized_checkpoint;

        // > Update justified checkpoint
        if justified_checkpoint.epoch > self.justified_checkpoint.epoch {
            if justified_checkpoint.epoch > self.best_justified_checkpoint.epoch {
                self.best_justified_checkpoint = justified_checkpoint;
            }

            if self.should_update_justified_checkpoint(justified_checkpoint) {
                debug!("justified checkpoint updated to {justified_checkpoint:?}");
                self.justified_checkpoint = justified_checkpoint;
            }
        }

        // > Update finalized checkpoint
        if finalized_checkpoint.epoch > self.finalized_checkpoint.epoch {
            info!(
                "finalized checkpoint updated (epoch: {}, root: {:?})",
                finalized_checkpoint.epoch, finalized_checkpoint.root,
            );

            self.finalized_checkpoint = finalized_checkpoint;
            self.justified_checkpoint = justified_checkpoint;
        }
    }

    /// [`should_update_justified_checkpoint`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#should_update_justified_checkpoint)
    ///
    /// > To address the bouncing attack, only update conflicting justified
    /// > checkpoints in the fork choice if in the early slots of the epoch.
    #[must_use]
    pub fn should_update_justified_checkpoint(&self, new_justified_checkpoint: Checkpoint) -> bool {
        let slots_since_epoch_start = slots_since_epoch_start::<P>(self.get_current_slot());

        if slots_since_epoch_start < self.chain_config.safe_slots_to_update_justified {
            return true;
        }

        let justified_slot = compute_start_slot_at_epoch::<P>(self.justified_checkpoint.epoch);

        self.get_ancestor(new_justified_checkpoint.root, justified_slot)
            == Some(self.justified_checkpoint.root)
    }

    /// [`on_attestation`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#on_attestation)
    pub fn on_attestation(
        &mut self,
        attestation: Arc<Attestation<P>>,
        origin: AttestationOrigin,
        verifier: impl Verifier,
    ) -> Result<AttestationAction<P>> {
        match self.validate_attestation(attestation, origin, verifier)? {
            AttestationValidation::Valid(valid_attestation) => {
                Ok(self.apply_attestation(valid_attestation))
            }
            AttestationValidation::Done(action) => Ok(action),
        }
    }

    pub fn validate_attestation(
        &self,
        attestation: Arc<Attestation<P>>,
        origin: AttestationOrigin,
        mut verifier: impl Verifier,
    ) -> Result<AttestationValidation<P>> {
        let data = attestation.data;
        let target = data.target;
        let defer = |attestation, reason| -> Result<_> {
            Ok(AttestationValidation::Done(AttestationAction::Defer(attestation, reason)))
        };

        // > If the given attestation is not from a beacon block message,
        // > we have to check the target epoch scope.
        if !origin.is_from_block() {
            let current_epoch = compute_epoch_at_slot::<P>(self.get_current_slot());
            let previous_epoch = current_epoch.saturating_sub(1).max(GENESIS_EPOCH);

            ensure!(
                target.epoch == current_epoch || target.epoch == previous_epoch,
                Error::<P>::AttestationFromWrongEpoch {
                    target_epoch: target.epoch,
                    current_epoch,
                },
            );
        }

        // > Check that the epoch number and slot number are matching
        ensure!(
            target.epoch == compute_epoch_at_slot::<P>(data.slot),
            Error::AttestationTargetsWrongEpoch { attestation },
        );

        // > Attestations target be for a known block.
        // > If target block is unknown, delay consideration until the block is found
        if !self.contains_block(target.root) {
            return defer(attestation, DeferReason::UnknownBlock(target.root));
        }

        // > Attestations must be for a known block. If block is unknown,
        // > delay consideration until the block is found
        let Some(block) = self.blocks.get(&data.beacon_block_root) else {
            return defer(attestation, DeferReason::UnknownBlock(data.beacon_block_root));
        };

        // > Attestations must not be for blocks in the future.
        // > If not, the attestation should not be considered
        ensure!(
            block.message.slot <= data.slot,
            Error::AttestationForFutureBlock {
                attestation,
                block: Arc::clone(block),
            },
        );

        // > LMD vote must be consistent with FFG vote target
        let target_slot = compute_start_slot_at_epoch::<P>(target.epoch);

        ensure!(
            self.get_ancestor(data.beacon_block_root, target_slot) == Some(target.root),
            Error::LmdGhostInconsistentWithFfgTarget { attestation },
        );

        // > Attestations can only affect the fork choice of subsequent slots.
        // > Delay consideration in the fork choice until their slot is in the past.
        if self.get_current_slot() <= data.slot {
            return defer(attestation, DeferReason::FutureSlot(data.slot + 1));
        }

        // > Get state at the `target` to fully validate attestation
        let target_state = self.checkpoint_state(target)?;
        let indexed_attestation = get_indexed_attestation(&target_state, &attestation)?;

        validate_indexed_attestation(
            &self.chain_config,
            &target_state,
            &indexed_attestation,
            &mut verifier,
        )?;

        verifier.finish()?;

        Ok(AttestationValidation::Valid(ValidAttestation {
            data,
            attesting_indices: indexed_attestation.attesting_indices.to_vec(),
        }))
    }

    pub fn apply_attestation(&mut self, valid_attestation: ValidAttestation) -> AttestationAction<P> {
        let ValidAttestation {
            data,
            attesting_indices,
        } = valid_attestation;

        // > Update latest messages for attesting indices
        self.update_latest_messages(attesting_indices, data);

        AttestationAction::Accept
    }

    fn update_latest_messages(
        &mut self,
        attesting_indices: impl IntoIterator<Item = ValidatorIndex>,
        data: AttestationData,
    ) {
        let message = LatestMessage {
            epoch: data.target.epoch,
            root: data.beacon_block_root,
        };

        for validator_index in attesting_indices {
            if self.is_equivocating(validator_index) {
                continue;
            }

            let is_newer = self
                .latest_messages
                .get(&validator_index)
                .is_none_or(|latest| message.epoch > latest.epoch);

            if is_newer {
                self.latest_messages.insert(validator_index, message);
            }
        }
    }

    /// [`on_attester_slashing`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#on_attester_slashing)
    ///
    /// Returns the number of validators newly marked as equivocating.
    pub fn on_attester_slashing(
        &mut self,
        attester_slashing: Arc<AttesterSlashing<P>>,
        verifier: impl Verifier,
    ) -> Result<usize> {
        let slashable_indices = self.validate_attester_slashing(attester_slashing, verifier)?;
        Ok(self.apply_equivocating_indices(slashable_indices))
    }

    /// Validates `attester_slashing` and returns the indices of validators that attested to both
    /// conflicting attestations.
    pub fn validate_attester_slashing(
        &self,
        attester_slashing: Arc<AttesterSlashing<P>>,
        mut verifier: impl Verifier,
    ) -> Result<Vec<ValidatorIndex>> {
        let attestation_1 = &attester_slashing.attestation_1;
        let attestation_2 = &attester_slashing.attestation_2;

        ensure!(
            is_slashable_attestation_data(attestation_1.data, attestation_2.data),
            Error::AttesterSlashingNotSlashable {
                attester_slashing: Arc::clone(&attester_slashing),
            },
        );

        let state = self.justified_block_state()?;

        validate_indexed_attestation(&self.chain_config, &state, attestation_1, &mut verifier)?;
        validate_indexed_attestation(&self.chain_config, &state, attestation_2, &mut verifier)?;

        verifier.finish()?;

        // Both lists were just checked to be sorted.
        let slashable_indices = attestation_1
            .attesting_indices
            .iter()
            .merge_join_by(attestation_2.attesting_indices.iter(), Ord::cmp)
            .filter_map(EitherOrBoth::both)
            .map(|(validator_index, _)| *validator_index)
            .collect();

        Ok(slashable_indices)
    }

    /// Returns the number of validators newly marked as equivocating.
    pub fn apply_equivocating_indices(
        &mut self,
        validator_indices: impl IntoIterator<Item = ValidatorIndex>,
    ) -> usize {
        let equivocating = validator_indices
            .into_iter()
            .filter(|validator_index| self.equivocating_indices.insert(*validator_index).is_none())
            .count();

        if equivocating > 0 {
            debug!("{equivocating} validators marked as equivocating");
        }

        equivocating
    }

    fn justified_block_state(&self) -> Result<Arc<BeaconState<P>>> {
        let block_root = self.justified_checkpoint.root;

        self.block_states
            .get(&block_root)
            .cloned()
            .ok_or_else(|| Error::<P>::StateNotFound { block_root }.into())
    }

    /// [`store_target_checkpoint_state`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#store_target_checkpoint_state)
    ///
    /// Returns the state of `checkpoint.root` advanced to the first slot of `checkpoint.epoch`.
    pub fn checkpoint_state(&self, checkpoint: Checkpoint) -> Result<Arc<BeaconState<P>>> {
        self.checkpoint_states.get_or_try_init(checkpoint, || {
            let block_root = checkpoint.root;

            let base_state = self
                .block_states
                .get(&block_root)
                .ok_or(Error::<P>::StateNotFound { block_root })?;

            let epoch_start_slot = compute_start_slot_at_epoch::<P>(checkpoint.epoch);

            if base_state.slot >= epoch_start_slot {
                return Ok(Arc::clone(base_state));
            }

            let mut state = base_state.as_ref().clone();
            bellatrix::process_slots(&self.chain_config, &mut state, epoch_start_slot)?;
            Ok(Arc::new(state))
        })
    }

    /// [`get_latest_attesting_balance`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#get_latest_attesting_balance)
    pub fn get_latest_attesting_balance(&self, block_root: H256) -> Result<Gwei> {
        let justified_state = self.checkpoint_state(self.justified_checkpoint)?;
        self.attesting_balance(&justified_state, block_root)
    }

    fn attesting_balance(
        &self,
        justified_state: &BeaconState<P>,
        block_root: H256,
    ) -> Result<Gwei> {
        let block_slot = self
            .blocks
            .get(&block_root)
            .ok_or(Error::<P>::UnknownBlock { block_root })?
            .message
            .slot;

        let current_epoch = get_current_epoch(justified_state);

        let attestation_score = (0..)
            .zip(justified_state.validators.iter())
            .filter(|(_, validator)| {
                is_active_validator(validator, current_epoch) && !validator.slashed
            })
            .filter(|(validator_index, _)| !self.is_equivocating(*validator_index))
            .filter(|(validator_index, _)| {
                self.latest_messages
                    .get(validator_index)
                    .is_some_and(|message| {
                        self.get_ancestor(message.root, block_slot) == Some(block_root)
                    })
            })
            .map(|(_, validator)| validator.effective_balance)
            .sum::<Gwei>();

        if self.proposer_boost_root.is_zero() {
            return Ok(attestation_score);
        }

        // > Boost is applied if ``root`` is an ancestor of ``proposer_boost_root``
        if self.get_ancestor(self.proposer_boost_root, block_slot) != Some(block_root) {
            return Ok(attestation_score);
        }

        Ok(attestation_score + self.proposer_score(justified_state))
    }

    fn proposer_score(&self, justified_state: &BeaconState<P>) -> Gwei {
        let num_validators =
            accessors::active_validator_count(justified_state, RelativeEpoch::Current);

        if num_validators == 0 {
            return 0;
        }

        let avg_balance = get_total_active_balance(justified_state) / num_validators;
        let committee_size = num_validators / P::SlotsPerEpoch::U64;
        let committee_weight = committee_size * avg_balance;

        committee_weight * self.chain_config.proposer_score_boost / 100
    }

    /// [`filter_block_tree`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#filter_block_tree)
    ///
    /// Adds viable blocks in the subtree rooted at `block_root` to `blocks`.
    /// A block is viable if it leads to a leaf whose state agrees with the store's justified and
    /// finalized checkpoints. Returns whether `block_root` itself is viable.
    pub fn filter_block_tree(
        &self,
        block_root: H256,
        blocks: &mut HashMap<H256, Arc<SignedBeaconBlock<P>>>,
    ) -> bool {
        let children = self.children_by_parent();

        // Parents come before their children.
        let mut subtree = vec![block_root];
        let mut position = 0;

        while let Some(root) = subtree.get(position).copied() {
            subtree.extend(children.get(&root).into_iter().flatten().copied());
            position += 1;
        }

        let mut viable = StdHashSet::new();

        for root in subtree.into_iter().rev() {
            let is_viable = match children.get(&root) {
                Some(children) => children.iter().any(|child| viable.contains(child)),
                None => self.is_viable_leaf(root),
            };

            if !is_viable {
                continue;
            }

            if let Some(block) = self.blocks.get(&root) {
                blocks.insert(root, Arc::clone(block));
            }

            viable.insert(root);
        }

        viable.contains(&block_root)
    }

    fn is_viable_leaf(&self, block_root: H256) -> bool {
        let Some(state) = self.block_states.get(&block_root) else {
            return false;
        };

        let correct_justified = self.justified_checkpoint.epoch == GENESIS_EPOCH
            || state.current_justified_checkpoint == self.justified_checkpoint;

        let correct_finalized = self.finalized_checkpoint.epoch == GENESIS_EPOCH
            || state.finalized_checkpoint == self.finalized_checkpoint;

        correct_justified && correct_finalized
    }

    fn children_by_parent(&self) -> std::collections::HashMap<H256, Vec<H256>> {
        self.blocks
            .iter()
            .map(|(root, block)| (block.message.parent_root, *root))
            .into_group_map()
    }

    /// [`get_filtered_block_tree`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#get_filtered_block_tree)
    #[must_use]
    pub fn get_filtered_block_tree(&self) -> HashMap<H256, Arc<SignedBeaconBlock<P>>> {
        let mut blocks = HashMap::new();
        self.filter_block_tree(self.justified_checkpoint.root, &mut blocks);
        blocks
    }

    /// [`get_head`](https://github.com/ethereum/consensus-specs/blob/v1.1.10/specs/phase0/fork-choice.md#get_head)
    ///
    /// Ties between children with equal weight are broken in favor of the greater root.
    pub fn get_head(&self) -> Result<H256> {
        let blocks = self.get_filtered_block_tree();
        let justified_state = self.checkpoint_state(self.justified_checkpoint)?;

        let children = blocks
            .iter()
            .map(|(root, block)| (block.message.parent_root, *root))
            .into_group_map();

        let mut head = self.justified_checkpoint.root;

        while let Some(candidates) = children.get(&head) {
            let best = itertools::process_results(
                candidates.iter().map(|root| {
                    self.attesting_balance(&justified_state, *root)
                        .map(|weight| (weight, *root))
                }),
                |iter| iter.max(),
            )?;

            match best {
                Some((_, root)) => head = root,
                None => break,
            }
        }

        Ok(head)
    }

    /// Execution block hashes of the head, the justified block and the finalized block.
    ///
    /// Blocks from before the merge contribute a zero hash.
    pub fn fork_choice_state(&self, head_root: H256) -> Result<ForkChoiceState> {
        let block_hash = |block_root: H256| -> Result<ExecutionBlockHash> {
            let block = self
                .blocks
                .get(&block_root)
                .ok_or(Error::<P>::UnknownBlock { block_root })?;

            Ok(block.message.body.execution_payload.block_hash)
        };

        Ok(ForkChoiceState {
            head_block_hash: block_hash(head_root)?,
            safe_block_hash: block_hash(self.justified_checkpoint.root)?,
            finalized_block_hash: block_hash(self.finalized_checkpoint.root)?,
        })
    }

    /// Removes blocks and states that do not descend from the finalized checkpoint.
    ///
    /// The store is never pruned implicitly. Callers decide when memory should be reclaimed.
    /// Returns the number of blocks removed.
    pub fn prune_finalized(&mut self) -> usize {
        let finalized_root = self.finalized_checkpoint.root;
        let finalized_slot = self.finalized_slot();

        let retained = self
            .blocks
            .iter()
            .filter(|(root, block)| {
                **root == finalized_root
                    || (block.message.slot > finalized_slot
                        && self.is_descendant_of_finalized(**root))
            })
            .map(|(root, _)| *root)
            .collect::<StdHashSet<_>>();

        let pruned = self.blocks.len() - retained.len();

        self.blocks.retain(|root, _| retained.contains(root));
        self.block_states.retain(|root, _| retained.contains(root));
        self.checkpoint_states.prune(self.finalized_checkpoint.epoch);

        debug!("pruned {pruned} blocks not descending from {:?}", self.finalized_checkpoint);

        pruned
    }
}

#[cfg(test)]
mod tests {
    use anyhow::bail;
    use bls::SignatureBytes;
    use execution_engine::NullExecutionEngine;
    use helper_functions::verifier::NullVerifier;
    use test_case::test_case;
    use types::{
        collections::VecExt as _,
        phase0::{containers::IndexedAttestation, primitives::Epoch},
        preset::Minimal,
    };

    use crate::test_helpers::{self, block_on, full_attestation, new_store, slot_start};

    use super::*;

    fn accept(store: &mut Store<Minimal>, block: Arc<SignedBeaconBlock<Minimal>>) -> Result<H256> {
        match store.on_block(block, NullExecutionEngine, NullVerifier)? {
            BlockAction::Accept(block_root) => Ok(block_root),
            action => bail!("block was not accepted: {action:?}"),
        }
    }

    // Two late blocks competing for slot 1.
    fn store_with_fork() -> Result<(Store<Minimal>, H256, H256)> {
        let mut store = new_store()?;
        let genesis_root = store.justified_checkpoint().root;

        store.on_tick(slot_start(2));

        let block_1 = block_on(&store, genesis_root, 1, 1)?;
        let block_2 = block_on(&store, genesis_root, 1, 2)?;
        let root_1 = accept(&mut store, block_1)?;
        let root_2 = accept(&mut store, block_2)?;

        Ok((store, root_1.min(root_2), root_1.max(root_2)))
    }

    #[test]
    fn anchor_block_must_commit_to_anchor_state() -> Result<()> {
        let (block, state) = test_helpers::genesis()?;

        let mut block = block.as_ref().clone();
        block.message.state_root = H256::repeat_byte(1);

        let result = Store::new(
            Arc::new(ChainConfig::minimal()),
            Arc::new(block),
            state,
            Arc::new(StateCache::default()),
        );

        assert!(matches!(
            result.map(|_| ()).unwrap_err().downcast_ref::<Error<Minimal>>(),
            Some(Error::AnchorStateRootMismatch { .. }),
        ));

        Ok(())
    }

    #[test]
    fn new_store_is_anchored_at_genesis() -> Result<()> {
        let store = new_store()?;
        let genesis_root = store.justified_checkpoint().root;

        assert_eq!(store.time(), test_helpers::GENESIS_TIME);
        assert_eq!(store.get_current_slot(), 0);
        assert_eq!(store.finalized_checkpoint(), store.justified_checkpoint());
        assert_eq!(store.best_justified_checkpoint(), store.justified_checkpoint());
        assert_eq!(store.get_head()?, genesis_root);
        assert!(store.proposer_boost_root().is_zero());

        Ok(())
    }

    #[test]
    fn head_ties_are_broken_by_greater_root() -> Result<()> {
        let (store, lower_root, greater_root) = store_with_fork()?;

        assert_ne!(lower_root, greater_root);
        assert_eq!(store.get_latest_attesting_balance(lower_root)?, 0);
        assert_eq!(store.get_latest_attesting_balance(greater_root)?, 0);
        assert_eq!(store.get_head()?, greater_root);

        Ok(())
    }

    #[test]
    fn on_tick_and_get_head_are_idempotent() -> Result<()> {
        let (mut store, _, _) = store_with_fork()?;

        let head = store.get_head()?;
        let time = store.time();

        store.on_tick(time);
        store.on_tick(time - 1);

        assert_eq!(store.time(), time);
        assert_eq!(store.get_head()?, head);
        assert_eq!(store.get_head()?, head);

        Ok(())
    }

    #[test]
    fn on_tick_crosses_every_slot_boundary() -> Result<()> {
        let mut store = new_store()?;

        store.on_tick(slot_start(10) + 1);

        assert_eq!(store.get_current_slot(), 10);
        assert_eq!(store.time(), slot_start(10) + 1);

        Ok(())
    }

    #[test]
    fn timely_block_is_boosted_until_next_slot() -> Result<()> {
        let (mut store, lower_root, greater_root) = store_with_fork()?;

        let block = block_on(&store, lower_root, 2, 3)?;
        let boosted_root = accept(&mut store, block)?;

        assert_eq!(store.proposer_boost_root(), boosted_root);
        assert!(store.get_latest_attesting_balance(lower_root)? > 0);
        assert_eq!(store.get_head()?, boosted_root);

        store.on_tick(slot_start(3));

        assert!(store.proposer_boost_root().is_zero());
        assert_eq!(store.get_head()?, greater_root);

        Ok(())
    }

    #[test]
    fn late_block_is_not_boosted() -> Result<()> {
        let (mut store, lower_root, _) = store_with_fork()?;

        store.on_tick(slot_start(2) + 2);

        let block = block_on(&store, lower_root, 2, 3)?;
        accept(&mut store, block)?;

        assert!(store.proposer_boost_root().is_zero());

        Ok(())
    }

    #[test]
    fn known_block_is_ignored() -> Result<()> {
        let (mut store, lower_root, _) = store_with_fork()?;
        let block = Arc::clone(store.block(lower_root).expect("block was just accepted"));

        assert!(matches!(
            store.on_block(block, NullExecutionEngine, NullVerifier)?,
            BlockAction::Ignore(block_root) if block_root == lower_root,
        ));

        Ok(())
    }

    #[test]
    fn block_from_future_slot_is_deferred() -> Result<()> {
        let mut store = new_store()?;
        let genesis_root = store.justified_checkpoint().root;
        let block = block_on(&store, genesis_root, 3, 0)?;

        store.on_tick(slot_start(2));

        assert!(matches!(
            store.on_block(Arc::clone(&block), NullExecutionEngine, NullVerifier)?,
            BlockAction::Defer(_, DeferReason::FutureSlot(3)),
        ));

        store.on_tick(slot_start(3));

        let block_root = accept(&mut store, block)?;

        assert_eq!(store.get_head()?, block_root);

        Ok(())
    }

    #[test]
    fn block_with_unknown_parent_is_deferred() -> Result<()> {
        let mut store = new_store()?;
        let genesis_root = store.justified_checkpoint().root;
        let unknown_root = H256::repeat_byte(0xaa);

        store.on_tick(slot_start(2));

        let mut block = block_on(&store, genesis_root, 1, 0)?.as_ref().clone();
        block.message.parent_root = unknown_root;

        assert!(matches!(
            store.on_block(Arc::new(block), NullExecutionEngine, NullVerifier)?,
            BlockAction::Defer(_, DeferReason::UnknownParent(root)) if root == unknown_root,
        ));

        assert_eq!(store.block_count(), 1);

        Ok(())
    }

    #[test]
    fn invalid_block_is_rejected_without_changing_store() -> Result<()> {
        let mut store = new_store()?;
        let genesis_root = store.justified_checkpoint().root;

        store.on_tick(slot_start(1));

        let mut block = block_on(&store, genesis_root, 1, 0)?.as_ref().clone();
        block.message.state_root = H256::repeat_byte(0xbb);

        store
            .on_block(Arc::new(block), NullExecutionEngine, NullVerifier)
            .expect_err("state root does not match");

        assert_eq!(store.block_count(), 1);
        assert!(store.proposer_boost_root().is_zero());

        Ok(())
    }

    #[test]
    fn attestations_move_head_to_attested_branch() -> Result<()> {
        let (mut store, lower_root, _) = store_with_fork()?;
        let (attestation, committee) = full_attestation(&store, 1, lower_root)?;

        assert!(matches!(
            store.on_attestation(attestation, AttestationOrigin::Gossip, NullVerifier)?,
            AttestationAction::Accept,
        ));

        let committee_size = u64::try_from(committee.len())?;
        let committee_balance = committee_size * <Minimal as Preset>::MAX_EFFECTIVE_BALANCE;

        assert_eq!(store.get_latest_attesting_balance(lower_root)?, committee_balance);
        assert_eq!(store.get_head()?, lower_root);

        for validator_index in committee {
            assert_eq!(
                store.latest_message(validator_index),
                Some(LatestMessage {
                    epoch: 0,
                    root: lower_root,
                }),
            );
        }

        Ok(())
    }

    #[test]
    fn attestation_from_current_slot_is_deferred() -> Result<()> {
        let (mut store, lower_root, _) = store_with_fork()?;

        let block = block_on(&store, lower_root, 2, 3)?;
        let block_root = accept(&mut store, block)?;
        let (attestation, _) = full_attestation(&store, 2, block_root)?;

        assert!(matches!(
            store.on_attestation(attestation, AttestationOrigin::Gossip, NullVerifier)?,
            AttestationAction::Defer(_, DeferReason::FutureSlot(3)),
        ));

        Ok(())
    }

    #[test]
    fn attestation_for_unknown_block_is_deferred() -> Result<()> {
        let (mut store, _, _) = store_with_fork()?;
        let unknown_root = H256::repeat_byte(0xcc);
        let (attestation, _) = full_attestation(&store, 1, unknown_root)?;

        assert!(matches!(
            store.on_attestation(attestation, AttestationOrigin::Gossip, NullVerifier)?,
            AttestationAction::Defer(_, DeferReason::UnknownBlock(root)) if root == unknown_root,
        ));

        Ok(())
    }

    #[test_case(AttestationOrigin::Gossip, false; "rejected from gossip")]
    #[test_case(AttestationOrigin::Block, true; "accepted from block")]
    fn attestation_from_old_epoch(origin: AttestationOrigin, accepted: bool) -> Result<()> {
        let (mut store, lower_root, _) = store_with_fork()?;
        let (attestation, _) = full_attestation(&store, 1, lower_root)?;

        store.on_tick(slot_start(3 * <Minimal as Preset>::SlotsPerEpoch::U64));

        let result = store.on_attestation(attestation, origin, NullVerifier);

        if accepted {
            assert!(matches!(result?, AttestationAction::Accept));
        } else {
            assert!(matches!(
                result.map(|_| ()).unwrap_err().downcast_ref::<Error<Minimal>>(),
                Some(Error::AttestationFromWrongEpoch { target_epoch: 0, current_epoch: 3 }),
            ));
        }

        Ok(())
    }

    #[test]
    fn later_messages_only_replace_earlier_epochs() -> Result<()> {
        let (mut store, lower_root, greater_root) = store_with_fork()?;
        let (first, committee) = full_attestation(&store, 1, lower_root)?;
        let (second, _) = full_attestation(&store, 1, greater_root)?;

        store.on_attestation(first, AttestationOrigin::Gossip, NullVerifier)?;
        store.on_attestation(second, AttestationOrigin::Gossip, NullVerifier)?;

        assert_eq!(
            store.latest_message(committee[0]).map(|message| message.root),
            Some(lower_root),
        );

        Ok(())
    }

    #[test]
    fn equivocating_validators_lose_their_weight() -> Result<()> {
        let (mut store, lower_root, _) = store_with_fork()?;
        let (attestation, committee) = full_attestation(&store, 1, lower_root)?;

        store.on_attestation(Arc::clone(&attestation), AttestationOrigin::Gossip, NullVerifier)?;

        let equivocator = committee[0];

        let indexed_attestation = |beacon_block_root| -> Result<IndexedAttestation<Minimal>> {
            Ok(IndexedAttestation {
                attesting_indices: vec![equivocator].into_variable_list()?,
                data: AttestationData {
                    beacon_block_root,
                    ..attestation.data
                },
                signature: SignatureBytes::empty(),
            })
        };

        let attester_slashing = Arc::new(AttesterSlashing {
            attestation_1: indexed_attestation(H256::repeat_byte(1))?,
            attestation_2: indexed_attestation(H256::repeat_byte(2))?,
        });

        let balance_before = store.get_latest_attesting_balance(lower_root)?;

        assert_eq!(
            store.on_attester_slashing(Arc::clone(&attester_slashing), NullVerifier)?,
            1,
        );
        assert_eq!(store.on_attester_slashing(attester_slashing, NullVerifier)?, 0);
        assert!(store.is_equivocating(equivocator));

        assert_eq!(
            store.get_latest_attesting_balance(lower_root)?,
            balance_before - <Minimal as Preset>::MAX_EFFECTIVE_BALANCE,
        );

        Ok(())
    }

    #[test]
    fn attester_slashing_must_be_slashable() -> Result<()> {
        let mut store = new_store()?;

        let indexed_attestation = IndexedAttestation {
            attesting_indices: vec![1].into_variable_list()?,
            data: AttestationData::default(),
            signature: SignatureBytes::empty(),
        };

        let attester_slashing = Arc::new(AttesterSlashing {
            attestation_1: indexed_attestation.clone(),
            attestation_2: indexed_attestation,
        });

        store
            .on_attester_slashing(attester_slashing, NullVerifier)
            .expect_err("identical attestations are not slashable");

        assert!(!store.is_equivocating(1));

        Ok(())
    }

    #[test]
    fn justified_checkpoint_updates_early_in_epoch_or_on_same_chain() -> Result<()> {
        let (mut store, lower_root, _) = store_with_fork()?;

        let unrelated = Checkpoint {
            epoch: 1,
            root: H256::repeat_byte(0xdd),
        };

        let descendant = Checkpoint {
            epoch: 1,
            root: lower_root,
        };

        store.on_tick(slot_start(8));

        assert!(store.should_update_justified_checkpoint(unrelated));

        // `SAFE_SLOTS_TO_UPDATE_JUSTIFIED` is 2 in the minimal configuration.
        store.on_tick(slot_start(10));

        assert!(!store.should_update_justified_checkpoint(unrelated));
        assert!(store.should_update_justified_checkpoint(descendant));

        Ok(())
    }

    #[test]
    fn get_ancestor_walks_back_to_latest_block_at_or_before_slot() -> Result<()> {
        let (mut store, lower_root, _) = store_with_fork()?;
        let genesis_root = store.justified_checkpoint().root;

        store.on_tick(slot_start(4));

        let block = block_on(&store, lower_root, 4, 0)?;
        let tip_root = accept(&mut store, block)?;

        assert_eq!(store.get_ancestor(tip_root, 4), Some(tip_root));
        assert_eq!(store.get_ancestor(tip_root, 3), Some(lower_root));
        assert_eq!(store.get_ancestor(tip_root, 1), Some(lower_root));
        assert_eq!(store.get_ancestor(tip_root, 0), Some(genesis_root));
        assert_eq!(store.get_ancestor(H256::repeat_byte(0xee), 0), None);

        Ok(())
    }

    #[test]
    fn filtered_block_tree_contains_all_viable_branches() -> Result<()> {
        let (store, lower_root, greater_root) = store_with_fork()?;
        let genesis_root = store.justified_checkpoint().root;

        let blocks = store.get_filtered_block_tree();

        assert_eq!(blocks.len(), 3);
        assert!(blocks.contains_key(&genesis_root));
        assert!(blocks.contains_key(&lower_root));
        assert!(blocks.contains_key(&greater_root));

        Ok(())
    }

    #[test]
    fn checkpoint_state_is_advanced_to_epoch_start() -> Result<()> {
        let (store, lower_root, _) = store_with_fork()?;

        let checkpoint = Checkpoint {
            epoch: 1,
            root: lower_root,
        };

        let state = store.checkpoint_state(checkpoint)?;

        assert_eq!(state.slot, <Minimal as Preset>::SlotsPerEpoch::U64);
        assert_eq!(state.latest_block_header.slot, 1);

        Ok(())
    }

    #[test]
    fn fork_choice_state_is_zero_before_merge() -> Result<()> {
        let (store, lower_root, _) = store_with_fork()?;

        assert_eq!(store.fork_choice_state(lower_root)?, ForkChoiceState::default());

        Ok(())
    }

    #[test]
    fn pruning_keeps_descendants_of_finalized_block() -> Result<()> {
        let (mut store, _, _) = store_with_fork()?;

        assert_eq!(store.prune_finalized(), 0);
        assert_eq!(store.block_count(), 3);

        Ok(())
    }

    fn checkpoint(epoch: Epoch, root: H256) -> Checkpoint {
        Checkpoint { epoch, root }
    }

    // A copy of the genesis state that claims the given checkpoints.
    fn state_with_checkpoints(
        store: &Store<Minimal>,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
    ) -> BeaconState<Minimal> {
        let genesis_root = store.finalized_checkpoint().root;
        let mut state = store
            .block_state(genesis_root)
            .expect("anchor state is always present")
            .as_ref()
            .clone();

        state.current_justified_checkpoint = justified_checkpoint;
        state.finalized_checkpoint = finalized_checkpoint;
        state
    }

    #[test_case(true; "descendant of finalized block is promoted")]
    #[test_case(false; "block on another branch is not promoted")]
    fn best_justified_checkpoint_is_promoted_at_epoch_start(on_finalized_chain: bool) -> Result<()> {
        let (mut store, lower_root, greater_root) = store_with_fork()?;

        let finalized_checkpoint = checkpoint(1, lower_root);
        let best_root = if on_finalized_chain { lower_root } else { greater_root };
        let best_justified_checkpoint = checkpoint(2, best_root);

        store.on_tick(slot_start(14));

        store.finalized_checkpoint = finalized_checkpoint;
        store.justified_checkpoint = finalized_checkpoint;
        store.best_justified_checkpoint = best_justified_checkpoint;

        store.on_tick(slot_start(15));

        assert_eq!(store.justified_checkpoint(), finalized_checkpoint);

        store.on_tick(slot_start(16));

        let expected = if on_finalized_chain {
            best_justified_checkpoint
        } else {
            finalized_checkpoint
        };

        assert_eq!(store.justified_checkpoint(), expected);
        assert_eq!(store.best_justified_checkpoint(), best_justified_checkpoint);

        Ok(())
    }

    #[test]
    fn newer_justified_checkpoint_is_adopted_early_in_epoch() -> Result<()> {
        let mut store = new_store()?;
        let justified_checkpoint = checkpoint(1, H256::repeat_byte(0xdd));
        let finalized_checkpoint = store.finalized_checkpoint();

        store.on_tick(slot_start(8));
        store.update_checkpoints(&state_with_checkpoints(
            &store,
            justified_checkpoint,
            finalized_checkpoint,
        ));

        assert_eq!(store.justified_checkpoint(), justified_checkpoint);
        assert_eq!(store.best_justified_checkpoint(), justified_checkpoint);
        assert_eq!(store.finalized_checkpoint(), finalized_checkpoint);

        Ok(())
    }

    #[test]
    fn conflicting_justified_checkpoint_late_in_epoch_only_becomes_best() -> Result<()> {
        let mut store = new_store()?;
        let genesis_checkpoint = store.justified_checkpoint();
        let justified_checkpoint = checkpoint(1, H256::repeat_byte(0xdd));

        store.on_tick(slot_start(10));
        store.update_checkpoints(&state_with_checkpoints(
            &store,
            justified_checkpoint,
            genesis_checkpoint,
        ));

        assert_eq!(store.justified_checkpoint(), genesis_checkpoint);
        assert_eq!(store.best_justified_checkpoint(), justified_checkpoint);

        // Older checkpoints never replace the best one.
        store.update_checkpoints(&state_with_checkpoints(
            &store,
            genesis_checkpoint,
            genesis_checkpoint,
        ));

        assert_eq!(store.best_justified_checkpoint(), justified_checkpoint);

        Ok(())
    }

    #[test]
    fn finalization_overwrites_justified_checkpoint() -> Result<()> {
        let (mut store, lower_root, _) = store_with_fork()?;
        let justified_checkpoint = checkpoint(2, H256::repeat_byte(0xdd));
        let finalized_checkpoint = checkpoint(1, lower_root);

        // Late in the epoch a conflicting justified checkpoint alone would not be adopted.
        store.on_tick(slot_start(18));

        assert!(!store.should_update_justified_checkpoint(justified_checkpoint));

        store.update_checkpoints(&state_with_checkpoints(
            &store,
            justified_checkpoint,
            finalized_checkpoint,
        ));

        assert_eq!(store.finalized_checkpoint(), finalized_checkpoint);
        assert_eq!(store.justified_checkpoint(), justified_checkpoint);
        assert_eq!(store.best_justified_checkpoint(), justified_checkpoint);

        Ok(())
    }

    #[test]
    fn validated_block_is_rejected_if_finalized_chain_moved_away() -> Result<()> {
        let (mut store, lower_root, greater_root) = store_with_fork()?;

        let block = block_on(&store, greater_root, 2, 0)?;

        let BlockValidation::Valid(valid_block) =
            store.validate_block(block, NullExecutionEngine, NullVerifier)?
        else {
            bail!("block should be valid before finalization moves");
        };

        store.finalized_checkpoint = checkpoint(0, lower_root);

        let result = store.apply_block(valid_block);

        assert!(matches!(
            result.map(|_| ()).unwrap_err().downcast_ref::<Error<Minimal>>(),
            Some(Error::BlockNotDescendantOfFinalized { .. }),
        ));

        assert_eq!(store.block_count(), 3);

        Ok(())
    }
}
