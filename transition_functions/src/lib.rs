pub mod combined;

#[cfg(test)]
mod test_utils;

pub mod unphased {
    pub use block_processing::{
        validate_attestation, validate_attester_slashing, validate_attester_slashing_with_verifier,
        validate_proposer_slashing, validate_voluntary_exit, validate_voluntary_exit_with_verifier,
        verify_deposit_merkle_branch, CombinedDeposit,
    };
    pub use epoch_intermediates::{EpochDeltas, ValidatorSummary};
    pub use error::Error;
    pub use slot_processing::{process_slot, ProcessSlots};
    pub use state_transition::StateRootPolicy;

    pub(crate) use block_processing::{
        process_block_header, process_eth1_data, process_randao, process_voluntary_exit,
        validate_attestation_with_verifier, validate_deposits,
        validate_proposer_slashing_with_verifier,
    };
    pub(crate) use epoch_processing::{
        process_effective_balance_updates, process_eth1_data_reset,
        process_historical_roots_update, process_randao_mixes_reset, process_registry_updates,
        process_rewards_and_penalties, process_slashings_reset,
        should_process_justification_and_finalization, should_process_rewards_and_penalties,
        weigh_justification_and_finalization,
    };

    mod block_processing;
    mod epoch_intermediates;
    mod epoch_processing;
    mod error;
    mod slot_processing;
    mod state_transition;
}

pub mod altair {
    pub use epoch_intermediates::{
        AltairValidatorSummary, EpochDeltasForTransition, Participation, Statistics,
    };

    pub(crate) use block_processing::{
        apply_attestation, apply_deposits, process_deposit_data, process_sync_aggregate,
        verify_sync_aggregate_signature,
    };
    pub(crate) use epoch_intermediates::{epoch_deltas, statistics};
    pub(crate) use epoch_processing::{
        process_inactivity_updates, process_justification_and_finalization,
        process_participation_flag_updates, process_sync_committee_updates,
    };

    mod block_processing;
    mod epoch_intermediates;
    mod epoch_processing;
}

pub mod bellatrix {
    pub use block_processing::{
        process_attester_slashing, process_block, process_execution_payload, process_operations,
        process_proposer_slashing,
    };
    pub use epoch_processing::{process_epoch, process_slashings};
    pub use slot_processing::process_slots;
    pub use state_transition::{state_transition, verify_signatures};

    mod block_processing;
    mod epoch_processing;
    mod slot_processing;
    mod state_transition;
}
