pub use crate::{
    execution_engine::{
        ExecutionEngine, ExecutionEngineV2, MockExecutionEngine, NullExecutionEngine,
    },
    types::{ForkChoiceState, PayloadAttributes, PayloadId, PayloadStatus, PayloadValidationStatus},
};

mod execution_engine;
mod types;
