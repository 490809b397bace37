use ethereum_types::H64;
use serde::{Deserialize, Serialize};
use types::phase0::primitives::{ExecutionAddress, ExecutionBlockHash, UnixSeconds, H256};

/// [`ForkChoiceStateV1`](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/paris.md#forkchoicestatev1)
#[expect(clippy::struct_field_names)]
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkChoiceState {
    pub head_block_hash: ExecutionBlockHash,
    pub safe_block_hash: ExecutionBlockHash,
    pub finalized_block_hash: ExecutionBlockHash,
}

/// [`PayloadAttributesV1`](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/paris.md#payloadattributesv1)
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadAttributes {
    pub timestamp: UnixSeconds,
    pub prev_randao: H256,
    pub suggested_fee_recipient: ExecutionAddress,
}

/// [`PayloadStatusV1`](https://github.com/ethereum/execution-apis/blob/b7c5d3420e00648f456744d121ffbd929862924d/src/engine/paris.md#payloadstatusv1)
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStatus {
    pub status: PayloadValidationStatus,
    pub latest_valid_hash: Option<ExecutionBlockHash>,
    pub validation_error: Option<String>,
}

impl PayloadStatus {
    #[must_use]
    pub const fn new(status: PayloadValidationStatus) -> Self {
        Self {
            status,
            latest_valid_hash: None,
            validation_error: None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadValidationStatus {
    Valid,
    Invalid,
    Syncing,
    Accepted,
    InvalidBlockHash,
}

impl PayloadValidationStatus {
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub const fn is_invalid(self) -> bool {
        matches!(self, Self::Invalid | Self::InvalidBlockHash)
    }

    #[must_use]
    pub const fn is_syncing(self) -> bool {
        matches!(self, Self::Syncing | Self::Accepted)
    }
}

/// Identifier of a payload build process started by `notify_forkchoice_updated`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PayloadId(pub H64);

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_status_deserializes_from_engine_api_json() -> serde_json::Result<()> {
        let status = serde_json::from_value::<PayloadStatus>(json!({
            "status": "INVALID_BLOCK_HASH",
            "latestValidHash": null,
            "validationError": "bad hash",
        }))?;

        assert_eq!(status.status, PayloadValidationStatus::InvalidBlockHash);
        assert!(status.status.is_invalid());
        assert_eq!(status.validation_error.as_deref(), Some("bad hash"));

        Ok(())
    }

    #[test]
    fn fork_choice_state_serializes_in_camel_case() -> serde_json::Result<()> {
        let value = serde_json::to_value(ForkChoiceState::default())?;

        assert!(value.get("headBlockHash").is_some());
        assert!(value.get("safeBlockHash").is_some());
        assert!(value.get("finalizedBlockHash").is_some());

        Ok(())
    }

    #[test]
    fn syncing_and_accepted_are_neither_valid_nor_invalid() {
        for status in [PayloadValidationStatus::Syncing, PayloadValidationStatus::Accepted] {
            assert!(!status.is_valid());
            assert!(!status.is_invalid());
            assert!(status.is_syncing());
        }
    }
}
