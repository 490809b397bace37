use core::num::NonZeroU64;

pub type NonZeroGwei = NonZeroU64;
pub type ParticipationFlags = u8;
pub type SyncCommitteePeriod = u64;
