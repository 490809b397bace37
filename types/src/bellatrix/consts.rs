use core::num::NonZeroU64;

use nonzero_ext::nonzero;

use crate::bellatrix::primitives::Gas;

pub const GAS_LIMIT_DENOMINATOR: NonZeroU64 = nonzero!(1024_u64);
pub const MIN_GAS_LIMIT: Gas = 5000;
