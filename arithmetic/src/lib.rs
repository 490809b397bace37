use core::num::NonZeroU64;

use easy_ext::ext;
use num_integer::Roots as _;
use typenum::{NonZero, Unsigned};

#[ext(NonZeroExt)]
pub impl<N: Unsigned + NonZero> N {
    #[inline]
    #[must_use]
    fn non_zero() -> NonZeroU64 {
        NonZeroU64::new(Self::U64).unwrap_or(NonZeroU64::MIN)
    }
}

#[ext(U64Ext)]
pub impl u64 {
    #[inline]
    #[must_use]
    fn is_multiple_of_nonzero(self, factor: NonZeroU64) -> bool {
        self % factor == 0
    }

    #[inline]
    #[must_use]
    fn prev_multiple_of(self, factor: NonZeroU64) -> Self {
        self - self % factor
    }

    #[inline]
    #[must_use]
    fn div_typenum<N: Unsigned + NonZero>(self) -> Self {
        self / N::U64
    }

    #[inline]
    #[must_use]
    fn mod_typenum<N: Unsigned + NonZero>(self) -> Self {
        self % N::U64
    }

    /// Largest `x` such that `x * x <= self`.
    #[inline]
    #[must_use]
    fn integer_sqrt(self) -> Self {
        self.sqrt()
    }
}

#[ext(UsizeExt)]
pub impl usize {
    #[inline]
    #[must_use]
    fn div_typenum<N: Unsigned + NonZero>(self) -> Self {
        self / N::USIZE
    }

    #[inline]
    #[must_use]
    fn mod_typenum<N: Unsigned + NonZero>(self) -> Self {
        self % N::USIZE
    }
}

#[cfg(test)]
mod tests {
    use nonzero_ext::nonzero;
    use test_case::test_case;
    use typenum::{U32, U8};

    use super::*;

    const INCREMENT: NonZeroU64 = nonzero!(1_000_u64);

    #[test_case(0 => 0)]
    #[test_case(1 => 1)]
    #[test_case(3 => 1)]
    #[test_case(4 => 2)]
    #[test_case(1_u64 << 40 => 1 << 20)]
    #[test_case(u64::MAX => u64::from(u32::MAX))]
    fn integer_sqrt_rounds_down(value: u64) -> u64 {
        value.integer_sqrt()
    }

    #[test_case(0 => 0)]
    #[test_case(999 => 0)]
    #[test_case(1_000 => 1_000)]
    #[test_case(31_999 => 31_000)]
    fn prev_multiple_of_rounds_down(value: u64) -> u64 {
        value.prev_multiple_of(INCREMENT)
    }

    #[test]
    fn typenum_division_matches_plain_division() {
        assert_eq!(100_u64.div_typenum::<U32>(), 3);
        assert_eq!(100_u64.mod_typenum::<U32>(), 4);
        assert_eq!(17_usize.div_typenum::<U8>(), 2);
        assert_eq!(U32::non_zero().get(), 32);
    }
}
