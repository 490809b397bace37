use core::fmt::Debug;

use derive_more::{AsMut, AsRef, From};
use static_assertions::assert_not_impl_any;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const SIZE: usize = 32;

#[derive(Default, AsRef, AsMut, From, Zeroize, ZeroizeOnDrop)]
#[as_ref(forward)]
#[as_mut(forward)]
pub struct SecretKeyBytes {
    pub(crate) bytes: [u8; SIZE],
}

// Secret keys must not leak through `Debug` output or accidental copies.
assert_not_impl_any!(SecretKeyBytes: Clone, Copy, Debug);

impl hex::FromHex for SecretKeyBytes {
    type Error = <[u8; SIZE] as hex::FromHex>::Error;

    fn from_hex<T: AsRef<[u8]>>(digits: T) -> Result<Self, Self::Error> {
        let bytes = hex::FromHex::from_hex(digits)?;
        Ok(Self { bytes })
    }
}
