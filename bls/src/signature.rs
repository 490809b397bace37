use core::num::NonZeroU64;

use blst::{
    blst_scalar,
    min_pk::{AggregateSignature as RawAggregateSignature, Signature as RawSignature},
    BLST_ERROR,
};
use derive_more::From;
use itertools::Itertools as _;
use rand::Rng as _;

use crate::{
    error::Error, public_key::PublicKey, signature_bytes::SignatureBytes, DOMAIN_SEPARATION_TAG,
};

const MULTI_VERIFY_RANDOM_BYTES: usize = size_of::<NonZeroU64>();
const MULTI_VERIFY_RANDOM_BITS: usize = MULTI_VERIFY_RANDOM_BYTES * 8;

#[derive(Clone, Copy, PartialEq, Eq, Debug, From)]
pub struct Signature(RawSignature);

impl Default for Signature {
    #[inline]
    fn default() -> Self {
        // Decompressing the point at infinity never fails.
        Self::try_from(SignatureBytes::empty()).unwrap_or_else(|_| {
            unreachable!("compressed signature constructed in SignatureBytes::empty is valid")
        })
    }
}

impl From<Signature> for SignatureBytes {
    #[inline]
    fn from(signature: Signature) -> Self {
        Self(signature.as_raw().compress())
    }
}

impl TryFrom<SignatureBytes> for Signature {
    type Error = Error;

    #[inline]
    fn try_from(bytes: SignatureBytes) -> Result<Self, Self::Error> {
        RawSignature::uncompress(bytes.as_bytes())
            .map(Self)
            .map_err(|_| Error::InvalidSignature)
    }
}

impl Signature {
    #[must_use]
    pub fn verify(&self, message: impl AsRef<[u8]>, public_key: &PublicKey) -> bool {
        let result = self.as_raw().verify(
            true,
            message.as_ref(),
            DOMAIN_SEPARATION_TAG,
            &[],
            public_key.as_raw(),
            false,
        );

        result == BLST_ERROR::BLST_SUCCESS
    }

    #[inline]
    #[must_use]
    pub fn aggregate(mut self, other: Self) -> Self {
        self.aggregate_in_place(other);
        self
    }

    #[inline]
    pub fn aggregate_in_place(&mut self, other: Self) {
        let mut self_aggregate = RawAggregateSignature::from_signature(self.as_raw());
        let other_aggregate = RawAggregateSignature::from_signature(other.as_raw());
        self_aggregate.add_aggregate(&other_aggregate);
        self.0 = self_aggregate.to_signature();
    }

    /// Returns `false` for an empty set of public keys.
    #[must_use]
    pub fn fast_aggregate_verify<'keys>(
        &self,
        message: impl AsRef<[u8]>,
        public_keys: impl IntoIterator<Item = &'keys PublicKey>,
    ) -> bool {
        let public_keys = public_keys.into_iter().map(PublicKey::as_raw).collect_vec();

        if public_keys.is_empty() {
            return false;
        }

        let result = self.as_raw().fast_aggregate_verify(
            true,
            message.as_ref(),
            DOMAIN_SEPARATION_TAG,
            public_keys.as_slice(),
        );

        result == BLST_ERROR::BLST_SUCCESS
    }

    /// Verifies many (message, signature, public key) triples at once.
    ///
    /// Each triple is weighted by a random nonzero scalar so that invalid signatures cannot
    /// cancel each other out.
    #[must_use]
    pub fn multi_verify<'all>(
        messages: impl IntoIterator<Item = &'all [u8]>,
        signatures: impl IntoIterator<Item = &'all Self>,
        public_keys: impl IntoIterator<Item = &'all PublicKey>,
    ) -> bool {
        let messages = messages.into_iter().collect_vec();
        let signatures = signatures.into_iter().map(Self::as_raw).collect_vec();
        let public_keys = public_keys.into_iter().map(PublicKey::as_raw).collect_vec();

        if signatures.is_empty() {
            return true;
        }

        // `ThreadRng` is cryptographically secure.
        let mut rng = rand::thread_rng();

        let randoms = core::iter::repeat_with(|| {
            let mut scalar = blst_scalar::default();
            let nonzero_bytes = rng.gen::<NonZeroU64>().get().to_le_bytes();
            scalar.b[..MULTI_VERIFY_RANDOM_BYTES].copy_from_slice(&nonzero_bytes);
            scalar
        })
        .take(signatures.len())
        .collect_vec();

        let result = RawSignature::verify_multiple_aggregate_signatures(
            messages.as_slice(),
            DOMAIN_SEPARATION_TAG,
            public_keys.as_slice(),
            false,
            signatures.as_slice(),
            true,
            randoms.as_slice(),
            MULTI_VERIFY_RANDOM_BITS,
        );

        result == BLST_ERROR::BLST_SUCCESS
    }

    const fn as_raw(&self) -> &RawSignature {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use tap::TryConv as _;

    use crate::{secret_key::SecretKey, secret_key_bytes::SecretKeyBytes};

    use super::*;

    const MESSAGE: &[u8] = b"foo";

    #[test]
    fn signature_verify_succeeds_on_correct_triple() {
        let secret_key = secret_key(b'?');
        let public_key = secret_key.to_public_key();
        let signature = secret_key.sign(MESSAGE);

        assert!(signature.verify(MESSAGE, &public_key));
    }

    #[test]
    fn signature_verify_fails_on_incorrect_public_key() {
        let signature = secret_key(b'?').sign(MESSAGE);
        let public_key = secret_key(b'!').to_public_key();

        assert!(!signature.verify(MESSAGE, &public_key));
    }

    #[test]
    fn signature_verify_fails_on_incorrect_signature() {
        let public_key = secret_key(b'?').to_public_key();

        assert!(!Signature::default().verify(MESSAGE, &public_key));
    }

    #[test]
    fn fast_aggregate_verify_accepts_aggregate_of_all_signers() {
        let secret_keys = [secret_key(b'?'), secret_key(b'!'), secret_key(b'#')];

        let signature = secret_keys
            .iter()
            .map(|secret_key| secret_key.sign(MESSAGE))
            .reduce(Signature::aggregate)
            .expect("there are 3 secret keys");

        let public_keys = secret_keys
            .iter()
            .map(SecretKey::to_public_key)
            .collect_vec();

        assert!(signature.fast_aggregate_verify(MESSAGE, &public_keys));
        assert!(!signature.fast_aggregate_verify(MESSAGE, &public_keys[..2]));
        assert!(!signature.fast_aggregate_verify(MESSAGE, []));
    }

    #[test]
    fn multi_verify_rejects_batch_with_one_bad_signature() {
        let first = secret_key(b'?');
        let second = secret_key(b'!');

        let messages = [b"a".as_slice(), b"b".as_slice()];
        let public_keys = [first.to_public_key(), second.to_public_key()];
        let good = [first.sign(messages[0]), second.sign(messages[1])];
        let bad = [first.sign(messages[0]), second.sign(messages[0])];

        assert!(Signature::multi_verify(messages, &good, &public_keys));
        assert!(!Signature::multi_verify(messages, &bad, &public_keys));
    }

    #[test]
    fn empty_signature_round_trips_through_bytes() {
        assert_eq!(SignatureBytes::from(Signature::default()), SignatureBytes::empty());
    }

    fn secret_key(byte: u8) -> SecretKey {
        SecretKeyBytes::from([byte; 32])
            .try_conv::<SecretKey>()
            .expect("bytes encode a valid secret key")
    }
}
