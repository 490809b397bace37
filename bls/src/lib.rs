//! BLS12-381 signatures in the minimal-public-key-size variant, backed by `blst`.
//!
//! Containers store [`PublicKeyBytes`] and [`SignatureBytes`] and only decompress them when
//! verifying. Validator public keys are stored as [`CachedPublicKey`] so that each one is
//! decompressed at most once.

pub use crate::{
    cached_public_key::CachedPublicKey,
    error::Error,
    public_key::PublicKey,
    public_key_bytes::PublicKeyBytes,
    secret_key::SecretKey,
    secret_key_bytes::SecretKeyBytes,
    signature::Signature,
    signature_bytes::SignatureBytes,
};

pub type AggregatePublicKey = PublicKey;
pub type AggregatePublicKeyBytes = PublicKeyBytes;
pub type AggregateSignature = Signature;
pub type AggregateSignatureBytes = SignatureBytes;

/// [Ciphersuite ID](https://datatracker.ietf.org/doc/html/draft-irtf-cfrg-bls-signature-04#section-4.2.3)
/// for the proof-of-possession scheme.
pub const DOMAIN_SEPARATION_TAG: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

mod cached_public_key;
mod error;
mod fixed_bytes;
mod public_key;
mod public_key_bytes;
mod secret_key;
mod secret_key_bytes;
mod signature;
mod signature_bytes;
