pub mod accessors;
pub mod error;
pub mod eth1;
pub mod misc;
pub mod mutators;
pub mod predicates;
pub mod signing;
pub mod verifier;

pub use error::{Error, SignatureKind};
