//! Wrappers around cryptographic primitives provided by other crates.

pub(crate) mod pubkey;
