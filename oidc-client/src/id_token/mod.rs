//! ID token decoding and verification.

pub mod jws;
mod verifier;

pub use verifier::{IdTokenVerifier, Verification, VerifiedIdentity};
