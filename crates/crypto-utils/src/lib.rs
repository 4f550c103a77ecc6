//! # crypto-utils
//!
//! Hashing and text-armor helpers shared by the wallet crates: SHA-256
//! digests, HASH160, the six-character checksum used for transaction ids and
//! file integrity lines, and base58 armor for free-form comments.

pub mod armor;
pub mod digest;
pub mod error;

pub use error::CryptoError;
