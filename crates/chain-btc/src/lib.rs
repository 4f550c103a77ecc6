//! Bitcoin-family transaction support for the cold wallet.
//!
//! Covers BTC, LTC and BCH: addresses and output scripts, the raw
//! transaction codec, size and fee estimation, BIP-69 ordering, the
//! create/sign/send lifecycle against an untrusted coin daemon, and status
//! and rescan queries.

pub mod address;
pub mod amount;
pub mod codec;
pub mod config;
pub mod error;
pub mod fee;
pub mod integrity;
pub mod io;
pub mod lifecycle;
pub mod network;
pub mod params;
pub mod resolve;
pub mod rpc;
pub mod scan;
pub mod script;
pub mod signer;
pub mod size;
pub mod sort;
pub mod status;

pub use amount::Amount;
pub use error::BtcError;
pub use params::{ChainParams, Coin};
