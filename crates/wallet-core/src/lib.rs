//! # wallet-core
//!
//! Outward facade over the transaction crates: configuration loading, the
//! protocol codec seam, transaction files, batch signing and logging setup.

pub mod batch;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod tx_file;

pub use batch::{sign_batch, sign_files, BatchOutcome, BatchSummary};
pub use chain_btc::config::TxConfig;
pub use chain_btc::lifecycle::TxState;
pub use codec::{codec_for, BitcoinCodec, ProtocolTag, TxCodec};
pub use config::{load_config, parse_config};
pub use error::WalletError;
pub use tx_file::{format_tx_file, parse_tx_file, read_tx_file, write_tx_file, TxFileKind};
