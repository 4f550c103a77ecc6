//! Signing many transactions in one run.
//!
//! Per-item failures (signer errors, negotiation problems) are counted and
//! the run goes on; malformed input and integrity failures stop it.

use std::fmt;
use std::path::{Path, PathBuf};

use chain_btc::config::TxConfig;
use chain_btc::error::BtcError;
use chain_btc::lifecycle::{SignOutcome, SignedTx, TxState, UnsignedTx};
use chain_btc::rpc::{DaemonSession, RpcTransport};
use chain_btc::signer::SigningKey;
use tracing::{info, warn};

use crate::error::WalletError;
use crate::tx_file::{read_tx_file, write_tx_file};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub signed: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn all_ok(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transaction{} signed, {} failed",
            self.signed,
            if self.signed == 1 { "" } else { "s" },
            self.failed
        )
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub signed: Vec<SignedTx>,
    /// Transactions handed back unsigned, with the reason.
    pub failed: Vec<(UnsignedTx, String)>,
}

impl BatchOutcome {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            signed: self.signed.len(),
            failed: self.failed.len(),
        }
    }
}

async fn sign_one<T: RpcTransport>(
    session: &DaemonSession<T>,
    tx: UnsignedTx,
    keys: &[SigningKey],
    cfg: &TxConfig,
) -> Result<SignOutcome, BtcError> {
    let id = tx.record().content_id().to_string();
    let fallback = tx.clone();
    match tx.sign(session, keys, cfg).await {
        Err(e) if !e.is_fatal() => {
            warn!(content_id = %id, error = %e, "transaction not signed");
            Ok(SignOutcome::Failed {
                tx: fallback,
                reason: e.to_string(),
            })
        }
        other => other,
    }
}

/// Sign each transaction in turn.
pub async fn sign_batch<T: RpcTransport>(
    session: &DaemonSession<T>,
    txs: Vec<UnsignedTx>,
    keys: &[SigningKey],
    cfg: &TxConfig,
) -> Result<BatchOutcome, BtcError> {
    let mut outcome = BatchOutcome::default();
    for tx in txs {
        match sign_one(session, tx, keys, cfg).await? {
            SignOutcome::Signed(s) => outcome.signed.push(s),
            SignOutcome::Failed { tx, reason } => outcome.failed.push((tx, reason)),
        }
    }
    info!(summary = %outcome.summary(), "batch signing finished");
    Ok(outcome)
}

/// Sign unsigned transaction files, writing signed files into `out_dir`.
/// Files that do not hold an unsigned transaction count as failures.
pub async fn sign_files<T: RpcTransport>(
    session: &DaemonSession<T>,
    paths: &[PathBuf],
    out_dir: &Path,
    keys: &[SigningKey],
    cfg: &TxConfig,
) -> Result<(BatchSummary, Vec<PathBuf>), WalletError> {
    let mut summary = BatchSummary::default();
    let mut written = Vec::new();
    for path in paths {
        let tx = match read_tx_file(path, cfg)? {
            TxState::Unsigned(tx) => tx,
            other => {
                warn!(path = %path.display(), state = other.name(), "not an unsigned transaction, skipping");
                summary.failed += 1;
                continue;
            }
        };
        match sign_one(session, tx, keys, cfg).await? {
            SignOutcome::Signed(signed) => {
                written.push(write_tx_file(&TxState::Signed(signed), out_dir, cfg)?);
                summary.signed += 1;
            }
            SignOutcome::Failed { reason, .. } => {
                warn!(path = %path.display(), %reason, "signing failed");
                summary.failed += 1;
            }
        }
    }
    info!(%summary, "signed transaction files");
    Ok((summary, written))
}
