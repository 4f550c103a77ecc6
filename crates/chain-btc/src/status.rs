//! Chain status of a broadcast transaction.
//!
//! Probes run in order: mempool, confirmed in the tracking wallet, in the
//! chain but untracked, replaced. A probe whose call fails counts as "no
//! match"; only the detail queries made after a match report errors.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::BtcError;
use crate::rpc::{DaemonSession, RpcTransport};

/// A transaction replacing ours, and whether it is still in the mempool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub txid: String,
    pub in_mempool: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    InMempool {
        replaceable: bool,
        time_received: Option<DateTime<Utc>>,
    },
    Confirmed {
        confirmations: u64,
    },
    Replaced {
        /// Zero while the replacement is unconfirmed.
        replacing_confirmations: u64,
        replacements: Vec<Replacement>,
    },
    NotFound,
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxStatus::InMempool { replaceable, .. } => write!(
                f,
                "in mempool, {}replaceable",
                if *replaceable { "" } else { "NOT " }
            ),
            TxStatus::Confirmed { confirmations } => {
                write!(f, "{confirmations} confirmation{}", if *confirmations == 1 { "" } else { "s" })
            }
            TxStatus::Replaced { replacing_confirmations: 0, .. } => {
                f.write_str("replaced, replacement is in mempool")
            }
            TxStatus::Replaced { replacing_confirmations: n, .. } => {
                write!(f, "replaced, replacement has {n} confirmations")
            }
            TxStatus::NotFound => f.write_str("not found"),
        }
    }
}

async fn wallet_tx<T: RpcTransport>(session: &DaemonSession<T>, txid: &str) -> Result<Value, BtcError> {
    session.call("gettransaction", vec![json!(txid), json!(true), json!(false)]).await
}

async fn mempool_entry<T: RpcTransport>(session: &DaemonSession<T>, txid: &str) -> Option<Value> {
    session.call("getmempoolentry", vec![json!(txid)]).await.ok()
}

pub async fn probe_mempool<T: RpcTransport>(
    session: &DaemonSession<T>,
    txid: &str,
) -> Result<Option<TxStatus>, BtcError> {
    if mempool_entry(session, txid).await.is_none() {
        return Ok(None);
    }
    let tx = wallet_tx(session, txid).await?;
    Ok(Some(TxStatus::InMempool {
        replaceable: tx["bip125-replaceable"].as_str() == Some("yes"),
        time_received: tx["timereceived"].as_i64().and_then(|t| DateTime::from_timestamp(t, 0)),
    }))
}

pub async fn probe_confirmed<T: RpcTransport>(session: &DaemonSession<T>, txid: &str) -> Option<TxStatus> {
    let tx = wallet_tx(session, txid).await.ok()?;
    match tx["confirmations"].as_i64() {
        Some(n) if n > 0 => Some(TxStatus::Confirmed {
            confirmations: n.unsigned_abs(),
        }),
        _ => None,
    }
}

/// Whether the transaction is in the chain, found without the wallet.
pub async fn probe_in_chain<T: RpcTransport>(session: &DaemonSession<T>, txid: &str) -> bool {
    session
        .call("getrawtransaction", vec![json!(txid), json!(true)])
        .await
        .is_ok_and(|tx| tx.get("txid").is_some())
}

pub async fn probe_replaced<T: RpcTransport>(session: &DaemonSession<T>, txid: &str) -> Option<TxStatus> {
    if mempool_entry(session, txid).await.is_some() {
        return None;
    }
    let tx = wallet_tx(session, txid).await.ok()?;
    let confs = tx["confirmations"].as_i64().unwrap_or(1);
    if tx.get("bip125-replaceable").is_none() || confs > 0 {
        return None;
    }
    let conflicts: Vec<String> = tx["walletconflicts"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let mut replacements = Vec::with_capacity(conflicts.len());
    for id in conflicts {
        let in_mempool = mempool_entry(session, &id)
            .await
            .is_some_and(|e| e.get("height").is_some());
        replacements.push(Replacement { txid: id, in_mempool });
    }
    Some(TxStatus::Replaced {
        replacing_confirmations: confs.unsigned_abs(),
        replacements,
    })
}

/// Current status of a broadcast transaction.
///
/// A transaction in the chain but unknown to the tracking wallet is an
/// error: the wallet is out of sync.
pub async fn probe_status<T: RpcTransport>(session: &DaemonSession<T>, txid: &str) -> Result<TxStatus, BtcError> {
    let status = if let Some(s) = probe_mempool(session, txid).await? {
        s
    } else if let Some(s) = probe_confirmed(session, txid).await {
        s
    } else if probe_in_chain(session, txid).await {
        return Err(BtcError::InChainUntracked(txid.to_string()));
    } else if let Some(s) = probe_replaced(session, txid).await {
        s
    } else {
        TxStatus::NotFound
    };
    debug!(txid, %status, "transaction status");
    Ok(status)
}
