//! Blockchain rescans for the tracking wallet.

use std::collections::BTreeSet;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::amount::Amount;
use crate::config::TxConfig;
use crate::error::BtcError;
use crate::rpc::{DaemonSession, RpcTransport};

/// Blocks per `rescanblockchain` call.
pub const RESCAN_CHUNK: u64 = 100;

/// Inclusive block ranges of at most [`RESCAN_CHUNK`] blocks covering
/// `start..=stop`.
pub fn rescan_chunks(start: u64, stop: u64) -> Vec<(u64, u64)> {
    (start..=stop)
        .step_by(RESCAN_CHUNK as usize)
        .map(|a| (a, (a + RESCAN_CHUNK - 1).min(stop)))
        .collect()
}

async fn rescan_chunk<T: RpcTransport>(session: &DaemonSession<T>, a: u64, b: u64) -> Result<(), BtcError> {
    debug!(start = a, stop = b, "rescanning blocks");
    let res = session.call_slow("rescanblockchain", vec![json!(a), json!(b)]).await?;
    if res["start_height"].as_u64() != Some(a) || res["stop_height"].as_u64() != Some(b) {
        return Err(BtcError::RescanMismatch(format!("an error occurred in block range {a}-{b}")));
    }
    Ok(())
}

/// Rescan blocks `start..=stop`. Without `stop`, keep scanning until the
/// chain tip stops moving. Returns the last block scanned.
pub async fn rescan_range<T: RpcTransport>(
    session: &DaemonSession<T>,
    start: u64,
    stop: Option<u64>,
) -> Result<u64, BtcError> {
    let tip = session.info().blockcount;
    let end = match stop {
        Some(s) if s < start => return Err(BtcError::InvalidBlockRange(format!("{start} {s}"))),
        Some(s) if s > tip => {
            return Err(BtcError::InvalidBlockRange(format!(
                "{s}: stop value is higher than chain tip {tip}"
            )))
        }
        Some(s) => s,
        None => tip,
    };
    for (a, b) in rescan_chunks(start, end) {
        rescan_chunk(session, a, b).await?;
    }
    let mut last = end;

    if stop.is_none() {
        loop {
            let reply = session.call("getblockcount", vec![]).await?;
            let tip = reply.as_u64().ok_or_else(|| BtcError::RpcReply {
                method: "getblockcount".into(),
                detail: reply.to_string(),
            })?;
            if last >= tip {
                break;
            }
            for (a, b) in rescan_chunks(last + 1, tip) {
                rescan_chunk(session, a, b).await?;
            }
            last = tip;
        }
    }
    info!(start, stop = last, "rescan complete");
    Ok(last)
}

/// An unspent output found by a UTXO set scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedUnspent {
    pub txid: String,
    pub vout: u32,
    pub height: u64,
    pub amount: Amount,
}

fn parse_unspent(v: &Value) -> Result<ScannedUnspent, BtcError> {
    let bad = || BtcError::RpcReply {
        method: "scantxoutset".into(),
        detail: v.to_string(),
    };
    Ok(ScannedUnspent {
        txid: v["txid"].as_str().ok_or_else(bad)?.to_string(),
        vout: v["vout"].as_u64().and_then(|n| u32::try_from(n).ok()).ok_or_else(bad)?,
        height: v["height"].as_u64().ok_or_else(bad)?,
        amount: Amount::from_rpc_value(&v["amount"])?,
    })
}

/// Scan the UTXO set for outputs paying to `addrs`, logging progress every
/// `scan_poll_ms` until the scan completes.
pub async fn scan_utxo_set<T: RpcTransport>(
    session: &DaemonSession<T>,
    addrs: &[String],
    cfg: &TxConfig,
) -> Result<Vec<ScannedUnspent>, BtcError> {
    let descriptors: Vec<String> = addrs.iter().map(|a| format!("addr({a})")).collect();
    let scan = session.call_slow("scantxoutset", vec![json!("start"), json!(descriptors)]);
    tokio::pin!(scan);
    let mut ticker = tokio::time::interval(cfg.scan_poll_interval());
    ticker.tick().await;

    let res = loop {
        tokio::select! {
            res = &mut scan => break res?,
            _ = ticker.tick() => {
                match session.call("scantxoutset", vec![json!("status")]).await {
                    Ok(status) => {
                        if let Some(p) = status["progress"].as_f64() {
                            info!(progress = p, "scanning UTXO set");
                        }
                    }
                    Err(e) => warn!(error = %e, "scan status unavailable"),
                }
            }
        }
    };

    if res["success"].as_bool() != Some(true) {
        return Err(BtcError::RescanMismatch("UTXO scanning failed or was interrupted".into()));
    }
    res["unspents"]
        .as_array()
        .map(|a| a.iter().map(parse_unspent).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}

/// Find the unspents of `addrs` and rescan only the blocks holding them.
/// Returns the number of blocks rescanned.
pub async fn rescan_addresses<T: RpcTransport>(
    session: &DaemonSession<T>,
    addrs: &[String],
    cfg: &TxConfig,
) -> Result<usize, BtcError> {
    let unspents = scan_utxo_set(session, addrs, cfg).await?;
    let blocks: BTreeSet<u64> = unspents.iter().map(|u| u.height).collect();
    info!(unspents = unspents.len(), blocks = blocks.len(), "found unspent outputs");
    for (n, block) in blocks.iter().enumerate() {
        debug!(block, n = n + 1, total = blocks.len(), "rescanning block");
        rescan_chunk(session, *block, *block).await?;
    }
    Ok(blocks.len())
}
