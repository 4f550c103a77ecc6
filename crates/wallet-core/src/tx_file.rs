//! Transaction files.
//!
//! ```text
//! a3f2c1                                       checksum of the lines below
//! [COIN ]CHAIN ID SEND_AMT TIMESTAMP BLOCKCOUNT[ LT=n]
//! 0200000001...                                transaction hex
//! [{"txid":...}]                               inputs
//! [{"dest":...}]                               outputs
//! 2fHxH4sh... | -                              comment (optional)
//! 5d8f1c93...                                  coin txid (signed)
//! Sent 20261017_101500                         (sent)
//! ```
//!
//! Loading re-runs the integrity checks, so a file that parses is safe to
//! hand to the next lifecycle step.

use std::path::{Path, PathBuf};

use chain_btc::amount::Amount;
use chain_btc::config::TxConfig;
use chain_btc::error::BtcError;
use chain_btc::integrity::check_sigs;
use chain_btc::io::{TxInput, TxOutput};
use chain_btc::lifecycle::{SentTx, SignedTx, TxData, TxRecord, TxState, UnsignedTx};
use chain_btc::network::BtcNetwork;
use chain_btc::params::{ChainParams, Coin, Locktime};
use chrono::{DateTime, NaiveDateTime, Utc};
use crypto_utils::armor::{decode_text, encode_text};
use crypto_utils::digest::{chksum6, is_chksum6};
use tracing::{debug, info};

use crate::codec::{codec_for, ProtocolTag};
use crate::error::WalletError;

/// Metadata lines must be shorter than this.
pub const MAX_METADATA_LEN: usize = 100;

const TIMESTAMP_FMT: &str = "%Y%m%d_%H%M%S";
const SENT_PREFIX: &str = "Sent ";
const NO_COMMENT: &str = "-";

/// What a file holds, as shown by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFileKind {
    Unsigned,
    Signed,
    Sent,
}

impl TxFileKind {
    pub fn extension(self) -> &'static str {
        match self {
            TxFileKind::Unsigned => "rawtx",
            TxFileKind::Signed => "sigtx",
            TxFileKind::Sent => "subtx",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "rawtx" => Some(TxFileKind::Unsigned),
            "sigtx" => Some(TxFileKind::Signed),
            "subtx" => Some(TxFileKind::Sent),
            _ => None,
        }
    }

    /// Kind of file a state is written as. New and bump states have no
    /// file form.
    pub fn of_state(state: &TxState) -> Result<Self, WalletError> {
        match state {
            TxState::Unsigned(_) => Ok(TxFileKind::Unsigned),
            TxState::Signed(_) | TxState::OnlineSigned(_) => Ok(TxFileKind::Signed),
            TxState::Sent(_) => Ok(TxFileKind::Sent),
            other => Err(WalletError::tx_file(
                "state",
                format!("a {} transaction cannot be saved", other.name()),
            )),
        }
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FMT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FMT)
        .ok()
        .map(|n| n.and_utc())
}

fn record_and_txid(state: &TxState) -> Option<(&TxRecord, Option<&str>, Option<&DateTime<Utc>>)> {
    match state {
        TxState::Unsigned(t) => Some((t.record(), None, None)),
        TxState::Signed(t) => Some((t.record(), Some(t.coin_txid()), None)),
        TxState::OnlineSigned(t) => Some((t.signed().record(), Some(t.signed().coin_txid()), None)),
        TxState::Sent(t) => Some((t.record(), Some(t.coin_txid()), Some(&t.sent_timestamp))),
        TxState::New(_) | TxState::Bump(_) => None,
    }
}

fn metadata_line(record: &TxRecord) -> Result<String, WalletError> {
    let data = &record.data;
    let mut tokens = Vec::with_capacity(7);
    if data.params.coin != Coin::Btc {
        tokens.push(data.params.coin.symbol().to_string());
    }
    tokens.push(data.params.chain_name().to_ascii_uppercase());
    tokens.push(record.content_id().to_string());
    tokens.push(data.send_amount()?.to_string());
    tokens.push(format_timestamp(&record.timestamp));
    tokens.push(record.blockcount.to_string());
    if data.locktime != 0 {
        tokens.push(format!("LT={}", data.locktime));
    }
    let line = tokens.join(" ");
    if line.len() >= MAX_METADATA_LEN {
        return Err(WalletError::tx_file("metadata", format!("line too long ({} chars)", line.len())));
    }
    Ok(line)
}

fn file_checksum(lines: &[String]) -> String {
    chksum6(lines.join(" ").as_bytes())
}

/// Render a transaction as file text.
pub fn format_tx_file(state: &TxState) -> Result<String, WalletError> {
    let (record, coin_txid, sent) = record_and_txid(state).ok_or_else(|| {
        WalletError::tx_file("state", format!("a {} transaction cannot be saved", state.name()))
    })?;
    let json = |e: serde_json::Error| WalletError::tx_file("inputs/outputs", e.to_string());

    let mut lines = vec![
        metadata_line(record)?,
        record.serialized().to_string(),
        serde_json::to_string(&record.data.inputs).map_err(json)?,
        serde_json::to_string(&record.data.outputs).map_err(json)?,
    ];
    match &record.data.comment {
        Some(c) => lines.push(encode_text(c)),
        None if coin_txid.is_some() => lines.push(NO_COMMENT.to_string()),
        None => {}
    }
    if let Some(id) = coin_txid {
        lines.push(id.to_string());
    }
    if let Some(ts) = sent {
        lines.push(format!("{SENT_PREFIX}{}", format_timestamp(ts)));
    }

    let mut text = file_checksum(&lines);
    for line in &lines {
        text.push('\n');
        text.push_str(line);
    }
    text.push('\n');
    Ok(text)
}

struct Metadata {
    params: ChainParams,
    content_id: String,
    send_amount: Amount,
    timestamp: DateTime<Utc>,
    blockcount: u64,
    locktime: u32,
}

fn parse_metadata(line: &str) -> Result<Metadata, WalletError> {
    let bad = |detail: String| WalletError::tx_file("metadata", detail);
    if line.len() >= MAX_METADATA_LEN {
        return Err(bad(format!("line too long ({} chars)", line.len())));
    }
    let mut tokens: Vec<&str> = line.split(' ').collect();

    let locktime = match tokens.last().and_then(|t| t.strip_prefix("LT=")) {
        Some(lt) => {
            let lt = lt
                .parse::<u32>()
                .ok()
                .and_then(Locktime::from_consensus)
                .ok_or_else(|| bad(format!("invalid locktime '{lt}'")))?;
            tokens.pop();
            lt.to_consensus()
        }
        None => 0,
    };
    let coin = match tokens.len() {
        6 => tokens.remove(0).parse::<Coin>().map_err(|e| bad(e.to_string()))?,
        5 => Coin::Btc,
        n => return Err(bad(format!("expected 5 or 6 fields, found {n}"))),
    };
    let [chain, id, send, ts, blocks] = tokens[..] else {
        return Err(bad("wrong field count".into()));
    };
    if chain != chain.to_ascii_uppercase() {
        return Err(bad(format!("chain '{chain}' is not upper case")));
    }
    let network: BtcNetwork = chain.parse().map_err(|e: BtcError| bad(e.to_string()))?;
    if !is_chksum6(id) || id != id.to_ascii_uppercase() {
        return Err(bad(format!("invalid transaction id '{id}'")));
    }
    Ok(Metadata {
        params: ChainParams::new(coin, network),
        content_id: id.to_string(),
        send_amount: send
            .parse()
            .map_err(|_| bad(format!("invalid send amount '{send}'")))?,
        timestamp: parse_timestamp(ts).ok_or_else(|| bad(format!("invalid timestamp '{ts}'")))?,
        blockcount: blocks
            .parse()
            .map_err(|_| bad(format!("invalid block count '{blocks}'")))?,
        locktime,
    })
}

/// Comment, coin txid and sent time, in that order, each optional.
struct Trailer {
    comment: Option<String>,
    coin_txid: Option<String>,
    sent: Option<DateTime<Utc>>,
}

fn is_coin_txid(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn parse_trailer(lines: &[&str]) -> Result<Trailer, WalletError> {
    let mut trailer = Trailer {
        comment: None,
        coin_txid: None,
        sent: None,
    };
    let mut rest = lines;

    if let Some((first, tail)) = rest.split_first() {
        if !is_coin_txid(first) && !first.starts_with(SENT_PREFIX) {
            if *first != NO_COMMENT {
                trailer.comment = Some(decode_text(first)?);
            }
            rest = tail;
        }
    }
    if let Some((first, tail)) = rest.split_first() {
        if is_coin_txid(first) {
            trailer.coin_txid = Some(first.to_string());
            rest = tail;
        }
    }
    if let Some((first, tail)) = rest.split_first() {
        if let Some(ts) = first.strip_prefix(SENT_PREFIX) {
            if trailer.coin_txid.is_none() {
                return Err(WalletError::tx_file("sent", "sent transaction has no coin txid"));
            }
            trailer.sent = Some(
                parse_timestamp(ts).ok_or_else(|| WalletError::tx_file("sent", format!("invalid timestamp '{ts}'")))?,
            );
            rest = tail;
        }
    }
    if let Some(extra) = rest.first() {
        return Err(WalletError::tx_file("line count", format!("unexpected line '{extra}'")));
    }
    Ok(trailer)
}

/// Parse file text and verify it, returning the transaction in the state
/// the file records.
pub fn parse_tx_file(text: &str, cfg: &TxConfig) -> Result<TxState, WalletError> {
    if text.len() > cfg.max_tx_file_size {
        return Err(WalletError::tx_file(
            "size",
            format!("{} bytes exceeds the maximum of {}", text.len(), cfg.max_tx_file_size),
        ));
    }
    let lines: Vec<&str> = text.lines().collect();
    if !(5..=8).contains(&lines.len()) {
        return Err(WalletError::tx_file(
            "line count",
            format!("expected 5 to 8 lines, found {}", lines.len()),
        ));
    }

    let body: Vec<String> = lines[1..].iter().map(|l| l.to_string()).collect();
    let expected = file_checksum(&body);
    if !is_chksum6(lines[0]) || lines[0] != expected {
        return Err(WalletError::tx_file(
            "checksum",
            format!("'{}' does not match computed '{expected}'", lines[0]),
        ));
    }

    let meta = parse_metadata(lines[1])?;
    let tx_hex = lines[2];
    if tx_hex.is_empty() || tx_hex.len() % 2 != 0 || !tx_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(WalletError::tx_file("transaction hex", "not a hex string"));
    }
    let inputs: Vec<TxInput> =
        serde_json::from_str(lines[3]).map_err(|e| WalletError::tx_file("inputs", e.to_string()))?;
    let outputs: Vec<TxOutput> =
        serde_json::from_str(lines[4]).map_err(|e| WalletError::tx_file("outputs", e.to_string()))?;
    let trailer = parse_trailer(&lines[5..])?;

    let data = TxData {
        params: meta.params,
        inputs,
        outputs,
        locktime: meta.locktime,
        comment: trailer.comment,
    };
    data.check_comment()?;
    data.check_roles()?;
    let send = data.send_amount()?;
    if send != meta.send_amount {
        return Err(WalletError::tx_file(
            "send amount",
            format!("metadata says {}, outputs sum to {send}", meta.send_amount),
        ));
    }

    let record = TxRecord::from_parts(data, tx_hex.to_string(), meta.content_id, meta.timestamp, meta.blockcount);
    let codec = codec_for(ProtocolTag::for_coin(meta.params.coin), meta.params);
    let dtx = codec.decode_hex(tx_hex)?;
    record.check_integrity(&dtx)?;

    let state = match trailer.coin_txid {
        None => {
            if dtx.has_witness || dtx.inputs.iter().any(|i| !i.script_sig.is_empty()) {
                return Err(WalletError::tx_file("transaction hex", "unsigned transaction carries signatures"));
            }
            TxState::Unsigned(UnsignedTx::from_record(record))
        }
        Some(coin_txid) => {
            check_sigs(&dtx)?;
            if dtx.txid != coin_txid {
                return Err(BtcError::CoinTxIdMismatch {
                    expected: coin_txid,
                    actual: dtx.txid,
                }
                .into());
            }
            let signed = SignedTx::from_parts(record, coin_txid);
            match trailer.sent {
                Some(ts) => TxState::Sent(SentTx::from_parts(signed, ts)),
                None => TxState::Signed(signed),
            }
        }
    };
    debug!(state = state.name(), "parsed transaction file");
    Ok(state)
}

/// `ID[SEND_AMT].ext`, prefixed by the coin and chain off BTC mainnet.
pub fn file_name(state: &TxState) -> Result<String, WalletError> {
    let kind = TxFileKind::of_state(state)?;
    let (record, _, _) = record_and_txid(state)
        .ok_or_else(|| WalletError::tx_file("state", "transaction has no record"))?;
    let params = &record.data.params;
    let mut name = String::new();
    if params.coin != Coin::Btc || params.network != BtcNetwork::Mainnet {
        name.push_str(&format!("{}-{}-", params.coin.symbol(), params.network));
    }
    name.push_str(&format!(
        "{}[{}].{}",
        record.content_id(),
        record.data.send_amount()?,
        kind.extension()
    ));
    Ok(name)
}

/// Write `state` into `dir` under its standard file name.
pub fn write_tx_file(state: &TxState, dir: &Path, cfg: &TxConfig) -> Result<PathBuf, WalletError> {
    let text = format_tx_file(state)?;
    if text.len() > cfg.max_tx_file_size {
        return Err(WalletError::tx_file(
            "size",
            format!("{} bytes exceeds the maximum of {}", text.len(), cfg.max_tx_file_size),
        ));
    }
    let path = dir.join(file_name(state)?);
    std::fs::write(&path, text).map_err(|e| WalletError::io(&path, e))?;
    info!(path = %path.display(), "wrote transaction file");
    Ok(path)
}

/// Read and verify a transaction file. A known extension must agree with
/// the file's contents.
pub fn read_tx_file(path: &Path, cfg: &TxConfig) -> Result<TxState, WalletError> {
    let len = std::fs::metadata(path).map_err(|e| WalletError::io(path, e))?.len();
    if len > cfg.max_tx_file_size as u64 {
        return Err(WalletError::tx_file(
            "size",
            format!("{len} bytes exceeds the maximum of {}", cfg.max_tx_file_size),
        ));
    }
    let text = std::fs::read_to_string(path).map_err(|e| WalletError::io(path, e))?;
    let state = parse_tx_file(&text, cfg)?;
    let expected = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(TxFileKind::from_extension);
    if let Some(kind) = expected {
        if kind != TxFileKind::of_state(&state)? {
            return Err(WalletError::tx_file(
                "extension",
                format!("'.{}' file holds a {} transaction", kind.extension(), state.name()),
            ));
        }
    }
    debug!(path = %path.display(), state = state.name(), "read transaction file");
    Ok(state)
}
