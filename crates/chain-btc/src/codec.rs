//! Raw transaction codec.
//!
//! Parses serialized transactions into a [`DeserializedTx`] and rebuilds the
//! canonical unsigned bytes (every signature script replaced by an empty
//! script, witness data dropped). The canonical bytes are what the wallet's
//! content id commits to, so any daemon that alters inputs, outputs,
//! sequences or locktime while signing is caught by re-deriving them.

use crypto_utils::digest::{chksum6, sha256d_reversed_hex};
use tracing::debug;

use crate::amount::Amount;
use crate::error::BtcError;
use crate::io::{TxInput, TxOutput};
use crate::params::ChainParams;
use crate::script::{script_to_dest, OutputDest};

/// Transaction version written for new transactions.
pub const TX_VERSION: u32 = 2;

/// Versions are signed 32-bit on the wire.
pub const MAX_TX_VERSION: u32 = i32::MAX as u32;

/// The only legal segwit marker and flag bytes.
pub const WITNESS_MARKER_FLAG: [u8; 2] = [0x00, 0x01];

/// Bounds-checked cursor over transaction bytes.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn read_bytes(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], BtcError> {
        if n > self.remaining() {
            return Err(BtcError::TxHexParse(format!(
                "unexpected end of data reading {field} at offset {}",
                self.pos
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u32_le(&mut self, field: &'static str) -> Result<u32, BtcError> {
        let b = self.read_bytes(4, field)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64_le(&mut self, field: &'static str) -> Result<u64, BtcError> {
        let b = self.read_bytes(8, field)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    /// Read a compact-size integer, returning its value and raw encoding.
    fn read_compact_size(&mut self, field: &'static str) -> Result<(u64, &'a [u8]), BtcError> {
        let start = self.pos;
        let marker = self.read_bytes(1, field)?[0];
        let value = match marker {
            0xfd => {
                let b = self.read_bytes(2, field)?;
                u16::from_le_bytes([b[0], b[1]]) as u64
            }
            0xfe => {
                let b = self.read_bytes(4, field)?;
                u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u64
            }
            0xff => {
                let b = self.read_bytes(8, field)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(b);
                u64::from_le_bytes(arr)
            }
            n => n as u64,
        };
        Ok((value, &self.buf[start..self.pos]))
    }

    /// Read a count or length prefix that must not exceed the remaining data.
    fn read_bounded_size(&mut self, field: &'static str) -> Result<(usize, &'a [u8]), BtcError> {
        let offset = self.pos;
        let (len, raw) = self.read_compact_size(field)?;
        if len > self.remaining() as u64 {
            return Err(BtcError::LengthPrefixOverrun { field, len, offset });
        }
        Ok((len as usize, raw))
    }
}

/// Append a compact-size integer.
pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Encoded length of a compact-size integer.
pub fn compact_size_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// One parsed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    /// Previous txid, display-order hex.
    pub txid: String,
    pub vout: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    /// Witness stack; empty for non-witness inputs.
    pub witness: Vec<Vec<u8>>,
}

/// One parsed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub amount: Amount,
    pub script_pubkey: Vec<u8>,
    pub dest: OutputDest,
}

/// A parsed transaction plus its canonical unsigned reconstruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeserializedTx {
    pub version: u32,
    pub inputs: Vec<RawInput>,
    pub outputs: Vec<RawOutput>,
    pub locktime: u32,
    pub has_witness: bool,
    /// Canonical unsigned bytes: signature scripts emptied, witness dropped.
    pub unsigned_bytes: Vec<u8>,
    /// Network txid (double SHA-256 of the non-witness serialization,
    /// byte-reversed hex).
    pub txid: String,
    /// Witness bytes including the marker and flag; zero without witness.
    pub witness_size: usize,
    /// Total serialized size in bytes.
    pub size: usize,
}

impl DeserializedTx {
    pub fn unsigned_hex(&self) -> String {
        hex::encode(&self.unsigned_bytes)
    }

    /// Six-character content id over the canonical unsigned bytes.
    pub fn content_id(&self) -> String {
        chksum6(&self.unsigned_bytes).to_ascii_uppercase()
    }

    /// Txid the canonical unsigned bytes would have if broadcast as-is.
    pub fn unsigned_txid(&self) -> String {
        sha256d_reversed_hex(&self.unsigned_bytes)
    }

    /// Segwit-discounted virtual size.
    pub fn vsize(&self) -> u64 {
        let stripped = (self.size - self.witness_size) as u64;
        (stripped * 3 + self.size as u64).div_ceil(4)
    }

    pub fn sequences(&self) -> Vec<u32> {
        self.inputs.iter().map(|i| i.sequence).collect()
    }
}

/// Parse a hex-encoded transaction.
pub fn deserialize_hex(tx_hex: &str, params: &ChainParams) -> Result<DeserializedTx, BtcError> {
    let bytes = hex::decode(tx_hex.trim())
        .map_err(|e| BtcError::InvalidHex(format!("transaction hex: {e}")))?;
    deserialize(&bytes, params)
}

/// Parse a serialized transaction.
pub fn deserialize(tx: &[u8], params: &ChainParams) -> Result<DeserializedTx, BtcError> {
    let mut r = ByteReader::new(tx);
    let mut unsigned = Vec::with_capacity(tx.len());

    let version_bytes = r.read_bytes(4, "version")?;
    unsigned.extend_from_slice(version_bytes);
    let version = u32::from_le_bytes([
        version_bytes[0],
        version_bytes[1],
        version_bytes[2],
        version_bytes[3],
    ]);
    if version > MAX_TX_VERSION {
        return Err(BtcError::VersionOutOfRange(version));
    }

    let has_witness = r.peek() == Some(0);
    if has_witness {
        let flag = r.read_bytes(2, "witness marker")?;
        if flag != WITNESS_MARKER_FLAG {
            return Err(BtcError::IllegalWitnessFlag(hex::encode(flag)));
        }
    }

    let (n_in, raw) = r.read_bounded_size("input count")?;
    unsigned.extend_from_slice(raw);
    let mut inputs = Vec::with_capacity(n_in);
    for _ in 0..n_in {
        let outpoint = r.read_bytes(36, "input outpoint")?;
        unsigned.extend_from_slice(outpoint);
        let mut txid = outpoint[..32].to_vec();
        txid.reverse();
        let vout = u32::from_le_bytes([outpoint[32], outpoint[33], outpoint[34], outpoint[35]]);
        let (script_len, _) = r.read_bounded_size("scriptSig")?;
        let script_sig = r.read_bytes(script_len, "scriptSig")?.to_vec();
        unsigned.push(0);
        let seq_bytes = r.read_bytes(4, "sequence")?;
        unsigned.extend_from_slice(seq_bytes);
        inputs.push(RawInput {
            txid: hex::encode(txid),
            vout,
            script_sig,
            sequence: u32::from_le_bytes([seq_bytes[0], seq_bytes[1], seq_bytes[2], seq_bytes[3]]),
            witness: Vec::new(),
        });
    }

    let (n_out, raw) = r.read_bounded_size("output count")?;
    unsigned.extend_from_slice(raw);
    let mut outputs = Vec::with_capacity(n_out);
    for _ in 0..n_out {
        let amount_start = r.pos;
        let amount = Amount::from_sat(r.read_u64_le("output amount")?);
        let (script_len, _) = r.read_bounded_size("scriptPubKey")?;
        let script_pubkey = r.read_bytes(script_len, "scriptPubKey")?.to_vec();
        unsigned.extend_from_slice(&tx[amount_start..r.pos]);
        let dest = script_to_dest(&script_pubkey, params)?;
        outputs.push(RawOutput {
            amount,
            script_pubkey,
            dest,
        });
    }

    let outputs_end = r.pos;
    let (txid, witness_size) = if has_witness {
        let mut stripped = Vec::with_capacity(tx.len());
        stripped.extend_from_slice(&tx[..4]);
        stripped.extend_from_slice(&tx[6..outputs_end]);
        stripped.extend_from_slice(&tx[tx.len().saturating_sub(4)..]);
        for input in inputs.iter_mut() {
            let (n_items, _) = r.read_bounded_size("witness item count")?;
            let mut stack = Vec::with_capacity(n_items);
            for _ in 0..n_items {
                let (len, _) = r.read_bounded_size("witness item")?;
                stack.push(r.read_bytes(len, "witness item")?.to_vec());
            }
            input.witness = stack;
        }
        (
            sha256d_reversed_hex(&stripped),
            (tx.len() + 2).saturating_sub(outputs_end + 4),
        )
    } else {
        (sha256d_reversed_hex(tx), 0)
    };

    if r.remaining() != 4 {
        return Err(BtcError::TxHexParse(format!(
            "transaction has invalid length: {} extra bytes",
            r.remaining() as i64 - 4
        )));
    }
    let lock_bytes = r.read_bytes(4, "locktime")?;
    unsigned.extend_from_slice(lock_bytes);
    let locktime = u32::from_le_bytes([lock_bytes[0], lock_bytes[1], lock_bytes[2], lock_bytes[3]]);

    debug!(
        %txid,
        inputs = inputs.len(),
        outputs = outputs.len(),
        has_witness,
        "deserialized transaction"
    );

    Ok(DeserializedTx {
        version,
        inputs,
        outputs,
        locktime,
        has_witness,
        unsigned_bytes: unsigned,
        txid,
        witness_size,
        size: tx.len(),
    })
}

/// Serialize a transaction, adding the segwit marker when any input has a
/// witness.
pub fn serialize(
    version: u32,
    inputs: &[RawInput],
    outputs: &[RawOutput],
    locktime: u32,
) -> Result<Vec<u8>, BtcError> {
    let segwit = inputs.iter().any(|i| !i.witness.is_empty());
    let mut out = Vec::new();
    out.extend_from_slice(&version.to_le_bytes());
    if segwit {
        out.extend_from_slice(&WITNESS_MARKER_FLAG);
    }
    write_compact_size(&mut out, inputs.len() as u64);
    for input in inputs {
        let mut txid = hex::decode(&input.txid)
            .map_err(|e| BtcError::InvalidHex(format!("input txid {}: {e}", input.txid)))?;
        if txid.len() != 32 {
            return Err(BtcError::InvalidTransaction(format!(
                "input txid {} is not 32 bytes",
                input.txid
            )));
        }
        txid.reverse();
        out.extend_from_slice(&txid);
        out.extend_from_slice(&input.vout.to_le_bytes());
        write_compact_size(&mut out, input.script_sig.len() as u64);
        out.extend_from_slice(&input.script_sig);
        out.extend_from_slice(&input.sequence.to_le_bytes());
    }
    write_compact_size(&mut out, outputs.len() as u64);
    for output in outputs {
        out.extend_from_slice(&output.amount.to_sat().to_le_bytes());
        write_compact_size(&mut out, output.script_pubkey.len() as u64);
        out.extend_from_slice(&output.script_pubkey);
    }
    if segwit {
        for input in inputs {
            write_compact_size(&mut out, input.witness.len() as u64);
            for item in &input.witness {
                write_compact_size(&mut out, item.len() as u64);
                out.extend_from_slice(item);
            }
        }
    }
    out.extend_from_slice(&locktime.to_le_bytes());
    Ok(out)
}

/// Encode the unsigned form of a wallet transaction, in the given order.
///
/// Produces the same bytes a daemon's `createrawtransaction` returns for
/// these inputs, outputs and locktime.
pub fn encode_unsigned(
    inputs: &[TxInput],
    outputs: &[TxOutput],
    locktime: u32,
    params: &ChainParams,
) -> Result<Vec<u8>, BtcError> {
    let raw_inputs: Vec<RawInput> = inputs
        .iter()
        .map(|i| RawInput {
            txid: i.txid.clone(),
            vout: i.vout,
            script_sig: Vec::new(),
            sequence: i.effective_sequence(),
            witness: Vec::new(),
        })
        .collect();
    let raw_outputs = outputs
        .iter()
        .map(|o| {
            Ok(RawOutput {
                amount: o.amount,
                script_pubkey: o.dest.script_pubkey(params)?,
                dest: o.dest.clone(),
            })
        })
        .collect::<Result<Vec<_>, BtcError>>()?;
    serialize(TX_VERSION, &raw_inputs, &raw_outputs, locktime)
}
