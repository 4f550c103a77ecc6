//! Output script classification.
//!
//! Maps scriptPubKeys to address or data destinations and back. Only the
//! standard forms a wallet of this kind creates are recognized: P2PKH, P2SH,
//! native segwit key-hash and OP_RETURN null-data.

use serde::{Deserialize, Serialize};

use crate::address::{AddrFormat, CoinAddr};
use crate::error::BtcError;
use crate::params::{ChainParams, MAX_OP_RETURN_DATA_LEN};

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_EQUAL: u8 = 0x87;
const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const PUSH_20: u8 = 0x14;

/// Recognized shape of an output script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind {
    P2pkh([u8; 20]),
    P2sh([u8; 20]),
    Segwit([u8; 20]),
    NullData(Vec<u8>),
}

/// Where an output sends its value: a coin address or embedded data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputDest {
    Addr(String),
    Data(#[serde(with = "hex::serde")] Vec<u8>),
}

impl OutputDest {
    pub fn is_data(&self) -> bool {
        matches!(self, OutputDest::Data(_))
    }

    pub fn addr(&self) -> Option<&str> {
        match self {
            OutputDest::Addr(a) => Some(a),
            OutputDest::Data(_) => None,
        }
    }

    /// The output script paying to this destination.
    pub fn script_pubkey(&self, params: &ChainParams) -> Result<Vec<u8>, BtcError> {
        match self {
            OutputDest::Addr(a) => Ok(CoinAddr::parse(a, params)?.script_pubkey(params)),
            OutputDest::Data(d) => null_data_script(d),
        }
    }
}

impl std::fmt::Display for OutputDest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputDest::Addr(a) => f.write_str(a),
            OutputDest::Data(d) => write!(f, "OP_RETURN data ({} bytes)", d.len()),
        }
    }
}

pub fn p2pkh_script(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, PUSH_20]);
    script.extend_from_slice(hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

pub fn p2sh_script(hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.extend_from_slice(&[OP_HASH160, PUSH_20]);
    script.extend_from_slice(hash);
    script.push(OP_EQUAL);
    script
}

pub fn segwit_script(witness_version: u8, hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    // OP_0 is 0x00; OP_1..OP_16 are 0x51..0x60.
    let version_op = if witness_version == 0 {
        0x00
    } else {
        0x50 + witness_version
    };
    script.extend_from_slice(&[version_op, PUSH_20]);
    script.extend_from_slice(hash);
    script
}

/// OP_RETURN script carrying `data`, using the shortest push encoding.
/// An empty payload is pushed as OP_0.
pub fn null_data_script(data: &[u8]) -> Result<Vec<u8>, BtcError> {
    if data.len() > MAX_OP_RETURN_DATA_LEN {
        return Err(BtcError::InvalidOpReturnData(format!(
            "{}: length not in range 0-{MAX_OP_RETURN_DATA_LEN}",
            data.len()
        )));
    }
    let mut script = Vec::with_capacity(data.len() + 3);
    script.push(OP_RETURN);
    if data.len() < OP_PUSHDATA1 as usize {
        script.push(data.len() as u8);
    } else {
        script.push(OP_PUSHDATA1);
        script.push(data.len() as u8);
    }
    script.extend_from_slice(data);
    Ok(script)
}

/// Decode the payload of an OP_RETURN script.
///
/// Accepts OP_0, direct pushes and PUSHDATA1/2/4; a bare OP_RETURN is an
/// empty payload. Payloads over the relay limit are rejected.
pub fn decode_null_data(script: &[u8]) -> Result<Vec<u8>, BtcError> {
    let bad = |why: &str| BtcError::InvalidOpReturnData(format!("{}: {why}", hex::encode(script)));
    let (&op, rest) = script.split_first().ok_or_else(|| bad("empty script"))?;
    if op != OP_RETURN {
        return Err(bad("not an OP_RETURN script"));
    }
    let Some((&push, rest)) = rest.split_first() else {
        return Ok(Vec::new());
    };
    let (len, body) = match push {
        0x00..=0x4b => (push as usize, rest),
        OP_PUSHDATA1 => {
            let (&n, body) = rest.split_first().ok_or_else(|| bad("truncated PUSHDATA1"))?;
            (n as usize, body)
        }
        OP_PUSHDATA2 => {
            let n: [u8; 2] = rest
                .get(..2)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| bad("truncated PUSHDATA2"))?;
            (u16::from_le_bytes(n) as usize, &rest[2..])
        }
        OP_PUSHDATA4 => {
            let n: [u8; 4] = rest
                .get(..4)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| bad("truncated PUSHDATA4"))?;
            (u32::from_le_bytes(n) as usize, &rest[4..])
        }
        _ => return Err(bad("unsupported push opcode")),
    };
    if len > MAX_OP_RETURN_DATA_LEN {
        return Err(bad(&format!(
            "payload of {len} bytes exceeds {MAX_OP_RETURN_DATA_LEN}"
        )));
    }
    if body.len() != len {
        return Err(bad(&format!(
            "push declares {len} bytes but {} follow",
            body.len()
        )));
    }
    Ok(body.to_vec())
}

/// Classify a scriptPubKey.
pub fn classify(script: &[u8], params: &ChainParams) -> Result<ScriptKind, BtcError> {
    let hash_at = |start: usize| -> [u8; 20] {
        let mut h = [0u8; 20];
        h.copy_from_slice(&script[start..start + 20]);
        h
    };
    let version_op = segwit_script(params.witness_version, &[0u8; 20])[0];
    match script {
        [OP_DUP, OP_HASH160, PUSH_20, .., OP_EQUALVERIFY, OP_CHECKSIG] if script.len() == 25 => {
            Ok(ScriptKind::P2pkh(hash_at(3)))
        }
        [OP_HASH160, PUSH_20, .., OP_EQUAL] if script.len() == 23 => Ok(ScriptKind::P2sh(hash_at(2))),
        [v, PUSH_20, ..] if script.len() == 22 && *v == version_op && params.supports_segwit => {
            Ok(ScriptKind::Segwit(hash_at(2)))
        }
        [OP_RETURN, ..] => Ok(ScriptKind::NullData(decode_null_data(script)?)),
        _ => Err(BtcError::UnknownScript(hex::encode(script))),
    }
}

/// Classify a scriptPubKey and render it as a destination.
pub fn script_to_dest(script: &[u8], params: &ChainParams) -> Result<OutputDest, BtcError> {
    let addr = |format, hash| CoinAddr::from_hash(format, hash, params);
    Ok(match classify(script, params)? {
        ScriptKind::P2pkh(h) => OutputDest::Addr(addr(AddrFormat::P2pkh, h)?.to_string()),
        ScriptKind::P2sh(h) => OutputDest::Addr(addr(AddrFormat::P2sh, h)?.to_string()),
        ScriptKind::Segwit(h) => OutputDest::Addr(addr(AddrFormat::Bech32, h)?.to_string()),
        ScriptKind::NullData(d) => OutputDest::Data(d),
    })
}
