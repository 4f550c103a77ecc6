//! Fixtures shared by the wallet-core integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chain_btc::amount::Amount;
use chain_btc::codec::{deserialize, deserialize_hex, encode_unsigned, serialize};
use chain_btc::error::BtcError;
use chain_btc::io::{AddrType, TxInput, TxOutput};
use chain_btc::lifecycle::{SentTx, SignedTx, TxData, TxRecord, UnsignedTx};
use chain_btc::network::BtcNetwork;
use chain_btc::params::{ChainParams, Coin, RBF_SEQUENCE};
use chain_btc::rpc::RpcTransport;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

pub const ADDR_SRC: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";
pub const SCRIPT_SRC: &str = "76a914751e76e8199196d454941c45d1b3a323f1433bd688ac";
pub const ADDR_DEST: &str = "17fBp95y8fRSTqQpL4nv7G4cH6G5WHn817";
pub const ADDR_CHANGE: &str = "13Mt8DW9sqtenv354oCbUNzkGjsFWgJpnu";

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

pub fn tx_data(coin: Coin, sequence: u32, locktime: u32, comment: Option<&str>) -> TxData {
    TxData {
        params: ChainParams::new(coin, BtcNetwork::Mainnet),
        inputs: vec![TxInput {
            txid: "01".repeat(32),
            vout: 0,
            amount: Amount::from_sat(100_000),
            addr: ADDR_SRC.into(),
            addr_type: Some(AddrType::C),
            wallet_id: Some("F00DBABE:C:1".parse().unwrap()),
            sequence: Some(sequence),
            script_pubkey: SCRIPT_SRC.into(),
            comment: None,
            confs: 10,
        }],
        outputs: vec![
            TxOutput {
                is_change: true,
                wallet_id: Some("F00DBABE:C:2".parse().unwrap()),
                ..TxOutput::to_addr(ADDR_CHANGE, Amount::from_sat(47_740))
            },
            TxOutput::to_addr(ADDR_DEST, Amount::from_sat(50_000)),
        ],
        locktime,
        comment: comment.map(str::to_string),
    }
}

pub fn unsigned_from(data: TxData) -> UnsignedTx {
    let bytes = encode_unsigned(&data.inputs, &data.outputs, data.locktime, &data.params).unwrap();
    let content_id = deserialize(&bytes, &data.params).unwrap().content_id();
    UnsignedTx::from_record(TxRecord::from_parts(
        data,
        hex::encode(bytes),
        content_id,
        ts(1_792_231_200),
        812_000,
    ))
}

pub fn unsigned() -> UnsignedTx {
    unsigned_from(tx_data(Coin::Btc, RBF_SEQUENCE, 0, None))
}

/// Placeholder signature script of the size a compressed-key signature
/// produces.
pub fn legacy_script_sig() -> Vec<u8> {
    [vec![0x48], vec![0x30; 72], vec![0x21], vec![0x02; 33]].concat()
}

/// Add placeholder signatures to unsigned hex.
pub fn sign_hex(tx_hex: &str, params: &ChainParams) -> Result<String, BtcError> {
    let dtx = deserialize_hex(tx_hex, params)?;
    let mut inputs = dtx.inputs.clone();
    for input in inputs.iter_mut() {
        input.script_sig = legacy_script_sig();
    }
    Ok(hex::encode(serialize(dtx.version, &inputs, &dtx.outputs, dtx.locktime)?))
}

pub fn signed_from(tx: UnsignedTx) -> SignedTx {
    let record = tx.into_record();
    let signed_hex = sign_hex(record.serialized(), &record.data.params).unwrap();
    let txid = deserialize_hex(&signed_hex, &record.data.params).unwrap().txid;
    let record = TxRecord::from_parts(
        record.data.clone(),
        signed_hex,
        record.content_id().to_string(),
        record.timestamp,
        record.blockcount,
    );
    SignedTx::from_parts(record, txid)
}

pub fn sent_from(tx: SignedTx) -> SentTx {
    SentTx::from_parts(tx, ts(1_792_234_800))
}

/// Just enough of a coin daemon to connect and sign.
pub struct SigningDaemon {
    pub fail_sign: bool,
}

#[async_trait]
impl RpcTransport for SigningDaemon {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, BtcError> {
        let btc = ChainParams::new(Coin::Btc, BtcNetwork::Mainnet);
        match method {
            "getblockcount" => Ok(json!(812_010)),
            "getblockhash" => Ok(json!("000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f")),
            "getnetworkinfo" => Ok(json!({ "version": 270000, "relayfee": 0.00001 })),
            "getblockchaininfo" => Ok(json!({ "chain": "main", "softforks": { "segwit": { "active": true } } })),
            "help" => Ok(json!("signrawtransactionwithkey")),
            "signrawtransactionwithkey" if self.fail_sign => Err(BtcError::Rpc {
                method: method.into(),
                message: "Invalid private key".into(),
            }),
            "signrawtransactionwithkey" => {
                let hex = sign_hex(params[0].as_str().unwrap_or_default(), &btc)?;
                Ok(json!({ "hex": hex, "complete": true }))
            }
            "decoderawtransaction" => {
                let dtx = deserialize_hex(params[0].as_str().unwrap_or_default(), &btc)?;
                Ok(json!({ "txid": dtx.txid, "size": dtx.size, "vsize": dtx.vsize() }))
            }
            other => Err(BtcError::Rpc {
                method: other.into(),
                message: "Method not found".into(),
            }),
        }
    }
}
