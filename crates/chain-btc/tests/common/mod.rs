//! In-memory coin daemon for integration tests.
//!
//! Builds and "signs" transactions with the crate's own codec: signatures
//! are fixed-size placeholder bytes of the sizes real keys produce, so the
//! size estimate and signature-shape checks behave as against a real node.
//! Knobs let a test make the daemon tamper with what it returns.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chain_btc::address::CoinAddr;
use chain_btc::amount::Amount;
use chain_btc::codec::{deserialize_hex, serialize, RawInput, RawOutput};
use chain_btc::error::BtcError;
use chain_btc::io::{AddrType, TxInput, WalletId};
use chain_btc::network::BtcNetwork;
use chain_btc::params::{ChainParams, Coin};
use chain_btc::resolve::AddressBook;
use chain_btc::rpc::RpcTransport;
use chain_btc::script::{null_data_script, OutputDest};
use serde_json::{json, Value};

pub const ADDR_SRC: &str = "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH";
pub const SCRIPT_SRC: &str = "76a914751e76e8199196d454941c45d1b3a323f1433bd688ac";
pub const ADDR_SRC_BECH32: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
pub const SCRIPT_SRC_BECH32: &str = "0014751e76e8199196d454941c45d1b3a323f1433bd6";
pub const ADDR_DEST: &str = "17fBp95y8fRSTqQpL4nv7G4cH6G5WHn817";
pub const ADDR_CHANGE: &str = "13Mt8DW9sqtenv354oCbUNzkGjsFWgJpnu";

/// How the daemon misbehaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tamper {
    #[default]
    None,
    CreateLocktime,
    SignAmount,
    SignSequence,
    SignDropWitnessKey,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub calls: Vec<String>,
    pub mempool: HashMap<String, Value>,
    pub wallet_txs: HashMap<String, Value>,
    pub chain_txs: HashSet<String>,
    pub blockcount: u64,
}

pub struct MockDaemon {
    pub params: ChainParams,
    pub chain: &'static str,
    pub smart_fee: Option<f64>,
    pub tamper: Tamper,
    pub sign_error: Option<String>,
    pub sign_incomplete: bool,
    pub reject: Option<String>,
    pub bad_rescan: bool,
    pub slow_blockcount: bool,
    pub segwit_inactive: bool,
    pub state: Arc<Mutex<MockState>>,
}

impl MockDaemon {
    pub fn new() -> Self {
        MockDaemon {
            params: ChainParams::new(Coin::Btc, BtcNetwork::Mainnet),
            chain: "main",
            smart_fee: Some(0.0001),
            tamper: Tamper::None,
            sign_error: None,
            sign_incomplete: false,
            reject: None,
            bad_rescan: false,
            slow_blockcount: false,
            segwit_inactive: false,
            state: Arc::new(Mutex::new(MockState {
                blockcount: 800_000,
                ..MockState::default()
            })),
        }
    }

    pub fn state(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }

    fn create(&self, params: &[Value]) -> Result<Value, BtcError> {
        let inputs: Vec<RawInput> = params[0]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| RawInput {
                txid: i["txid"].as_str().unwrap().to_string(),
                vout: i["vout"].as_u64().unwrap() as u32,
                script_sig: Vec::new(),
                sequence: i["sequence"].as_u64().unwrap() as u32,
                witness: Vec::new(),
            })
            .collect();
        let outputs: Vec<RawOutput> = params[1]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| {
                let (k, v) = o.as_object().unwrap().iter().next().unwrap();
                let v = v.as_str().unwrap();
                if k == "data" {
                    let data = hex::decode(v).unwrap();
                    RawOutput {
                        amount: Amount::ZERO,
                        script_pubkey: null_data_script(&data).unwrap(),
                        dest: OutputDest::Data(data),
                    }
                } else {
                    RawOutput {
                        amount: v.parse().unwrap(),
                        script_pubkey: CoinAddr::parse(k, &self.params).unwrap().script_pubkey(&self.params),
                        dest: OutputDest::Addr(k.clone()),
                    }
                }
            })
            .collect();
        let mut locktime = params[2].as_u64().unwrap() as u32;
        if self.tamper == Tamper::CreateLocktime {
            locktime += 1;
        }
        Ok(json!(hex::encode(serialize(2, &inputs, &outputs, locktime)?)))
    }

    fn sign(&self, tx_hex: &str, sig_data: &Value) -> Result<Value, BtcError> {
        let dtx = deserialize_hex(tx_hex, &self.params)?;
        let mut inputs = dtx.inputs.clone();
        for input in inputs.iter_mut() {
            let prev = sig_data
                .as_array()
                .and_then(|a| a.iter().find(|e| e["txid"] == input.txid.as_str() && e["vout"] == input.vout))
                .ok_or_else(|| rpc_err("signrawtransactionwithkey", "missing prevtx"))?;
            let spk = hex::decode(prev["scriptPubKey"].as_str().unwrap()).unwrap();
            let witness = vec![vec![0x30; 72], vec![0x02; 33]];
            match spk.first() {
                Some(0x00) => input.witness = witness,
                Some(0xa9) => {
                    let redeem = hex::decode(prev["redeemScript"].as_str().unwrap()).unwrap();
                    input.script_sig = [vec![redeem.len() as u8], redeem].concat();
                    input.witness = witness;
                }
                _ => {
                    input.script_sig = [vec![0x48], vec![0x30; 72], vec![0x21], vec![0x02; 33]].concat();
                }
            }
        }
        let mut outputs = dtx.outputs.clone();
        match self.tamper {
            Tamper::SignAmount => outputs[0].amount = Amount::from_sat(outputs[0].amount.to_sat() + 1),
            Tamper::SignSequence => inputs[0].sequence ^= 1,
            Tamper::SignDropWitnessKey => {
                if let Some(i) = inputs.iter_mut().find(|i| !i.witness.is_empty()) {
                    i.witness.pop();
                }
            }
            _ => {}
        }
        let bytes = serialize(dtx.version, &inputs, &outputs, dtx.locktime)?;
        Ok(json!({ "hex": hex::encode(bytes), "complete": !self.sign_incomplete }))
    }
}

pub fn rpc_err(method: &str, message: &str) -> BtcError {
    BtcError::Rpc {
        method: method.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl RpcTransport for MockDaemon {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, BtcError> {
        self.state.lock().unwrap().calls.push(method.to_string());
        match method {
            "getblockcount" => {
                if self.slow_blockcount {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok(json!(self.state.lock().unwrap().blockcount))
            }
            "getblockhash" => Ok(json!(self.params.genesis_hashes[0])),
            "getnetworkinfo" => Ok(json!({ "version": 270000, "relayfee": 0.00001 })),
            "getblockchaininfo" => Ok(json!({
                "chain": self.chain,
                "softforks": { "segwit": { "active": self.params.supports_segwit && !self.segwit_inactive } }
            })),
            "help" => Ok(json!("== Rawtransactions ==\ncreaterawtransaction\nsignrawtransactionwithkey")),
            "estimatesmartfee" => Ok(match self.smart_fee {
                Some(rate) => json!({ "feerate": rate, "blocks": 3 }),
                None => json!({ "errors": ["Insufficient data or no feerate found"], "blocks": 0 }),
            }),
            "estimatefee" => Ok(json!(0.0002)),
            "createrawtransaction" => self.create(&params),
            "signrawtransactionwithkey" => {
                if let Some(msg) = &self.sign_error {
                    return Err(rpc_err(method, msg));
                }
                self.sign(params[0].as_str().unwrap(), &params[2])
            }
            "decoderawtransaction" => {
                let dtx = deserialize_hex(params[0].as_str().unwrap(), &self.params)?;
                Ok(json!({ "txid": dtx.txid, "size": dtx.size, "vsize": dtx.vsize() }))
            }
            "sendrawtransaction" => {
                if let Some(msg) = &self.reject {
                    return Err(rpc_err(method, msg));
                }
                let dtx = deserialize_hex(params[0].as_str().unwrap(), &self.params)?;
                let mut st = self.state.lock().unwrap();
                let height = st.blockcount;
                st.mempool.insert(dtx.txid.clone(), json!({ "height": height }));
                st.wallet_txs.insert(
                    dtx.txid.clone(),
                    json!({ "confirmations": 0, "bip125-replaceable": "yes", "timereceived": 1_700_000_000 }),
                );
                Ok(json!(dtx.txid))
            }
            "getmempoolentry" => {
                let txid = params[0].as_str().unwrap();
                self.state
                    .lock()
                    .unwrap()
                    .mempool
                    .get(txid)
                    .cloned()
                    .ok_or_else(|| rpc_err(method, "Transaction not in mempool"))
            }
            "gettransaction" => {
                let txid = params[0].as_str().unwrap();
                self.state
                    .lock()
                    .unwrap()
                    .wallet_txs
                    .get(txid)
                    .cloned()
                    .ok_or_else(|| rpc_err(method, "Invalid or non-wallet transaction id"))
            }
            "getrawtransaction" => {
                let txid = params[0].as_str().unwrap();
                if self.state.lock().unwrap().chain_txs.contains(txid) {
                    Ok(json!({ "txid": txid }))
                } else {
                    Err(rpc_err(method, "No such mempool or blockchain transaction"))
                }
            }
            "rescanblockchain" => {
                let a = params[0].as_u64().unwrap();
                let b = params[1].as_u64().unwrap();
                let stop = if self.bad_rescan { b.saturating_sub(1) } else { b };
                Ok(json!({ "start_height": a, "stop_height": stop }))
            }
            "scantxoutset" => match params[0].as_str() {
                Some("status") => Ok(json!({ "progress": 42.0 })),
                _ => {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(json!({
                        "success": true,
                        "unspents": [
                            { "txid": "aa".repeat(32), "vout": 0, "height": 700_010, "amount": 0.1 },
                            { "txid": "bb".repeat(32), "vout": 2, "height": 700_010, "amount": 0.2 },
                            { "txid": "cc".repeat(32), "vout": 1, "height": 650_000, "amount": 0.3 }
                        ]
                    }))
                }
            },
            other => Err(rpc_err(other, "Method not found")),
        }
    }
}

/// Address book handing out one fixed change address.
pub struct TestBook;

#[async_trait]
impl AddressBook for TestBook {
    async fn resolve(&self, id: &WalletId) -> Result<String, BtcError> {
        Ok(match id.addr_type {
            AddrType::B => ADDR_SRC_BECH32,
            _ => ADDR_CHANGE,
        }
        .to_string())
    }

    async fn next_change_addr(&self, addr_type: AddrType) -> Result<(WalletId, String), BtcError> {
        let id = WalletId {
            seed_id: "F00DBABE".into(),
            addr_type,
            index: 2,
        };
        let addr = self.resolve(&id).await?;
        Ok((id, addr))
    }
}

pub fn unspent(txid_byte: u8, vout: u32, sat: u64) -> TxInput {
    TxInput {
        txid: hex::encode([txid_byte; 32]),
        vout,
        amount: Amount::from_sat(sat),
        addr: ADDR_SRC.into(),
        addr_type: Some(AddrType::C),
        wallet_id: Some(format!("F00DBABE:C:{}", txid_byte as u32 + 1).parse().unwrap()),
        sequence: None,
        script_pubkey: SCRIPT_SRC.into(),
        comment: None,
        confs: 10,
    }
}

pub fn segwit_unspent(txid_byte: u8, vout: u32, sat: u64) -> TxInput {
    TxInput {
        addr: ADDR_SRC_BECH32.into(),
        addr_type: Some(AddrType::B),
        wallet_id: Some("F00DBABE:B:1".parse().unwrap()),
        script_pubkey: SCRIPT_SRC_BECH32.into(),
        ..unspent(txid_byte, vout, sat)
    }
}
