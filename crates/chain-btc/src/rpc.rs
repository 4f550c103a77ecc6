//! Coin daemon session.
//!
//! The daemon is untrusted: it builds, signs and broadcasts transactions for
//! us, and everything it returns is re-checked locally. This module only
//! shapes the calls and replies; the checks live in the lifecycle.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::amount::Amount;
use crate::config::{FeeEstimateMode, TxConfig};
use crate::error::{BtcError, RejectKind};
use crate::io::{TxInput, TxOutput};
use crate::network::BtcNetwork;
use crate::params::ChainParams;
use crate::script::OutputDest;
use crate::signer::SigningKey;

/// JSON-RPC transport to a coin daemon.
///
/// Implementations report daemon-side errors as [`BtcError::Rpc`] carrying
/// the daemon's message text.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, BtcError>;
}

/// Optional daemon methods discovered from `help`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonCaps {
    pub sign_with_key: bool,
    pub deployment_info: bool,
}

impl DaemonCaps {
    fn from_help(help: &str) -> Self {
        DaemonCaps {
            sign_with_key: help.contains("signrawtransactionwithkey"),
            deployment_info: help.contains("getdeploymentinfo"),
        }
    }
}

/// Chain metadata fetched once per session.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainInfo {
    pub blockcount: u64,
    pub genesis_hash: String,
    pub daemon_version: u64,
    pub network: BtcNetwork,
    pub relay_fee_per_kb: Amount,
    pub segwit_active: bool,
    pub caps: DaemonCaps,
}

/// Reply of `decoderawtransaction`, the fields we check.
#[derive(Debug, Clone, Deserialize)]
pub struct DecodedTx {
    pub txid: String,
    pub size: u64,
    /// Absent on daemons without segwit.
    #[serde(default)]
    pub vsize: Option<u64>,
}

impl DecodedTx {
    pub fn vsize_or_size(&self) -> u64 {
        self.vsize.unwrap_or(self.size)
    }
}

/// Reply of the signing calls.
#[derive(Debug, Clone, Deserialize)]
pub struct SignReply {
    pub hex: String,
    #[serde(default)]
    pub complete: bool,
}

async fn timed_call<T: RpcTransport + ?Sized>(
    transport: &T,
    method: &str,
    params: Vec<Value>,
    limit: Duration,
) -> Result<Value, BtcError> {
    debug!(method, "rpc call");
    timeout(limit, transport.call(method, params))
        .await
        .map_err(|_| BtcError::RpcTimeout {
            method: method.to_string(),
            secs: limit.as_secs(),
        })?
}

fn reply_err(method: &str, detail: impl Into<String>) -> BtcError {
    BtcError::RpcReply {
        method: method.to_string(),
        detail: detail.into(),
    }
}

fn segwit_active(chain_info: &Value, deployment_info: Option<&Value>) -> bool {
    if let Some(active) = deployment_info.and_then(|d| d["deployments"]["segwit"]["active"].as_bool()) {
        return active;
    }
    if let Some(active) = chain_info["softforks"]["segwit"]["active"].as_bool() {
        return active;
    }
    chain_info["bip9_softforks"]["segwit"]["status"].as_str() == Some("active")
}

/// A connected daemon plus its cached chain metadata.
pub struct DaemonSession<T: RpcTransport> {
    transport: T,
    info: ChainInfo,
    rpc_timeout: Duration,
    rescan_timeout: Duration,
}

impl<T: RpcTransport> DaemonSession<T> {
    /// Connect and fetch chain metadata. The independent bootstrap calls are
    /// issued concurrently.
    pub async fn connect(transport: T, cfg: &TxConfig) -> Result<Self, BtcError> {
        let limit = cfg.rpc_timeout();
        let (blockcount, genesis, net_info, chain_info, help) = tokio::try_join!(
            timed_call(&transport, "getblockcount", vec![], limit),
            timed_call(&transport, "getblockhash", vec![json!(0)], limit),
            timed_call(&transport, "getnetworkinfo", vec![], limit),
            timed_call(&transport, "getblockchaininfo", vec![], limit),
            timed_call(&transport, "help", vec![], limit),
        )?;

        let caps = DaemonCaps::from_help(help.as_str().unwrap_or_default());
        let deployment_info = if caps.deployment_info {
            Some(timed_call(&transport, "getdeploymentinfo", vec![], limit).await?)
        } else {
            None
        };

        let chain = chain_info["chain"]
            .as_str()
            .ok_or_else(|| reply_err("getblockchaininfo", "missing 'chain'"))?;
        let info = ChainInfo {
            blockcount: blockcount
                .as_u64()
                .ok_or_else(|| reply_err("getblockcount", blockcount.to_string()))?,
            genesis_hash: genesis
                .as_str()
                .ok_or_else(|| reply_err("getblockhash", genesis.to_string()))?
                .to_string(),
            daemon_version: net_info["version"].as_u64().unwrap_or_default(),
            network: BtcNetwork::from_daemon_chain(chain)?,
            relay_fee_per_kb: Amount::from_rpc_value(&net_info["relayfee"])?,
            segwit_active: segwit_active(&chain_info, deployment_info.as_ref()),
            caps,
        };
        info!(
            network = %info.network,
            blockcount = info.blockcount,
            version = info.daemon_version,
            segwit = info.segwit_active,
            "connected to coin daemon"
        );

        Ok(DaemonSession {
            transport,
            info,
            rpc_timeout: limit,
            rescan_timeout: cfg.rescan_timeout(),
        })
    }

    pub fn info(&self) -> &ChainInfo {
        &self.info
    }

    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, BtcError> {
        timed_call(&self.transport, method, params, self.rpc_timeout).await
    }

    /// Call a method known to run for a long time (rescans).
    pub async fn call_slow(&self, method: &str, params: Vec<Value>) -> Result<Value, BtcError> {
        timed_call(&self.transport, method, params, self.rescan_timeout).await
    }

    /// Fail unless the daemon runs the chain the transaction is for.
    pub fn check_chain(&self, params: &ChainParams) -> Result<(), BtcError> {
        if self.info.network != params.network {
            return Err(BtcError::WrongChain {
                expected: params.chain_name(),
                actual: self.info.network.to_string(),
            });
        }
        if !params.is_genesis(&self.info.genesis_hash) {
            return Err(BtcError::WrongChain {
                expected: format!("{} {}", params.coin, params.chain_name()),
                actual: format!("a chain with genesis block {}", self.info.genesis_hash),
            });
        }
        Ok(())
    }

    /// Network fee rate per kilobyte, from `estimatesmartfee` with a fallback
    /// to the older `estimatefee`.
    pub async fn estimate_fee_rate(
        &self,
        confs: u32,
        mode: FeeEstimateMode,
    ) -> Result<Amount, BtcError> {
        match self
            .call("estimatesmartfee", vec![json!(confs), json!(mode.as_rpc_str())])
            .await
        {
            Ok(reply) => match reply.get("feerate") {
                Some(rate) => {
                    return Amount::from_rpc_value(rate)
                        .map_err(|e| BtcError::NoFeeEstimate(e.to_string()));
                }
                None => warn!("estimatesmartfee returned no fee rate, trying estimatefee"),
            },
            Err(e) => warn!(error = %e, "estimatesmartfee failed, trying estimatefee"),
        }
        let reply = self.call("estimatefee", vec![json!(confs)]).await?;
        match reply.as_f64() {
            Some(rate) if rate >= 0.0 => Amount::from_coin_f64(rate),
            _ => Err(BtcError::NoFeeEstimate(format!(
                "estimatefee {confs} returned {reply}"
            ))),
        }
    }

    /// Have the daemon build the unsigned transaction.
    pub async fn create_raw_transaction(
        &self,
        inputs: &[TxInput],
        outputs: &[TxOutput],
        locktime: u32,
    ) -> Result<String, BtcError> {
        let ins: Vec<Value> = inputs
            .iter()
            .map(|i| json!({ "txid": i.txid, "vout": i.vout, "sequence": i.effective_sequence() }))
            .collect();
        let outs: Vec<Value> = outputs
            .iter()
            .map(|o| match &o.dest {
                OutputDest::Addr(a) => {
                    let mut m = serde_json::Map::new();
                    m.insert(a.clone(), json!(o.amount.to_string()));
                    Value::Object(m)
                }
                OutputDest::Data(d) => json!({ "data": hex::encode(d) }),
            })
            .collect();
        let reply = self
            .call("createrawtransaction", vec![json!(ins), json!(outs), json!(locktime)])
            .await?;
        reply
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| reply_err("createrawtransaction", reply.to_string()))
    }

    pub async fn decode_raw_transaction(&self, tx_hex: &str) -> Result<DecodedTx, BtcError> {
        let reply = self.call("decoderawtransaction", vec![json!(tx_hex)]).await?;
        serde_json::from_value(reply).map_err(|e| reply_err("decoderawtransaction", e.to_string()))
    }

    /// Sign with the given keys. Uses `signrawtransactionwithkey` when the
    /// daemon has it.
    pub async fn sign_raw_transaction(
        &self,
        tx_hex: &str,
        keys: &[SigningKey],
        sig_data: Vec<Value>,
        sighash: &str,
    ) -> Result<SignReply, BtcError> {
        let keys: Vec<Value> = keys.iter().map(|k| json!(k.wif.expose_secret())).collect();
        let (method, params) = if self.info.caps.sign_with_key {
            (
                "signrawtransactionwithkey",
                vec![json!(tx_hex), json!(keys), json!(sig_data), json!(sighash)],
            )
        } else {
            (
                "signrawtransaction",
                vec![json!(tx_hex), json!(sig_data), json!(keys), json!(sighash)],
            )
        };
        let reply = self.call(method, params).await?;
        serde_json::from_value(reply).map_err(|e| reply_err(method, e.to_string()))
    }

    /// Broadcast a signed transaction, returning the daemon's txid.
    pub async fn send_raw_transaction(&self, tx_hex: &str) -> Result<String, BtcError> {
        match self.call("sendrawtransaction", vec![json!(tx_hex)]).await {
            Ok(reply) => reply
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| reply_err("sendrawtransaction", reply.to_string())),
            Err(BtcError::Rpc { message, .. }) => Err(BtcError::BroadcastRejected {
                kind: RejectKind::classify(&message),
                message,
            }),
            Err(e) => Err(e),
        }
    }
}
