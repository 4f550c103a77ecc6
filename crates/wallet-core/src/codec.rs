//! Protocol codecs behind one capability trait.
//!
//! The file layer and batch tools only see [`TxCodec`]; which
//! implementation they get is decided once, from the protocol tag.

use std::fmt;
use std::str::FromStr;

use chain_btc::codec::{deserialize, encode_unsigned, DeserializedTx};
use chain_btc::config::TxConfig;
use chain_btc::error::BtcError;
use chain_btc::lifecycle::TxData;
use chain_btc::params::{ChainParams, Coin};
use chain_btc::size::estimate;

use crate::error::WalletError;

/// Wire protocol family of a coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolTag {
    /// Binary Bitcoin serialization: BTC, LTC, BCH.
    Bitcoin,
}

impl ProtocolTag {
    pub fn for_coin(coin: Coin) -> Self {
        match coin {
            Coin::Btc | Coin::Ltc | Coin::Bch => ProtocolTag::Bitcoin,
        }
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolTag::Bitcoin => f.write_str("bitcoin"),
        }
    }
}

impl FromStr for ProtocolTag {
    type Err = WalletError;

    /// Accepts a family name or any coin symbol of the family.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("bitcoin") {
            return Ok(ProtocolTag::Bitcoin);
        }
        s.parse::<Coin>()
            .map(ProtocolTag::for_coin)
            .map_err(|_| WalletError::UnsupportedProtocol(s.to_string()))
    }
}

/// Encode, decode and size transactions for one protocol family.
pub trait TxCodec: Send + Sync {
    fn protocol(&self) -> ProtocolTag;

    fn params(&self) -> &ChainParams;

    /// Canonical unsigned bytes for the transaction in its current order.
    fn encode_unsigned(&self, tx: &TxData) -> Result<Vec<u8>, BtcError>;

    fn decode(&self, bytes: &[u8]) -> Result<DeserializedTx, BtcError>;

    /// `None` when the transaction has no inputs or no outputs.
    fn estimate_vsize(&self, tx: &TxData, cfg: &TxConfig) -> Result<Option<u64>, BtcError>;

    fn decode_hex(&self, tx_hex: &str) -> Result<DeserializedTx, BtcError> {
        let bytes = hex::decode(tx_hex).map_err(|e| BtcError::InvalidHex(e.to_string()))?;
        self.decode(&bytes)
    }
}

#[derive(Debug, Clone)]
pub struct BitcoinCodec {
    params: ChainParams,
}

impl BitcoinCodec {
    pub fn new(params: ChainParams) -> Self {
        BitcoinCodec { params }
    }
}

impl TxCodec for BitcoinCodec {
    fn protocol(&self) -> ProtocolTag {
        ProtocolTag::Bitcoin
    }

    fn params(&self) -> &ChainParams {
        &self.params
    }

    fn encode_unsigned(&self, tx: &TxData) -> Result<Vec<u8>, BtcError> {
        encode_unsigned(&tx.inputs, &tx.outputs, tx.locktime, &self.params)
    }

    fn decode(&self, bytes: &[u8]) -> Result<DeserializedTx, BtcError> {
        deserialize(bytes, &self.params)
    }

    fn estimate_vsize(&self, tx: &TxData, cfg: &TxConfig) -> Result<Option<u64>, BtcError> {
        Ok(estimate(&tx.inputs, &tx.outputs, &self.params, cfg.vsize_adj)?.map(|e| e.vsize))
    }
}

/// Codec for `tag` on the chain described by `params`.
pub fn codec_for(tag: ProtocolTag, params: ChainParams) -> Box<dyn TxCodec> {
    match tag {
        ProtocolTag::Bitcoin => Box::new(BitcoinCodec::new(params)),
    }
}
