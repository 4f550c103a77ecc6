//! Transaction inputs and outputs as the wallet models them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::address::{AddrFormat, CoinAddr};
use crate::amount::Amount;
use crate::error::BtcError;
use crate::params::{ChainParams, MAX_SEQUENCE};
use crate::script::OutputDest;

/// Wallet address type of an input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddrType {
    /// Legacy P2PKH, uncompressed public key.
    L,
    /// Legacy P2PKH, compressed public key.
    C,
    /// Segwit key-hash wrapped in P2SH.
    S,
    /// Native segwit key-hash (bech32).
    B,
}

impl AddrType {
    pub fn is_segwit(self) -> bool {
        matches!(self, AddrType::S | AddrType::B)
    }

    pub fn letter(self) -> char {
        match self {
            AddrType::L => 'L',
            AddrType::C => 'C',
            AddrType::S => 'S',
            AddrType::B => 'B',
        }
    }

    /// The address format this type pays to.
    pub fn addr_format(self) -> AddrFormat {
        match self {
            AddrType::L | AddrType::C => AddrFormat::P2pkh,
            AddrType::S => AddrFormat::P2sh,
            AddrType::B => AddrFormat::Bech32,
        }
    }
}

impl FromStr for AddrType {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" => Ok(AddrType::L),
            "C" => Ok(AddrType::C),
            "S" => Ok(AddrType::S),
            "B" => Ok(AddrType::B),
            _ => Err(BtcError::InvalidWalletId(format!("unknown address type '{s}'"))),
        }
    }
}

/// Wallet-derived address id: `SEEDID:TYPE:INDEX`, e.g. `F00DBABE:C:3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletId {
    pub seed_id: String,
    pub addr_type: AddrType,
    pub index: u32,
}

impl std::fmt::Display for WalletId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.seed_id, self.addr_type.letter(), self.index)
    }
}

impl FromStr for WalletId {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || BtcError::InvalidWalletId(s.to_string());
        let mut parts = s.split(':');
        let (Some(seed), Some(kind), Some(idx), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(bad());
        };
        if seed.len() != 8 || !seed.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(bad());
        }
        let index: u32 = idx.parse().map_err(|_| bad())?;
        if index == 0 {
            return Err(bad());
        }
        Ok(WalletId {
            seed_id: seed.to_ascii_uppercase(),
            addr_type: kind.parse()?,
            index,
        })
    }
}

impl TryFrom<String> for WalletId {
    type Error = BtcError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<WalletId> for String {
    fn from(id: WalletId) -> Self {
        id.to_string()
    }
}

/// A transaction input: an unspent output being spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Previous transaction id, display-order hex.
    pub txid: String,
    pub vout: u32,
    pub amount: Amount,
    /// Address claimed to own the output.
    pub addr: String,
    /// Wallet address type; `None` for foreign P2PKH addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr_type: Option<AddrType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<WalletId>,
    /// Sequence number; `None` means final (`0xffffffff`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u32>,
    /// Claimed scriptPubKey of the spent output, hex.
    pub script_pubkey: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub confs: u64,
}

impl TxInput {
    pub fn effective_sequence(&self) -> u32 {
        self.sequence.unwrap_or(MAX_SEQUENCE)
    }

    pub fn is_segwit(&self) -> bool {
        self.addr_type.is_some_and(AddrType::is_segwit)
    }

    /// Previous txid as raw bytes in display order, the BIP-69 sort key.
    pub fn txid_bytes(&self) -> Result<[u8; 32], BtcError> {
        let bytes = hex::decode(&self.txid)
            .map_err(|e| BtcError::InvalidHex(format!("input txid {}: {e}", self.txid)))?;
        bytes
            .try_into()
            .map_err(|_| BtcError::InvalidTransaction(format!("input txid {} is not 32 bytes", self.txid)))
    }

    /// Verify the claimed scriptPubKey is the one the claimed address
    /// implies.
    pub fn check_script_pubkey(&self, params: &ChainParams) -> Result<(), BtcError> {
        let expected = CoinAddr::parse(&self.addr, params)?.script_pubkey(params);
        if hex::encode(expected) != self.script_pubkey.to_ascii_lowercase() {
            return Err(BtcError::ScriptPubKeyMismatch {
                addr: self.addr.clone(),
                script: self.script_pubkey.clone(),
            });
        }
        Ok(())
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    #[serde(flatten)]
    pub dest: OutputDest,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_id: Option<WalletId>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl TxOutput {
    pub fn to_addr(addr: impl Into<String>, amount: Amount) -> Self {
        TxOutput {
            dest: OutputDest::Addr(addr.into()),
            amount,
            wallet_id: None,
            is_change: false,
            comment: None,
        }
    }

    pub fn data(payload: Vec<u8>) -> Self {
        TxOutput {
            dest: OutputDest::Data(payload),
            amount: Amount::ZERO,
            wallet_id: None,
            is_change: false,
            comment: None,
        }
    }

    /// Whether this output pays to a segwit address.
    ///
    /// Wallet outputs are judged by their address type; foreign outputs
    /// only when the address is native segwit.
    pub fn is_segwit(&self, params: &ChainParams) -> bool {
        if let Some(id) = &self.wallet_id {
            return id.addr_type.is_segwit();
        }
        match &self.dest {
            OutputDest::Addr(a) => CoinAddr::parse(a, params)
                .map(|addr| addr.format().is_segwit())
                .unwrap_or(false),
            OutputDest::Data(_) => false,
        }
    }
}
