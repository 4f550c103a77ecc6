//! Output specs as the user writes them, and their resolution to outputs.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;

use crate::address::CoinAddr;
use crate::amount::Amount;
use crate::error::BtcError;
use crate::io::{AddrType, TxOutput, WalletId};
use crate::params::{ChainParams, MAX_OP_RETURN_DATA_LEN};

/// Wallet-side address lookups needed to resolve output specs.
#[async_trait]
pub trait AddressBook: Send + Sync {
    /// Address of a wallet id.
    async fn resolve(&self, id: &WalletId) -> Result<String, BtcError>;

    /// First unused address of the given type, for change.
    async fn next_change_addr(&self, addr_type: AddrType) -> Result<(WalletId, String), BtcError>;
}

/// One output as given on the command line.
///
/// - `ADDR,AMT` or `WALLET_ID,AMT`: payment
/// - `ADDR` or `WALLET_ID`: change to that address
/// - `L`, `C`, `S` or `B`: change to the next unused wallet address of that type
/// - `data:TEXT` or `hexdata:HEX`: OP_RETURN payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSpec {
    Addr { addr: String, amount: Option<Amount> },
    WalletId { id: WalletId, amount: Option<Amount> },
    ChangeType(AddrType),
    Data(Vec<u8>),
}

fn check_data_len(spec: &str, data: &[u8]) -> Result<(), BtcError> {
    if data.is_empty() || data.len() > MAX_OP_RETURN_DATA_LEN {
        return Err(BtcError::InvalidOpReturnData(format!(
            "'{spec}': payload must be 1 to {MAX_OP_RETURN_DATA_LEN} bytes"
        )));
    }
    Ok(())
}

impl FromStr for OutputSpec {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(text) = s.strip_prefix("data:") {
            check_data_len(s, text.as_bytes())?;
            return Ok(OutputSpec::Data(text.as_bytes().to_vec()));
        }
        if let Some(h) = s.strip_prefix("hexdata:") {
            let data = hex::decode(h).map_err(|e| BtcError::InvalidOpReturnData(format!("'{s}': {e}")))?;
            check_data_len(s, &data)?;
            return Ok(OutputSpec::Data(data));
        }
        if s.len() == 1 {
            return s.parse().map(OutputSpec::ChangeType);
        }
        let (dest, amount) = match s.split_once(',') {
            Some((d, a)) => {
                let amt: Amount = a.parse()?;
                if amt.is_zero() {
                    return Err(BtcError::InvalidOutputSpec(format!("'{s}': zero amount")));
                }
                (d, Some(amt))
            }
            None => (s, None),
        };
        if dest.is_empty() {
            return Err(BtcError::InvalidOutputSpec(s.to_string()));
        }
        Ok(match dest.parse::<WalletId>() {
            Ok(id) => OutputSpec::WalletId { id, amount },
            Err(_) => OutputSpec::Addr {
                addr: dest.to_string(),
                amount,
            },
        })
    }
}

fn output(addr: &CoinAddr, amount: Option<Amount>, wallet_id: Option<WalletId>) -> TxOutput {
    TxOutput {
        wallet_id,
        is_change: amount.is_none(),
        ..TxOutput::to_addr(addr.as_str(), amount.unwrap_or(Amount::ZERO))
    }
}

/// Exactly one output takes the change, and no address is paid twice.
fn check_outputs(outputs: &[TxOutput]) -> Result<(), BtcError> {
    match outputs.iter().filter(|o| o.is_change).count() {
        0 => return Err(BtcError::NoChangeOutput),
        1 => {}
        n => return Err(BtcError::InvalidOutputSpec(format!("{n} change outputs given, expected one"))),
    }
    let mut seen = HashSet::new();
    for addr in outputs.iter().filter_map(|o| o.dest.addr()) {
        if !seen.insert(addr) {
            return Err(BtcError::DuplicateAddress(addr.to_string()));
        }
    }
    Ok(())
}

/// Resolve specs to outputs. Change outputs get a zero amount, filled in
/// once the fee is known.
pub async fn resolve_outputs<B: AddressBook + ?Sized>(
    specs: &[OutputSpec],
    book: &B,
    params: &ChainParams,
) -> Result<Vec<TxOutput>, BtcError> {
    let mut outputs = Vec::with_capacity(specs.len());
    for spec in specs {
        let out = match spec {
            OutputSpec::Addr { addr, amount } => output(&CoinAddr::parse(addr, params)?, *amount, None),
            OutputSpec::WalletId { id, amount } => {
                let addr = book.resolve(id).await?;
                output(&CoinAddr::parse(&addr, params)?, *amount, Some(id.clone()))
            }
            OutputSpec::ChangeType(t) => {
                if t.is_segwit() && !params.supports_segwit {
                    return Err(BtcError::SegwitUnsupported(format!(
                        "{} has no '{}' addresses",
                        params.coin,
                        t.letter()
                    )));
                }
                let (id, addr) = book.next_change_addr(*t).await?;
                output(&CoinAddr::parse(&addr, params)?, None, Some(id))
            }
            OutputSpec::Data(d) => TxOutput::data(d.clone()),
        };
        outputs.push(out);
    }
    check_outputs(&outputs)?;
    Ok(outputs)
}
