//! Key material and per-input signing data handed to the daemon's signer.

use crypto_utils::digest::hash160;
use secrecy::SecretString;
use serde_json::{json, Value};

use crate::address::CoinAddr;
use crate::error::BtcError;
use crate::io::{AddrType, TxInput};
use crate::params::ChainParams;

/// A private key for one input address.
#[derive(Debug)]
pub struct SigningKey {
    pub addr: String,
    /// Wallet import format.
    pub wif: SecretString,
    /// P2SH redeem script for wrapped segwit addresses.
    pub redeem_script: Option<Vec<u8>>,
}

impl SigningKey {
    pub fn new(addr: impl Into<String>, wif: impl Into<String>) -> Self {
        SigningKey {
            addr: addr.into(),
            wif: SecretString::from(wif.into()),
            redeem_script: None,
        }
    }

    pub fn with_redeem_script(mut self, script: Vec<u8>) -> Self {
        self.redeem_script = Some(script);
        self
    }
}

/// Previous-output data for each input, as the signing calls expect it.
///
/// Wrapped segwit inputs need the redeem script of their key, and it must
/// hash to the input's P2SH address.
pub fn build_sig_data(
    inputs: &[TxInput],
    keys: &[SigningKey],
    params: &ChainParams,
) -> Result<Vec<Value>, BtcError> {
    inputs
        .iter()
        .map(|input| {
            let mut entry = json!({
                "txid": input.txid,
                "vout": input.vout,
                "scriptPubKey": input.script_pubkey,
                "amount": input.amount.to_string(),
            });
            if input.addr_type == Some(AddrType::S) {
                let redeem = keys
                    .iter()
                    .find(|k| k.addr == input.addr)
                    .and_then(|k| k.redeem_script.as_deref())
                    .ok_or_else(|| BtcError::RedeemScriptMismatch(input.addr.clone()))?;
                let addr = CoinAddr::parse(&input.addr, params)?;
                if hash160(redeem) != *addr.hash() {
                    return Err(BtcError::RedeemScriptMismatch(input.addr.clone()));
                }
                entry["redeemScript"] = json!(hex::encode(redeem));
            }
            Ok(entry)
        })
        .collect()
}
