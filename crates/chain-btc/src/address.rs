use bech32::{Fe32, Hrp};

use crate::error::BtcError;
use crate::params::ChainParams;
use crate::script;

/// Address formats understood by the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrFormat {
    P2pkh,
    P2sh,
    /// Native segwit key-hash (bech32, witness v0, 20-byte program).
    Bech32,
}

impl AddrFormat {
    pub fn is_segwit(self) -> bool {
        matches!(self, AddrFormat::Bech32)
    }
}

/// A coin address validated against one chain's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoinAddr {
    format: AddrFormat,
    hash: [u8; 20],
    encoded: String,
}

impl CoinAddr {
    /// Parse a base58check or bech32 address for the given chain.
    ///
    /// Bech32 strings are normalized to lower case.
    pub fn parse(s: &str, params: &ChainParams) -> Result<Self, BtcError> {
        if let Some(hrp) = params.bech32_hrp {
            let lower = s.to_ascii_lowercase();
            if lower.starts_with(&format!("{hrp}1")) {
                return Self::parse_bech32(&lower, hrp, params);
            }
        }
        Self::parse_base58(s, params)
    }

    fn parse_bech32(s: &str, hrp: &str, params: &ChainParams) -> Result<Self, BtcError> {
        let (got_hrp, version, program) = bech32::segwit::decode(s)
            .map_err(|e| BtcError::InvalidAddress(format!("{s}: bech32 decode failed: {e}")))?;
        if got_hrp.as_str() != hrp {
            return Err(BtcError::InvalidAddress(format!(
                "{s}: human-readable part '{got_hrp}' is not '{hrp}'"
            )));
        }
        if version.to_u8() != params.witness_version {
            return Err(BtcError::InvalidAddress(format!(
                "{s}: unsupported witness version {}",
                version.to_u8()
            )));
        }
        let hash: [u8; 20] = program.as_slice().try_into().map_err(|_| {
            BtcError::InvalidAddress(format!(
                "{s}: witness program is {} bytes, expected 20",
                program.len()
            ))
        })?;
        Ok(CoinAddr {
            format: AddrFormat::Bech32,
            hash,
            encoded: s.to_string(),
        })
    }

    fn parse_base58(s: &str, params: &ChainParams) -> Result<Self, BtcError> {
        let payload = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| BtcError::InvalidAddress(format!("{s}: base58check decode failed: {e}")))?;
        let (version, hash) = payload
            .split_first()
            .ok_or_else(|| BtcError::InvalidAddress(format!("{s}: empty payload")))?;
        let hash: [u8; 20] = hash.try_into().map_err(|_| {
            BtcError::InvalidAddress(format!("{s}: payload is {} bytes, expected 21", payload.len()))
        })?;
        let format = if *version == params.p2pkh_version {
            AddrFormat::P2pkh
        } else if *version == params.p2sh_version {
            AddrFormat::P2sh
        } else {
            return Err(BtcError::InvalidAddress(format!(
                "{s}: version byte {version:#04x} is not valid for {} {}",
                params.coin, params.network
            )));
        };
        Ok(CoinAddr {
            format,
            hash,
            encoded: s.to_string(),
        })
    }

    /// Build the address committing to `hash` in the given format.
    pub fn from_hash(
        format: AddrFormat,
        hash: [u8; 20],
        params: &ChainParams,
    ) -> Result<Self, BtcError> {
        let encoded = match format {
            AddrFormat::P2pkh => base58check(params.p2pkh_version, &hash),
            AddrFormat::P2sh => base58check(params.p2sh_version, &hash),
            AddrFormat::Bech32 => {
                let hrp_str = params.bech32_hrp.ok_or_else(|| {
                    BtcError::SegwitUnsupported(format!("{} has no bech32 addresses", params.coin))
                })?;
                let hrp = Hrp::parse(hrp_str)
                    .map_err(|e| BtcError::InvalidAddress(format!("invalid hrp '{hrp_str}': {e}")))?;
                let version = Fe32::try_from(params.witness_version).map_err(|e| {
                    BtcError::InvalidAddress(format!("invalid witness version: {e}"))
                })?;
                bech32::segwit::encode(hrp, version, &hash)
                    .map_err(|e| BtcError::InvalidAddress(format!("bech32 encode failed: {e}")))?
            }
        };
        Ok(CoinAddr {
            format,
            hash,
            encoded,
        })
    }

    pub fn format(&self) -> AddrFormat {
        self.format
    }

    pub fn hash(&self) -> &[u8; 20] {
        &self.hash
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// The output script paying to this address.
    pub fn script_pubkey(&self, params: &ChainParams) -> Vec<u8> {
        match self.format {
            AddrFormat::P2pkh => script::p2pkh_script(&self.hash),
            AddrFormat::P2sh => script::p2sh_script(&self.hash),
            AddrFormat::Bech32 => script::segwit_script(params.witness_version, &self.hash),
        }
    }
}

impl std::fmt::Display for CoinAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encoded)
    }
}

fn base58check(version: u8, hash: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(hash);
    bs58::encode(payload).with_check().into_string()
}
