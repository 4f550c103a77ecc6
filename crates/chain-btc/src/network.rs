use std::str::FromStr;

use crate::error::BtcError;

/// Supported Bitcoin-family networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
    Regtest,
}

impl BtcNetwork {
    /// Map the `chain` field of `getblockchaininfo` (`main`, `test`,
    /// `testnet4`, `regtest`) to a network.
    pub fn from_daemon_chain(chain: &str) -> Result<Self, BtcError> {
        match chain {
            "main" => Ok(BtcNetwork::Mainnet),
            "test" | "testnet4" | "signet" => Ok(BtcNetwork::Testnet),
            "regtest" => Ok(BtcNetwork::Regtest),
            other => Err(BtcError::InvalidNetwork(format!(
                "unrecognized daemon chain name '{other}'"
            ))),
        }
    }

    /// Whether this is a test network (testnet or regtest).
    pub fn is_testnet(self) -> bool {
        !matches!(self, BtcNetwork::Mainnet)
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "mainnet"),
            BtcNetwork::Testnet => write!(f, "testnet"),
            BtcNetwork::Regtest => write!(f, "regtest"),
        }
    }
}

impl FromStr for BtcNetwork {
    type Err = BtcError;

    /// Parse a chain name as written in transaction files (any case).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(BtcNetwork::Mainnet),
            "testnet" => Ok(BtcNetwork::Testnet),
            "regtest" => Ok(BtcNetwork::Regtest),
            _ => Err(BtcError::InvalidNetwork(s.to_string())),
        }
    }
}
