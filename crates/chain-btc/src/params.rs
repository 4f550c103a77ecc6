//! Per-coin, per-network protocol parameters.

use std::str::FromStr;

use chrono::DateTime;

use crate::amount::Amount;
use crate::error::BtcError;
use crate::network::BtcNetwork;

/// Largest 32-bit sequence number; also the "final" sequence.
pub const MAX_SEQUENCE: u32 = 0xffff_ffff;

/// Sequence signalling opt-in replace-by-fee.
pub const RBF_SEQUENCE: u32 = MAX_SEQUENCE - 2;

/// Sequence enabling locktime without signalling replaceability.
pub const LOCKTIME_SEQUENCE: u32 = MAX_SEQUENCE - 1;

/// Locktimes below this are block heights, above it Unix timestamps.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// A non-zero transaction locktime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locktime {
    /// Earliest block height the transaction can be mined at.
    Height(u32),
    /// Unix time that the median time of past blocks must exceed.
    Time(u32),
}

impl Locktime {
    /// Interpret a raw nLockTime; zero means no locktime.
    pub fn from_consensus(n: u32) -> Option<Self> {
        match n {
            0 => None,
            n if n < LOCKTIME_THRESHOLD => Some(Locktime::Height(n)),
            n => Some(Locktime::Time(n)),
        }
    }

    pub fn to_consensus(self) -> u32 {
        match self {
            Locktime::Height(n) | Locktime::Time(n) => n,
        }
    }
}

impl std::fmt::Display for Locktime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Locktime::Height(n) => write!(f, "block height {n}"),
            Locktime::Time(n) => match DateTime::from_timestamp(i64::from(n), 0) {
                Some(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S UTC")),
                None => write!(f, "time {n}"),
            },
        }
    }
}

/// Genesis block hashes, as returned by `getblockhash 0`.
const BTC_MAINNET_GENESIS: &str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
const BTC_TESTNET3_GENESIS: &str = "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943";
const BTC_TESTNET4_GENESIS: &str = "00000000da84f2bafbbc53dee25a72ae507ff4914b867c565be350b0da8bf043";
const BTC_SIGNET_GENESIS: &str = "00000008819873e925422c1ff0f99f7cc9bbb232af63a077a480a3633bee1ef6";
const BTC_REGTEST_GENESIS: &str = "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206";
const BCH_TESTNET4_GENESIS: &str = "000000001dd410c49a788668ce26751718cc797474d3152a5fc073dd44fd9f7b";
const LTC_MAINNET_GENESIS: &str = "12a765e31ffd4059bada1e25190f6e98c99d9714d334efa41a195a7e7e04bfe2";
const LTC_TESTNET4_GENESIS: &str = "4966625a4b2851d9fdee139e56211a0d88575f59ed816ff5e6a63deb4e3e29a0";
const LTC_REGTEST_GENESIS: &str = "530827f38f93b43ed12af0b3ad25a288dc02ed74d6d7857862df51fc56c416f9";

/// Maximum OP_RETURN payload relayed by default policy.
pub const MAX_OP_RETURN_DATA_LEN: usize = 80;

/// Bitcoin-family coins handled by the binary codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coin {
    Btc,
    Ltc,
    Bch,
}

impl Coin {
    pub fn symbol(self) -> &'static str {
        match self {
            Coin::Btc => "BTC",
            Coin::Ltc => "LTC",
            Coin::Bch => "BCH",
        }
    }
}

impl std::fmt::Display for Coin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Coin {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BTC" => Ok(Coin::Btc),
            "LTC" => Ok(Coin::Ltc),
            "BCH" => Ok(Coin::Bch),
            _ => Err(BtcError::UnsupportedCoin(s.to_string())),
        }
    }
}

/// Protocol constants for one coin on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    pub coin: Coin,
    pub network: BtcNetwork,
    /// Base58 version byte of pay-to-pubkey-hash addresses.
    pub p2pkh_version: u8,
    /// Base58 version byte of pay-to-script-hash addresses.
    pub p2sh_version: u8,
    /// Bech32 human-readable part, `None` for coins without segwit.
    pub bech32_hrp: Option<&'static str>,
    pub witness_version: u8,
    /// Absolute fee ceiling, in smallest units.
    pub max_tx_fee: Amount,
    pub supports_rbf: bool,
    pub supports_segwit: bool,
    /// Sighash flag name passed to the signer.
    pub sighash_type: &'static str,
    /// Genesis hashes of the chains this coin and network may run on.
    /// BCH shares its mainnet and testnet3 history with BTC.
    pub genesis_hashes: &'static [&'static str],
}

impl ChainParams {
    pub fn new(coin: Coin, network: BtcNetwork) -> Self {
        let testnet = network.is_testnet();
        match coin {
            Coin::Btc => ChainParams {
                coin,
                network,
                p2pkh_version: if testnet { 0x6f } else { 0x00 },
                p2sh_version: if testnet { 0xc4 } else { 0x05 },
                bech32_hrp: Some(match network {
                    BtcNetwork::Mainnet => "bc",
                    BtcNetwork::Testnet => "tb",
                    BtcNetwork::Regtest => "bcrt",
                }),
                witness_version: 0,
                max_tx_fee: Amount::from_sat(300_000),
                supports_rbf: true,
                supports_segwit: true,
                sighash_type: "ALL",
                genesis_hashes: match network {
                    BtcNetwork::Mainnet => &[BTC_MAINNET_GENESIS],
                    BtcNetwork::Testnet => &[BTC_TESTNET3_GENESIS, BTC_TESTNET4_GENESIS, BTC_SIGNET_GENESIS],
                    BtcNetwork::Regtest => &[BTC_REGTEST_GENESIS],
                },
            },
            Coin::Ltc => ChainParams {
                coin,
                network,
                p2pkh_version: if testnet { 0x6f } else { 0x30 },
                p2sh_version: if testnet { 0x3a } else { 0x32 },
                bech32_hrp: Some(match network {
                    BtcNetwork::Mainnet => "ltc",
                    BtcNetwork::Testnet => "tltc",
                    BtcNetwork::Regtest => "rltc",
                }),
                witness_version: 0,
                max_tx_fee: Amount::from_sat(30_000_000),
                supports_rbf: true,
                supports_segwit: true,
                sighash_type: "ALL",
                genesis_hashes: match network {
                    BtcNetwork::Mainnet => &[LTC_MAINNET_GENESIS],
                    BtcNetwork::Testnet => &[LTC_TESTNET4_GENESIS],
                    BtcNetwork::Regtest => &[LTC_REGTEST_GENESIS],
                },
            },
            Coin::Bch => ChainParams {
                coin,
                network,
                p2pkh_version: if testnet { 0x6f } else { 0x00 },
                p2sh_version: if testnet { 0xc4 } else { 0x05 },
                bech32_hrp: None,
                witness_version: 0,
                max_tx_fee: Amount::from_sat(10_000_000),
                supports_rbf: false,
                supports_segwit: false,
                sighash_type: "ALL|FORKID",
                genesis_hashes: match network {
                    BtcNetwork::Mainnet => &[BTC_MAINNET_GENESIS],
                    BtcNetwork::Testnet => &[BTC_TESTNET3_GENESIS, BCH_TESTNET4_GENESIS],
                    BtcNetwork::Regtest => &[BTC_REGTEST_GENESIS],
                },
            },
        }
    }

    /// Chain name as recorded in transaction files.
    pub fn chain_name(&self) -> String {
        self.network.to_string()
    }

    pub fn is_genesis(&self, hash: &str) -> bool {
        self.genesis_hashes.iter().any(|h| h.eq_ignore_ascii_case(hash))
    }
}
