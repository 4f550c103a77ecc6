//! Transaction-building configuration.
//!
//! One value is built at startup and passed by reference to the daemon
//! session, the lifecycle and the file layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Mode passed to `estimatesmartfee`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeEstimateMode {
    #[default]
    Conservative,
    Economical,
}

impl FeeEstimateMode {
    pub fn as_rpc_str(self) -> &'static str {
        match self {
            FeeEstimateMode::Conservative => "CONSERVATIVE",
            FeeEstimateMode::Economical => "ECONOMICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxConfig {
    /// Multiplier applied to network fee estimates.
    pub fee_adjust: f64,
    /// Confirmation target for fee estimation.
    pub fee_estimate_confs: u32,
    pub fee_estimate_mode: FeeEstimateMode,
    /// Correction factor for the vsize estimate, as suggested by a failed
    /// size check.
    pub vsize_adj: Option<f64>,
    /// Do not signal replace-by-fee.
    pub no_rbf: bool,
    /// Block height or Unix timestamp.
    pub locktime: Option<u32>,
    pub max_tx_file_size: usize,
    pub rpc_timeout_secs: u64,
    pub rescan_timeout_secs: u64,
    pub scan_poll_ms: u64,
    /// Log filter directive, e.g. `info` or `chain_btc=debug`.
    pub verbosity: String,
}

impl Default for TxConfig {
    fn default() -> Self {
        TxConfig {
            fee_adjust: 1.0,
            fee_estimate_confs: 3,
            fee_estimate_mode: FeeEstimateMode::default(),
            vsize_adj: None,
            no_rbf: false,
            locktime: None,
            max_tx_file_size: 100_000,
            rpc_timeout_secs: 60,
            rescan_timeout_secs: 7200,
            scan_poll_ms: 1000,
            verbosity: "info".to_string(),
        }
    }
}

impl TxConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn rescan_timeout(&self) -> Duration {
        Duration::from_secs(self.rescan_timeout_secs)
    }

    pub fn scan_poll_interval(&self) -> Duration {
        Duration::from_millis(self.scan_poll_ms.max(1))
    }
}
