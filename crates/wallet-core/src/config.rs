//! Loading [`TxConfig`] from JSON.

use std::path::Path;

use chain_btc::config::TxConfig;

use crate::error::WalletError;

/// Parse a config document. Absent keys take their defaults.
pub fn parse_config(json: &str) -> Result<TxConfig, WalletError> {
    let cfg: TxConfig = serde_json::from_str(json).map_err(|e| WalletError::Config(e.to_string()))?;
    validate(&cfg)?;
    Ok(cfg)
}

pub fn load_config(path: &Path) -> Result<TxConfig, WalletError> {
    let text = std::fs::read_to_string(path).map_err(|e| WalletError::io(path, e))?;
    parse_config(&text)
}

fn validate(cfg: &TxConfig) -> Result<(), WalletError> {
    if !(cfg.fee_adjust.is_finite() && cfg.fee_adjust > 0.0) {
        return Err(WalletError::Config(format!("fee_adjust must be positive, got {}", cfg.fee_adjust)));
    }
    if let Some(adj) = cfg.vsize_adj {
        if !(adj.is_finite() && adj > 0.0) {
            return Err(WalletError::Config(format!("vsize_adj must be positive, got {adj}")));
        }
    }
    if cfg.fee_estimate_confs == 0 {
        return Err(WalletError::Config("fee_estimate_confs must be at least 1".into()));
    }
    if cfg.scan_poll_ms == 0 {
        return Err(WalletError::Config("scan_poll_ms must be non-zero".into()));
    }
    if cfg.max_tx_file_size == 0 {
        return Err(WalletError::Config("max_tx_file_size must be non-zero".into()));
    }
    Ok(())
}
