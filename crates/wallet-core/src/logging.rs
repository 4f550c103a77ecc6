use chain_btc::config::TxConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::WalletError;

/// Log filter: `RUST_LOG` when set, else the configured verbosity.
pub fn env_filter(cfg: &TxConfig) -> Result<EnvFilter, WalletError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&cfg.verbosity).map_err(|e| WalletError::Logging(e.to_string())),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(cfg: &TxConfig) -> Result<(), WalletError> {
    tracing_subscriber::registry()
        .with(env_filter(cfg)?)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| WalletError::Logging(e.to_string()))
}
