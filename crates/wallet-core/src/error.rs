use chain_btc::error::BtcError;
use crypto_utils::error::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Transaction file: {field}: {detail}")]
    TxFile { field: &'static str, detail: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Btc(BtcError),

    #[error("Armor: {0}")]
    Crypto(CryptoError),
}

impl WalletError {
    pub(crate) fn tx_file(field: &'static str, detail: impl Into<String>) -> Self {
        WalletError::TxFile {
            field,
            detail: detail.into(),
        }
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        WalletError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Process exit code for a CLI layer.
    pub fn exit_code(&self) -> i32 {
        match self {
            WalletError::Btc(e) => e.exit_code(),
            _ => 1,
        }
    }
}

impl From<CryptoError> for WalletError {
    fn from(e: CryptoError) -> Self {
        WalletError::Crypto(e)
    }
}

impl From<BtcError> for WalletError {
    fn from(e: BtcError) -> Self {
        WalletError::Btc(e)
    }
}
