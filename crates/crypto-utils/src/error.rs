use thiserror::Error;

/// Hashing and encoding errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid base58 data: {0}")]
    InvalidBase58(String),

    #[error("invalid UTF-8 in decoded data: {0}")]
    InvalidUtf8(String),
}
