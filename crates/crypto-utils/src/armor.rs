//! Base58 armor for free-form text stored on a single file line.

use crate::error::CryptoError;

/// Encode UTF-8 text as base58 so it survives line- and space-oriented
/// file formats.
pub fn encode_text(text: &str) -> String {
    bs58::encode(text.as_bytes()).into_string()
}

/// Decode base58-armored UTF-8 text.
pub fn decode_text(armored: &str) -> Result<String, CryptoError> {
    if armored.is_empty() {
        return Err(CryptoError::InvalidInput("empty armored text".into()));
    }
    let bytes = bs58::decode(armored)
        .into_vec()
        .map_err(|e| CryptoError::InvalidBase58(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CryptoError::InvalidUtf8(e.to_string()))
}
