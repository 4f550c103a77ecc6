use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Length in hex characters of a short checksum.
pub const CHKSUM6_LEN: usize = 6;

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Double SHA-256, as used for transaction and block hashes.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// RIPEMD-160 of SHA-256, the hash committed to by P2PKH and P2SH scripts.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(sha256(data)).into()
}

/// First six lowercase hex characters of SHA-256 over `data`.
///
/// Used both for transaction content ids (upper-cased by the caller) and
/// for the checksum line of transaction files.
pub fn chksum6(data: &[u8]) -> String {
    hex::encode(&sha256(data)[..CHKSUM6_LEN / 2])
}

/// Whether `s` has the shape of a short checksum (six hex digits, any case).
pub fn is_chksum6(s: &str) -> bool {
    s.len() == CHKSUM6_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Double SHA-256 rendered in reversed byte order, the display form of a
/// transaction id.
pub fn sha256d_reversed_hex(data: &[u8]) -> String {
    let mut hash = sha256d(data);
    hash.reverse();
    hex::encode(hash)
}
