use thiserror::Error;

use crate::amount::Amount;

/// Header attached to every integrity failure.
pub const TAMPER_WARNING: &str =
    "A malicious or malfunctioning coin daemon or other program may have altered your data!";

/// Broad category of a failure, deciding how a caller reacts to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad hex, bad file structure, length or type mismatch. Never retried.
    Malformed,
    /// Daemon output disagrees with the local model. Possible compromise.
    Integrity,
    /// Fee, funds or capability problems the user can fix and retry.
    Negotiation,
    /// A daemon call failed or timed out.
    External,
}

/// Reason a daemon refused to broadcast a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    /// The chain requires replay-protected (FORKID) signatures.
    ReplayProtectionRequired,
    /// The chain does not accept replay-protected signatures.
    ReplayProtectionIllegal,
    /// Locktime not yet reached.
    NonFinal,
    Generic,
}

impl RejectKind {
    /// Classify daemon rejection text.
    pub fn classify(message: &str) -> Self {
        if message.contains("Signature must use SIGHASH_FORKID") {
            RejectKind::ReplayProtectionRequired
        } else if message.contains("Illegal use of SIGHASH_FORKID") {
            RejectKind::ReplayProtectionIllegal
        } else if message.contains("non-final") {
            RejectKind::NonFinal
        } else {
            RejectKind::Generic
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            RejectKind::ReplayProtectionRequired => {
                "this chain requires replay-protected signatures: sign with the BCH protocol"
            }
            RejectKind::ReplayProtectionIllegal => {
                "this chain does not accept replay-protected signatures: sign with the BTC protocol"
            }
            RejectKind::NonFinal => "transaction locktime has not yet been reached",
            RejectKind::Generic => "transaction rejected by the coin daemon",
        }
    }
}

/// Bitcoin-family transaction errors.
#[derive(Debug, Error)]
pub enum BtcError {
    // Malformed input
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("transaction hex parse error: {0}")]
    TxHexParse(String),

    #[error("'{0}': illegal value for witness flag in transaction")]
    IllegalWitnessFlag(String),

    #[error("length prefix for {field} ({len} bytes) runs past end of data at offset {offset}")]
    LengthPrefixOverrun {
        field: &'static str,
        len: u64,
        offset: usize,
    },

    #[error("{0}: transaction version greater than maximum allowed value (int32)")]
    VersionOutOfRange(u32),

    #[error("unrecognized scriptPubKey: {0}")]
    UnknownScript(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid OP_RETURN data: {0}")]
    InvalidOpReturnData(String),

    #[error("invalid output spec: {0}")]
    InvalidOutputSpec(String),

    #[error("invalid fee spec: {0}")]
    InvalidFeeSpec(String),

    #[error("invalid wallet id: {0}")]
    InvalidWalletId(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    #[error("unsupported coin: {0}")]
    UnsupportedCoin(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("invalid block range: {0}")]
    InvalidBlockRange(String),

    #[error("no change output specified")]
    NoChangeOutput,

    #[error("{0}: duplicate address in transaction outputs")]
    DuplicateAddress(String),

    #[error("{0}: duplicate input")]
    DuplicateInput(String),

    // Integrity
    #[error("{}\n{}", TAMPER_WARNING, .0)]
    TxHexMismatch(String),

    #[error("input address {addr} does not match scriptPubKey {script}")]
    ScriptPubKeyMismatch { addr: String, script: String },

    #[error("redeem script does not hash to address {0}")]
    RedeemScriptMismatch(String),

    #[error(
        "estimated transaction vsize is {ratio:.3} times the true vsize; \
         re-create the transaction with a vsize adjustment of {suggested_adj:.3}"
    )]
    BadTxSizeEstimate { ratio: f64, suggested_adj: f64 },

    #[error("coin txid mismatch: expected {expected}, daemon reported {actual}")]
    CoinTxIdMismatch { expected: String, actual: String },

    #[error("bad signature data: {0}")]
    BadSignatures(String),

    #[error("rescan reply mismatch: {0}")]
    RescanMismatch(String),

    #[error("transaction {0} is in the blockchain but not tracked by the wallet")]
    InChainUntracked(String),

    // Negotiation
    #[error("fee {fee} is below the relay fee {min}")]
    FeeTooLow { fee: Amount, min: Amount },

    #[error("fee {fee} exceeds the maximum transaction fee {max}")]
    FeeTooHigh { fee: Amount, max: Amount },

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("transaction is for {expected}, but the coin daemon is running on {actual}")]
    WrongChain { expected: String, actual: String },

    #[error("segwit is not supported: {0}")]
    SegwitUnsupported(String),

    #[error("transaction is not replaceable")]
    NotReplaceable,

    #[error("no fee estimate available: {0}")]
    NoFeeEstimate(String),

    #[error("output {idx} amount {amount} cannot cover fee {fee}")]
    OutputTooSmall {
        idx: usize,
        amount: Amount,
        fee: Amount,
    },

    #[error("invalid output index {0}")]
    InvalidOutputIndex(usize),

    #[error("transaction has no inputs or no outputs")]
    EmptyTransaction,

    // External
    #[error("RPC {method} failed: {message}")]
    Rpc { method: String, message: String },

    #[error("RPC {method} timed out after {secs} seconds")]
    RpcTimeout { method: String, secs: u64 },

    #[error("unexpected RPC reply from {method}: {detail}")]
    RpcReply { method: String, detail: String },

    #[error("broadcast rejected ({}): {message}", .kind.hint())]
    BroadcastRejected { kind: RejectKind, message: String },
}

impl BtcError {
    pub fn class(&self) -> ErrorClass {
        use BtcError::*;
        match self {
            InvalidHex(_)
            | TxHexParse(_)
            | IllegalWitnessFlag(_)
            | LengthPrefixOverrun { .. }
            | VersionOutOfRange(_)
            | UnknownScript(_)
            | InvalidAddress(_)
            | InvalidAmount(_)
            | InvalidOpReturnData(_)
            | InvalidOutputSpec(_)
            | InvalidFeeSpec(_)
            | InvalidWalletId(_)
            | InvalidNetwork(_)
            | UnsupportedCoin(_)
            | InvalidTransaction(_)
            | InvalidBlockRange(_)
            | NoChangeOutput
            | DuplicateAddress(_)
            | DuplicateInput(_) => ErrorClass::Malformed,
            TxHexMismatch(_)
            | ScriptPubKeyMismatch { .. }
            | RedeemScriptMismatch(_)
            | BadTxSizeEstimate { .. }
            | CoinTxIdMismatch { .. }
            | BadSignatures(_)
            | RescanMismatch(_)
            | InChainUntracked(_) => ErrorClass::Integrity,
            FeeTooLow { .. }
            | FeeTooHigh { .. }
            | InsufficientFunds { .. }
            | WrongChain { .. }
            | SegwitUnsupported(_)
            | NotReplaceable
            | NoFeeEstimate(_)
            | OutputTooSmall { .. }
            | InvalidOutputIndex(_)
            | EmptyTransaction => ErrorClass::Negotiation,
            Rpc { .. } | RpcTimeout { .. } | RpcReply { .. } | BroadcastRejected { .. } => {
                ErrorClass::External
            }
        }
    }

    /// Process exit code for a CLI layer.
    pub fn exit_code(&self) -> i32 {
        match self {
            BtcError::InChainUntracked(_) => 4,
            BtcError::IllegalWitnessFlag(_) | BtcError::VersionOutOfRange(_) => 3,
            other => match other.class() {
                ErrorClass::Integrity => 2,
                _ => 1,
            },
        }
    }

    /// Whether the failure halts the whole operation rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Malformed | ErrorClass::Integrity)
    }
}
