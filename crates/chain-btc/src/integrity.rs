//! Cross-checks of daemon-returned transaction bytes against the wallet's
//! own model of the transaction.
//!
//! Every check here is fatal: a disagreement means the daemon (or something
//! between it and us) changed the transaction, and it must not be signed or
//! broadcast.

use tracing::debug;

use crate::codec::DeserializedTx;
use crate::error::BtcError;
use crate::io::{TxInput, TxOutput};
use crate::params::ChainParams;

/// Signature-script length range accepted for a signed legacy input.
pub const LEGACY_SCRIPT_SIG_LEN: std::ops::RangeInclusive<usize> = 100..=150;

const COMPRESSED_PUBKEY_LEN: usize = 33;

fn mismatch(what: impl Into<String>) -> BtcError {
    BtcError::TxHexMismatch(what.into())
}

/// Verify that `dtx` carries exactly the inputs, outputs, sequences and
/// locktime of the model, and that its canonical unsigned bytes hash to
/// the content id assigned when the transaction was created.
pub fn check_serialized_integrity(
    inputs: &[TxInput],
    outputs: &[TxOutput],
    locktime: u32,
    content_id: &str,
    dtx: &DeserializedTx,
    params: &ChainParams,
) -> Result<(), BtcError> {
    if dtx.locktime != locktime {
        return Err(mismatch(format!(
            "locktime mismatch: {} (serialized data) != {} (transaction data)",
            dtx.locktime, locktime
        )));
    }

    let model_seqs: Vec<u32> = inputs.iter().map(TxInput::effective_sequence).collect();
    if dtx.sequences() != model_seqs {
        return Err(mismatch("sequence numbers of serialized data do not match transaction data"));
    }

    let mut model_ins: Vec<(String, u32)> = inputs
        .iter()
        .map(|i| (i.txid.to_ascii_lowercase(), i.vout))
        .collect();
    let mut raw_ins: Vec<(String, u32)> = dtx.inputs.iter().map(|i| (i.txid.clone(), i.vout)).collect();
    model_ins.sort();
    raw_ins.sort();
    if model_ins != raw_ins {
        return Err(mismatch("inputs of serialized data do not match transaction data"));
    }

    let mut model_outs = outputs
        .iter()
        .map(|o| Ok((o.dest.script_pubkey(params)?, o.amount)))
        .collect::<Result<Vec<_>, BtcError>>()?;
    let mut raw_outs: Vec<_> = dtx
        .outputs
        .iter()
        .map(|o| (o.script_pubkey.clone(), o.amount))
        .collect();
    model_outs.sort();
    raw_outs.sort();
    if model_outs != raw_outs {
        return Err(mismatch("outputs of serialized data do not match transaction data"));
    }

    let chk = dtx.content_id();
    if chk != content_id {
        return Err(mismatch(format!(
            "content id of serialized data {chk} does not match transaction id {content_id}"
        )));
    }

    debug!(content_id, "serialized data matches transaction data");
    Ok(())
}

/// Check that every input of a signed transaction carries a signature of
/// the expected shape.
pub fn check_sigs(dtx: &DeserializedTx) -> Result<(), BtcError> {
    for (n, input) in dtx.inputs.iter().enumerate() {
        if input.witness.is_empty() {
            if !LEGACY_SCRIPT_SIG_LEN.contains(&input.script_sig.len()) {
                return Err(BtcError::BadSignatures(format!(
                    "input {n}: signature script of {} bytes",
                    input.script_sig.len()
                )));
            }
        } else if input.witness.len() != 2 || input.witness[1].len() != COMPRESSED_PUBKEY_LEN {
            return Err(BtcError::BadSignatures(format!(
                "input {n}: witness is not a signature and compressed public key"
            )));
        }
    }
    Ok(())
}
