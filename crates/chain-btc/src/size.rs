//! Transaction size estimation.
//!
//! Signatures are not known until after signing, so fees are computed from a
//! per-type cost table. Once signed, the estimate is checked against the true
//! size and a large disagreement stops the operation.

use tracing::debug;

use crate::address::{AddrFormat, CoinAddr};
use crate::codec::compact_size_len;
use crate::error::BtcError;
use crate::io::{AddrType, TxInput, TxOutput};
use crate::params::ChainParams;
use crate::script::OutputDest;

/// DER signature with sighash byte, upper bound.
pub const SIG_SIZE: usize = 72;
pub const PUBKEY_SIZE_UNCOMPRESSED: usize = 65;
pub const PUBKEY_SIZE_COMPRESSED: usize = 33;

/// txid + vout + scriptSig length byte + sequence.
pub const INPUT_SIZE_COMMON: usize = 32 + 4 + 1 + 4;

/// Witness of a key-hash spend: item count, sig length, sig, key length, key.
pub const WITNESS_FIELD_SIZE: usize = 1 + 1 + SIG_SIZE + 1 + PUBKEY_SIZE_COMPRESSED;

/// Maximum relative deviation between estimated and true vsize.
pub const VSIZE_TOLERANCE: f64 = 0.05;

/// Estimated serialized size of one input.
///
/// Inputs of unknown type are foreign P2PKH; their key could be either
/// form, so the compressed size is assumed.
pub fn input_size(addr_type: Option<AddrType>) -> usize {
    match addr_type {
        Some(AddrType::L) => INPUT_SIZE_COMMON + SIG_SIZE + PUBKEY_SIZE_UNCOMPRESSED,
        Some(AddrType::C) | None => INPUT_SIZE_COMMON + SIG_SIZE + PUBKEY_SIZE_COMPRESSED,
        Some(AddrType::S) => INPUT_SIZE_COMMON + 23,
        Some(AddrType::B) => INPUT_SIZE_COMMON,
    }
}

/// Serialized size of one output.
pub fn output_size(output: &TxOutput, params: &ChainParams) -> Result<usize, BtcError> {
    match &output.dest {
        OutputDest::Addr(a) => Ok(match CoinAddr::parse(a, params)?.format() {
            AddrFormat::P2pkh => 34,
            AddrFormat::P2sh => 32,
            AddrFormat::Bech32 => 31,
        }),
        OutputDest::Data(_) => {
            let script_len = output.dest.script_pubkey(params)?.len();
            Ok(8 + compact_size_len(script_len as u64) + script_len)
        }
    }
}

/// Breakdown of a size estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeEstimate {
    pub inputs_size: usize,
    pub outputs_size: usize,
    pub witness_size: usize,
    /// Size without witness data.
    pub legacy_size: usize,
    /// Size with witness data and marker.
    pub full_size: usize,
    /// Virtual size after the user adjustment factor.
    pub vsize: u64,
}

/// Estimate the size of a transaction with these inputs and outputs.
///
/// Returns `None` when either list is empty: no fee can be computed for
/// such a transaction.
pub fn estimate(
    inputs: &[TxInput],
    outputs: &[TxOutput],
    params: &ChainParams,
    vsize_adj: Option<f64>,
) -> Result<Option<SizeEstimate>, BtcError> {
    if inputs.is_empty() || outputs.is_empty() {
        return Ok(None);
    }
    let inputs_size: usize = inputs.iter().map(|i| input_size(i.addr_type)).sum();
    let outputs_size = outputs
        .iter()
        .map(|o| output_size(o, params))
        .sum::<Result<usize, BtcError>>()?;
    let witness_size = if inputs.iter().any(TxInput::is_segwit) {
        inputs
            .iter()
            .map(|i| if i.is_segwit() { WITNESS_FIELD_SIZE } else { 1 })
            .sum()
    } else {
        0
    };

    // Counts are assumed to fit in one byte each.
    let legacy_size = 4 + 1 + inputs_size + 1 + outputs_size + 4;
    let full_size = if witness_size > 0 {
        legacy_size + 2 + witness_size
    } else {
        legacy_size
    };
    let raw_vsize = ((legacy_size * 3 + full_size) as u64).div_ceil(4);
    let vsize = match vsize_adj {
        Some(adj) => (raw_vsize as f64 * adj).ceil() as u64,
        None => raw_vsize,
    };

    debug!(
        inputs_size,
        outputs_size,
        witness_size,
        full_size,
        legacy_size,
        vsize,
        "estimated transaction size"
    );

    Ok(Some(SizeEstimate {
        inputs_size,
        outputs_size,
        witness_size,
        legacy_size,
        full_size,
        vsize,
    }))
}

/// Compare an estimate with the true vsize reported after signing.
///
/// Fails closed: outside the tolerance the caller must re-create the
/// transaction with the suggested adjustment factor.
pub fn check_vsize(estimated: u64, actual: u64) -> Result<(), BtcError> {
    if actual == 0 {
        return Err(BtcError::InvalidTransaction("true vsize is zero".into()));
    }
    let ratio = estimated as f64 / actual as f64;
    debug!(estimated, actual, ratio, "checking vsize estimate");
    if (1.0 - VSIZE_TOLERANCE) < ratio && ratio < (1.0 + VSIZE_TOLERANCE) {
        Ok(())
    } else {
        Err(BtcError::BadTxSizeEstimate {
            ratio,
            suggested_adj: 1.0 / ratio,
        })
    }
}
