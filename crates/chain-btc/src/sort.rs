//! BIP-69 lexicographic ordering of inputs and outputs.

use crate::error::BtcError;
use crate::io::{TxInput, TxOutput};
use crate::params::ChainParams;

/// Input sort key: txid bytes (display order) then big-endian vout.
pub fn input_key(input: &TxInput) -> Result<[u8; 36], BtcError> {
    let mut key = [0u8; 36];
    key[..32].copy_from_slice(&input.txid_bytes()?);
    key[32..].copy_from_slice(&input.vout.to_be_bytes());
    Ok(key)
}

/// Output sort key: big-endian amount then scriptPubKey bytes.
pub fn output_key(output: &TxOutput, params: &ChainParams) -> Result<Vec<u8>, BtcError> {
    let script = output.dest.script_pubkey(params)?;
    let mut key = Vec::with_capacity(8 + script.len());
    key.extend_from_slice(&output.amount.to_sat().to_be_bytes());
    key.extend_from_slice(&script);
    Ok(key)
}

pub fn sort_inputs(inputs: &mut Vec<TxInput>) -> Result<(), BtcError> {
    let mut keyed = inputs
        .drain(..)
        .map(|i| Ok((input_key(&i)?, i)))
        .collect::<Result<Vec<_>, BtcError>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    inputs.extend(keyed.into_iter().map(|(_, i)| i));
    Ok(())
}

pub fn sort_outputs(outputs: &mut Vec<TxOutput>, params: &ChainParams) -> Result<(), BtcError> {
    let mut keyed = outputs
        .drain(..)
        .map(|o| Ok((output_key(&o, params)?, o)))
        .collect::<Result<Vec<_>, BtcError>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    outputs.extend(keyed.into_iter().map(|(_, o)| o));
    Ok(())
}
