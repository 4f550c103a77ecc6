//! Fee specs, fee-rate conversion and fee bounds.

use std::str::FromStr;

use tracing::debug;

use crate::amount::Amount;
use crate::error::BtcError;

/// Bytes per kilobyte in daemon fee rates.
pub const BYTES_PER_KB: u64 = 1024;

/// A user-supplied fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeSpec {
    /// Absolute fee, e.g. `0.0001`.
    Absolute(Amount),
    /// Satoshis per byte of estimated vsize, e.g. `20s`.
    SatPerByte(u64),
}

impl FeeSpec {
    /// Resolve to an absolute fee for a transaction of `vsize` bytes.
    pub fn to_absolute(self, vsize: u64) -> Result<Amount, BtcError> {
        match self {
            FeeSpec::Absolute(a) => Ok(a),
            FeeSpec::SatPerByte(rate) => rate
                .checked_mul(vsize)
                .map(Amount::from_sat)
                .ok_or_else(|| BtcError::InvalidFeeSpec(format!("{rate}s overflows"))),
        }
    }
}

impl FromStr for FeeSpec {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rate) = s.strip_suffix('s') {
            return rate
                .parse::<u64>()
                .map(FeeSpec::SatPerByte)
                .map_err(|_| BtcError::InvalidFeeSpec(s.to_string()));
        }
        s.parse::<Amount>()
            .map(FeeSpec::Absolute)
            .map_err(|_| BtcError::InvalidFeeSpec(s.to_string()))
    }
}

impl std::fmt::Display for FeeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeeSpec::Absolute(a) => write!(f, "{a}"),
            FeeSpec::SatPerByte(r) => write!(f, "{r}s"),
        }
    }
}

/// Absolute fee for `size` bytes at a per-kilobyte rate, scaled by
/// `adjust`.
pub fn fee_from_kb_rate(rate_per_kb: Amount, size: u64, adjust: f64) -> Amount {
    let sat = rate_per_kb.to_sat() as f64 * adjust * size as f64 / BYTES_PER_KB as f64;
    Amount::from_sat(sat.round() as u64)
}

/// Minimum fee peers will relay for a transaction of `size` bytes.
pub fn relay_fee(relay_rate_per_kb: Amount, size: u64) -> Amount {
    fee_from_kb_rate(relay_rate_per_kb, size, 1.0)
}

/// Fee rate in satoshis per byte, for display.
pub fn fee_abs_to_rel(fee: Amount, vsize: u64) -> u64 {
    if vsize == 0 {
        return 0;
    }
    fee.to_sat() / vsize
}

/// Check an absolute fee against the relay minimum and protocol maximum.
pub fn check_fee_bounds(fee: Amount, min: Amount, max: Amount) -> Result<(), BtcError> {
    debug!(%fee, %min, %max, "checking fee bounds");
    if fee < min {
        return Err(BtcError::FeeTooLow { fee, min });
    }
    if fee > max {
        return Err(BtcError::FeeTooHigh { fee, max });
    }
    Ok(())
}
