use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::BtcError;

/// Smallest units per whole coin.
pub const SAT_PER_COIN: u64 = 100_000_000;

const DECIMALS: usize = 8;

/// A non-negative coin amount held in smallest units (satoshis).
///
/// Text form is a plain decimal with up to eight fractional digits and no
/// trailing zeros; this is also the form used in transaction files and
/// daemon calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_sat(sat: u64) -> Self {
        Amount(sat)
    }

    pub const fn to_sat(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Sum amounts, failing on overflow.
    pub fn sum<I: IntoIterator<Item = Amount>>(iter: I) -> Result<Amount, BtcError> {
        iter.into_iter().try_fold(Amount::ZERO, |acc, a| {
            acc.checked_add(a)
                .ok_or_else(|| BtcError::InvalidAmount("sum overflows".into()))
        })
    }

    /// Convert a floating-point whole-coin value as returned in daemon JSON.
    pub fn from_coin_f64(value: f64) -> Result<Self, BtcError> {
        if !value.is_finite() || value < 0.0 {
            return Err(BtcError::InvalidAmount(format!("{value}")));
        }
        let sat = (value * SAT_PER_COIN as f64).round();
        if sat > u64::MAX as f64 {
            return Err(BtcError::InvalidAmount(format!("{value}: too large")));
        }
        Ok(Amount(sat as u64))
    }

    /// Read an amount from a daemon reply field (JSON number or string).
    pub fn from_rpc_value(value: &Value) -> Result<Self, BtcError> {
        match value {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| BtcError::InvalidAmount(n.to_string()))
                .and_then(Amount::from_coin_f64),
            Value::String(s) => s.parse(),
            other => Err(BtcError::InvalidAmount(other.to_string())),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SAT_PER_COIN;
        let frac = self.0 % SAT_PER_COIN;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:0width$}", width = DECIMALS);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BtcError::InvalidAmount(s.to_string());
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > DECIMALS
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let frac_sat: u64 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<width$}", width = DECIMALS)
                .parse()
                .map_err(|_| invalid())?
        };
        whole
            .checked_mul(SAT_PER_COIN)
            .and_then(|w| w.checked_add(frac_sat))
            .map(Amount)
            .ok_or_else(invalid)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
