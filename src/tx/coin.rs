//! Coin amounts and decimal gas prices
//!
//! Gas prices are fractional (`0.025uatom`) while fees are integral, so fee
//! math runs on an 18-decimal fixed-point type instead of `f64`.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits carried by [`Dec`]
pub const DEC_PRECISION: usize = 18;
const DEC_ONE: u128 = 10u128.pow(DEC_PRECISION as u32);

lazy_static! {
    static ref COIN: Regex =
        Regex::new(r"^([0-9]+(?:\.[0-9]+)?)([a-zA-Z][a-zA-Z0-9/:._-]{2,127})$").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid coin {input:?}: {reason}")]
pub struct ParseCoinError {
    pub input: String,
    pub reason: String,
}

impl ParseCoinError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Non-negative fixed-point decimal with 18 fractional digits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dec(u128);

impl Dec {
    pub const ZERO: Dec = Dec(0);

    /// Build from raw 10^-18 units
    pub fn from_atomics(atomics: u128) -> Self {
        Dec(atomics)
    }

    pub fn atomics(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `ceil(self * n)`, or `None` on overflow
    pub fn mul_ceil(&self, n: u64) -> Option<u128> {
        let product = self.0.checked_mul(u128::from(n))?;
        let whole = product / DEC_ONE;
        if product % DEC_ONE == 0 {
            Some(whole)
        } else {
            whole.checked_add(1)
        }
    }
}

impl FromStr for Dec {
    type Err = ParseCoinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseCoinError::new(s, "malformed integer part"));
        }
        if s.contains('.') && frac_part.is_empty() {
            return Err(ParseCoinError::new(s, "empty fractional part"));
        }
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseCoinError::new(s, "malformed fractional part"));
        }
        if frac_part.len() > DEC_PRECISION {
            return Err(ParseCoinError::new(
                s,
                format!("more than {} decimal places", DEC_PRECISION),
            ));
        }

        let overflow = || ParseCoinError::new(s, "value out of range");
        let int_value: u128 = int_part.parse().map_err(|_| overflow())?;
        let mut frac_value: u128 = if frac_part.is_empty() {
            0
        } else {
            frac_part.parse().map_err(|_| overflow())?
        };
        frac_value *= 10u128.pow((DEC_PRECISION - frac_part.len()) as u32);

        int_value
            .checked_mul(DEC_ONE)
            .and_then(|v| v.checked_add(frac_value))
            .map(Dec)
            .ok_or_else(overflow)
    }
}

impl fmt::Display for Dec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / DEC_ONE;
        let frac = self.0 % DEC_ONE;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:0width$}", frac, width = DEC_PRECISION);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

/// Integral amount of one denomination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Decimal amount of one denomination, used for gas prices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecCoin {
    pub denom: String,
    pub amount: Dec,
}

impl DecCoin {
    pub fn new(denom: impl Into<String>, amount: Dec) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for DecCoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

fn split_coin(s: &str) -> Result<(&str, &str), ParseCoinError> {
    let caps = COIN
        .captures(s)
        .ok_or_else(|| ParseCoinError::new(s, "expected <amount><denom>"))?;
    let amount = caps.get(1).map_or("", |m| m.as_str());
    let denom = caps.get(2).map_or("", |m| m.as_str());
    Ok((amount, denom))
}

/// Parse a comma-separated list, rejecting duplicate denoms and sorting by denom
fn parse_list<T>(
    input: &str,
    parse_one: impl Fn(&str) -> Result<T, ParseCoinError>,
    denom_of: impl Fn(&T) -> &str,
) -> Result<Vec<T>, ParseCoinError> {
    let mut items = Vec::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        items.push(parse_one(part)?);
    }

    items.sort_by(|a, b| denom_of(a).cmp(denom_of(b)));
    for pair in items.windows(2) {
        if denom_of(&pair[0]) == denom_of(&pair[1]) {
            return Err(ParseCoinError::new(
                input,
                format!("duplicate denom {}", denom_of(&pair[0])),
            ));
        }
    }

    Ok(items)
}

/// Parse `"100stake,5uatom"`; an empty string is an empty list
pub fn parse_coins(input: &str) -> Result<Vec<Coin>, ParseCoinError> {
    parse_list(
        input,
        |s| {
            let (amount, denom) = split_coin(s)?;
            if amount.contains('.') {
                return Err(ParseCoinError::new(s, "fee amounts must be integral"));
            }
            let amount = amount
                .parse::<u128>()
                .map_err(|_| ParseCoinError::new(s, "value out of range"))?;
            Ok(Coin::new(denom, amount))
        },
        |c| c.denom.as_str(),
    )
}

/// Parse `"0.1stake,0.025uatom"`; an empty string is an empty list
pub fn parse_dec_coins(input: &str) -> Result<Vec<DecCoin>, ParseCoinError> {
    parse_list(
        input,
        |s| {
            let (amount, denom) = split_coin(s)?;
            Ok(DecCoin::new(denom, amount.parse::<Dec>()?))
        },
        |c| c.denom.as_str(),
    )
}
