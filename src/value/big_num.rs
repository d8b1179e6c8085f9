use core::fmt;
use core::str::FromStr;

use crate::error::Error;

// -----------------------------------------------------------------------------
// BigInteger

/// An arbitrary-precision integer held in canonical decimal string form.
///
/// The engine never does arithmetic on big numbers; it only needs a
/// losslessly round-trippable canonical form with a strict parse. Parse
/// failure is a hard error, never a default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigInteger(String);

impl BigInteger {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BigInteger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let digits = s.strip_prefix('-').unwrap_or(s);
        let canonical_zeros = digits.len() == 1 || !digits.starts_with('0');
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) || !canonical_zeros {
            return Err(Error::value(format!("`{s}` is not a valid big integer")));
        }
        Ok(Self(s.to_owned()))
    }
}

impl fmt::Display for BigInteger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// -----------------------------------------------------------------------------
// BigDecimal

/// An arbitrary-precision decimal held in canonical string form.
///
/// Accepts the JSON number grammar plus an optional leading `+` on the
/// exponent, e.g. `-3.14159e+20`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigDecimal(String);

impl BigDecimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BigDecimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if parse_decimal(s) {
            Ok(Self(s.to_owned()))
        } else {
            Err(Error::value(format!("`{s}` is not a valid big decimal")))
        }
    }
}

impl fmt::Display for BigDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_decimal(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    let (mantissa, exponent) = match s.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (s, None),
    };

    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (mantissa, None),
    };
    let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !frac_part.is_none_or(all_digits) {
        return false;
    }

    match exponent {
        Some(e) => {
            let e = e.strip_prefix(['+', '-']).unwrap_or(e);
            all_digits(e)
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_integer_strict_parse() {
        assert!("123456789012345678901234567890".parse::<BigInteger>().is_ok());
        assert!("-42".parse::<BigInteger>().is_ok());
        assert!("0".parse::<BigInteger>().is_ok());

        assert!("".parse::<BigInteger>().is_err());
        assert!("007".parse::<BigInteger>().is_err());
        assert!("12.5".parse::<BigInteger>().is_err());
        assert!("12a".parse::<BigInteger>().is_err());
    }

    #[test]
    fn big_decimal_strict_parse() {
        assert!("3.14159".parse::<BigDecimal>().is_ok());
        assert!("-3.14159e+20".parse::<BigDecimal>().is_ok());
        assert!("10E5".parse::<BigDecimal>().is_ok());
        assert!("42".parse::<BigDecimal>().is_ok());

        assert!(".5".parse::<BigDecimal>().is_err());
        assert!("5.".parse::<BigDecimal>().is_err());
        assert!("1e".parse::<BigDecimal>().is_err());
        assert!("NaN".parse::<BigDecimal>().is_err());
    }
}
