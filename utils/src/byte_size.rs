use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

const UNITS: &[(&str, u64)] = &[
    ("b", 1),
    ("k", 1_000),
    ("kb", 1_000),
    ("ki", 1 << 10),
    ("kib", 1 << 10),
    ("m", 1_000_000),
    ("mb", 1_000_000),
    ("mi", 1 << 20),
    ("mib", 1 << 20),
    ("g", 1_000_000_000),
    ("gb", 1_000_000_000),
    ("gi", 1 << 30),
    ("gib", 1 << 30),
    ("t", 1_000_000_000_000),
    ("tb", 1_000_000_000_000),
    ("ti", 1 << 40),
    ("tib", 1 << 40),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ByteSizeParseError {
    #[error("empty byte size")]
    Empty,

    #[error("invalid number in byte size {0:?}")]
    InvalidNumber(String),

    #[error("unknown unit {unit:?} in byte size {value:?}")]
    UnknownUnit { value: String, unit: String },

    #[error("byte size {0:?} overflows u64")]
    Overflow(String),
}

/// A number of bytes that can be written by users as a plain integer or with a unit
/// suffix, e.g. `6000`, `"64kb"`, `"1.5mib"`.
///
/// Decimal suffixes (`kb`, `mb`, `gb`, `tb`) are powers of 1000; binary suffixes
/// (`kib`, `mib`, `gib`, `tib`) are powers of 1024. Parsing is case-insensitive and
/// ignores whitespace between the number and the unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(u64);

impl ByteSize {
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ByteSize {
    fn from(bytes: u64) -> Self {
        Self(bytes)
    }
}

impl From<ByteSize> for u64 {
    fn from(value: ByteSize) -> Self {
        value.0
    }
}

impl FromStr for ByteSize {
    type Err = ByteSizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.is_empty() {
            return Err(ByteSizeParseError::Empty);
        }

        let split = value
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(value.len());
        let (number, unit) = value.split_at(split);
        let unit = unit.trim().to_ascii_lowercase();

        let multiplier = if unit.is_empty() {
            1
        } else {
            UNITS
                .iter()
                .find(|(name, _)| *name == unit)
                .map(|(_, m)| *m)
                .ok_or_else(|| ByteSizeParseError::UnknownUnit {
                    value: value.to_owned(),
                    unit: unit.clone(),
                })?
        };

        if number.is_empty() {
            return Err(ByteSizeParseError::InvalidNumber(value.to_owned()));
        }

        if let Ok(n) = number.parse::<u64>() {
            return n
                .checked_mul(multiplier)
                .map(Self)
                .ok_or_else(|| ByteSizeParseError::Overflow(value.to_owned()));
        }

        // Fractional values such as "1.5mb".
        let n: f64 = number
            .parse()
            .map_err(|_| ByteSizeParseError::InvalidNumber(value.to_owned()))?;
        let bytes = (n * multiplier as f64).round();
        if !bytes.is_finite() || bytes >= u64::MAX as f64 {
            return Err(ByteSizeParseError::Overflow(value.to_owned()));
        }
        Ok(Self(bytes as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Largest unit that represents the value exactly; plain bytes otherwise.
        for (name, m) in [("tb", 1_000_000_000_000u64), ("gb", 1_000_000_000), ("mb", 1_000_000), ("kb", 1_000)] {
            if self.0 >= m && self.0 % m == 0 {
                return write!(f, "{}{}", self.0 / m, name);
            }
        }
        write!(f, "{}", self.0)
    }
}

struct ByteSizeVisitor;

impl Visitor<'_> for ByteSizeVisitor {
    type Value = ByteSize;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a non-negative integer or a size string such as \"64kb\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(ByteSize(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(ByteSize)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_suffixed() {
        assert_eq!("6000".parse::<ByteSize>().unwrap().as_u64(), 6000);
        assert_eq!("64kb".parse::<ByteSize>().unwrap().as_u64(), 64_000);
        assert_eq!("64 KiB".parse::<ByteSize>().unwrap().as_u64(), 64 * 1024);
        assert_eq!("1.5mb".parse::<ByteSize>().unwrap().as_u64(), 1_500_000);
        assert_eq!("2G".parse::<ByteSize>().unwrap().as_u64(), 2_000_000_000);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<ByteSize>(), Err(ByteSizeParseError::Empty));
        assert!(matches!("12parsecs".parse::<ByteSize>(), Err(ByteSizeParseError::UnknownUnit { .. })));
        assert!(matches!("mb".parse::<ByteSize>(), Err(ByteSizeParseError::InvalidNumber(_))));
        assert!(matches!("99999999999tb".parse::<ByteSize>(), Err(ByteSizeParseError::Overflow(_))));
    }

    #[test]
    fn test_display_uses_exact_units() {
        assert_eq!(ByteSize::new(64_000_000).to_string(), "64mb");
        assert_eq!(ByteSize::new(6000).to_string(), "6kb");
        assert_eq!(ByteSize::new(1024).to_string(), "1024");
    }

    #[test]
    fn test_deserialize_int_or_string() {
        let v: Vec<ByteSize> = serde_yaml::from_str("[1024, \"2kb\"]").unwrap();
        assert_eq!(v, vec![ByteSize::new(1024), ByteSize::new(2000)]);

        assert!(serde_yaml::from_str::<ByteSize>("-5").is_err());
        assert!(serde_yaml::from_str::<ByteSize>("\"lots\"").is_err());
    }
}
