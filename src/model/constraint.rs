//! Parameter constraints declared by capabilities.

use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::when::parse_timestamp;

const ANY: &str = "*";
const RANGE_SEPARATOR: &str = "...";
const SET_SEPARATOR: char = ',';

/// Values a capability will accept for one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Any value.
    Any,
    /// One of an explicit list of values.
    Set(Vec<String>),
    /// An inclusive range; bounds are compared numerically, as addresses,
    /// as timestamps, or lexically, whichever fits all three values.
    Range(String, String),
}

impl Constraint {
    /// Whether `value` satisfies this constraint.
    #[must_use]
    pub fn accepts(&self, value: &str) -> bool {
        let value = value.trim();
        match self {
            Self::Any => true,
            Self::Set(members) => members.iter().any(|m| m == value),
            Self::Range(lo, hi) => matches!(
                (compare(lo, value), compare(value, hi)),
                (Some(Ordering::Less | Ordering::Equal), Some(Ordering::Less | Ordering::Equal))
            ),
        }
    }
}

/// Compare two values using the most specific interpretation both share.
fn compare(a: &str, b: &str) -> Option<Ordering> {
    if let (Ok(x), Ok(y)) = (a.parse::<f64>(), b.parse::<f64>()) {
        return x.partial_cmp(&y);
    }
    if let (Ok(x), Ok(y)) = (a.parse::<IpAddr>(), b.parse::<IpAddr>()) {
        return (x.is_ipv4() == y.is_ipv4()).then(|| x.cmp(&y));
    }
    if let (Ok(x), Ok(y)) = (parse_timestamp(a), parse_timestamp(b)) {
        return Some(x.cmp(&y));
    }
    Some(a.cmp(b))
}

impl Default for Constraint {
    fn default() -> Self {
        Self::Any
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(ANY),
            Self::Set(members) => f.write_str(&members.join(",")),
            Self::Range(lo, hi) => write!(f, "{lo} {RANGE_SEPARATOR} {hi}"),
        }
    }
}

impl FromStr for Constraint {
    type Err = std::convert::Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() || input == ANY {
            return Ok(Self::Any);
        }
        if let Some((lo, hi)) = input.split_once(RANGE_SEPARATOR) {
            return Ok(Self::Range(lo.trim().to_string(), hi.trim().to_string()));
        }
        Ok(Self::Set(
            input
                .split(SET_SEPARATOR)
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(ToString::to_string)
                .collect(),
        ))
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(input: &str) -> Constraint {
        input.parse().unwrap()
    }

    #[test]
    fn test_any() {
        assert_eq!(c("*"), Constraint::Any);
        assert!(c("*").accepts("whatever"));
    }

    #[test]
    fn test_set() {
        let set = c("tcp, udp,icmp");
        assert_eq!(set.to_string(), "tcp,udp,icmp");
        assert!(set.accepts("udp"));
        assert!(!set.accepts("sctp"));
    }

    #[test]
    fn test_numeric_range() {
        let range = c("1 ... 100");
        assert!(range.accepts("1"));
        assert!(range.accepts("42"));
        assert!(range.accepts("100"));
        assert!(!range.accepts("101"));
        assert!(!range.accepts("0.5"));
    }

    #[test]
    fn test_address_range() {
        let range = c("10.0.0.0 ... 10.0.0.255");
        assert!(range.accepts("10.0.0.17"));
        assert!(!range.accepts("10.0.1.1"));
        assert!(!range.accepts("::1"));
    }

    #[test]
    fn test_timestamp_range() {
        let range = c("2024-01-01 ... 2024-12-31");
        assert!(range.accepts("2024-06-01 10:00:00"));
        assert!(!range.accepts("2025-01-02"));
    }
}
