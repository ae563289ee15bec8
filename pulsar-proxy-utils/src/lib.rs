//! Small helpers shared by the proxy crates
//!
//! - [`Bytesize`]: `5M`, `2G512M` style sizes for configuration files
//! - [`to_duration`]: `1h30m15s` style durations, plus serde helpers
//! - [`Counter`]: current/high-water gauge used for connection and session stats
//! - millisecond timestamps
//!
//! ```
//! use pulsar_proxy_utils::{to_duration, Bytesize};
//!
//! let size: Bytesize = "5M".parse().unwrap();
//! assert_eq!(size.as_usize(), 5 * 1024 * 1024);
//!
//! let timeout = to_duration("1m30s").unwrap();
//! assert_eq!(timeout.as_secs(), 90);
//! assert!(to_duration("10 seconds").is_err());
//! ```

#![deny(unsafe_code)]

use std::fmt;
use std::net::SocketAddr;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

use serde::{
    de::{self, Deserializer},
    ser::Serializer,
    Deserialize, Serialize,
};

mod counter;

pub use counter::Counter;

/// Timestamp representation in milliseconds since Unix epoch
pub type TimestampMillis = i64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid byte size {0:?}, expected e.g. 5242880, 512K or 5M")]
    Bytesize(String),
    #[error("invalid duration {0:?}, expected e.g. 1500, 250ms or 1h30m15s")]
    Duration(String),
}

const BYTESIZE_K: u64 = 1024;
const BYTESIZE_M: u64 = 1048576;
const BYTESIZE_G: u64 = 1073741824;

const BYTESIZE_UNITS: &[(&str, u64)] = &[
    ("b", 1),
    ("k", BYTESIZE_K),
    ("kb", BYTESIZE_K),
    ("m", BYTESIZE_M),
    ("mb", BYTESIZE_M),
    ("g", BYTESIZE_G),
    ("gb", BYTESIZE_G),
];

const DURATION_UNITS: &[(&str, u64)] =
    &[("ms", 1), ("s", 1000), ("m", 60_000), ("h", 3_600_000), ("d", 86_400_000), ("w", 604_800_000)];

/// Human-readable byte size
///
/// ```
/// use pulsar_proxy_utils::Bytesize;
///
/// let size: Bytesize = "2G512M".parse().unwrap();
/// assert_eq!(size.as_usize(), 2_684_354_560);
/// assert_eq!(Bytesize::from(1024).string(), "1K");
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Bytesize(pub usize);

impl Bytesize {
    #[inline]
    pub fn as_usize(&self) -> usize {
        self.0
    }

    /// Format as `2G1M` style string
    #[inline]
    pub fn string(&self) -> String {
        let mut v = self.0 as u64;
        let mut res = String::new();

        for (unit, name) in [(BYTESIZE_G, 'G'), (BYTESIZE_M, 'M'), (BYTESIZE_K, 'K')] {
            let n = v / unit;
            if n > 0 {
                res.push_str(&format!("{n}{name}"));
                v %= unit;
            }
        }

        if v > 0 || res.is_empty() {
            res.push_str(&format!("{v}B"));
        }

        res
    }
}

impl Deref for Bytesize {
    type Target = usize;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<usize> for Bytesize {
    fn from(v: usize) -> Self {
        Bytesize(v)
    }
}

impl FromStr for Bytesize {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Bytesize(to_bytesize(s)?))
    }
}

impl fmt::Debug for Bytesize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.string())
    }
}

impl fmt::Display for Bytesize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.string())
    }
}

impl Serialize for Bytesize {
    #[inline]
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.string())
    }
}

impl<'de> Deserialize<'de> for Bytesize {
    #[inline]
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer)?.parse().map_err(de::Error::custom)
    }
}

/// Sums `<number><unit>` fragments, a bare number is taken in the base unit
///
/// `None` on an empty text, an unknown unit, a number without unit inside a
/// longer text, or overflow.
fn sum_units(text: &str, units: &[(&str, u64)]) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(v) = text.parse::<u64>() {
        return Some(v);
    }

    let mut rest = text;
    let mut total = 0u64;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let v = rest[..digits].parse::<u64>().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let (_, scale) = units.iter().find(|(name, _)| name.eq_ignore_ascii_case(&rest[..unit_len]))?;
        total = total.checked_add(v.checked_mul(*scale)?)?;
        rest = &rest[unit_len..];
    }
    Some(total)
}

/// Parse a `2G512K` style string, a bare number is a byte count
#[inline]
pub fn to_bytesize(text: &str) -> Result<usize, ParseError> {
    sum_units(text, BYTESIZE_UNITS)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| ParseError::Bytesize(text.to_owned()))
}

#[inline]
pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    to_duration(&String::deserialize(deserializer)?).map_err(de::Error::custom)
}

/// Convert a `1h30m15s` style string to a Duration
///
/// Units: `ms`, `s`, `m`, `h`, `d`, `w`. A bare number is taken as milliseconds.
#[inline]
pub fn to_duration(text: &str) -> Result<Duration, ParseError> {
    sum_units(text, DURATION_UNITS)
        .map(Duration::from_millis)
        .ok_or_else(|| ParseError::Duration(text.to_owned()))
}

#[inline]
pub fn deserialize_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer)?.parse::<SocketAddr>().map_err(de::Error::custom)
}

#[inline]
pub fn timestamp_millis() -> TimestampMillis {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|t| t.as_millis() as i64).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::value::{Error as ValueError, StrDeserializer};
    use serde::de::IntoDeserializer;

    #[test]
    fn test_bytesize() {
        assert_eq!(to_bytesize("5M"), Ok(5 * 1024 * 1024));
        assert_eq!(to_bytesize("1g500mb"), Ok((BYTESIZE_G + 500 * BYTESIZE_M) as usize));
        assert_eq!(to_bytesize("10KB24B"), Ok(10 * 1024 + 24));
        assert_eq!(to_bytesize("5242880"), Ok(5242880));
        assert_eq!(Bytesize(5 * 1024 * 1024 + 10 * 1024).string(), "5M10K");
        assert_eq!(Bytesize(0).string(), "0B");
    }

    #[test]
    fn test_bytesize_rejects_garbage() {
        for bad in ["", "oops", "5 MB", "5T", "M", "1M5", "-5M", "99999999999999999999G"] {
            assert_eq!(to_bytesize(bad), Err(ParseError::Bytesize(bad.into())), "{bad:?}");
        }
    }

    #[test]
    fn test_duration() {
        assert_eq!(to_duration("1h30m15s"), Ok(Duration::from_secs(5415)));
        assert_eq!(to_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(to_duration("2w3d12h").map(|d| d.as_secs()), Ok(1512000));
        assert_eq!(to_duration("1500"), Ok(Duration::from_millis(1500)));
        assert_eq!(to_duration("0s"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_duration_rejects_garbage() {
        for bad in ["", "10 seconds", "1m30", "5y", "s", "1.5s"] {
            assert_eq!(to_duration(bad), Err(ParseError::Duration(bad.into())), "{bad:?}");
        }
    }

    #[test]
    fn test_deserialize_errors() {
        let de: StrDeserializer<ValueError> = "10 seconds".into_deserializer();
        assert!(deserialize_duration(de).is_err());
        let de: StrDeserializer<ValueError> = "5 MB".into_deserializer();
        assert!(Bytesize::deserialize(de).is_err());
        let de: StrDeserializer<ValueError> = "5242880".into_deserializer();
        assert_eq!(Bytesize::deserialize(de).unwrap().as_usize(), 5242880);
    }

    #[test]
    fn test_timestamp() {
        assert!(timestamp_millis() > 0);
    }
}
