//! Log sequence numbers.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::Error;

/// Position in the engine's write-ahead log.
///
/// Stored as a 64-bit value, rendered in the engine's `XXXXXXXX/XXXXXXXX`
/// hexadecimal form. Comparable only between positions from the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Lsn(u64);

impl Lsn {
    /// Creates an LSN from its raw 64-bit representation.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw 64-bit representation.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the byte distance between two positions.
    ///
    /// Used for replication lag: `latest_end.delta(received)` is the number
    /// of WAL bytes not yet received. Saturates at zero when `other` is
    /// ahead of `self`.
    pub fn delta(self, other: Lsn) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl FromStr for Lsn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = s
            .split_once('/')
            .ok_or_else(|| Error::InvalidLsn(s.to_string()))?;
        let hi = u64::from_str_radix(hi, 16).map_err(|_| Error::InvalidLsn(s.to_string()))?;
        let lo = u64::from_str_radix(lo, 16).map_err(|_| Error::InvalidLsn(s.to_string()))?;
        if hi > u64::from(u32::MAX) || lo > u64::from(u32::MAX) {
            return Err(Error::InvalidLsn(s.to_string()));
        }
        Ok(Self((hi << 32) | lo))
    }
}

impl Serialize for Lsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Lsn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LsnVisitor;

        impl Visitor<'_> for LsnVisitor {
            type Value = Lsn;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an LSN string of the form <hex>/<hex>")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Lsn, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(LsnVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_and_display() {
        let lsn: Lsn = "0/1000".parse().unwrap();
        assert_eq!(lsn.as_u64(), 0x1000);
        assert_eq!(lsn.to_string(), "0/1000");

        let lsn: Lsn = "16/B374D848".parse().unwrap();
        assert_eq!(lsn.as_u64(), (0x16 << 32) | 0xB374_D848);
        assert_eq!(lsn.to_string(), "16/B374D848");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("".parse::<Lsn>().is_err());
        assert!("1000".parse::<Lsn>().is_err());
        assert!("zz/1000".parse::<Lsn>().is_err());
        assert!("1/2/3".parse::<Lsn>().is_err());
        assert!("100000000/0".parse::<Lsn>().is_err());
    }

    #[test]
    fn delta_saturates() {
        let a = Lsn::new(1000);
        let b = Lsn::new(400);
        assert_eq!(a.delta(b), 600);
        assert_eq!(b.delta(a), 0);
    }

    #[test]
    fn serde_roundtrip_as_string() {
        let lsn: Lsn = "1/A0".parse().unwrap();
        let json = serde_json::to_string(&lsn).unwrap();
        assert_eq!(json, "\"1/A0\"");
        let back: Lsn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lsn);
    }

    proptest! {
        #[test]
        fn display_parse_roundtrip(raw in any::<u64>()) {
            let lsn = Lsn::new(raw);
            let parsed: Lsn = lsn.to_string().parse().unwrap();
            prop_assert_eq!(parsed, lsn);
        }
    }
}
