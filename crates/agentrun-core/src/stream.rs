//! Stream entry identifiers and message envelopes.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Stream-assigned sequence token of a log entry, rendered `<millis>-<seq>`.
///
/// Ids are strictly increasing within a stream and never reused, so the last
/// id a reader saw is a valid resumption cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    /// Sorts before every real entry. Reading "after ZERO" reads from the start.
    pub const ZERO: StreamId = StreamId { ms: 0, seq: 0 };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Next id after `self` for an append happening at `now_ms`.
    ///
    /// Uses the wall clock when it moved forward, otherwise bumps the
    /// sequence so ids stay monotonic even if the clock goes backwards.
    pub fn next(&self, now_ms: u64) -> Self {
        if now_ms > self.ms {
            Self { ms: now_ms, seq: 0 }
        } else {
            Self {
                ms: self.ms,
                seq: self.seq + 1,
            }
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for StreamId {
    type Err = CoreError;

    /// Accepts `<ms>-<seq>`, a bare `<ms>`, and `-`/`0` for the stream start.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidStreamId(s.to_string());
        if s == "-" {
            return Ok(Self::ZERO);
        }
        match s.split_once('-') {
            Some((ms, seq)) => Ok(Self {
                ms: ms.parse().map_err(|_| invalid())?,
                seq: seq.parse().map_err(|_| invalid())?,
            }),
            None => Ok(Self {
                ms: s.parse().map_err(|_| invalid())?,
                seq: 0,
            }),
        }
    }
}

impl Serialize for StreamId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Envelope of a decoded stream entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage<T> {
    pub id: StreamId,
    pub data: T,
}

impl<T> StreamMessage<T> {
    pub fn new(id: StreamId, data: T) -> Self {
        Self { id, data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id: StreamId = "1700000000000-3".parse().unwrap();
        assert_eq!(id, StreamId::new(1_700_000_000_000, 3));
        assert_eq!(id.to_string(), "1700000000000-3");
    }

    #[test]
    fn test_parse_start_markers() {
        assert_eq!("-".parse::<StreamId>().unwrap(), StreamId::ZERO);
        assert_eq!("0".parse::<StreamId>().unwrap(), StreamId::ZERO);
        assert!("abc".parse::<StreamId>().is_err());
        assert!("1-x".parse::<StreamId>().is_err());
    }

    #[test]
    fn test_next_is_monotonic_when_clock_stalls() {
        let id = StreamId::new(100, 0);
        assert_eq!(id.next(100), StreamId::new(100, 1));
        assert_eq!(id.next(50), StreamId::new(100, 1));
        assert_eq!(id.next(101), StreamId::new(101, 0));
        assert!(id.next(100) > id);
    }
}
