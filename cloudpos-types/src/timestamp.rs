//! Wall-clock timestamps used for last-write-wins comparison.
//!
//! Timestamps are UTC instants with millisecond precision. They are persisted
//! as fixed-width RFC 3339 text (`2024-05-01T10:00:00.123Z`) so that lexical
//! order in SQLite equals chronological order.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Earliest representable instant, `0000-01-01T00:00:00.000Z`.
const MIN_MILLIS: i64 = -62_167_219_200_000;
/// Latest representable instant, `9999-12-31T23:59:59.999Z`.
const MAX_MILLIS: i64 = 253_402_300_799_999;

/// A UTC instant truncated to whole milliseconds.
///
/// Always within years 0000 to 9999, so the text form stays fixed-width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Milliseconds since the Unix epoch.
    millis: i64,
}

impl Timestamp {
    /// The earliest representable timestamp.
    pub const MIN: Self = Self { millis: MIN_MILLIS };

    /// The latest representable timestamp.
    pub const MAX: Self = Self { millis: MAX_MILLIS };

    /// Returns the current time.
    #[must_use]
    pub fn now() -> Self {
        Self::from_millis(Utc::now().timestamp_millis())
    }

    /// Creates a timestamp from milliseconds since the Unix epoch, clamped to
    /// [`Timestamp::MIN`]..=[`Timestamp::MAX`].
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        let millis = if millis < MIN_MILLIS {
            MIN_MILLIS
        } else if millis > MAX_MILLIS {
            MAX_MILLIS
        } else {
            millis
        };
        Self { millis }
    }

    /// Creates a timestamp from milliseconds since the Unix epoch, rejecting
    /// values outside [`Timestamp::MIN`]..=[`Timestamp::MAX`].
    pub fn try_from_millis(millis: i64) -> Result<Self, Error> {
        if !(MIN_MILLIS..=MAX_MILLIS).contains(&millis) {
            return Err(Error::InvalidTimestamp(format!(
                "{millis} ms is outside years 0000 to 9999"
            )));
        }
        Ok(Self { millis })
    }

    /// Returns milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.millis
    }

    /// Generates the next local timestamp after `self`, ensuring monotonicity.
    ///
    /// Returns the current time, or `self` plus one millisecond when the
    /// wall clock has not moved past it (or runs behind it).
    #[must_use]
    pub fn tick(&self) -> Self {
        let now = Self::now();
        if now > *self {
            now
        } else {
            Self::from_millis(self.millis.saturating_add(1))
        }
    }

    /// Parses any RFC 3339 timestamp, truncating sub-millisecond precision.
    ///
    /// Offsets other than `Z` are normalized to UTC, so the value coming back
    /// from a Postgres `timestamptz` column (`...123456+00:00`) is accepted.
    pub fn parse_rfc3339(s: &str) -> Result<Self, Error> {
        let parsed = DateTime::parse_from_rfc3339(s.trim())
            .map_err(|e| Error::InvalidTimestamp(format!("{s}: {e}")))?;
        Self::try_from_millis(parsed.with_timezone(&Utc).timestamp_millis())
    }

    /// Formats as fixed-width RFC 3339 with milliseconds and a `Z` suffix.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.to_datetime()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Converts to a chrono `DateTime<Utc>`.
    #[must_use]
    pub fn to_datetime(&self) -> DateTime<Utc> {
        // In range by construction, so chrono always accepts it.
        Utc.timestamp_millis_opt(self.millis)
            .single()
            .unwrap_or_default()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_millis(value.timestamp_millis())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_rfc3339(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_rfc3339(&raw).map_err(serde::de::Error::custom)
    }
}
