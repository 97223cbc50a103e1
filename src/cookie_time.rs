//! Wall-clock timestamps as they are stored in cookies.
//!
//! Cookies carry times as `YYYY-MM-DDTHH:MM:SS`, always UTC, with no fractional seconds and no
//! zone suffix. [`CookieTime`] holds whole seconds only, so a value survives an encode/decode
//! round trip unchanged.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

const COOKIE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A UTC instant with whole-second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CookieTime(DateTime<Utc>);

impl CookieTime {
    /// Current time, truncated to the second.
    pub fn now() -> CookieTime {
        CookieTime::from(Utc::now())
    }

    /// Parse a timestamp in the cookie format.
    ///
    /// ```
    /// # use ab_cookies::CookieTime;
    /// let t = CookieTime::parse("2021-01-01T15:31:23").unwrap();
    /// assert_eq!(t.to_string(), "2021-01-01T15:31:23");
    /// ```
    ///
    /// Every field must be zero-padded: `2021-1-1T1:2:3` is rejected.
    pub fn parse(value: &str) -> Result<CookieTime> {
        let invalid = |reason: String| Error::InvalidCookieTime {
            value: value.to_owned(),
            reason,
        };
        let time = NaiveDateTime::parse_from_str(value, COOKIE_TIME_FORMAT)
            .map(|naive| CookieTime(naive.and_utc()))
            .map_err(|err| invalid(err.to_string()))?;
        if time.to_string() != value {
            return Err(invalid("not in YYYY-MM-DDTHH:MM:SS form".to_owned()));
        }
        Ok(time)
    }

    /// Returns `self + duration`, saturating at the largest representable instant.
    pub fn saturating_add(self, duration: Duration) -> CookieTime {
        self.0
            .checked_add_signed(duration)
            .map_or(CookieTime(DateTime::<Utc>::MAX_UTC.trunc_subsecs(0)), CookieTime)
    }

    /// `true` if `self` is strictly later than `other`.
    pub fn is_after(&self, other: &CookieTime) -> bool {
        self > other
    }

    /// The underlying `chrono` value.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for CookieTime {
    fn from(value: DateTime<Utc>) -> Self {
        CookieTime(value.trunc_subsecs(0))
    }
}

impl FromStr for CookieTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        CookieTime::parse(s)
    }
}

impl fmt::Display for CookieTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(COOKIE_TIME_FORMAT))
    }
}

impl Serialize for CookieTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CookieTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CookieTime::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde helpers for `Option<CookieTime>` fields where an empty string or `null` means unset.
pub(crate) mod optional {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::CookieTime;

    pub fn serialize<S: Serializer>(
        value: &Option<CookieTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => serializer.collect_str(t),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<CookieTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => CookieTime::parse(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
