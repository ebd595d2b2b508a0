//! Time-related types: fantasy seasons and run identifiers.

use crate::error::{Result, YahooError};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type-safe wrapper for Season years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Season(pub u16);

impl Season {
    pub fn new(year: u16) -> Self {
        Self(year)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Season {
    type Err = YahooError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Filename-safe UTC timestamp shared by every artifact of one run,
/// e.g. `20250912T143012Z`.
///
/// The fixed-width format makes lexical order equal chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

const RUN_ID_FORMAT: &str = "%Y%m%dT%H%M%SZ";

impl RunId {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format(RUN_ID_FORMAT).to_string())
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.0, RUN_ID_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// The id one second later.
    pub fn next(&self) -> Self {
        match self.to_datetime() {
            Some(at) => Self::from_datetime(at + Duration::seconds(1)),
            None => Self::now(),
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = YahooError;

    fn from_str(s: &str) -> Result<Self> {
        NaiveDateTime::parse_from_str(s, RUN_ID_FORMAT).map_err(|_| YahooError::InvalidRunId {
            value: s.to_string(),
        })?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for RunId {
    type Error = YahooError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}
