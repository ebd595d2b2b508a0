//! ID types for Yahoo Fantasy leagues and entities.

use crate::core::files::sha256_hex;
use crate::error::{Result, YahooError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type-safe wrapper for Yahoo league keys (`<game>.l.<league_id>`).
///
/// The game part is either a game code (`nhl`, `nfl`) or a numeric game key
/// (`453`); the league part is always numeric.
///
/// # Examples
///
/// ```rust
/// use yahoo_fantasy::LeagueKey;
///
/// let key: LeagueKey = "453.l.33099".parse().unwrap();
/// assert_eq!(key.game(), "453");
/// assert_eq!(key.league_id(), "33099");
///
/// let built = LeagueKey::from_parts("nhl", 22607).unwrap();
/// assert_eq!(built.as_str(), "nhl.l.22607");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LeagueKey(String);

impl LeagueKey {
    /// Build a key from a game code/key and a numeric league id.
    pub fn from_parts(game: &str, league_id: u64) -> Result<Self> {
        format!("{}.l.{}", game.trim(), league_id).parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn game(&self) -> &str {
        self.0.split(".l.").next().unwrap_or_default()
    }

    pub fn league_id(&self) -> &str {
        self.0.rsplit(".l.").next().unwrap_or_default()
    }
}

impl fmt::Display for LeagueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LeagueKey {
    type Err = YahooError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || YahooError::InvalidLeagueKey { key: s.to_string() };

        let (game, id) = s.split_once(".l.").ok_or_else(invalid)?;
        let game_ok = !game.is_empty() && game.chars().all(|c| c.is_ascii_alphanumeric());
        let id_ok = !id.is_empty() && id.chars().all(|c| c.is_ascii_digit());

        if game_ok && id_ok {
            Ok(Self(s.to_string()))
        } else {
            Err(invalid())
        }
    }
}

impl TryFrom<String> for LeagueKey {
    type Error = YahooError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<LeagueKey> for String {
    fn from(key: LeagueKey) -> Self {
        key.0
    }
}

/// Stable identifier of a remote entity (e.g. a player key `453.p.6743`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic, filesystem-safe file stem for this id.
    pub fn file_stem(&self) -> String {
        let stem: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        // Keep ".." and leading dots out of cache paths
        let stem = match stem.trim_start_matches('.') {
            "" => "_".to_string(),
            trimmed => trimmed.replace("..", "__"),
        };

        // Rewritten ids get a digest suffix so `a/b` and `a_b` stay distinct
        if stem == self.0 {
            stem
        } else {
            format!("{}-{}", stem, &sha256_hex(self.0.as_bytes())[..12])
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = YahooError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(s.trim().to_string()))
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
