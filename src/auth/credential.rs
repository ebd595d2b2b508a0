//! The OAuth2 credential and its on-disk store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::files::{read_if_exists, restrict_to_owner, write_atomic};
use crate::error::Result;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Access/refresh token pair with absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub scope: String,
    pub issued_at: DateTime<Utc>,
}

/// Token endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl Credential {
    /// Build a credential from a grant issued at `issued_at`.
    ///
    /// A response without a refresh token keeps `previous`'s one, and a
    /// response without a scope keeps `previous`'s scope (or `requested_scope`).
    pub fn from_grant(
        response: TokenResponse,
        issued_at: DateTime<Utc>,
        previous: Option<&Credential>,
        requested_scope: &str,
    ) -> Self {
        let lifetime = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS).max(0);
        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .or_else(|| previous.map(|p| p.refresh_token.clone()))
            .unwrap_or_default();
        let scope = response
            .scope
            .or_else(|| previous.map(|p| p.scope.clone()))
            .unwrap_or_else(|| requested_scope.to_string());

        Self {
            access_token: response.access_token,
            refresh_token,
            expires_at: issued_at + Duration::seconds(lifetime),
            scope,
            issued_at,
        }
    }

    /// Usable while `now < expires_at - margin`.
    pub fn is_usable(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now < self.expires_at - margin
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// Durable single-file store for the current [`Credential`].
///
/// Every save replaces the whole file atomically and restricts it to the
/// owner. Only [`TokenManager`](super::TokenManager) writes through it.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored credential. A missing or unreadable document is `None`.
    pub fn load(&self) -> Result<Option<Credential>> {
        let Some(contents) = read_if_exists(&self.path)? else {
            debug!("No credential stored at {}", self.path.display());
            return Ok(None);
        };

        match serde_json::from_str::<Credential>(&contents) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!(
                    "Ignoring unreadable credential file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Replace the stored credential.
    pub fn save(&self, credential: &Credential) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(credential)?;
        write_atomic(&self.path, &bytes)?;
        restrict_to_owner(&self.path)?;
        debug!("Saved credential to {}", self.path.display());
        Ok(())
    }
}
