//! Error types for the Yahoo Fantasy export toolkit

use std::path::PathBuf;
use thiserror::Error;


pub type Result<T> = std::result::Result<T, YahooError>;

/// Exit code for a missing prerequisite run (e.g. no `league_dump` yet).
pub const EXIT_PRECONDITION: u8 = 2;
/// Exit code for authorization failures that need user action.
pub const EXIT_AUTH: u8 = 3;

#[derive(Error, Debug)]
pub enum YahooError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Failed to parse number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Missing configuration: {keys} (set them in the environment or .env)")]
    MissingConfig { keys: String },

    #[error("Invalid redirect URI '{uri}': {reason}")]
    InvalidRedirectUri { uri: String, reason: String },

    #[error("Invalid league key '{key}' (expected <game>.l.<id>, e.g. 453.l.33099)")]
    InvalidLeagueKey { key: String },

    #[error("Invalid run id '{value}' (expected YYYYMMDDTHHMMSSZ)")]
    InvalidRunId { value: String },

    #[error("League key not provided and {env_var} environment variable not set")]
    MissingLeagueKey { env_var: String },

    #[error("Transient network failure: {message}")]
    TransientNetwork { message: String },

    #[error("Access token expired")]
    AuthExpired,

    #[error("No stored credential; run `yahoo-fantasy auth login` to authorize")]
    NotAuthorized,

    #[error("Refresh token rejected ({reason}); run `yahoo-fantasy auth login` to reauthorize")]
    AuthRevoked { reason: String },

    #[error("Timed out after {waited_secs}s waiting for the authorization callback; retry `yahoo-fantasy auth login`")]
    CallbackTimeout { waited_secs: u64 },

    #[error("Authorization callback state did not match this attempt; restart the login")]
    StateMismatch,

    #[error("Authorization was denied: {error}")]
    AuthorizationDenied { error: String },

    #[error("No authorization code found in the redirect")]
    MissingAuthorizationCode,

    #[error("Token exchange failed with status {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("Request to {endpoint} was rejected as unauthorized after a token refresh")]
    Unauthorized { endpoint: String },

    #[error("Yahoo API returned status {status} for {endpoint}")]
    ApiStatus { status: u16, endpoint: String },

    #[error("TLS setup failed: {message}")]
    Tls { message: String },

    #[error("Failed to cache entity {entity_id}: {source}")]
    CacheWrite {
        entity_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact missing on disk: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("Failed to seal manifest {}: {message}", path.display())]
    ManifestSeal { path: PathBuf, message: String },

    #[error("Prerequisite missing: no completed {module} run for league {league_key}")]
    PointerNotFound { module: String, league_key: String },

    #[error("Latest {module} pointer for league {league_key} references a missing artifact: {}", path.display())]
    StalePointer {
        module: String,
        league_key: String,
        path: PathBuf,
    },

    #[error("Could not determine the season for league {league_key}; pass --season")]
    SeasonUnknown { league_key: String },

    #[error("{failed} of {total} entities failed; rerun to resume or pass --allow-partial")]
    IncompleteRun { failed: usize, total: usize },
}

impl YahooError {
    /// Whether the caller should start a fresh interactive grant.
    pub fn needs_reauthorization(&self) -> bool {
        matches!(self, YahooError::NotAuthorized | YahooError::AuthRevoked { .. })
    }

    /// Expected precondition failures, reported without treating them as crashes.
    pub fn is_precondition_failure(&self) -> bool {
        matches!(
            self,
            YahooError::PointerNotFound { .. } | YahooError::StalePointer { .. }
        )
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            YahooError::NotAuthorized
                | YahooError::AuthRevoked { .. }
                | YahooError::CallbackTimeout { .. }
                | YahooError::StateMismatch
                | YahooError::AuthorizationDenied { .. }
                | YahooError::MissingAuthorizationCode
                | YahooError::TokenExchange { .. }
                | YahooError::Unauthorized { .. }
        )
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        if self.is_precondition_failure() {
            EXIT_PRECONDITION
        } else if self.is_auth_failure() {
            EXIT_AUTH
        } else {
            1
        }
    }
}
