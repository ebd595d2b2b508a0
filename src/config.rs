//! Runtime configuration from the environment and an optional `.env` file.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::{Result, YahooError};

pub const CLIENT_ID_ENV_VAR: &str = "YAHOO_CLIENT_ID";
pub const CLIENT_SECRET_ENV_VAR: &str = "YAHOO_CLIENT_SECRET";
pub const REDIRECT_URI_ENV_VAR: &str = "YAHOO_REDIRECT_URI";

/// Yahoo OAuth2 endpoints.
pub const YAHOO_AUTH_URL: &str = "https://api.login.yahoo.com/oauth2/request_auth";
pub const YAHOO_TOKEN_URL: &str = "https://api.login.yahoo.com/oauth2/get_token";

const DEFAULT_SCOPE: &str = "fspt-r";
const DEFAULT_EXPORT_DIR: &str = "./exports";
const DEFAULT_TLS_CERT: &str = "./certs/localhost.pem";
const DEFAULT_TLS_KEY: &str = "./certs/localhost-key.pem";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

/// Authorization and token endpoints (overridable for tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub authorize_url: String,
    pub token_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: YAHOO_AUTH_URL.to_string(),
            token_url: YAHOO_TOKEN_URL.to_string(),
        }
    }
}

/// Parsed redirect URI the callback listener binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUri {
    raw: String,
    scheme: String,
    host: String,
    port: u16,
    path: String,
}

impl RedirectUri {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| YahooError::InvalidRedirectUri {
            uri: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
        let scheme = url.scheme().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(invalid("scheme must be http or https"));
        }
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;

        Ok(Self {
            raw: raw.trim().to_string(),
            scheme,
            host,
            port,
            path: url.path().to_string(),
        })
    }

    /// The URI exactly as registered with Yahoo.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_https(&self) -> bool {
        self.scheme == "https"
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `host:port` for binding the local listener.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// PEM files for an `https` redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Everything the token manager needs to run a grant.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect: RedirectUri,
    pub scope: String,
    pub prompt: Option<String>,
    pub manual: bool,
    pub open_browser: bool,
    pub tls: Option<TlsFiles>,
    pub callback_timeout: Duration,
    pub endpoints: OAuthEndpoints,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub oauth: OAuthConfig,
    pub token_file: PathBuf,
    pub export_dir: PathBuf,
    pub http_timeout: Duration,
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => debug!("No .env file found"),
            Err(e) => tracing::warn!("Ignoring unreadable .env file: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let required = [CLIENT_ID_ENV_VAR, CLIENT_SECRET_ENV_VAR, REDIRECT_URI_ENV_VAR];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| get(key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(YahooError::MissingConfig {
                keys: missing.join(", "),
            });
        }

        let client_id = get(CLIENT_ID_ENV_VAR).unwrap_or_default();
        let client_secret = get(CLIENT_SECRET_ENV_VAR).unwrap_or_default();
        let redirect = RedirectUri::parse(&get(REDIRECT_URI_ENV_VAR).unwrap_or_default())?;

        let tls = redirect.is_https().then(|| TlsFiles {
            cert: PathBuf::from(get("TLS_CERT_FILE").unwrap_or_else(|| DEFAULT_TLS_CERT.into())),
            key: PathBuf::from(get("TLS_KEY_FILE").unwrap_or_else(|| DEFAULT_TLS_KEY.into())),
        });

        let http_timeout = parse_secs(get("HTTP_TIMEOUT"), DEFAULT_HTTP_TIMEOUT_SECS)?;
        let callback_timeout =
            parse_secs(get("OAUTH_CALLBACK_TIMEOUT"), DEFAULT_CALLBACK_TIMEOUT_SECS)?;

        let oauth = OAuthConfig {
            client_id,
            client_secret,
            redirect,
            scope: get("YAHOO_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            prompt: get("OAUTH_PROMPT"),
            manual: get("OAUTH_MANUAL").as_deref().map(is_truthy).unwrap_or(false),
            open_browser: true,
            tls,
            callback_timeout,
            endpoints: OAuthEndpoints::default(),
        };

        Ok(Self {
            oauth,
            token_file: get("TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(default_token_file),
            export_dir: PathBuf::from(
                get("EXPORT_DIR").unwrap_or_else(|| DEFAULT_EXPORT_DIR.to_string()),
            ),
            http_timeout,
        })
    }
}

/// Path: <data dir>/yahoo-fantasy/yahoo_token.json, falling back to ./data
pub fn default_token_file() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("yahoo-fantasy"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .join("yahoo_token.json")
}

fn parse_secs(value: Option<String>, default: u64) -> Result<Duration> {
    match value {
        Some(v) => Ok(Duration::from_secs(v.parse()?)),
        None => Ok(Duration::from_secs(default)),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
