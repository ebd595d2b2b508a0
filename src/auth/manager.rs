//! Credential lifecycle: authorization grants, refresh and persistence.
//!
//! [`TokenManager`] is the only writer of the [`CredentialStore`]. All grant
//! and refresh work happens while holding one async mutex, so concurrent
//! callers of [`TokenManager::ensure_session`] wait on the attempt in flight
//! and then observe its result instead of issuing their own token exchange.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use url::Url;

use super::callback::{load_tls_acceptor, CallbackListener, CallbackParams};
use super::credential::{Credential, CredentialStore, TokenResponse};
use crate::config::OAuthConfig;
use crate::error::{Result, YahooError};

/// Seconds before expiry at which a credential stops being handed out.
pub const DEFAULT_SAFETY_MARGIN_SECS: i64 = 60;

/// Lifecycle state of the token manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Authorizing,
    Active,
    Refreshing,
    Failed,
}

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// One interactive grant. Never persisted.
#[derive(Debug, Clone)]
pub struct AuthorizationAttempt {
    pub state_nonce: String,
    pub redirect_uri: String,
    pub authorization_url: String,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl AuthorizationAttempt {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Why a token endpoint call failed.
#[derive(Debug)]
enum TokenFailure {
    Transient(String),
    Rejected { status: u16, body: String },
}

impl TokenFailure {
    fn rejection_reason(status: u16, body: &str) -> String {
        match serde_json::from_str::<TokenErrorBody>(body) {
            Ok(err) => match err.error_description {
                Some(desc) if !desc.is_empty() => format!("{}: {}", err.error, desc),
                _ => err.error,
            },
            Err(_) => format!("status {status}"),
        }
    }
}

struct Inner {
    state: AuthState,
    credential: Option<Credential>,
}

pub struct TokenManager {
    config: OAuthConfig,
    store: CredentialStore,
    client: Client,
    margin: chrono::Duration,
    retry: RetryPolicy,
    inner: Mutex<Inner>,
}

impl TokenManager {
    /// Load any stored credential. With none the manager starts `Uninitialized`.
    pub fn new(config: OAuthConfig, store: CredentialStore, client: Client) -> Result<Self> {
        let credential = store.load()?;
        let state = if credential.is_some() {
            AuthState::Active
        } else {
            AuthState::Uninitialized
        };
        debug!("Token manager starting in state {:?}", state);

        Ok(Self {
            config,
            store,
            client,
            margin: chrono::Duration::seconds(DEFAULT_SAFETY_MARGIN_SECS),
            retry: RetryPolicy::default(),
            inner: Mutex::new(Inner { state, credential }),
        })
    }

    pub fn with_safety_margin(mut self, margin: chrono::Duration) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn safety_margin(&self) -> chrono::Duration {
        self.margin
    }

    pub async fn state(&self) -> AuthState {
        self.inner.lock().await.state
    }

    pub async fn credential(&self) -> Option<Credential> {
        self.inner.lock().await.credential.clone()
    }

    /// Return a usable credential, refreshing it first when it is near expiry.
    ///
    /// Fails with `NotAuthorized` when nothing is stored and `AuthRevoked`
    /// when the refresh token is rejected; both call for a new grant.
    pub async fn ensure_session(&self) -> Result<Credential> {
        let mut inner = self.inner.lock().await;

        if let Some(credential) = &inner.credential {
            if credential.is_usable(Utc::now(), self.margin) {
                let credential = credential.clone();
                inner.state = AuthState::Active;
                return Ok(credential);
            }
        }

        let Some(current) = inner.credential.clone() else {
            return Err(YahooError::NotAuthorized);
        };
        self.refresh_locked(&mut inner, &current).await
    }

    /// Refresh after the API rejected `stale_access_token`.
    ///
    /// If another caller already replaced that token, the newer credential is
    /// returned without another exchange.
    pub async fn force_refresh(&self, stale_access_token: &str) -> Result<Credential> {
        let mut inner = self.inner.lock().await;

        let Some(current) = inner.credential.clone() else {
            return Err(YahooError::NotAuthorized);
        };
        if current.access_token != stale_access_token
            && current.is_usable(Utc::now(), self.margin)
        {
            debug!("Credential already refreshed by another caller");
            return Ok(current);
        }
        self.refresh_locked(&mut inner, &current).await
    }

    async fn refresh_locked(
        &self,
        inner: &mut MutexGuard<'_, Inner>,
        current: &Credential,
    ) -> Result<Credential> {
        if !current.has_refresh_token() {
            inner.state = AuthState::Authorizing;
            return Err(YahooError::AuthRevoked {
                reason: "no refresh token stored".to_string(),
            });
        }

        inner.state = AuthState::Refreshing;
        info!("Refreshing access token");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
            ("redirect_uri", self.config.redirect.as_str()),
        ];

        match self.post_token_with_retry(&form).await {
            Ok(response) => {
                let credential =
                    Credential::from_grant(response, Utc::now(), Some(current), &self.config.scope);
                if let Err(e) = self.store.save(&credential) {
                    warn!("Could not persist the refreshed credential: {}", e);
                    inner.state = AuthState::Active;
                    return Err(e);
                }
                inner.credential = Some(credential.clone());
                inner.state = AuthState::Active;
                info!("Access token refreshed; expires at {}", credential.expires_at);
                Ok(credential)
            }
            Err(TokenFailure::Rejected { status, body }) => {
                let reason = TokenFailure::rejection_reason(status, &body);
                warn!("Refresh token rejected ({}): {}", status, reason);
                inner.state = AuthState::Authorizing;
                Err(YahooError::AuthRevoked { reason })
            }
            Err(TokenFailure::Transient(message)) => {
                warn!("Token refresh gave up after transient failures: {}", message);
                inner.state = AuthState::Active;
                Err(YahooError::TransientNetwork { message })
            }
        }
    }

    /// Start an interactive grant: a fresh nonce, deadline and authorization URL.
    pub fn begin_authorization(&self) -> Result<AuthorizationAttempt> {
        let state_nonce = generate_state();
        let started_at = Utc::now();
        let deadline = started_at
            + chrono::Duration::from_std(self.config.callback_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));

        let mut params = vec![
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect.as_str()),
            ("state", state_nonce.as_str()),
        ];
        if !self.config.scope.is_empty() {
            params.push(("scope", self.config.scope.as_str()));
        }
        if let Some(prompt) = self.config.prompt.as_deref() {
            params.push(("prompt", prompt));
        }
        let authorization_url =
            Url::parse_with_params(&self.config.endpoints.authorize_url, &params)?.to_string();

        Ok(AuthorizationAttempt {
            state_nonce,
            redirect_uri: self.config.redirect.as_str().to_string(),
            authorization_url,
            started_at,
            deadline,
        })
    }

    /// Run a full grant through a local callback listener bound to the
    /// configured redirect URI.
    pub async fn authorize_interactively(&self) -> Result<Credential> {
        let mut inner = self.inner.lock().await;
        inner.state = AuthState::Authorizing;

        let redirect = &self.config.redirect;
        let tls = match (&self.config.tls, redirect.is_https()) {
            (Some(files), true) => match load_tls_acceptor(files) {
                Ok(acceptor) => Some(acceptor),
                Err(e) => {
                    inner.state = AuthState::Failed;
                    return Err(e);
                }
            },
            _ => None,
        };

        let listener =
            match CallbackListener::bind(&redirect.bind_addr(), redirect.path(), tls).await {
                Ok(listener) => listener,
                Err(e) => {
                    inner.state = AuthState::Failed;
                    return Err(e);
                }
            };

        self.complete_with_listener_locked(&mut inner, listener).await
    }

    /// Run a full grant through an already bound listener.
    pub async fn authorize_with_listener(&self, listener: CallbackListener) -> Result<Credential> {
        let mut inner = self.inner.lock().await;
        inner.state = AuthState::Authorizing;
        self.complete_with_listener_locked(&mut inner, listener).await
    }

    async fn complete_with_listener_locked(
        &self,
        inner: &mut MutexGuard<'_, Inner>,
        listener: CallbackListener,
    ) -> Result<Credential> {
        let attempt = match self.begin_authorization() {
            Ok(attempt) => attempt,
            Err(e) => {
                inner.state = AuthState::Failed;
                return Err(e);
            }
        };

        println!("Open this URL in your browser to authorize:\n  {}", attempt.authorization_url);
        if self.config.open_browser {
            if let Err(e) = open::that(&attempt.authorization_url) {
                warn!("Could not open a browser: {}", e);
            }
        }

        let code = match listener
            .wait_for_code(&attempt.state_nonce, self.config.callback_timeout)
            .await
        {
            Ok(code) => code,
            Err(e) => {
                inner.state = AuthState::Failed;
                return Err(e);
            }
        };

        self.exchange_code_locked(inner, &code).await
    }

    /// Finish a grant with a code the user pasted (manual mode).
    ///
    /// Accepts either the bare code or the full redirected URL; a URL carrying
    /// `state` must match the attempt's nonce.
    pub async fn authorize_with_code(
        &self,
        attempt: &AuthorizationAttempt,
        input: &str,
    ) -> Result<Credential> {
        let mut inner = self.inner.lock().await;
        inner.state = AuthState::Authorizing;

        if attempt.is_expired(Utc::now()) {
            inner.state = AuthState::Failed;
            let waited = (attempt.deadline - attempt.started_at).num_seconds().max(0) as u64;
            return Err(YahooError::CallbackTimeout {
                waited_secs: waited,
            });
        }

        let code = match parse_manual_input(input, &attempt.state_nonce) {
            Ok(code) => code,
            Err(e) => {
                inner.state = AuthState::Failed;
                return Err(e);
            }
        };

        self.exchange_code_locked(&mut inner, &code).await
    }

    async fn exchange_code_locked(
        &self,
        inner: &mut MutexGuard<'_, Inner>,
        code: &str,
    ) -> Result<Credential> {
        info!("Exchanging authorization code for tokens");
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect.as_str()),
        ];

        match self.post_token_with_retry(&form).await {
            Ok(response) => {
                let credential =
                    Credential::from_grant(response, Utc::now(), None, &self.config.scope);
                if let Err(e) = self.store.save(&credential) {
                    inner.state = AuthState::Failed;
                    return Err(e);
                }
                inner.credential = Some(credential.clone());
                inner.state = AuthState::Active;
                info!("Authorization complete; token saved to {}", self.store.path().display());
                Ok(credential)
            }
            Err(TokenFailure::Rejected { status, body }) => {
                inner.state = AuthState::Failed;
                Err(YahooError::TokenExchange { status, body })
            }
            Err(TokenFailure::Transient(message)) => {
                inner.state = AuthState::Failed;
                Err(YahooError::TransientNetwork { message })
            }
        }
    }

    async fn post_token_with_retry(
        &self,
        form: &[(&str, &str)],
    ) -> std::result::Result<TokenResponse, TokenFailure> {
        let mut attempt = 1;
        loop {
            match self.post_token(form).await {
                Err(TokenFailure::Transient(message)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Token request failed ({}); retrying in {:?} (attempt {}/{})",
                        message, delay, attempt, self.retry.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn post_token(
        &self,
        form: &[(&str, &str)],
    ) -> std::result::Result<TokenResponse, TokenFailure> {
        let response = self
            .client
            .post(&self.config.endpoints.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| TokenFailure::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| TokenFailure::Transient(e.to_string()))?;
            return serde_json::from_str::<TokenResponse>(&body).map_err(|e| {
                TokenFailure::Rejected {
                    status: status.as_u16(),
                    body: format!("malformed token response: {e}"),
                }
            });
        }

        let body = response.text().await.unwrap_or_default();
        if is_transient_status(status) {
            Err(TokenFailure::Transient(format!("token endpoint returned {status}")))
        } else {
            Err(TokenFailure::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Network-level status codes worth retrying.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

fn generate_state() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Extract the authorization code from what the user pasted.
pub fn parse_manual_input(input: &str, expected_state: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(YahooError::MissingAuthorizationCode);
    }

    let url = if input.starts_with("http://") || input.starts_with("https://") {
        Some(Url::parse(input)?)
    } else if input.contains("code=") {
        let query = input.trim_start_matches('?');
        Some(Url::parse(&format!("http://localhost/?{query}"))?)
    } else {
        None
    };

    let Some(url) = url else {
        return Ok(input.to_string());
    };

    let params = CallbackParams::from_url(&url);
    if params.state.is_some() {
        return params.into_code(expected_state);
    }
    if let Some(error) = params.error {
        return Err(YahooError::AuthorizationDenied { error });
    }
    params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(YahooError::MissingAuthorizationCode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delays_double() {
        let retry = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_rejection_reason() {
        assert_eq!(
            TokenFailure::rejection_reason(400, r#"{"error":"invalid_grant"}"#),
            "invalid_grant"
        );
        assert_eq!(
            TokenFailure::rejection_reason(
                401,
                r#"{"error":"invalid_grant","error_description":"token revoked"}"#
            ),
            "invalid_grant: token revoked"
        );
        assert_eq!(TokenFailure::rejection_reason(403, "<html>"), "status 403");
    }

    #[test]
    fn test_state_nonces_are_unique_and_url_safe() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_manual_input_bare_code() {
        assert_eq!(parse_manual_input("  abc123 \n", "s").unwrap(), "abc123");
        assert!(matches!(
            parse_manual_input("   ", "s"),
            Err(YahooError::MissingAuthorizationCode)
        ));
    }

    #[test]
    fn test_manual_input_full_url_validates_state() {
        let url = "https://127.0.0.1:8910/callback?code=xyz&state=nonce";
        assert_eq!(parse_manual_input(url, "nonce").unwrap(), "xyz");
        assert!(matches!(
            parse_manual_input(url, "other"),
            Err(YahooError::StateMismatch)
        ));
    }

    #[test]
    fn test_manual_input_url_without_state() {
        let url = "https://127.0.0.1:8910/callback?code=xyz";
        assert_eq!(parse_manual_input(url, "nonce").unwrap(), "xyz");
        assert!(matches!(
            parse_manual_input("https://127.0.0.1:8910/callback", "nonce"),
            Err(YahooError::MissingAuthorizationCode)
        ));
    }

    #[test]
    fn test_manual_input_query_string() {
        assert_eq!(
            parse_manual_input("?code=q1&state=nonce", "nonce").unwrap(),
            "q1"
        );
        assert_eq!(parse_manual_input("code=q2", "nonce").unwrap(), "q2");
    }

    #[test]
    fn test_manual_input_error_param() {
        assert!(matches!(
            parse_manual_input("https://localhost/cb?error=access_denied", "nonce"),
            Err(YahooError::AuthorizationDenied { .. })
        ));
    }
}
