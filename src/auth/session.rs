//! Authenticated requests against the Yahoo Fantasy API.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::{header::ACCEPT, Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::credential::Credential;
use super::manager::{is_transient_status, TokenManager};
use crate::error::{Result, YahooError};

/// A bearer token good for at least the manager's safety margin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<Credential> for Session {
    fn from(credential: Credential) -> Self {
        Self {
            access_token: credential.access_token,
            expires_at: credential.expires_at,
        }
    }
}

/// Issues requests with a fresh bearer token, refreshing through the shared
/// [`TokenManager`] when the API answers 401.
#[derive(Clone)]
pub struct SessionProvider {
    manager: Arc<TokenManager>,
    client: Client,
    api_base: String,
}

impl SessionProvider {
    pub fn new(manager: Arc<TokenManager>, client: Client, api_base: impl Into<String>) -> Self {
        Self {
            manager,
            client,
            api_base: api_base.into(),
        }
    }

    pub fn manager(&self) -> &Arc<TokenManager> {
        &self.manager
    }

    pub async fn session(&self) -> Result<Session> {
        Ok(self.manager.ensure_session().await?.into())
    }

    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    pub async fn get(&self, endpoint: &str) -> Result<Value> {
        self.request(Method::GET, endpoint).await
    }

    /// Send `method endpoint` and return the JSON payload.
    ///
    /// A 401 triggers one refresh and one retry; a second 401 is returned as
    /// `Unauthorized`.
    pub async fn request(&self, method: Method, endpoint: &str) -> Result<Value> {
        let session = self.session().await?;

        match self.send_with_retry(&method, endpoint, &session).await {
            Err(YahooError::AuthExpired) => {
                info!("Access token rejected for {}; refreshing", endpoint);
                let refreshed: Session = self
                    .manager
                    .force_refresh(&session.access_token)
                    .await?
                    .into();

                match self.send_with_retry(&method, endpoint, &refreshed).await {
                    Err(YahooError::AuthExpired) => Err(YahooError::Unauthorized {
                        endpoint: endpoint.to_string(),
                    }),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn send_with_retry(
        &self,
        method: &Method,
        endpoint: &str,
        session: &Session,
    ) -> Result<Value> {
        let retry = self.manager.retry_policy();
        let mut attempt = 1;
        loop {
            match self.send(method, endpoint, session).await {
                Err(YahooError::TransientNetwork { message }) if attempt < retry.max_attempts => {
                    let delay = retry.delay_for(attempt);
                    warn!(
                        "Request to {} failed ({}); retrying in {:?}",
                        endpoint, message, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn send(&self, method: &Method, endpoint: &str, session: &Session) -> Result<Value> {
        let url = self.endpoint_url(endpoint);
        debug!("{} {}", method, url);

        let response = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&session.access_token)
            .header(ACCEPT, "application/json")
            .query(&[("format", "json")])
            .send()
            .await
            .map_err(|e| YahooError::TransientNetwork {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(YahooError::AuthExpired);
        }
        if is_transient_status(status) {
            return Err(YahooError::TransientNetwork {
                message: format!("{endpoint} returned {status}"),
            });
        }
        if !status.is_success() {
            return Err(YahooError::ApiStatus {
                status: status.as_u16(),
                endpoint: endpoint.to_string(),
            });
        }

        Ok(response.json::<Value>().await?)
    }
}
