//! OAuth2 credential lifecycle for the Yahoo Fantasy API
//!
//! - `credential`: the token pair and its durable store
//! - `callback`: one-shot local listener for the authorization redirect
//! - `manager`: grant, refresh and persistence state machine
//! - `session`: authenticated requests with refresh-on-401

pub mod callback;
pub mod credential;
pub mod manager;
pub mod session;

pub use callback::{load_tls_acceptor, CallbackListener, CallbackParams};
pub use credential::{Credential, CredentialStore, TokenResponse};
pub use manager::{
    parse_manual_input, AuthState, AuthorizationAttempt, RetryPolicy, TokenManager,
    DEFAULT_SAFETY_MARGIN_SECS,
};
pub use session::{Session, SessionProvider};
