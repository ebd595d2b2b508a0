//! Command implementations for the Yahoo Fantasy export toolkit

pub mod auth;
pub mod latest;
pub mod league_dump;
pub mod players_dump;
pub mod raw_fetch;


use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{
    auth::{Credential, CredentialStore, SessionProvider, TokenManager},
    cli::LeagueArgs,
    config::Config,
    core::paths::ExportPaths,
    error::YahooError,
    yahoo::API_BASE,
    LeagueKey, Result, LEAGUE_KEY_ENV_VAR,
};

/// Module name of the league metadata export.
pub const LEAGUE_DUMP_MODULE: &str = "league_dump";
/// Module name of the per-player stats export.
pub const PLAYERS_DUMP_MODULE: &str = "players_dump";

/// Shared resources for commands: configuration, export layout and an
/// authenticated session backed by one token manager.
pub struct CommandContext {
    pub config: Config,
    pub paths: ExportPaths,
    pub session: SessionProvider,
}

impl CommandContext {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_api_base(config, API_BASE)
    }

    /// Build a context talking to `api_base` instead of the Yahoo API.
    pub fn with_api_base(config: Config, api_base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("yahoo-fantasy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let store = CredentialStore::new(&config.token_file);
        let manager = Arc::new(TokenManager::new(config.oauth.clone(), store, client.clone())?);

        Ok(Self {
            paths: ExportPaths::new(&config.export_dir),
            session: SessionProvider::new(manager, client, api_base),
            config,
        })
    }

    pub fn manager(&self) -> &Arc<TokenManager> {
        self.session.manager()
    }

    /// Make sure a usable credential exists, running a grant when none is
    /// stored or the refresh token was rejected.
    pub async fn ensure_authorized(&self) -> Result<()> {
        match self.session.session().await {
            Ok(_) => Ok(()),
            Err(e) if e.needs_reauthorization() => {
                println!("{}", e);
                println!("Starting authorization...");
                self.authorize(self.config.oauth.manual).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    /// Run a fresh grant, through the local listener or by pasting the redirect.
    pub async fn authorize(&self, manual: bool) -> Result<Credential> {
        if !manual {
            return self.manager().authorize_interactively().await;
        }

        let manager = self.manager();
        let attempt = manager.begin_authorization()?;
        println!(
            "Open this URL in your browser to authorize:\n  {}",
            attempt.authorization_url
        );
        if self.config.oauth.open_browser {
            if let Err(e) = open::that(&attempt.authorization_url) {
                warn!("Could not open a browser: {}", e);
            }
        }
        println!("Paste the full redirected URL (or just the code) and press Enter:");

        // tarpaulin::skip - interactive stdin
        let stdin = std::io::BufReader::new(std::io::stdin());
        let line = read_line_with_timeout(stdin, self.config.oauth.callback_timeout).await?;

        manager.authorize_with_code(&attempt, &line).await
    }
}

/// Read one line on a dedicated thread, giving up after `timeout`.
///
/// The reader thread is detached on timeout; a blocked read never holds up
/// runtime shutdown.
pub async fn read_line_with_timeout<R>(mut reader: R, timeout: Duration) -> Result<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let read = reader.read_line(&mut line).map(|_| line);
        let _ = tx.send(read);
    });

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(read)) => Ok(read?),
        Ok(Err(_)) => Err(YahooError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "input reader stopped",
        ))),
        Err(_) => Err(YahooError::CallbackTimeout {
            waited_secs: timeout.as_secs(),
        }),
    }
}

/// Resolve the league key from `--league-key`, `--league-id` + `--game`, or
/// the environment.
pub fn resolve_league_key(args: &LeagueArgs) -> Result<LeagueKey> {
    if let Some(key) = &args.league_key {
        return Ok(key.clone());
    }
    if let Some(id) = args.league_id {
        return LeagueKey::from_parts(&args.game, id);
    }

    match std::env::var(LEAGUE_KEY_ENV_VAR) {
        Ok(value) if !value.trim().is_empty() => {
            debug!("Using league key from {}", LEAGUE_KEY_ENV_VAR);
            value.parse()
        }
        _ => Err(YahooError::MissingLeagueKey {
            env_var: LEAGUE_KEY_ENV_VAR.to_string(),
        }),
    }
}

/// The command line as recorded in run manifests.
pub fn recorded_cli_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
