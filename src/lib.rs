//! Yahoo Fantasy Export Toolkit Library
//!
//! Exports Yahoo Fantasy Sports league data as JSON artifacts, keeping an
//! OAuth2 session alive across runs and making every export idempotent.
//!
//! ## Features
//!
//! - **Credential Lifecycle**: Interactive or manual OAuth2 grant, proactive and
//!   on-401 refresh with a single refresh in flight, atomic credential storage
//! - **Entity Cache**: Per-player payloads cached by season so interrupted runs resume
//! - **Run Manifests**: Every artifact of a run listed with size and sha256
//! - **Latest Pointers**: Downstream modules find their prerequisites only
//!   through atomically replaced pointers to sealed runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use yahoo_fantasy::{commands::{league_dump::handle_league_dump, CommandContext}, config::Config, LeagueKey};
//!
//! # async fn example() -> yahoo_fantasy::Result<()> {
//! let ctx = CommandContext::new(Config::from_env()?)?;
//! let league_key: LeagueKey = "453.l.33099".parse()?;
//!
//! let sealed = handle_league_dump(&ctx, &league_key, false, vec![]).await?;
//! println!("{}", sealed.manifest_path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Configuration
//!
//! Set your OAuth app credentials and default league in the environment or `.env`:
//! ```bash
//! export YAHOO_CLIENT_ID=...
//! export YAHOO_CLIENT_SECRET=...
//! export YAHOO_REDIRECT_URI=https://127.0.0.1:8910/callback
//! export YAHOO_LEAGUE_KEY=453.l.33099
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod yahoo;

// Re-export commonly used types
pub use cli::types::{EntityId, LeagueKey, RunId, Season};
pub use error::{Result, YahooError};

pub const LEAGUE_KEY_ENV_VAR: &str = "YAHOO_LEAGUE_KEY";
