//! CLI argument definitions and parsing.

pub mod types;

use clap::{Args, Parser, Subcommand};
use types::{LeagueKey, Season};

/// League selection shared between commands
#[derive(Debug, Clone, Args)]
pub struct LeagueArgs {
    /// Full league key, e.g. `453.l.33099` (or set `YAHOO_LEAGUE_KEY` env var).
    #[clap(long, short = 'k')]
    pub league_key: Option<LeagueKey>,

    /// Numeric league id, combined with `--game` into a league key.
    #[clap(long, short = 'l', conflicts_with = "league_key")]
    pub league_id: Option<u64>,

    /// Game key or code used with `--league-id` (e.g. `nhl`, `453`).
    #[clap(long, short = 'g', default_value = "nhl")]
    pub game: String,
}

#[derive(Debug, Subcommand)]
pub enum AuthCmd {
    /// Run a fresh authorization grant and store the credential.
    Login {
        /// Paste the redirected URL (or code) instead of running the local listener.
        #[clap(long)]
        manual: bool,

        /// Print the authorization URL without opening a browser.
        #[clap(long)]
        no_browser: bool,
    },

    /// Show the stored credential's expiry and whether it is still usable.
    Status,
}

#[derive(Debug, Subcommand)]
pub enum GetCmd {
    /// Fetch any league-relative endpoint and save it under `_debug/`.
    Raw {
        #[clap(flatten)]
        league: LeagueArgs,

        /// Path after `league/<key>/`, e.g. `standings` or `transactions;type=trade`.
        #[clap(long)]
        path: String,
    },

    /// Export league metadata, settings and teams as a sealed run.
    LeagueDump {
        #[clap(flatten)]
        league: LeagueArgs,

        /// Pretty-print JSON artifacts.
        #[clap(long)]
        pretty: bool,
    },

    /// Export per-player season stats for the rostered players of a league.
    ///
    /// Needs a completed `league-dump` run for the same league.
    PlayersDump {
        #[clap(flatten)]
        league: LeagueArgs,

        /// Season year; read from the latest league dump when omitted.
        #[clap(long, short)]
        season: Option<Season>,

        /// Only these players (repeatable): `--player-key 453.p.6743`.
        #[clap(long = "player-key")]
        player_keys: Vec<String>,

        /// Re-fetch players even if they are cached for the season.
        #[clap(long)]
        refresh: bool,

        /// Seal the run even when some players could not be fetched.
        #[clap(long)]
        allow_partial: bool,

        /// Pretty-print JSON artifacts.
        #[clap(long)]
        pretty: bool,
    },
}

#[derive(Debug, Parser)]
#[clap(
    name = "yahoo-fantasy",
    about = "Yahoo Fantasy export toolkit",
    version
)]
pub struct YahooFantasy {
    /// Enable debug logging (overridden by `RUST_LOG`).
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage the stored OAuth credential
    Auth {
        #[clap(subcommand)]
        cmd: AuthCmd,
    },

    /// Get data from Yahoo Fantasy
    Get {
        #[clap(subcommand)]
        cmd: GetCmd,
    },

    /// Show the latest completed run of a module for a league.
    Latest {
        #[clap(flatten)]
        league: LeagueArgs,

        /// Module name, e.g. `league_dump` or `players_dump`.
        #[clap(long, short, default_value = "league_dump")]
        module: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_players_dump() {
        let app = YahooFantasy::try_parse_from([
            "yahoo-fantasy",
            "get",
            "players-dump",
            "--league-key",
            "453.l.33099",
            "--season",
            "2024",
            "--player-key",
            "453.p.1",
            "--player-key",
            "453.p.2",
            "--allow-partial",
        ])
        .unwrap();

        match app.command {
            Commands::Get {
                cmd:
                    GetCmd::PlayersDump {
                        league,
                        season,
                        player_keys,
                        allow_partial,
                        refresh,
                        ..
                    },
            } => {
                assert_eq!(league.league_key.unwrap().as_str(), "453.l.33099");
                assert_eq!(season, Some(Season::new(2024)));
                assert_eq!(player_keys, vec!["453.p.1", "453.p.2"]);
                assert!(allow_partial);
                assert!(!refresh);
            }
            other => panic!("Unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_league_id_and_game() {
        let app = YahooFantasy::try_parse_from([
            "yahoo-fantasy",
            "get",
            "league-dump",
            "--league-id",
            "33099",
        ])
        .unwrap();

        match app.command {
            Commands::Get {
                cmd: GetCmd::LeagueDump { league, pretty },
            } => {
                assert_eq!(league.league_id, Some(33099));
                assert_eq!(league.game, "nhl");
                assert!(league.league_key.is_none());
                assert!(!pretty);
            }
            other => panic!("Unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_league_key_conflicts_with_league_id() {
        let result = YahooFantasy::try_parse_from([
            "yahoo-fantasy",
            "get",
            "league-dump",
            "--league-key",
            "453.l.33099",
            "--league-id",
            "1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_league_key_is_rejected() {
        let result =
            YahooFantasy::try_parse_from(["yahoo-fantasy", "latest", "--league-key", "bogus"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_verbose_and_auth() {
        let app =
            YahooFantasy::try_parse_from(["yahoo-fantasy", "auth", "login", "--manual", "-v"])
                .unwrap();
        assert!(app.verbose);
        assert!(matches!(
            app.command,
            Commands::Auth {
                cmd: AuthCmd::Login {
                    manual: true,
                    no_browser: false
                }
            }
        ));
    }
}
