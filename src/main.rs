//! Entry point: parse CLI and dispatch to command handlers.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use yahoo_fantasy::{
    cli::{AuthCmd, Commands, GetCmd, YahooFantasy},
    commands::{
        auth::{handle_auth_login, handle_auth_status},
        latest::handle_latest,
        league_dump::handle_league_dump,
        players_dump::{handle_players_dump, PlayersDumpOptions},
        raw_fetch::handle_raw_fetch,
        recorded_cli_args, resolve_league_key, CommandContext,
    },
    config::Config,
    YahooError,
};

/// Run the CLI.
#[tokio::main]
async fn main() -> ExitCode {
    let app = YahooFantasy::parse();
    init_tracing(app.verbose);

    match run(app).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = match err.downcast_ref::<YahooError>() {
                Some(yahoo) if yahoo.is_precondition_failure() => {
                    eprintln!("Precondition failed: {}", yahoo);
                    yahoo.exit_code()
                }
                Some(yahoo) => {
                    eprintln!("Error: {:#}", err);
                    yahoo.exit_code()
                }
                None => {
                    eprintln!("Error: {:#}", err);
                    1
                }
            };
            ExitCode::from(code)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(app: YahooFantasy) -> anyhow::Result<()> {
    let mut config = Config::from_env()?;

    match app.command {
        Commands::Auth { cmd } => match cmd {
            AuthCmd::Status => handle_auth_status(&config)?,
            AuthCmd::Login { manual, no_browser } => {
                if no_browser {
                    config.oauth.open_browser = false;
                }
                let ctx = CommandContext::new(config)?;
                handle_auth_login(&ctx, manual || ctx.config.oauth.manual).await?
            }
        },

        Commands::Get { cmd } => {
            let ctx = CommandContext::new(config)?;
            match cmd {
                GetCmd::Raw { league, path } => {
                    let league_key = resolve_league_key(&league)?;
                    handle_raw_fetch(&ctx, &league_key, &path)
                        .await
                        .with_context(|| format!("raw fetch of '{}' failed", path))?;
                }

                GetCmd::LeagueDump { league, pretty } => {
                    let league_key = resolve_league_key(&league)?;
                    handle_league_dump(&ctx, &league_key, pretty, recorded_cli_args()).await?;
                }

                GetCmd::PlayersDump {
                    league,
                    season,
                    player_keys,
                    refresh,
                    allow_partial,
                    pretty,
                } => {
                    let league_key = resolve_league_key(&league)?;
                    handle_players_dump(
                        &ctx,
                        &league_key,
                        PlayersDumpOptions {
                            season,
                            player_keys,
                            refresh,
                            allow_partial,
                            pretty,
                            cli_args: recorded_cli_args(),
                        },
                    )
                    .await?;
                }
            }
        }

        Commands::Latest { league, module } => {
            let ctx = CommandContext::new(config)?;
            let league_key = resolve_league_key(&league)?;
            handle_latest(&ctx, &league_key, &module)?;
        }
    }

    Ok(())
}
