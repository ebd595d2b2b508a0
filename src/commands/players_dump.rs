//! players-dump: per-player season stats for a league's rostered players
//!
//! Reads the league context only through the `league_dump` latest pointer.
//! Player payloads go through the entity cache scoped by season, so a rerun
//! after a partial failure fetches only the players that are still missing.

use serde_json::{json, Value};
use tracing::warn;

use crate::{
    core::files::try_read_to_string,
    error::YahooError,
    export::{CacheStatus, EntityCache, LatestPointerStore, RunManifestBuilder, SealedRun},
    yahoo::{
        http::{league_rosters, player_season_stats},
        payload::{collect_strings, find_season},
    },
    EntityId, LeagueKey, Result, Season,
};

use super::{league_dump::LEAGUE_ROLE, CommandContext, LEAGUE_DUMP_MODULE, PLAYERS_DUMP_MODULE};

/// Role of the processed player stats in the latest pointer.
pub const PLAYER_STATS_ROLE: &str = "player_stats";

#[derive(Debug, Clone, Default)]
pub struct PlayersDumpOptions {
    pub season: Option<Season>,
    pub player_keys: Vec<String>,
    pub refresh: bool,
    pub allow_partial: bool,
    pub pretty: bool,
    pub cli_args: Vec<String>,
}

/// Cache outcome counts for the run summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchTally {
    pub cached: usize,
    pub fetched: usize,
    pub failed: usize,
}

pub async fn handle_players_dump(
    ctx: &CommandContext,
    league_key: &LeagueKey,
    options: PlayersDumpOptions,
) -> Result<SealedRun> {
    let pointers = LatestPointerStore::new(ctx.paths.clone());
    let league_pointer = match pointers.read(LEAGUE_DUMP_MODULE, league_key) {
        Ok(pointer) => pointer,
        Err(e) => {
            if e.is_precondition_failure() {
                println!("Run `yahoo-fantasy get league-dump --league-key {league_key}` first.");
            }
            return Err(e);
        }
    };

    let season = match options.season {
        Some(season) => season,
        None => pointers
            .artifact_path(&league_pointer, LEAGUE_ROLE)
            .and_then(|path| try_read_to_string(&path))
            .and_then(|s| serde_json::from_str::<Value>(&s).ok())
            .and_then(|league| find_season(&league))
            .ok_or_else(|| YahooError::SeasonUnknown {
                league_key: league_key.to_string(),
            })?,
    };

    ctx.ensure_authorized().await?;

    let builder = RunManifestBuilder::new(ctx.paths.clone()).with_pretty(options.pretty);
    let mut run = builder.start_run(PLAYERS_DUMP_MODULE, league_key, options.cli_args);
    println!(
        "Exporting {} season {} player stats (run {}, league dump {})...",
        league_key,
        season,
        run.run_id(),
        league_pointer.pointed_run_id
    );

    let player_keys = if options.player_keys.is_empty() {
        // tarpaulin::skip - HTTP API call
        let rosters = ctx.session.get(&league_rosters(league_key)).await?;
        let path = run.paths().raw_dir.join(run.artifact_name("rosters", "json"));
        builder.write_json_artifact(&mut run, "rosters", &path, &rosters)?;
        collect_strings(&rosters, "player_key")
    } else {
        options.player_keys
    };
    println!("{} players to export", player_keys.len());

    let cache = EntityCache::new(&run.paths().cache_root);
    let scope = format!("season-{}", season);
    let mut tally = FetchTally::default();
    let mut players = Vec::with_capacity(player_keys.len());
    let mut missing = Vec::new();

    for player_key in &player_keys {
        let entity_id = EntityId::new(player_key.as_str());
        let endpoint = player_season_stats(league_key, player_key, season);
        let result = cache
            .get_or_fetch(&scope, &entity_id, options.refresh, || {
                ctx.session.get(&endpoint)
            })
            .await;

        match result {
            Ok((entry, status)) => {
                match status {
                    CacheStatus::Hit => tally.cached += 1,
                    CacheStatus::Miss | CacheStatus::Refreshed => tally.fetched += 1,
                }
                players.push(json!({
                    "player_key": player_key,
                    "fetched_at": entry.fetched_at,
                    "content_hash": entry.content_hash,
                    "stats": entry.payload,
                }));
            }
            Err(e) if e.needs_reauthorization() => return Err(e),
            Err(e) => {
                warn!("Skipping {}: {}", player_key, e);
                println!("✗ {}: {}", player_key, e);
                tally.failed += 1;
                missing.push(player_key.clone());
            }
        }
    }

    println!(
        "✓ {} cached, {} fetched, {} failed",
        tally.cached, tally.fetched, tally.failed
    );
    if tally.failed > 0 && !options.allow_partial {
        return Err(YahooError::IncompleteRun {
            failed: tally.failed,
            total: player_keys.len(),
        });
    }

    let processed = json!({
        "league_key": league_key,
        "season": season.as_u16(),
        "run_id": run.run_id(),
        "league_dump_run_id": league_pointer.pointed_run_id,
        "players": players,
        "missing_player_keys": missing,
    });
    let stem = format!("player_stats.season{}", season);
    let path = run.paths().processed_dir.join(run.artifact_name(&stem, "json"));
    builder.write_json_artifact(&mut run, PLAYER_STATS_ROLE, &path, &processed)?;

    let sealed = builder.seal(run)?;
    pointers.update(&sealed)?;

    println!("✓ Players dump complete");
    println!("  Processed: {}", path.display());
    println!("  Manifest:  {}", sealed.manifest_path.display());
    Ok(sealed)
}
