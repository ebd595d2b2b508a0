//! league-dump: league metadata, settings and teams as one sealed run

use serde_json::{json, Value};

use crate::{
    export::{LatestPointerStore, RunManifestBuilder, SealedRun},
    yahoo::{
        http::{league_metadata, league_settings, league_teams},
        payload::{collect_strings, find_season, find_string},
    },
    LeagueKey, Result, RunId,
};

use super::{CommandContext, LEAGUE_DUMP_MODULE};

/// Role of the processed league summary in the latest pointer.
pub const LEAGUE_ROLE: &str = "league";

/// Run the league dump and point `league_dump` at it.
pub async fn handle_league_dump(
    ctx: &CommandContext,
    league_key: &LeagueKey,
    pretty: bool,
    cli_args: Vec<String>,
) -> Result<SealedRun> {
    ctx.ensure_authorized().await?;

    let builder = RunManifestBuilder::new(ctx.paths.clone()).with_pretty(pretty);
    let mut run = builder.start_run(LEAGUE_DUMP_MODULE, league_key, cli_args);
    println!("Exporting league {} (run {})...", league_key, run.run_id());

    let mut payloads = Vec::with_capacity(3);
    for (name, endpoint) in [
        ("metadata", league_metadata(league_key)),
        ("settings", league_settings(league_key)),
        ("teams", league_teams(league_key)),
    ] {
        // tarpaulin::skip - HTTP API call
        let payload = ctx.session.get(&endpoint).await?;
        let path = run.paths().raw_dir.join(run.artifact_name(name, "json"));
        builder.write_json_artifact(&mut run, name, &path, &payload)?;
        println!("✓ {} saved", name);
        payloads.push(payload);
    }

    let summary = league_summary(league_key, run.run_id(), &payloads[0], &payloads[2]);
    let processed = run
        .paths()
        .processed_dir
        .join(run.artifact_name(LEAGUE_ROLE, "json"));
    builder.write_json_artifact(&mut run, LEAGUE_ROLE, &processed, &summary)?;

    let sealed = builder.seal(run)?;
    LatestPointerStore::new(ctx.paths.clone()).update(&sealed)?;

    println!("✓ League dump complete");
    println!("  Processed: {}", processed.display());
    println!("  Manifest:  {}", sealed.manifest_path.display());
    Ok(sealed)
}

/// Small league summary read by downstream modules.
pub fn league_summary(
    league_key: &LeagueKey,
    run_id: &RunId,
    metadata: &Value,
    teams: &Value,
) -> Value {
    let team_keys = collect_strings(teams, "team_key");
    json!({
        "league_key": league_key,
        "run_id": run_id,
        "name": find_string(metadata, "name"),
        "season": find_season(metadata).map(|s| s.as_u16()),
        "game_code": find_string(metadata, "game_code"),
        "num_teams": team_keys.len(),
        "team_keys": team_keys,
    })
}
