//! Raw endpoint fetch for debugging; not a tracked run.

use std::path::PathBuf;

use crate::{
    core::files::{to_json_bytes, write_atomic},
    yahoo::http::league_path,
    EntityId, LeagueKey, Result,
};

use super::CommandContext;

/// Fetch `league/<key>/<path>` and save the payload under `_debug/`.
pub async fn handle_raw_fetch(
    ctx: &CommandContext,
    league_key: &LeagueKey,
    path: &str,
) -> Result<PathBuf> {
    ctx.ensure_authorized().await?;

    let endpoint = league_path(league_key, path);
    println!("Fetching {}...", endpoint);
    // tarpaulin::skip - HTTP API call
    let payload = ctx.session.get(&endpoint).await?;

    let out = ctx.paths.debug_dir().join(debug_file_name(path));
    write_atomic(&out, &to_json_bytes(&payload, true)?)?;

    println!("Saved: {}", out.display());
    Ok(out)
}

/// `standings` -> `standings.json`, `teams/roster` -> `teams_roster.json`
fn debug_file_name(path: &str) -> String {
    let path = path.trim().trim_matches('/').replace('/', "_");
    let stem = if path.is_empty() {
        "league".to_string()
    } else {
        EntityId::new(path).file_stem()
    };
    format!("{stem}.json")
}
