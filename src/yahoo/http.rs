//! Yahoo Fantasy v2 endpoints, relative to [`API_BASE`].

use crate::{LeagueKey, Season};

/// Base path for the Yahoo Fantasy Sports v2 API.
pub const API_BASE: &str = "https://fantasysports.yahooapis.com/fantasy/v2";

pub fn league_metadata(league_key: &LeagueKey) -> String {
    format!("league/{}/metadata", league_key)
}

pub fn league_settings(league_key: &LeagueKey) -> String {
    format!("league/{}/settings", league_key)
}

pub fn league_teams(league_key: &LeagueKey) -> String {
    format!("league/{}/teams", league_key)
}

/// Every team with its current roster.
pub fn league_rosters(league_key: &LeagueKey) -> String {
    format!("league/{}/teams/roster", league_key)
}

/// Season totals for one player in the league's scoring context.
pub fn player_season_stats(league_key: &LeagueKey, player_key: &str, season: Season) -> String {
    format!(
        "league/{}/players;player_keys={};out=stats;type=season;season={}",
        league_key, player_key, season
    )
}

/// A path under `league/<key>/`, e.g. `standings` or `transactions;type=trade`.
pub fn league_path(league_key: &LeagueKey, path: &str) -> String {
    let path = path.trim().trim_matches('/');
    if path.is_empty() {
        format!("league/{}", league_key)
    } else {
        format!("league/{}/{}", league_key, path)
    }
}
