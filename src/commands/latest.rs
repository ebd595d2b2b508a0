//! `latest`: show a module's latest pointer

use crate::{
    core::files::to_json_bytes,
    export::{LatestPointer, LatestPointerStore},
    LeagueKey, Result,
};

use super::CommandContext;

pub fn handle_latest(
    ctx: &CommandContext,
    league_key: &LeagueKey,
    module: &str,
) -> Result<LatestPointer> {
    let pointers = LatestPointerStore::new(ctx.paths.clone());
    let pointer = pointers.read(module, league_key)?;

    let json = to_json_bytes(&pointer, true)?;
    print!("{}", String::from_utf8_lossy(&json));
    Ok(pointer)
}
