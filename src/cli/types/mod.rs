//! Type-safe wrappers for Yahoo Fantasy identifiers and run metadata.

pub mod ids;
pub mod time;


pub use ids::{EntityId, LeagueKey};
pub use time::{RunId, Season};
