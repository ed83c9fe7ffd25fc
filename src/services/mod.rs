//! Services built on top of climb documents.
//!
//! - Climb management (`ClimbService`)
//! - Ascent logging (`LogService`)
//! - Grade voting and consensus (`GradeService`)
//! - Video likes (`VideoService`)
//! - Ascent leaderboard (`LeaderboardService`)

mod climbs;
mod grades;
mod leaderboard;
mod logs;
mod videos;

pub use climbs::ClimbService;
pub use grades::GradeService;
pub use leaderboard::{LeaderboardEntry, LeaderboardService};
pub use logs::{LogService, RATING_RANGE};
pub use videos::VideoService;
