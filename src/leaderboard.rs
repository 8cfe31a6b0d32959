//! Leaderboard derivation and ranking.
//!
//! Entries are projections of progress records, rewritten on every progress
//! save. Ranking is a view recomputed on each read, never stored.

use crate::types::*;
use std::cmp::Ordering;

/// Derive the leaderboard entry for `progress` as written at `now`.
///
/// `totalTime` is frozen by `completionTime` when present and is 0 for a
/// session that never started.
pub fn derive_entry(progress: &GameProgress, now: EpochMs) -> LeaderboardEntry {
    let completed_puzzles = progress.completed_puzzles();
    let total_time = if progress.start_time > 0 {
        progress
            .completion_time
            .unwrap_or(now)
            .saturating_sub(progress.start_time)
            .max(0)
    } else {
        0
    };

    LeaderboardEntry {
        id: progress.identity().key(),
        player_name: progress.player_name.clone(),
        team_id: progress.team_id.clone(),
        completed_puzzles,
        current_progress: completed_puzzles,
        total_time,
        weapon: progress.weapon.clone(),
        killer: progress.killer.clone(),
        timestamp: now,
        is_complete: completed_puzzles == u32::from(PUZZLE_COUNT),
    }
}

/// Ranking order: finished players first, then more puzzles, then the faster
/// finisher, or among unfinished players the most recently active.
pub fn compare_entries(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.is_complete
        .cmp(&a.is_complete)
        .then_with(|| b.completed_puzzles.cmp(&a.completed_puzzles))
        .then_with(|| {
            if a.is_complete && b.is_complete {
                a.total_time.cmp(&b.total_time)
            } else {
                b.timestamp.cmp(&a.timestamp)
            }
        })
}

/// Sort entries into ranking order. Stable: full ties keep their input order.
pub fn rank(mut entries: Vec<LeaderboardEntry>) -> Vec<LeaderboardEntry> {
    entries.sort_by(compare_entries);
    entries
}
