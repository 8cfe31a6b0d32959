use serde::{Deserialize, Serialize};

/// Number of puzzles in the manor.
pub const PUZZLE_COUNT: u8 = 9;

/// Epoch timestamp in milliseconds
pub type EpochMs = i64;

/// Puzzle number, 1-based
pub type PuzzleId = u8;

/// Identity of one player on one team.
///
/// Client-supplied, no authentication. Cached on the device under
/// the `wren-manor-player` key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct PlayerIdentity {
    pub player_name: String,
    pub team_id: String,
}

impl PlayerIdentity {
    pub fn new(player_name: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            team_id: team_id.into(),
        }
    }

    /// Record key shared by the progress and leaderboard records: `{teamId}_{playerName}`
    pub fn key(&self) -> String {
        format!("{}_{}", self.team_id, self.player_name)
    }

    /// Both parts must be non-empty for the identity to be usable
    pub fn is_complete(&self) -> bool {
        !self.player_name.is_empty() && !self.team_id.is_empty()
    }
}

/// One player's progress through the manor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameProgress {
    pub player_name: String,
    pub team_id: String,
    #[serde(default)]
    pub p1: bool,
    #[serde(default)]
    pub p2: bool,
    #[serde(default)]
    pub p3: bool,
    #[serde(default)]
    pub p4: bool,
    #[serde(default)]
    pub p5: bool,
    #[serde(default)]
    pub p6: bool,
    #[serde(default)]
    pub p7: bool,
    #[serde(default)]
    pub p8: bool,
    #[serde(default)]
    pub p9: bool,
    #[serde(default)]
    pub weapon: String,
    #[serde(default)]
    pub killer: String,
    #[serde(default)]
    pub current_page: u32,
    /// 0 means the session has not started
    #[serde(default)]
    pub start_time: EpochMs,
    /// Set once, on completion or forced exit. Freezes the timer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<EpochMs>,
    /// Write time, stamped by the store client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<EpochMs>,
}

impl GameProgress {
    /// Fresh record for an identity that has never been stored
    pub fn new_default(identity: &PlayerIdentity) -> Self {
        Self {
            player_name: identity.player_name.clone(),
            team_id: identity.team_id.clone(),
            p1: false,
            p2: false,
            p3: false,
            p4: false,
            p5: false,
            p6: false,
            p7: false,
            p8: false,
            p9: false,
            weapon: String::new(),
            killer: String::new(),
            current_page: 0,
            start_time: 0,
            completion_time: None,
            timestamp: None,
        }
    }

    pub fn identity(&self) -> PlayerIdentity {
        PlayerIdentity::new(self.player_name.clone(), self.team_id.clone())
    }

    fn flags(&self) -> [bool; PUZZLE_COUNT as usize] {
        [
            self.p1, self.p2, self.p3, self.p4, self.p5, self.p6, self.p7, self.p8, self.p9,
        ]
    }

    /// Whether puzzle `puzzle` (1-based) is solved. Out-of-range numbers are never solved.
    pub fn is_solved(&self, puzzle: PuzzleId) -> bool {
        match puzzle {
            1..=PUZZLE_COUNT => self.flags()[usize::from(puzzle - 1)],
            _ => false,
        }
    }

    /// Mark a puzzle solved. Flags never go back to false.
    /// Returns false if the puzzle number is out of range.
    pub fn mark_solved(&mut self, puzzle: PuzzleId) -> bool {
        let flag = match puzzle {
            1 => &mut self.p1,
            2 => &mut self.p2,
            3 => &mut self.p3,
            4 => &mut self.p4,
            5 => &mut self.p5,
            6 => &mut self.p6,
            7 => &mut self.p7,
            8 => &mut self.p8,
            9 => &mut self.p9,
            _ => return false,
        };
        *flag = true;
        true
    }

    pub fn completed_puzzles(&self) -> u32 {
        self.flags().iter().filter(|f| **f).count() as u32
    }

    /// Lowest-numbered unsolved puzzle, if any
    pub fn first_incomplete(&self) -> Option<PuzzleId> {
        (1..=PUZZLE_COUNT).find(|p| !self.is_solved(*p))
    }

    pub fn all_solved(&self) -> bool {
        self.completed_puzzles() == u32::from(PUZZLE_COUNT)
    }

    pub fn has_started(&self) -> bool {
        self.start_time > 0
    }

    /// Started and not yet frozen by a completion time
    pub fn is_live(&self) -> bool {
        self.has_started() && self.completion_time.is_none()
    }

    /// Apply a page-authored record on top of this stored one.
    ///
    /// Solved flags only go from false to true, `currentPage` only rises,
    /// and a stored `startTime` or `completionTime` is never replaced.
    /// Non-positive timestamps from the page are dropped.
    pub fn merged_with(&self, incoming: &GameProgress) -> GameProgress {
        let mut merged = self.clone();
        for puzzle in (1..=PUZZLE_COUNT).filter(|p| incoming.is_solved(*p)) {
            merged.mark_solved(puzzle);
        }
        merged.current_page = self.current_page.max(incoming.current_page);

        if !self.has_started() && incoming.start_time > 0 {
            merged.start_time = incoming.start_time;
        }
        if self.completion_time.is_none() {
            merged.completion_time = incoming
                .completion_time
                .filter(|t| *t > 0 && *t >= merged.start_time);
        }

        if !incoming.weapon.is_empty() {
            merged.weapon = incoming.weapon.clone();
        }
        if !incoming.killer.is_empty() {
            merged.killer = incoming.killer.clone();
        }
        merged
    }
}

/// Leaderboard projection of a [`GameProgress`]. Never authored directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: String,
    pub player_name: String,
    pub team_id: String,
    pub completed_puzzles: u32,
    pub current_progress: u32,
    /// Milliseconds
    pub total_time: i64,
    pub weapon: String,
    pub killer: String,
    pub timestamp: EpochMs,
    pub is_complete: bool,
}

/// Optional narrative payload written alongside a puzzle solve
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SolvePayload {
    #[serde(default)]
    pub weapon: Option<String>,
    #[serde(default)]
    pub killer: Option<String>,
}
