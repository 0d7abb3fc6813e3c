use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned match identifier
pub type MatchId = i64;

/// A football match as persisted by the match store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    pub team_a: String,
    pub team_b: String,
    pub location: String,
    pub competition: String,
    /// Scheduled kick-off
    pub date: DateTime<Utc>,
    pub status: MatchStatus,
    /// Elapsed minutes, only meaningful while the match is live
    pub time: u32,
    pub score_a: u32,
    pub score_b: u32,
    /// Insertion order, not minute order
    pub events: Vec<MatchEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a match: scheduled → live → finished, forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[serde(alias = "pending")]
    Scheduled,
    #[serde(alias = "ongoing")]
    Live,
    Finished,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Live => "live",
            MatchStatus::Finished => "finished",
        }
    }

    /// Parse a stored or user-supplied status, accepting the legacy names.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "scheduled" | "pending" => Some(MatchStatus::Scheduled),
            "live" | "ongoing" => Some(MatchStatus::Live),
            "finished" => Some(MatchStatus::Finished),
            _ => None,
        }
    }

    /// Whether `next` is strictly further along the lifecycle.
    pub fn can_advance_to(&self, next: MatchStatus) -> bool {
        next > *self
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened on the pitch. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEvent {
    pub event_type: EventKind,
    pub team: Side,
    pub player: String,
    pub minute: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Goal,
    YellowCard,
    RedCard,
    Foul,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Goal => "goal",
            EventKind::YellowCard => "yellow_card",
            EventKind::RedCard => "red_card",
            EventKind::Foul => "foul",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "goal" => Some(EventKind::Goal),
            "yellow_card" => Some(EventKind::YellowCard),
            "red_card" => Some(EventKind::RedCard),
            "foul" => Some(EventKind::Foul),
            _ => None,
        }
    }
}

/// Which of the two teams an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "teamA")]
    TeamA,
    #[serde(rename = "teamB")]
    TeamB,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::TeamA => "teamA",
            Side::TeamB => "teamB",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "teamA" => Some(Side::TeamA),
            "teamB" => Some(Side::TeamB),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields required to create a match
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub team_a: String,
    pub team_b: String,
    pub location: String,
    pub competition: String,
    pub date: DateTime<Utc>,
}

/// How a score column changes in a patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreChange {
    /// Overwrite with an explicit value
    Set(u32),
    /// Add to the stored value inside the same transaction
    Add(u32),
}

/// Partial update applied atomically by `update_by_id`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchPatch {
    /// Reject the patch unless the stored status still equals this
    pub expect_status: Option<MatchStatus>,
    pub status: Option<MatchStatus>,
    pub time: Option<u32>,
    pub score_a: Option<ScoreChange>,
    pub score_b: Option<ScoreChange>,
    /// Appended after existing events
    pub push_event: Option<MatchEvent>,
}

/// Ordering of `list_all` by scheduled date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}
