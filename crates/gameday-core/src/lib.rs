//! Core domain model for the schedule reconciliation engine.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "gameday-core";

/// Placeholder strings sources emit for values they do not know yet.
/// A sentinel never overwrites a stored non-sentinel value.
pub fn is_sentinel(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("tbd")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    Scheduled,
    Unplanned,
    InProgress,
    Completed,
}

impl GameStatus {
    fn rank(self) -> u8 {
        match self {
            GameStatus::Scheduled | GameStatus::Unplanned => 0,
            GameStatus::InProgress => 1,
            GameStatus::Completed => 2,
        }
    }

    /// Status moves forward only. Scheduled and Unplanned are peers, so a
    /// lateral move between them is not an advance either.
    pub fn advances_to(self, next: GameStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, GameStatus::Completed)
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::Unplanned => "unplanned",
            GameStatus::InProgress => "in-progress",
            GameStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    W,
    L,
    T,
}

impl std::fmt::Display for GameResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GameResult::W => "W",
            GameResult::L => "L",
            GameResult::T => "T",
        };
        f.write_str(s)
    }
}

/// Which external source a value came from. Ordering here is documentation
/// only; the engine encodes priority by pass order, not by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceName {
    Feed,
    OfficialSite,
    Fallback,
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SourceName::Feed => "feed",
            SourceName::OfficialSite => "official-site",
            SourceName::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

/// Canonical persisted game record. Exactly one record exists per
/// [`CompositeKey`]; the key is derivable from `date` + `opponent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub date: NaiveDate,
    pub kickoff_time: Option<NaiveTime>,
    pub opponent: String,
    pub is_home: bool,
    pub venue: Option<String>,
    pub broadcast_channel: Option<String>,
    pub status: GameStatus,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    #[serde(rename = "result")]
    pub game_result: Option<GameResult>,
    pub is_postseason: bool,
    pub postseason_name: Option<String>,
    pub external_ref: Option<String>,
    pub last_synced_at: DateTime<Utc>,
}

impl GameRecord {
    /// Create a record from a partial candidate. Callers must have checked
    /// that date and opponent are present.
    pub fn from_partial(candidate: &PartialGame, now: DateTime<Utc>) -> Option<Self> {
        let date = candidate.date?;
        let opponent = candidate.opponent.clone()?;
        Some(Self {
            id: Uuid::new_v4().to_string(),
            date,
            kickoff_time: candidate.kickoff_time,
            opponent,
            is_home: candidate.is_home.unwrap_or(false),
            venue: candidate.venue.clone().filter(|v| !is_sentinel(v)),
            broadcast_channel: candidate
                .broadcast_channel
                .clone()
                .filter(|v| !is_sentinel(v)),
            status: candidate.status.unwrap_or(GameStatus::Unplanned),
            home_score: candidate.home_score,
            away_score: candidate.away_score,
            game_result: candidate.game_result,
            is_postseason: candidate.is_postseason.unwrap_or(false),
            postseason_name: candidate.postseason_name.clone(),
            external_ref: candidate.external_ref.clone(),
            last_synced_at: now,
        })
    }

    pub fn composite_key(&self) -> CompositeKey {
        CompositeKey::new(self.date, &self.opponent)
    }

    pub fn has_scores(&self) -> bool {
        self.home_score.is_some() && self.away_score.is_some()
    }
}

/// Partial record as handed over by a source adapter. Absent fields were not
/// confidently known and must never be defaulted downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialGame {
    pub date: Option<NaiveDate>,
    pub kickoff_time: Option<NaiveTime>,
    pub opponent: Option<String>,
    pub is_home: Option<bool>,
    pub venue: Option<String>,
    pub broadcast_channel: Option<String>,
    pub status: Option<GameStatus>,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    #[serde(rename = "result")]
    pub game_result: Option<GameResult>,
    pub is_postseason: Option<bool>,
    pub postseason_name: Option<String>,
    pub external_ref: Option<String>,
}

impl PartialGame {
    pub fn composite_key(&self) -> Option<CompositeKey> {
        let date = self.date?;
        let opponent = self.opponent.as_deref()?;
        if opponent.trim().is_empty() {
            return None;
        }
        Some(CompositeKey::new(date, opponent))
    }

    pub fn reports_completed(&self) -> bool {
        self.status == Some(GameStatus::Completed)
    }
}

/// The only stable cross-source matching key: calendar day + normalized
/// opponent name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeKey {
    pub date: NaiveDate,
    pub opponent: String,
}

impl CompositeKey {
    pub fn new(date: NaiveDate, opponent: &str) -> Self {
        Self {
            date,
            opponent: normalize_opponent(opponent),
        }
    }
}

impl std::fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.date, self.opponent)
    }
}

/// Lowercase, strip punctuation, collapse whitespace. "Texas A&M" and
/// " texas a m " normalize identically.
pub fn normalize_opponent(input: &str) -> String {
    input
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Updatable record fields tracked in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameField {
    KickoffTime,
    BroadcastChannel,
    Venue,
    Status,
    HomeScore,
    AwayScore,
    GameResult,
    IsPostseason,
    PostseasonName,
    ExternalRef,
}

impl GameField {
    pub fn as_str(self) -> &'static str {
        match self {
            GameField::KickoffTime => "kickoff_time",
            GameField::BroadcastChannel => "broadcast_channel",
            GameField::Venue => "venue",
            GameField::Status => "status",
            GameField::HomeScore => "home_score",
            GameField::AwayScore => "away_score",
            GameField::GameResult => "result",
            GameField::IsPostseason => "is_postseason",
            GameField::PostseasonName => "postseason_name",
            GameField::ExternalRef => "external_ref",
        }
    }
}

impl std::fmt::Display for GameField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit entry: one field-level change applied during a sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub record_id: String,
    pub field: GameField,
    pub old_value: Option<String>,
    pub new_value: String,
    pub source: SourceName,
    pub at: DateTime<Utc>,
}

/// Outcome of one reconciliation run. Clone-able because coalesced manual
/// triggers all observe the same result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub added: usize,
    pub updated: usize,
    pub errors: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl SyncResult {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            added: 0,
            updated: 0,
            errors: Vec::new(),
            timestamp,
        }
    }
}

/// One append-only sync-log entry per run. The log is unbounded here;
/// trimming is an external concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub added: usize,
    pub updated: usize,
    pub errors: Vec<String>,
    pub updates: Vec<FieldUpdate>,
}

/// Snapshot returned by the status query surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_sync: Option<DateTime<Utc>>,
    pub next_scheduled: DateTime<Utc>,
    pub recent_updates: Vec<FieldUpdate>,
}

/// Conservative postseason classification: date in the December/January
/// window AND a postseason keyword in the display name. Misses are caught on
/// a later cycle once the game registers in the normal schedule; a false
/// positive would mislabel a regular-season game, so both legs are required.
pub fn is_postseason_game(date: NaiveDate, display_name: &str) -> bool {
    let in_window = matches!(date.month(), 12 | 1);
    if !in_window {
        return false;
    }
    let name = display_name.to_ascii_lowercase();
    ["bowl", "playoff", "championship"]
        .iter()
        .any(|kw| name.contains(kw))
}
