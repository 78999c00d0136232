//! Source adapter contracts + the three source implementations.
//!
//! Every external schedule source sits behind [`SourceAdapter`], which hands
//! the sync pipeline a uniform stream of [`PartialGame`]s with only
//! confidently-known fields populated. A malformed single entry is skipped
//! with a warning; only a transport/HTTP failure fails a whole call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime};
use gameday_core::{
    is_postseason_game, is_sentinel, CompositeKey, GameResult, GameStatus, PartialGame, SourceName,
};
use gameday_store::{FetchError, HttpFetcher};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

pub const CRATE_NAME: &str = "gameday-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Transport or HTTP failure: the whole call yields no data this cycle.
    #[error("{adapter} unavailable: {reason}")]
    SourceUnavailable { adapter: SourceName, reason: String },
    /// One source record (or the whole payload) could not be normalized.
    #[error("unparseable {what}: {detail}")]
    Parse { what: &'static str, detail: String },
    /// The source does not offer this capability.
    #[error("{0} does not support this capability")]
    Unsupported(SourceName),
}

impl AdapterError {
    fn unavailable(adapter: SourceName, err: FetchError) -> Self {
        AdapterError::SourceUnavailable {
            adapter,
            reason: err.to_string(),
        }
    }

    fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        AdapterError::Parse {
            what,
            detail: detail.into(),
        }
    }
}

/// Uniform fetch contract over one unreliable external source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceName;

    /// Full season schedule, partial records only.
    async fn fetch_schedule(&self, season: i32) -> Result<Vec<PartialGame>, AdapterError>;

    /// Today's and in-progress games.
    async fn fetch_live_scores(&self) -> Result<Vec<PartialGame>, AdapterError>;

    /// One richer record for a known source-specific id, including live or
    /// final score.
    async fn fetch_game_details(&self, external_ref: &str) -> Result<PartialGame, AdapterError>;

    /// Postseason candidates. Deliberately conservative: only games inside
    /// the December/January window whose name carries a postseason keyword.
    async fn check_bowl_games(&self, season: i32) -> Result<Vec<PartialGame>, AdapterError>;

    /// Known broadcast assignments keyed by composite key.
    async fn check_broadcast_updates(&self)
        -> Result<HashMap<CompositeKey, String>, AdapterError>;
}

/// Collect non-sentinel broadcast assignments from a schedule snapshot.
pub fn broadcast_map(games: &[PartialGame]) -> HashMap<CompositeKey, String> {
    let mut out = HashMap::new();
    for game in games {
        let Some(key) = game.composite_key() else {
            continue;
        };
        if let Some(channel) = game.broadcast_channel.as_deref() {
            if !is_sentinel(channel) {
                out.insert(key, channel.to_string());
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Free-text parsing shared by the scrape and fallback adapters.
// ---------------------------------------------------------------------------

/// Parse a display kickoff time. Minutes may be omitted ("7 PM"), a trailing
/// timezone abbreviation is tolerated ("11:00 a.m. CT"), and sentinels yield
/// `None`.
pub fn parse_kickoff_time(input: &str) -> Option<NaiveTime> {
    let cleaned = input.trim().to_ascii_uppercase().replace('.', "");
    if is_sentinel(&cleaned) {
        return None;
    }
    let (idx, meridiem) = ["AM", "PM"]
        .iter()
        .find_map(|m| cleaned.find(m).map(|i| (i, *m)))?;
    let digits: String = cleaned[..idx]
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ':')
        .collect();
    if digits.is_empty() {
        return None;
    }
    let (hour, minute) = match digits.split_once(':') {
        Some((h, m)) => (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?),
        None => (digits.parse::<u32>().ok()?, 0),
    };
    if !(1..=12).contains(&hour) || minute > 59 {
        return None;
    }
    let hour24 = match (hour % 12, meridiem) {
        (h, "PM") => h + 12,
        (h, _) => h,
    };
    NaiveTime::from_hms_opt(hour24, minute, 0)
}

/// Season-relative calendar year: January-June dates belong to the spring
/// side of the season (bowl and playoff games).
fn season_year(season: i32, month: u32) -> i32 {
    if month <= 6 {
        season + 1
    } else {
        season
    }
}

/// Parse a free-text schedule date: `"Saturday, Aug 31"`, `"9/7"`,
/// `"October 11, 2025"`, `"2025-10-11"`. Month-day without a year assumes the
/// given season.
pub fn parse_schedule_date(input: &str, season: i32) -> Option<NaiveDate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }

    // "9/7" or "10/11/2025"
    let slash: Vec<&str> = trimmed.split('/').collect();
    if slash.len() >= 2 {
        if let (Ok(month), Ok(day)) = (slash[0].trim().parse::<u32>(), slash[1].trim().parse::<u32>())
        {
            let year = slash
                .get(2)
                .and_then(|y| y.trim().parse::<i32>().ok())
                .unwrap_or_else(|| season_year(season, month));
            return NaiveDate::from_ymd_opt(year, month, day);
        }
    }

    // "Saturday, Aug 31" / "August 31, 2025"
    let mut month = None;
    let mut day = None;
    let mut year = None;
    for token in trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        if month.is_none() {
            if let Some(m) = month_from_name(token) {
                month = Some(m);
                continue;
            }
        }
        if let Ok(n) = token.parse::<i64>() {
            if n >= 1000 {
                year = Some(n as i32);
            } else if day.is_none() && (1..=31).contains(&n) {
                day = Some(n as u32);
            }
        }
    }
    let month = month?;
    let day = day?;
    NaiveDate::from_ymd_opt(year.unwrap_or_else(|| season_year(season, month)), month, day)
}

fn month_from_name(token: &str) -> Option<u32> {
    let lowered = token.to_ascii_lowercase();
    let prefix = lowered.get(..3)?;
    let month = match prefix {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn extract_ints(text: &str) -> Vec<u32> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            if let Ok(v) = current.parse() {
                out.push(v);
            }
            current.clear();
        }
    }
    if !current.is_empty() {
        if let Ok(v) = current.parse() {
            out.push(v);
        }
    }
    out
}

/// Parse a result line like `"W 31-24"` into (result, home, away) oriented
/// around the given home/away flag. Scores are listed ours-first; if the
/// listing disagrees with the W/L letter, the pair is swapped.
pub fn parse_result_text(input: &str, is_home: bool) -> Option<(GameResult, u32, u32)> {
    let upper = input.trim().to_ascii_uppercase();
    let result = match upper.chars().next()? {
        'W' => GameResult::W,
        'L' => GameResult::L,
        'T' => GameResult::T,
        _ => return None,
    };
    let nums = extract_ints(&upper);
    let (mut ours, mut theirs) = (*nums.first()?, *nums.get(1)?);
    let swapped = matches!(result, GameResult::W) && ours < theirs
        || matches!(result, GameResult::L) && ours > theirs;
    if swapped {
        std::mem::swap(&mut ours, &mut theirs);
    }
    let (home, away) = if is_home { (ours, theirs) } else { (theirs, ours) };
    Some((result, home, away))
}

// ---------------------------------------------------------------------------
// Structured feed adapter.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub base_url: String,
    /// Our team's id in the feed; the other competitor is the opponent.
    pub team_id: String,
    /// Feed timestamps are UTC; kickoff times are stored stadium-local.
    pub utc_offset: FixedOffset,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://site.api.espn.com/apis/site/v2/sports/football/college-football"
                .to_string(),
            team_id: "251".to_string(),
            utc_offset: FixedOffset::west_opt(6 * 3600).expect("static offset in range"),
        }
    }
}

/// Adapter over the structured sports-data feed (JSON schedule + game
/// summary endpoints).
pub struct FeedAdapter {
    http: Arc<HttpFetcher>,
    config: FeedConfig,
}

#[derive(Debug, Deserialize)]
struct FeedScheduleDoc {
    #[serde(default)]
    events: Vec<FeedEvent>,
}

#[derive(Debug, Deserialize)]
struct FeedEvent {
    id: Option<String>,
    date: Option<String>,
    name: Option<String>,
    #[serde(default)]
    competitions: Vec<FeedCompetition>,
}

#[derive(Debug, Deserialize)]
struct FeedCompetition {
    date: Option<String>,
    status: Option<FeedStatus>,
    #[serde(default)]
    competitors: Vec<FeedCompetitor>,
    #[serde(default)]
    broadcasts: Vec<FeedBroadcast>,
    venue: Option<FeedVenue>,
}

#[derive(Debug, Deserialize)]
struct FeedStatus {
    #[serde(rename = "type")]
    kind: Option<FeedStatusType>,
}

#[derive(Debug, Deserialize)]
struct FeedStatusType {
    #[serde(default)]
    completed: bool,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedCompetitor {
    team: Option<FeedTeam>,
    #[serde(rename = "homeAway")]
    home_away: Option<String>,
    score: Option<String>,
    winner: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct FeedTeam {
    id: Option<String>,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedBroadcast {
    media: Option<FeedMedia>,
    #[serde(default)]
    names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FeedMedia {
    #[serde(rename = "shortName")]
    short_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedVenue {
    #[serde(rename = "fullName")]
    full_name: Option<String>,
    address: Option<FeedAddress>,
}

#[derive(Debug, Deserialize)]
struct FeedAddress {
    city: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedSummaryDoc {
    header: Option<FeedHeader>,
}

#[derive(Debug, Deserialize)]
struct FeedHeader {
    #[serde(default)]
    competitions: Vec<FeedCompetition>,
}

impl FeedAdapter {
    pub fn new(http: Arc<HttpFetcher>, config: FeedConfig) -> Self {
        Self { http, config }
    }

    fn schedule_url(&self, season: i32) -> String {
        format!(
            "{}/teams/{}/schedule?season={}",
            self.config.base_url, self.config.team_id, season
        )
    }

    /// Parse a schedule payload into partial records, skipping malformed
    /// entries.
    pub fn parse_schedule_payload(&self, body: &[u8]) -> Result<Vec<PartialGame>, AdapterError> {
        let doc: FeedScheduleDoc = serde_json::from_slice(body)
            .map_err(|e| AdapterError::parse("feed schedule payload", e.to_string()))?;
        let mut games = Vec::with_capacity(doc.events.len());
        for event in &doc.events {
            match self.transform_event(event) {
                Ok(game) => games.push(game),
                Err(err) => {
                    warn!(error = %err, event_id = ?event.id, "skipping malformed feed entry");
                }
            }
        }
        Ok(games)
    }

    /// Parse a game-summary payload into one richer partial record.
    pub fn parse_details_payload(&self, body: &[u8]) -> Result<PartialGame, AdapterError> {
        let doc: FeedSummaryDoc = serde_json::from_slice(body)
            .map_err(|e| AdapterError::parse("feed summary payload", e.to_string()))?;
        let comp = doc
            .header
            .as_ref()
            .and_then(|h| h.competitions.first())
            .ok_or_else(|| AdapterError::parse("feed summary payload", "no competition"))?;
        self.transform_competition(comp, None, None, None)
    }

    fn transform_event(&self, event: &FeedEvent) -> Result<PartialGame, AdapterError> {
        let comp = event
            .competitions
            .first()
            .ok_or_else(|| AdapterError::parse("feed event", "no competition"))?;
        self.transform_competition(
            comp,
            event.name.as_deref(),
            event.date.as_deref(),
            event.id.clone(),
        )
    }

    fn transform_competition(
        &self,
        comp: &FeedCompetition,
        event_name: Option<&str>,
        event_date: Option<&str>,
        external_ref: Option<String>,
    ) -> Result<PartialGame, AdapterError> {
        let kickoff = comp
            .date
            .as_deref()
            .or(event_date)
            .and_then(|s| self.parse_feed_datetime(s))
            .ok_or_else(|| AdapterError::parse("feed event", "missing or bad date"))?;

        let ours = comp
            .competitors
            .iter()
            .find(|c| competitor_id(c) == Some(self.config.team_id.as_str()));
        let theirs = comp
            .competitors
            .iter()
            .find(|c| competitor_id(c).is_some_and(|id| id != self.config.team_id));
        let (ours, theirs) = match (ours, theirs) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(AdapterError::parse("feed event", "missing competitor")),
        };

        let opponent = theirs
            .team
            .as_ref()
            .and_then(|t| t.display_name.clone())
            .ok_or_else(|| AdapterError::parse("feed event", "opponent has no name"))?;
        let is_home = ours.home_away.as_deref() == Some("home");

        let status_type = comp.status.as_ref().and_then(|s| s.kind.as_ref());
        let completed = status_type.is_some_and(|t| t.completed);
        let in_progress = status_type.is_some_and(|t| t.state.as_deref() == Some("in"));
        let status = if completed {
            Some(GameStatus::Completed)
        } else if in_progress {
            Some(GameStatus::InProgress)
        } else {
            None
        };

        let (home_score, away_score, game_result) = if completed || in_progress {
            let our_score = parse_score(ours);
            let their_score = parse_score(theirs);
            match (our_score, their_score) {
                (Some(ours_n), Some(theirs_n)) => {
                    let (home, away) = if is_home {
                        (ours_n, theirs_n)
                    } else {
                        (theirs_n, ours_n)
                    };
                    let result = if !completed {
                        None
                    } else if ours.winner == Some(true) {
                        Some(GameResult::W)
                    } else if ours.winner == Some(false) {
                        Some(GameResult::L)
                    } else if ours_n == theirs_n {
                        Some(GameResult::T)
                    } else {
                        None
                    };
                    (Some(home), Some(away), result)
                }
                _ => (None, None, None),
            }
        } else {
            (None, None, None)
        };

        let broadcast_channel = comp
            .broadcasts
            .first()
            .and_then(|b| {
                b.media
                    .as_ref()
                    .and_then(|m| m.short_name.clone())
                    .or_else(|| b.names.first().cloned())
            })
            .filter(|c| !is_sentinel(c));

        let venue = comp.venue.as_ref().and_then(|v| {
            let name = v.full_name.clone()?;
            Some(match v.address.as_ref() {
                Some(addr) => match (&addr.city, &addr.state) {
                    (Some(city), Some(state)) => format!("{name}, {city}, {state}"),
                    (Some(city), None) => format!("{name}, {city}"),
                    _ => name,
                },
                None => name,
            })
        });

        let postseason = event_name
            .is_some_and(|name| is_postseason_game(kickoff.date(), name));

        Ok(PartialGame {
            date: Some(kickoff.date()),
            kickoff_time: Some(kickoff.time()),
            opponent: Some(opponent),
            is_home: Some(is_home),
            venue,
            broadcast_channel,
            status,
            home_score,
            away_score,
            game_result,
            is_postseason: postseason.then_some(true),
            postseason_name: postseason
                .then(|| event_name.map(str::to_string))
                .flatten(),
            external_ref,
        })
    }

    fn parse_feed_datetime(&self, input: &str) -> Option<NaiveDateTime> {
        let utc = chrono::DateTime::parse_from_rfc3339(input)
            .map(|dt| dt.naive_utc())
            .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%MZ"))
            .ok()?;
        Some(utc + self.config.utc_offset)
    }
}

fn competitor_id(competitor: &FeedCompetitor) -> Option<&str> {
    competitor.team.as_ref().and_then(|t| t.id.as_deref())
}

fn parse_score(competitor: &FeedCompetitor) -> Option<u32> {
    competitor.score.as_deref().and_then(|s| s.trim().parse().ok())
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn source(&self) -> SourceName {
        SourceName::Feed
    }

    async fn fetch_schedule(&self, season: i32) -> Result<Vec<PartialGame>, AdapterError> {
        let url = self.schedule_url(season);
        let resp = self
            .http
            .fetch_bytes("feed", &url)
            .await
            .map_err(|e| AdapterError::unavailable(SourceName::Feed, e))?;
        self.parse_schedule_payload(&resp.body)
    }

    async fn fetch_live_scores(&self) -> Result<Vec<PartialGame>, AdapterError> {
        let today = Local::now().date_naive();
        let games = self.fetch_schedule(current_season(today)).await?;
        Ok(games
            .into_iter()
            .filter(|g| g.date == Some(today) || g.status == Some(GameStatus::InProgress))
            .collect())
    }

    async fn fetch_game_details(&self, external_ref: &str) -> Result<PartialGame, AdapterError> {
        let url = format!("{}/summary?event={}", self.config.base_url, external_ref);
        let resp = self
            .http
            .fetch_bytes("feed", &url)
            .await
            .map_err(|e| AdapterError::unavailable(SourceName::Feed, e))?;
        let mut game = self.parse_details_payload(&resp.body)?;
        game.external_ref = Some(external_ref.to_string());
        Ok(game)
    }

    async fn check_bowl_games(&self, season: i32) -> Result<Vec<PartialGame>, AdapterError> {
        let games = self.fetch_schedule(season).await?;
        Ok(games
            .into_iter()
            .filter(|g| g.is_postseason == Some(true))
            .collect())
    }

    async fn check_broadcast_updates(
        &self,
    ) -> Result<HashMap<CompositeKey, String>, AdapterError> {
        let today = Local::now().date_naive();
        let games = self.fetch_schedule(current_season(today)).await?;
        Ok(broadcast_map(&games))
    }
}

/// The season a date belongs to: January-June count toward the previous
/// fall's season.
pub fn current_season(today: NaiveDate) -> i32 {
    use chrono::Datelike;
    if today.month() <= 6 {
        today.year() - 1
    } else {
        today.year()
    }
}

// ---------------------------------------------------------------------------
// Official-site scrape adapter.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub schedule_url: String,
    /// Substring of the location text that marks a home game.
    pub home_keyword: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            schedule_url: "https://texassports.com/sports/football/schedule".to_string(),
            home_keyword: "Austin".to_string(),
        }
    }
}

/// Best-effort scrape of the official athletics site. Output may be empty;
/// any field it cannot confidently parse is omitted.
pub struct SiteAdapter {
    http: Arc<HttpFetcher>,
    config: SiteConfig,
}

impl SiteAdapter {
    pub fn new(http: Arc<HttpFetcher>, config: SiteConfig) -> Self {
        Self { http, config }
    }

    /// Parse the schedule page markup. Elements that do not yield at least a
    /// date and an opponent are skipped.
    pub fn parse_schedule_html(
        &self,
        html: &str,
        season: i32,
    ) -> Result<Vec<PartialGame>, AdapterError> {
        let document = Html::parse_document(html);
        let game_sel = selector(".sidearm-schedule-game")?;
        let date_sel = selector(".sidearm-schedule-game-opponent-date")?;
        let name_sel = selector(".sidearm-schedule-game-opponent-name")?;
        let location_sel = selector(".sidearm-schedule-game-location")?;
        let time_sel = selector(".sidearm-schedule-game-time")?;
        let tv_sel = selector(".sidearm-schedule-game-tv")?;
        let result_sel = selector(".sidearm-schedule-game-result")?;

        let mut games = Vec::new();
        for element in document.select(&game_sel) {
            let date_text = first_text(&element, &date_sel).unwrap_or_default();
            let opponent = first_text(&element, &name_sel).unwrap_or_default();
            let Some(date) = parse_schedule_date(&date_text, season) else {
                warn!(date_text, "skipping schedule row with unparseable date");
                continue;
            };
            if opponent.is_empty() {
                warn!(%date, "skipping schedule row without opponent");
                continue;
            }

            let location = first_text(&element, &location_sel);
            let is_home = location.as_deref().is_some_and(|loc| {
                loc.to_ascii_lowercase()
                    .contains(&self.config.home_keyword.to_ascii_lowercase())
            });

            let kickoff_time = first_text(&element, &time_sel)
                .as_deref()
                .and_then(parse_kickoff_time);
            let broadcast_channel =
                first_text(&element, &tv_sel).filter(|tv| !is_sentinel(tv));

            let result_line = first_text(&element, &result_sel);
            let parsed_result = result_line
                .as_deref()
                .and_then(|line| parse_result_text(line, is_home));

            games.push(PartialGame {
                date: Some(date),
                kickoff_time,
                opponent: Some(opponent),
                is_home: Some(is_home),
                venue: location.filter(|loc| !is_sentinel(loc)),
                broadcast_channel,
                status: parsed_result.is_some().then_some(GameStatus::Completed),
                home_score: parsed_result.map(|(_, home, _)| home),
                away_score: parsed_result.map(|(_, _, away)| away),
                game_result: parsed_result.map(|(result, _, _)| result),
                is_postseason: None,
                postseason_name: None,
                external_ref: None,
            });
        }
        Ok(games)
    }
}

fn selector(input: &'static str) -> Result<Selector, AdapterError> {
    Selector::parse(input).map_err(|e| AdapterError::parse("selector", e.to_string()))
}

fn first_text(element: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    element.select(sel).next().and_then(|node| {
        let text = node.text().collect::<String>();
        let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

#[async_trait]
impl SourceAdapter for SiteAdapter {
    fn source(&self) -> SourceName {
        SourceName::OfficialSite
    }

    async fn fetch_schedule(&self, season: i32) -> Result<Vec<PartialGame>, AdapterError> {
        let resp = self
            .http
            .fetch_bytes("official-site", &self.config.schedule_url)
            .await
            .map_err(|e| AdapterError::unavailable(SourceName::OfficialSite, e))?;
        let html = String::from_utf8_lossy(&resp.body).into_owned();
        self.parse_schedule_html(&html, season)
    }

    async fn fetch_live_scores(&self) -> Result<Vec<PartialGame>, AdapterError> {
        // The schedule page only shows final results, no live clock.
        Ok(Vec::new())
    }

    async fn fetch_game_details(&self, _external_ref: &str) -> Result<PartialGame, AdapterError> {
        Err(AdapterError::Unsupported(SourceName::OfficialSite))
    }

    async fn check_bowl_games(&self, _season: i32) -> Result<Vec<PartialGame>, AdapterError> {
        // Postseason names on the site are unreliable; the feed owns this
        // heuristic.
        Ok(Vec::new())
    }

    async fn check_broadcast_updates(
        &self,
    ) -> Result<HashMap<CompositeKey, String>, AdapterError> {
        let today = Local::now().date_naive();
        let games = self.fetch_schedule(current_season(today)).await?;
        Ok(broadcast_map(&games))
    }
}

// ---------------------------------------------------------------------------
// Static fallback adapter.
// ---------------------------------------------------------------------------

const EMBEDDED_FALLBACK: &str = include_str!("../fallback_schedule.yaml");

#[derive(Debug, Deserialize)]
struct FallbackTable {
    seasons: Vec<FallbackSeason>,
}

#[derive(Debug, Deserialize)]
struct FallbackSeason {
    season: i32,
    games: Vec<FallbackRow>,
}

#[derive(Debug, Deserialize)]
struct FallbackRow {
    date: NaiveDate,
    opponent: String,
    venue: Option<String>,
    kickoff: Option<String>,
    broadcast: Option<String>,
    home: bool,
}

/// Hand-authored schedule of record, compiled into the binary. Consulted
/// only when a richer adapter's network call failed; its fetches never fail.
pub struct FallbackAdapter {
    table: FallbackTable,
}

impl FallbackAdapter {
    pub fn embedded() -> anyhow::Result<Self> {
        Self::from_yaml(EMBEDDED_FALLBACK)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let table: FallbackTable =
            serde_yaml::from_str(text).map_err(|e| anyhow::anyhow!("fallback table: {e}"))?;
        Ok(Self { table })
    }

    fn season_games(&self, season: i32) -> Vec<PartialGame> {
        self.table
            .seasons
            .iter()
            .filter(|s| s.season == season)
            .flat_map(|s| s.games.iter())
            .map(|row| PartialGame {
                date: Some(row.date),
                kickoff_time: row.kickoff.as_deref().and_then(parse_kickoff_time),
                opponent: Some(row.opponent.clone()),
                is_home: Some(row.home),
                venue: row.venue.clone().filter(|v| !is_sentinel(v)),
                broadcast_channel: row.broadcast.clone().filter(|b| !is_sentinel(b)),
                status: None,
                home_score: None,
                away_score: None,
                game_result: None,
                is_postseason: None,
                postseason_name: None,
                external_ref: None,
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for FallbackAdapter {
    fn source(&self) -> SourceName {
        SourceName::Fallback
    }

    async fn fetch_schedule(&self, season: i32) -> Result<Vec<PartialGame>, AdapterError> {
        Ok(self.season_games(season))
    }

    async fn fetch_live_scores(&self) -> Result<Vec<PartialGame>, AdapterError> {
        Ok(Vec::new())
    }

    async fn fetch_game_details(&self, _external_ref: &str) -> Result<PartialGame, AdapterError> {
        Err(AdapterError::Unsupported(SourceName::Fallback))
    }

    async fn check_bowl_games(&self, _season: i32) -> Result<Vec<PartialGame>, AdapterError> {
        Ok(Vec::new())
    }

    async fn check_broadcast_updates(
        &self,
    ) -> Result<HashMap<CompositeKey, String>, AdapterError> {
        let today = Local::now().date_naive();
        Ok(broadcast_map(&self.season_games(current_season(today))))
    }
}
