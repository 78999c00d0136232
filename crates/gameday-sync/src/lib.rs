//! Reconciliation engine, completion sweeper, and scheduler.
//!
//! The engine pulls partial schedules from every source, matches them against
//! the canonical records by composite key, and applies field-level updates in
//! priority order. The sweeper promotes games whose scheduled window has
//! elapsed. The scheduler wraps both in cron cadences and a single-flight
//! manual trigger.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Context;
use chrono::{
    DateTime, Datelike, Duration as TimeDelta, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    Utc,
};
use gameday_adapters::{
    FallbackAdapter, FeedAdapter, FeedConfig, SiteAdapter, SiteConfig, SourceAdapter,
};
use gameday_core::{
    is_sentinel, CompositeKey, FieldUpdate, GameField, GameRecord, GameResult, GameStatus,
    PartialGame, SourceName, SyncLogEntry, SyncResult, SyncStatus,
};
use gameday_store::{
    BackoffPolicy, HttpClientConfig, HttpFetcher, JsonFileStore, RecordStore, StoreError,
};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "gameday-sync";

/// How long after kickoff a game is assumed to be over.
const POST_KICKOFF_HOURS: i64 = 4;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync run is already in flight")]
    AlreadyRunning,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub season: i32,
    pub feed_base_url: String,
    pub feed_team_id: String,
    /// Stadium-local offset from UTC, in hours.
    pub utc_offset_hours: i32,
    pub site_schedule_url: String,
    pub home_keyword: String,
    /// Local hour of the daily full sync.
    pub daily_sync_hour: u32,
    pub sweep_cron: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub data_path: std::path::PathBuf,
    pub recent_updates_limit: usize,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = FeedConfig::default();
        let site_defaults = SiteConfig::default();
        Self {
            season: std::env::var("GAMEDAY_SEASON")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| gameday_adapters::current_season(Local::now().date_naive())),
            feed_base_url: std::env::var("GAMEDAY_FEED_BASE_URL")
                .unwrap_or(defaults.base_url),
            feed_team_id: std::env::var("GAMEDAY_FEED_TEAM_ID").unwrap_or(defaults.team_id),
            utc_offset_hours: std::env::var("GAMEDAY_UTC_OFFSET_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(-6),
            site_schedule_url: std::env::var("GAMEDAY_SITE_SCHEDULE_URL")
                .unwrap_or(site_defaults.schedule_url),
            home_keyword: std::env::var("GAMEDAY_HOME_KEYWORD")
                .unwrap_or(site_defaults.home_keyword),
            daily_sync_hour: std::env::var("GAMEDAY_SYNC_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6),
            sweep_cron: std::env::var("GAMEDAY_SWEEP_CRON")
                .unwrap_or_else(|_| "0 * * * *".to_string()),
            user_agent: std::env::var("GAMEDAY_USER_AGENT")
                .unwrap_or_else(|_| "gameday-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("GAMEDAY_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            data_path: std::env::var("GAMEDAY_DATA_PATH")
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|_| std::path::PathBuf::from("./gameday.json")),
            recent_updates_limit: std::env::var("GAMEDAY_RECENT_UPDATES_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
        }
    }

    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: std::time::Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            base_url: self.feed_base_url.clone(),
            team_id: self.feed_team_id.clone(),
            utc_offset: chrono::FixedOffset::east_opt(self.utc_offset_hours * 3600)
                .unwrap_or_else(|| Utc.fix()),
        }
    }

    pub fn site_config(&self) -> SiteConfig {
        SiteConfig {
            schedule_url: self.site_schedule_url.clone(),
            home_keyword: self.home_keyword.clone(),
        }
    }
}

/// Fan-out notification for downstream listeners (the CLI, future surfaces).
/// Fire-and-forget; lagging or absent receivers are ignored.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    RecordCreated(GameRecord),
    FieldsUpdated(Vec<FieldUpdate>),
}

pub struct ReconciliationEngine {
    store: Arc<dyn RecordStore>,
    feed: Arc<dyn SourceAdapter>,
    site: Arc<dyn SourceAdapter>,
    fallback: Arc<dyn SourceAdapter>,
    season: i32,
    events: broadcast::Sender<SyncEvent>,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        feed: Arc<dyn SourceAdapter>,
        site: Arc<dyn SourceAdapter>,
        fallback: Arc<dyn SourceAdapter>,
        season: i32,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            feed,
            site,
            fallback,
            season,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub async fn run(&self) -> SyncResult {
        self.run_for_date(Local::now().date_naive()).await
    }

    /// One full reconciliation. Never fails: every problem is downgraded to
    /// an entry in `SyncResult.errors`.
    pub async fn run_for_date(&self, today: NaiveDate) -> SyncResult {
        info!(season = self.season, "sync run starting");

        let now = Utc::now();
        let mut result = SyncResult::new(now);
        let mut update_log: Vec<FieldUpdate> = Vec::new();
        let mut created: Vec<GameRecord> = Vec::new();

        let mut index: HashMap<CompositeKey, GameRecord> = match self.store.get_all().await {
            Ok(records) => records.into_iter().map(|r| (r.composite_key(), r)).collect(),
            Err(err) => {
                result.errors.push(format!("loading records: {err}"));
                return result;
            }
        };

        let (feed_fetch, site_fetch) = tokio::join!(
            self.feed.fetch_schedule(self.season),
            self.site.fetch_schedule(self.season),
        );

        let mut need_fallback = false;
        let feed_games = match feed_fetch {
            Ok(games) => Some(games),
            Err(err) => {
                warn!(error = %err, "feed schedule fetch failed");
                result.errors.push(format!("feed: {err}"));
                need_fallback = true;
                None
            }
        };
        let site_games = match site_fetch {
            Ok(games) => Some(games),
            Err(err) => {
                warn!(error = %err, "site schedule fetch failed");
                result.errors.push(format!("official-site: {err}"));
                need_fallback = true;
                None
            }
        };

        // Priority is pass order: the fallback table goes first so any richer
        // source overwrites it, and the site goes last so its values win for
        // broadcast and kickoff.
        let mut passes: Vec<(SourceName, Vec<PartialGame>)> = Vec::new();
        if need_fallback {
            match self.fallback.fetch_schedule(self.season).await {
                Ok(games) => passes.push((SourceName::Fallback, games)),
                Err(err) => result.errors.push(format!("fallback: {err}")),
            }
        }
        if let Some(games) = feed_games {
            passes.push((SourceName::Feed, games));
        }
        if matches!(today.month(), 12 | 1) {
            match self.feed.check_bowl_games(self.season).await {
                Ok(bowls) if !bowls.is_empty() => passes.push((SourceName::Feed, bowls)),
                Ok(_) => {}
                Err(err) => result.errors.push(format!("bowl check: {err}")),
            }
        }
        if let Some(games) = site_games {
            passes.push((SourceName::OfficialSite, games));
        }

        // Completion fields belong to whichever source reports Completed for
        // a key first in this run; a later source's conflicting final score
        // is ignored.
        let mut completion_owner: HashMap<CompositeKey, SourceName> = HashMap::new();

        for (source, games) in passes {
            for candidate in games {
                let Some(key) = candidate.composite_key() else {
                    continue;
                };
                if candidate.reports_completed() {
                    completion_owner.entry(key.clone()).or_insert(source);
                }
                let allow_completion = completion_owner.get(&key) == Some(&source);

                match index.get(&key) {
                    Some(stored) => {
                        let (patch, changes) =
                            diff_record(stored, &candidate, source, allow_completion, now);
                        if changes.is_empty() {
                            continue;
                        }
                        match self.store.update(&stored.id, patch).await {
                            Ok(()) => {
                                // `updated` counts field updates, matching
                                // the audit log, not touched records.
                                result.updated += changes.len();
                                update_log.extend(changes);
                                match self.store.get(&stored.id).await {
                                    Ok(Some(fresh)) => {
                                        index.insert(key, fresh);
                                    }
                                    Ok(None) => {}
                                    Err(err) => {
                                        warn!(id = %stored.id, error = %err, "reloading record after update failed");
                                    }
                                }
                            }
                            Err(err) => {
                                result.errors.push(format!("updating {key}: {err}"));
                            }
                        }
                    }
                    None => {
                        let Some(record) = GameRecord::from_partial(&candidate, now) else {
                            continue;
                        };
                        match self.store.create(record.clone()).await {
                            Ok(_) => {
                                info!(%key, source = %source, "created game record");
                                result.added += 1;
                                index.insert(key, record.clone());
                                created.push(record);
                            }
                            Err(err) => {
                                result.errors.push(format!("creating {key}: {err}"));
                            }
                        }
                    }
                }
            }
        }

        match self.site.check_broadcast_updates().await {
            Ok(map) => {
                let mut batch = BTreeMap::new();
                let mut changes = Vec::new();
                for (key, channel) in map {
                    let Some(stored) = index.get(&key) else {
                        continue;
                    };
                    if stored.broadcast_channel.as_deref() == Some(channel.as_str()) {
                        continue;
                    }
                    batch.insert(
                        format!("{}/{}", stored.id, GameField::BroadcastChannel),
                        JsonValue::String(channel.clone()),
                    );
                    changes.push(FieldUpdate {
                        record_id: stored.id.clone(),
                        field: GameField::BroadcastChannel,
                        old_value: stored.broadcast_channel.clone(),
                        new_value: channel,
                        source: SourceName::OfficialSite,
                        at: now,
                    });
                }
                if !batch.is_empty() {
                    match self.store.batch_update(batch).await {
                        Ok(()) => {
                            result.updated += changes.len();
                            update_log.extend(changes);
                        }
                        Err(err) => {
                            result.errors.push(format!("broadcast batch: {err}"));
                        }
                    }
                }
            }
            Err(err) => result.errors.push(format!("broadcast updates: {err}")),
        }

        let entry = SyncLogEntry {
            run_id: Uuid::new_v4().to_string(),
            timestamp: now,
            added: result.added,
            updated: result.updated,
            errors: result.errors.clone(),
            updates: update_log.clone(),
        };
        if let Err(err) = self.store.append_sync_entry(entry).await {
            result.errors.push(format!("sync log: {err}"));
        }

        for record in created {
            let _ = self.events.send(SyncEvent::RecordCreated(record));
        }
        if !update_log.is_empty() {
            let _ = self.events.send(SyncEvent::FieldsUpdated(update_log));
        }

        info!(
            added = result.added,
            updated = result.updated,
            errors = result.errors.len(),
            "sync run finished"
        );
        result
    }
}

/// Compute the patch and audit entries for one matched candidate. Only
/// present, non-sentinel, differing fields count; completion fields are
/// gated on ownership and on forward status movement.
fn diff_record(
    stored: &GameRecord,
    candidate: &PartialGame,
    source: SourceName,
    allow_completion: bool,
    now: DateTime<Utc>,
) -> (PartialGame, Vec<FieldUpdate>) {
    let mut patch = PartialGame::default();
    let mut changes = Vec::new();
    let mut change = |field: GameField, old: Option<String>, new: String| {
        changes.push(FieldUpdate {
            record_id: stored.id.clone(),
            field,
            old_value: old,
            new_value: new,
            source,
            at: now,
        });
    };

    if let Some(time) = candidate.kickoff_time {
        if stored.kickoff_time != Some(time) {
            patch.kickoff_time = Some(time);
            change(
                GameField::KickoffTime,
                stored.kickoff_time.map(|t| t.to_string()),
                time.to_string(),
            );
        }
    }
    if let Some(channel) = candidate.broadcast_channel.as_deref() {
        if !is_sentinel(channel) && stored.broadcast_channel.as_deref() != Some(channel) {
            patch.broadcast_channel = Some(channel.to_string());
            change(
                GameField::BroadcastChannel,
                stored.broadcast_channel.clone(),
                channel.to_string(),
            );
        }
    }
    if let Some(venue) = candidate.venue.as_deref() {
        if !is_sentinel(venue) && stored.venue.as_deref() != Some(venue) {
            patch.venue = Some(venue.to_string());
            change(GameField::Venue, stored.venue.clone(), venue.to_string());
        }
    }
    if let Some(external_ref) = candidate.external_ref.as_deref() {
        if !is_sentinel(external_ref) && stored.external_ref.as_deref() != Some(external_ref) {
            patch.external_ref = Some(external_ref.to_string());
            change(
                GameField::ExternalRef,
                stored.external_ref.clone(),
                external_ref.to_string(),
            );
        }
    }
    if candidate.is_postseason == Some(true) && !stored.is_postseason {
        patch.is_postseason = Some(true);
        change(
            GameField::IsPostseason,
            Some("false".to_string()),
            "true".to_string(),
        );
    }
    if let Some(name) = candidate.postseason_name.as_deref() {
        if !is_sentinel(name) && stored.postseason_name.as_deref() != Some(name) {
            patch.postseason_name = Some(name.to_string());
            change(
                GameField::PostseasonName,
                stored.postseason_name.clone(),
                name.to_string(),
            );
        }
    }

    let owns_completion = allow_completion && candidate.reports_completed();
    let mut fill_scores = |patch: &mut PartialGame,
                           change: &mut dyn FnMut(GameField, Option<String>, String)| {
        if let (Some(home), Some(away)) = (candidate.home_score, candidate.away_score) {
            if stored.home_score != Some(home) {
                patch.home_score = Some(home);
                change(
                    GameField::HomeScore,
                    stored.home_score.map(|s| s.to_string()),
                    home.to_string(),
                );
            }
            if stored.away_score != Some(away) {
                patch.away_score = Some(away);
                change(
                    GameField::AwayScore,
                    stored.away_score.map(|s| s.to_string()),
                    away.to_string(),
                );
            }
            // Sources may hand over a final score without the letter;
            // derive it so scores and result always land together.
            let game_result = candidate
                .game_result
                .unwrap_or_else(|| derive_result(home, away, stored.is_home));
            if stored.game_result != Some(game_result) {
                patch.game_result = Some(game_result);
                change(
                    GameField::GameResult,
                    stored.game_result.map(|r| r.to_string()),
                    game_result.to_string(),
                );
            }
        }
    };

    if owns_completion && stored.status.advances_to(GameStatus::Completed) {
        patch.status = Some(GameStatus::Completed);
        change(
            GameField::Status,
            Some(stored.status.to_string()),
            GameStatus::Completed.to_string(),
        );
        fill_scores(&mut patch, &mut change);
    } else if owns_completion && stored.status == GameStatus::Completed && !stored.has_scores() {
        // A sweep may have promoted without a score; backfill once a source
        // reports the final.
        fill_scores(&mut patch, &mut change);
    } else if candidate.status == Some(GameStatus::InProgress)
        && stored.status.advances_to(GameStatus::InProgress)
    {
        patch.status = Some(GameStatus::InProgress);
        change(
            GameField::Status,
            Some(stored.status.to_string()),
            GameStatus::InProgress.to_string(),
        );
    }

    (patch, changes)
}

fn derive_result(home: u32, away: u32, is_home: bool) -> GameResult {
    let (ours, theirs) = if is_home { (home, away) } else { (away, home) };
    match ours.cmp(&theirs) {
        std::cmp::Ordering::Greater => GameResult::W,
        std::cmp::Ordering::Less => GameResult::L,
        std::cmp::Ordering::Equal => GameResult::T,
    }
}

/// Promotes games whose scheduled window has elapsed to Completed.
pub struct CompletionSweeper {
    store: Arc<dyn RecordStore>,
    feed: Arc<dyn SourceAdapter>,
}

impl CompletionSweeper {
    pub fn new(store: Arc<dyn RecordStore>, feed: Arc<dyn SourceAdapter>) -> Self {
        Self { store, feed }
    }

    pub async fn sweep(&self) -> usize {
        self.sweep_at(Local::now().naive_local()).await
    }

    /// Sweep against an explicit local clock. Idempotent: Completed records
    /// are never touched again.
    pub async fn sweep_at(&self, now: NaiveDateTime) -> usize {
        let records = match self.store.get_all().await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "sweep could not load records");
                return 0;
            }
        };

        let mut promoted = 0;
        let mut batch: BTreeMap<String, JsonValue> = BTreeMap::new();
        let mut batch_count = 0;

        for record in records {
            if matches!(record.status, GameStatus::Completed | GameStatus::InProgress) {
                continue;
            }
            if now < end_of_game_estimate(&record) {
                continue;
            }

            if record.has_scores() {
                batch.insert(
                    format!("{}/{}", record.id, GameField::Status),
                    JsonValue::String(GameStatus::Completed.to_string()),
                );
                batch_count += 1;
                continue;
            }

            // One shot at a final score before promoting without one.
            if let Some(external_ref) = record.external_ref.as_deref() {
                match self.feed.fetch_game_details(external_ref).await {
                    Ok(details) if details.home_score.is_some() && details.away_score.is_some() => {
                        let patch = PartialGame {
                            status: Some(GameStatus::Completed),
                            home_score: details.home_score,
                            away_score: details.away_score,
                            game_result: details.game_result,
                            ..PartialGame::default()
                        };
                        match self.store.update(&record.id, patch).await {
                            Ok(()) => {
                                info!(id = %record.id, opponent = %record.opponent, "promoted with final score");
                                promoted += 1;
                            }
                            Err(err) => {
                                warn!(id = %record.id, error = %err, "promotion write failed");
                            }
                        }
                        continue;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(id = %record.id, error = %err, "details fetch failed, promoting without score");
                    }
                }
            }

            batch.insert(
                format!("{}/{}", record.id, GameField::Status),
                JsonValue::String(GameStatus::Completed.to_string()),
            );
            batch_count += 1;
        }

        if !batch.is_empty() {
            match self.store.batch_update(batch).await {
                Ok(()) => promoted += batch_count,
                Err(err) => warn!(error = %err, "batch promotion failed"),
            }
        }

        info!(promoted, "completion sweep finished");
        promoted
    }
}

fn end_of_game_estimate(record: &GameRecord) -> NaiveDateTime {
    match record.kickoff_time {
        Some(kickoff) => record.date.and_time(kickoff) + TimeDelta::hours(POST_KICKOFF_HOURS),
        // Kickoff unknown: assume the game is over once the day is.
        None => record
            .date
            .and_time(NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default()),
    }
}

/// Cron cadences + the single-flight manual trigger.
///
/// At most one reconciliation run is in flight at a time: the slot holds the
/// in-flight run's result channel, and triggers that arrive mid-run subscribe
/// to it instead of starting a second run.
pub struct SyncScheduler {
    engine: Arc<ReconciliationEngine>,
    sweeper: CompletionSweeper,
    store: Arc<dyn RecordStore>,
    config: SyncConfig,
    in_flight: Mutex<Option<broadcast::Sender<SyncResult>>>,
}

impl SyncScheduler {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        sweeper: CompletionSweeper,
        store: Arc<dyn RecordStore>,
        config: SyncConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            sweeper,
            store,
            config,
            in_flight: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.engine.subscribe()
    }

    /// Run a sync now, or join the run already in flight. Always yields a
    /// result; near-simultaneous triggers share one underlying run.
    pub async fn trigger_manual_sync(self: &Arc<Self>) -> SyncResult {
        let joined = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(sender) => Some(sender.subscribe()),
                None => {
                    let (sender, _) = broadcast::channel(1);
                    *slot = Some(sender);
                    None
                }
            }
        };

        if let Some(mut receiver) = joined {
            match receiver.recv().await {
                Ok(result) => return result,
                Err(_) => {
                    let mut result = SyncResult::new(Utc::now());
                    result
                        .errors
                        .push("in-flight sync ended without a result".to_string());
                    return result;
                }
            }
        }

        self.run_as_owner().await
    }

    /// Like [`trigger_manual_sync`](Self::trigger_manual_sync) but refuses to
    /// wait on an in-flight run.
    pub async fn try_trigger_sync(self: &Arc<Self>) -> Result<SyncResult, SyncError> {
        {
            let mut slot = self.in_flight.lock().await;
            if slot.is_some() {
                return Err(SyncError::AlreadyRunning);
            }
            let (sender, _) = broadcast::channel(1);
            *slot = Some(sender);
        }
        Ok(self.run_as_owner().await)
    }

    async fn run_as_owner(self: &Arc<Self>) -> SyncResult {
        let result = self.engine.run().await;
        let mut slot = self.in_flight.lock().await;
        if let Some(sender) = slot.take() {
            let _ = sender.send(result.clone());
        }
        result
    }

    pub async fn sweep_now(&self) -> usize {
        self.sweeper.sweep().await
    }

    /// Last sync timestamp, next scheduled run, and the most recent field
    /// updates. Best effort on an empty log.
    pub async fn get_last_sync_status(&self) -> Result<SyncStatus, SyncError> {
        let entries = self.store.recent_sync_entries(1).await?;
        let last = entries.first();
        let mut recent_updates = last.map(|e| e.updates.clone()).unwrap_or_default();
        recent_updates.truncate(self.config.recent_updates_limit);
        Ok(SyncStatus {
            last_sync: last.map(|e| e.timestamp),
            next_scheduled: next_daily_occurrence(Local::now(), self.config.daily_sync_hour),
            recent_updates,
        })
    }

    /// Build the cron scheduler: a daily full sync at the configured hour and
    /// the hourly completion sweep. The caller starts and owns it.
    pub async fn build_cron(self: &Arc<Self>) -> anyhow::Result<JobScheduler> {
        let sched = JobScheduler::new().await.context("creating scheduler")?;

        let sync_cron = format!("0 {} * * *", self.config.daily_sync_hour);
        let this = Arc::clone(self);
        let job = Job::new_async(sync_cron.as_str(), move |_uuid, _l| {
            let this = Arc::clone(&this);
            Box::pin(async move {
                let result = this.trigger_manual_sync().await;
                info!(
                    added = result.added,
                    updated = result.updated,
                    errors = result.errors.len(),
                    "scheduled sync finished"
                );
            })
        })
        .with_context(|| format!("creating sync job for cron {sync_cron}"))?;
        sched.add(job).await.context("adding sync job")?;

        let sweep_cron = self.config.sweep_cron.clone();
        let this = Arc::clone(self);
        let job = Job::new_async(sweep_cron.as_str(), move |_uuid, _l| {
            let this = Arc::clone(&this);
            Box::pin(async move {
                let promoted = this.sweep_now().await;
                if promoted > 0 {
                    info!(promoted, "scheduled sweep promoted games");
                }
            })
        })
        .with_context(|| format!("creating sweep job for cron {sweep_cron}"))?;
        sched.add(job).await.context("adding sweep job")?;

        Ok(sched)
    }
}

fn next_daily_occurrence(now: DateTime<Local>, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or_default();
    let mut candidate = now.date_naive().and_time(time);
    if candidate <= now.naive_local() {
        candidate += TimeDelta::days(1);
    }
    candidate
        .and_local_timezone(Local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| candidate.and_utc())
}

/// Wire the production runtime from config: JSON-file store, live adapters,
/// engine, sweeper, scheduler.
pub async fn build_runtime(config: &SyncConfig) -> anyhow::Result<Arc<SyncScheduler>> {
    let store: Arc<dyn RecordStore> = Arc::new(
        JsonFileStore::open(config.data_path.clone())
            .await
            .context("opening record store")?,
    );
    let http = Arc::new(HttpFetcher::new(config.http_config()).context("building http client")?);
    let feed: Arc<dyn SourceAdapter> =
        Arc::new(FeedAdapter::new(Arc::clone(&http), config.feed_config()));
    let site: Arc<dyn SourceAdapter> = Arc::new(SiteAdapter::new(http, config.site_config()));
    let fallback: Arc<dyn SourceAdapter> =
        Arc::new(FallbackAdapter::embedded().context("loading fallback table")?);

    let engine = Arc::new(ReconciliationEngine::new(
        Arc::clone(&store),
        Arc::clone(&feed),
        site,
        fallback,
        config.season,
    ));
    let sweeper = CompletionSweeper::new(Arc::clone(&store), feed);
    Ok(SyncScheduler::new(engine, sweeper, store, config.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gameday_adapters::AdapterError;
    use gameday_core::GameResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct ScriptedAdapter {
        source: SourceName,
        schedule: Option<Vec<PartialGame>>,
        bowls: Vec<PartialGame>,
        details: Option<PartialGame>,
        broadcasts: HashMap<CompositeKey, String>,
        delay: Option<std::time::Duration>,
        schedule_calls: AtomicUsize,
    }

    impl ScriptedAdapter {
        fn up(source: SourceName, schedule: Vec<PartialGame>) -> Self {
            Self {
                source,
                schedule: Some(schedule),
                bowls: Vec::new(),
                details: None,
                broadcasts: HashMap::new(),
                delay: None,
                schedule_calls: AtomicUsize::new(0),
            }
        }

        fn down(source: SourceName) -> Self {
            Self {
                schedule: None,
                ..Self::up(source, Vec::new())
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn source(&self) -> SourceName {
            self.source
        }

        async fn fetch_schedule(&self, _season: i32) -> Result<Vec<PartialGame>, AdapterError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.schedule_calls.fetch_add(1, Ordering::SeqCst);
            self.schedule
                .clone()
                .ok_or(AdapterError::SourceUnavailable {
                    adapter: self.source,
                    reason: "scripted outage".to_string(),
                })
        }

        async fn fetch_live_scores(&self) -> Result<Vec<PartialGame>, AdapterError> {
            Ok(Vec::new())
        }

        async fn fetch_game_details(
            &self,
            _external_ref: &str,
        ) -> Result<PartialGame, AdapterError> {
            self.details
                .clone()
                .ok_or(AdapterError::Unsupported(self.source))
        }

        async fn check_bowl_games(&self, _season: i32) -> Result<Vec<PartialGame>, AdapterError> {
            Ok(self.bowls.clone())
        }

        async fn check_broadcast_updates(
            &self,
        ) -> Result<HashMap<CompositeKey, String>, AdapterError> {
            if self.schedule.is_none() {
                return Err(AdapterError::SourceUnavailable {
                    adapter: self.source,
                    reason: "scripted outage".to_string(),
                });
            }
            Ok(self.broadcasts.clone())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn partial(d: NaiveDate, opponent: &str) -> PartialGame {
        PartialGame {
            date: Some(d),
            opponent: Some(opponent.to_string()),
            is_home: Some(true),
            ..PartialGame::default()
        }
    }

    async fn store_in(dir: &tempfile::TempDir) -> Arc<dyn RecordStore> {
        Arc::new(
            JsonFileStore::open(dir.path().join("gameday.json"))
                .await
                .unwrap(),
        )
    }

    fn engine_with(
        store: Arc<dyn RecordStore>,
        feed: ScriptedAdapter,
        site: ScriptedAdapter,
        fallback: ScriptedAdapter,
    ) -> ReconciliationEngine {
        ReconciliationEngine::new(store, Arc::new(feed), Arc::new(site), Arc::new(fallback), 2025)
    }

    fn scheduler_with(engine: ReconciliationEngine, store: Arc<dyn RecordStore>) -> Arc<SyncScheduler> {
        let engine = Arc::new(engine);
        let sweeper = CompletionSweeper::new(
            Arc::clone(&store),
            Arc::new(ScriptedAdapter::down(SourceName::Feed)),
        );
        let mut config = test_config();
        config.recent_updates_limit = 5;
        SyncScheduler::new(engine, sweeper, store, config)
    }

    fn test_config() -> SyncConfig {
        SyncConfig {
            season: 2025,
            feed_base_url: "http://localhost".to_string(),
            feed_team_id: "251".to_string(),
            utc_offset_hours: -6,
            site_schedule_url: "http://localhost".to_string(),
            home_keyword: "Austin".to_string(),
            daily_sync_hour: 6,
            sweep_cron: "0 * * * *".to_string(),
            user_agent: "gameday-test".to_string(),
            http_timeout_secs: 5,
            data_path: std::path::PathBuf::from("./unused.json"),
            recent_updates_limit: 20,
        }
    }

    #[tokio::test]
    async fn creates_records_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let mut game = partial(date(2025, 10, 18), "Georgia");
        game.kickoff_time = Some(time(19, 0));
        let engine = engine_with(
            Arc::clone(&store),
            ScriptedAdapter::up(SourceName::Feed, vec![game.clone(), partial(date(2025, 10, 25), "Vanderbilt")]),
            ScriptedAdapter::up(SourceName::OfficialSite, Vec::new()),
            ScriptedAdapter::down(SourceName::Fallback),
        );

        let first = engine.run_for_date(date(2025, 10, 1)).await;
        assert_eq!(first.added, 2);
        assert_eq!(first.updated, 0);
        assert!(first.errors.is_empty());

        let second = engine.run_for_date(date(2025, 10, 1)).await;
        assert_eq!(second.added, 0);
        assert_eq!(second.updated, 0);

        let records = store.get_all().await.unwrap();
        assert_eq!(records.len(), 2);
        let georgia = records.iter().find(|r| r.opponent == "Georgia").unwrap();
        assert_eq!(georgia.status, GameStatus::Unplanned);
        assert_eq!(georgia.kickoff_time, Some(time(19, 0)));
    }

    #[tokio::test]
    async fn matches_across_casing_and_punctuation() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let engine = engine_with(
            Arc::clone(&store),
            ScriptedAdapter::up(SourceName::Feed, vec![partial(date(2025, 11, 29), "Texas A&M")]),
            ScriptedAdapter::up(SourceName::OfficialSite, vec![{
                let mut g = partial(date(2025, 11, 29), "  texas a m ");
                g.kickoff_time = Some(time(18, 30));
                g
            }]),
            ScriptedAdapter::down(SourceName::Fallback),
        );

        let result = engine.run_for_date(date(2025, 11, 1)).await;
        // One record created from the feed, then updated by the site pass.
        assert_eq!(result.added, 1);
        assert_eq!(result.updated, 1);
        let records = store.get_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].opponent, "Texas A&M");
        assert_eq!(records[0].kickoff_time, Some(time(18, 30)));
    }

    #[tokio::test]
    async fn site_wins_kickoff_and_broadcast() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let mut from_feed = partial(date(2025, 10, 18), "Georgia");
        from_feed.kickoff_time = Some(time(11, 0));
        from_feed.broadcast_channel = Some("ESPN".to_string());
        let mut from_site = partial(date(2025, 10, 18), "Georgia");
        from_site.kickoff_time = Some(time(19, 0));
        from_site.broadcast_channel = Some("ABC".to_string());

        let engine = engine_with(
            Arc::clone(&store),
            ScriptedAdapter::up(SourceName::Feed, vec![from_feed]),
            ScriptedAdapter::up(SourceName::OfficialSite, vec![from_site]),
            ScriptedAdapter::down(SourceName::Fallback),
        );
        engine.run_for_date(date(2025, 10, 1)).await;

        let records = store.get_all().await.unwrap();
        assert_eq!(records[0].kickoff_time, Some(time(19, 0)));
        assert_eq!(records[0].broadcast_channel.as_deref(), Some("ABC"));
    }

    #[tokio::test]
    async fn fallback_cascade_when_both_rich_sources_fail() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let engine = engine_with(
            Arc::clone(&store),
            ScriptedAdapter::down(SourceName::Feed),
            ScriptedAdapter::down(SourceName::OfficialSite),
            ScriptedAdapter::up(
                SourceName::Fallback,
                vec![
                    partial(date(2025, 8, 30), "Ohio State"),
                    partial(date(2025, 9, 6), "San Jose State"),
                ],
            ),
        );

        let result = engine.run_for_date(date(2025, 8, 1)).await;
        assert_eq!(result.added, 2);
        // Feed outage, site outage, and the site broadcast check.
        assert_eq!(result.errors.len(), 3);
        assert_eq!(store.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn first_completed_reporter_owns_the_score() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let mut from_feed = partial(date(2025, 10, 11), "Oklahoma");
        from_feed.status = Some(GameStatus::Completed);
        from_feed.home_score = Some(3);
        from_feed.away_score = Some(34);
        from_feed.game_result = Some(GameResult::W);
        let mut from_site = partial(date(2025, 10, 11), "Oklahoma");
        from_site.status = Some(GameStatus::Completed);
        from_site.home_score = Some(24);
        from_site.away_score = Some(31);
        from_site.game_result = Some(GameResult::W);

        let engine = engine_with(
            Arc::clone(&store),
            ScriptedAdapter::up(SourceName::Feed, vec![from_feed]),
            ScriptedAdapter::up(SourceName::OfficialSite, vec![from_site]),
            ScriptedAdapter::down(SourceName::Fallback),
        );
        engine.run_for_date(date(2025, 10, 12)).await;

        let records = store.get_all().await.unwrap();
        assert_eq!(records[0].status, GameStatus::Completed);
        assert_eq!(records[0].home_score, Some(3));
        assert_eq!(records[0].away_score, Some(34));
    }

    #[tokio::test]
    async fn status_never_demotes_and_sentinels_never_overwrite() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let mut seed = partial(date(2025, 10, 11), "Oklahoma");
        seed.status = Some(GameStatus::Completed);
        seed.home_score = Some(3);
        seed.away_score = Some(34);
        seed.broadcast_channel = Some("ABC".to_string());
        let record = GameRecord::from_partial(&seed, Utc::now()).unwrap();
        store.create(record).await.unwrap();

        let mut stale = partial(date(2025, 10, 11), "Oklahoma");
        stale.status = Some(GameStatus::Scheduled);
        stale.broadcast_channel = Some("TBD".to_string());
        stale.kickoff_time = Some(time(14, 30));

        let engine = engine_with(
            Arc::clone(&store),
            ScriptedAdapter::up(SourceName::Feed, vec![stale]),
            ScriptedAdapter::up(SourceName::OfficialSite, Vec::new()),
            ScriptedAdapter::down(SourceName::Fallback),
        );
        engine.run_for_date(date(2025, 10, 12)).await;

        let records = store.get_all().await.unwrap();
        // Kickoff was new information; status and broadcast were not.
        assert_eq!(records[0].kickoff_time, Some(time(14, 30)));
        assert_eq!(records[0].status, GameStatus::Completed);
        assert_eq!(records[0].broadcast_channel.as_deref(), Some("ABC"));
    }

    #[tokio::test]
    async fn december_run_merges_bowl_candidates() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let mut feed = ScriptedAdapter::up(SourceName::Feed, Vec::new());
        let mut bowl = partial(date(2025, 12, 29), "Arizona");
        bowl.is_postseason = Some(true);
        bowl.postseason_name = Some("Alamo Bowl".to_string());
        feed.bowls = vec![bowl];

        let engine = engine_with(
            Arc::clone(&store),
            feed,
            ScriptedAdapter::up(SourceName::OfficialSite, Vec::new()),
            ScriptedAdapter::down(SourceName::Fallback),
        );

        // October run ignores the bowl check entirely.
        engine.run_for_date(date(2025, 10, 1)).await;
        assert!(store.get_all().await.unwrap().is_empty());

        let result = engine.run_for_date(date(2025, 12, 20)).await;
        assert_eq!(result.added, 1);
        let records = store.get_all().await.unwrap();
        assert!(records[0].is_postseason);
        assert_eq!(records[0].postseason_name.as_deref(), Some("Alamo Bowl"));
    }

    #[tokio::test]
    async fn broadcast_map_applies_and_run_is_logged() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let seed = partial(date(2025, 10, 18), "Georgia");
        let record = GameRecord::from_partial(&seed, Utc::now()).unwrap();
        store.create(record).await.unwrap();

        let mut site = ScriptedAdapter::up(SourceName::OfficialSite, Vec::new());
        site.broadcasts.insert(
            CompositeKey::new(date(2025, 10, 18), "Georgia"),
            "CBS".to_string(),
        );

        let engine = engine_with(
            Arc::clone(&store),
            ScriptedAdapter::up(SourceName::Feed, Vec::new()),
            site,
            ScriptedAdapter::down(SourceName::Fallback),
        );
        let mut events = engine.subscribe();
        let result = engine.run_for_date(date(2025, 10, 1)).await;

        assert_eq!(result.updated, 1);
        let records = store.get_all().await.unwrap();
        assert_eq!(records[0].broadcast_channel.as_deref(), Some("CBS"));

        let entries = store.recent_sync_entries(5).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].updates.len(), 1);
        assert_eq!(entries[0].updates[0].field, GameField::BroadcastChannel);
        assert_eq!(entries[0].updates[0].new_value, "CBS");

        match events.try_recv().unwrap() {
            SyncEvent::FieldsUpdated(updates) => assert_eq!(updates.len(), 1),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn sweep_promotes_elapsed_games_only() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let now = date(2025, 10, 12).and_time(time(12, 0));

        // Yesterday evening, kickoff known, no scores: past kickoff + 4h.
        let mut played = partial(date(2025, 10, 11), "Oklahoma");
        played.kickoff_time = Some(time(19, 0));
        played.status = Some(GameStatus::Scheduled);
        store
            .create(GameRecord::from_partial(&played, Utc::now()).unwrap())
            .await
            .unwrap();

        // Earlier today, no kickoff: day not over yet.
        let mut pending = partial(date(2025, 10, 12), "Kentucky");
        pending.status = Some(GameStatus::Scheduled);
        store
            .create(GameRecord::from_partial(&pending, Utc::now()).unwrap())
            .await
            .unwrap();

        // Next week: untouched.
        let mut future = partial(date(2025, 10, 18), "Georgia");
        future.status = Some(GameStatus::Scheduled);
        store
            .create(GameRecord::from_partial(&future, Utc::now()).unwrap())
            .await
            .unwrap();

        let sweeper = CompletionSweeper::new(
            Arc::clone(&store),
            Arc::new(ScriptedAdapter::down(SourceName::Feed)),
        );
        assert_eq!(sweeper.sweep_at(now).await, 1);

        let records = store.get_all().await.unwrap();
        let oklahoma = records.iter().find(|r| r.opponent == "Oklahoma").unwrap();
        assert_eq!(oklahoma.status, GameStatus::Completed);
        assert_eq!(oklahoma.home_score, None);
        assert!(records
            .iter()
            .filter(|r| r.opponent != "Oklahoma")
            .all(|r| r.status == GameStatus::Scheduled));

        // Idempotent.
        assert_eq!(sweeper.sweep_at(now).await, 0);
    }

    #[tokio::test]
    async fn sweep_fetches_final_score_when_ref_known() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let mut played = partial(date(2025, 10, 11), "Oklahoma");
        played.kickoff_time = Some(time(14, 30));
        played.status = Some(GameStatus::Scheduled);
        played.external_ref = Some("401520281".to_string());
        store
            .create(GameRecord::from_partial(&played, Utc::now()).unwrap())
            .await
            .unwrap();

        let mut feed = ScriptedAdapter::down(SourceName::Feed);
        feed.details = Some(PartialGame {
            status: Some(GameStatus::Completed),
            home_score: Some(3),
            away_score: Some(34),
            game_result: Some(GameResult::W),
            ..PartialGame::default()
        });

        let sweeper = CompletionSweeper::new(Arc::clone(&store), Arc::new(feed));
        let now = date(2025, 10, 12).and_time(time(9, 0));
        assert_eq!(sweeper.sweep_at(now).await, 1);

        let records = store.get_all().await.unwrap();
        assert_eq!(records[0].status, GameStatus::Completed);
        assert_eq!(records[0].home_score, Some(3));
        assert_eq!(records[0].away_score, Some(34));
        assert_eq!(records[0].game_result, Some(GameResult::W));
    }

    #[tokio::test]
    async fn sweep_promotes_without_score_when_details_fail() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let mut played = partial(date(2025, 10, 11), "Oklahoma");
        played.kickoff_time = Some(time(14, 30));
        played.status = Some(GameStatus::Scheduled);
        played.external_ref = Some("401520281".to_string());
        store
            .create(GameRecord::from_partial(&played, Utc::now()).unwrap())
            .await
            .unwrap();

        // `details` unset: every fetch fails.
        let sweeper = CompletionSweeper::new(
            Arc::clone(&store),
            Arc::new(ScriptedAdapter::down(SourceName::Feed)),
        );
        let now = date(2025, 10, 12).and_time(time(9, 0));
        assert_eq!(sweeper.sweep_at(now).await, 1);

        let records = store.get_all().await.unwrap();
        assert_eq!(records[0].status, GameStatus::Completed);
        assert_eq!(records[0].home_score, None);
    }

    #[tokio::test]
    async fn concurrent_triggers_coalesce_into_one_run() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let mut feed =
            ScriptedAdapter::up(SourceName::Feed, vec![partial(date(2025, 10, 18), "Georgia")]);
        feed.delay = Some(std::time::Duration::from_millis(100));
        let calls = Arc::new(feed);
        let engine = ReconciliationEngine::new(
            Arc::clone(&store),
            Arc::clone(&calls) as Arc<dyn SourceAdapter>,
            Arc::new(ScriptedAdapter::up(SourceName::OfficialSite, Vec::new())),
            Arc::new(ScriptedAdapter::down(SourceName::Fallback)),
            2025,
        );
        let scheduler = scheduler_with(engine, Arc::clone(&store));

        let a = Arc::clone(&scheduler);
        let b = Arc::clone(&scheduler);
        let (first, second) = tokio::join!(
            async move { a.trigger_manual_sync().await },
            async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                b.trigger_manual_sync().await
            }
        );

        assert_eq!(first, second);
        assert_eq!(calls.schedule_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn try_trigger_rejects_while_a_run_is_in_flight() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let mut feed = ScriptedAdapter::up(SourceName::Feed, Vec::new());
        feed.delay = Some(std::time::Duration::from_millis(150));
        let engine = engine_with(
            Arc::clone(&store),
            feed,
            ScriptedAdapter::up(SourceName::OfficialSite, Vec::new()),
            ScriptedAdapter::down(SourceName::Fallback),
        );
        let scheduler = scheduler_with(engine, store);

        let owner = Arc::clone(&scheduler);
        let handle = tokio::spawn(async move { owner.trigger_manual_sync().await });
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        match scheduler.try_trigger_sync().await {
            Err(SyncError::AlreadyRunning) => {}
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
        handle.await.unwrap();

        // Slot is free again afterwards.
        assert!(scheduler.try_trigger_sync().await.is_ok());
    }

    #[tokio::test]
    async fn status_query_is_best_effort_on_empty_log() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let engine = engine_with(
            Arc::clone(&store),
            ScriptedAdapter::up(SourceName::Feed, Vec::new()),
            ScriptedAdapter::up(SourceName::OfficialSite, Vec::new()),
            ScriptedAdapter::down(SourceName::Fallback),
        );
        let scheduler = scheduler_with(engine, store);

        let status = scheduler.get_last_sync_status().await.unwrap();
        assert!(status.last_sync.is_none());
        assert!(status.recent_updates.is_empty());
        assert!(status.next_scheduled > Utc::now());

        scheduler.trigger_manual_sync().await;
        let status = scheduler.get_last_sync_status().await.unwrap();
        assert!(status.last_sync.is_some());
    }

    #[test]
    fn next_occurrence_rolls_to_tomorrow() {
        let now = Local::now();
        let next = next_daily_occurrence(now, 6);
        assert!(next > now.with_timezone(&Utc));
        assert!(next <= now.with_timezone(&Utc) + TimeDelta::days(1));
    }

    #[tokio::test]
    async fn derives_result_when_source_omits_the_letter() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir).await;
        let mut seed = partial(date(2025, 10, 18), "Georgia");
        seed.status = Some(GameStatus::Scheduled);
        store
            .create(GameRecord::from_partial(&seed, Utc::now()).unwrap())
            .await
            .unwrap();

        // Final score, no W/L/T flag from the source.
        let mut final_score = partial(date(2025, 10, 18), "Georgia");
        final_score.status = Some(GameStatus::Completed);
        final_score.home_score = Some(45);
        final_score.away_score = Some(21);

        let engine = engine_with(
            Arc::clone(&store),
            ScriptedAdapter::up(SourceName::Feed, vec![final_score]),
            ScriptedAdapter::up(SourceName::OfficialSite, Vec::new()),
            ScriptedAdapter::down(SourceName::Fallback),
        );
        let result = engine.run_for_date(date(2025, 10, 19)).await;

        // Status, both scores, and the derived result count individually.
        assert_eq!(result.updated, 4);
        let records = store.get_all().await.unwrap();
        assert_eq!(records[0].status, GameStatus::Completed);
        assert_eq!(records[0].home_score, Some(45));
        assert_eq!(records[0].away_score, Some(21));
        // Home team on top of the score pair.
        assert_eq!(records[0].game_result, Some(GameResult::W));
    }

    struct ReadFlakyStore {
        inner: JsonFileStore,
    }

    #[async_trait]
    impl RecordStore for ReadFlakyStore {
        async fn get_all(&self) -> Result<Vec<GameRecord>, StoreError> {
            self.inner.get_all().await
        }

        async fn get(&self, id: &str) -> Result<Option<GameRecord>, StoreError> {
            Err(StoreError::NotFound(id.to_string()))
        }

        async fn create(&self, record: GameRecord) -> Result<String, StoreError> {
            self.inner.create(record).await
        }

        async fn update(&self, id: &str, patch: PartialGame) -> Result<(), StoreError> {
            self.inner.update(id, patch).await
        }

        async fn batch_update(
            &self,
            updates: BTreeMap<String, JsonValue>,
        ) -> Result<(), StoreError> {
            self.inner.batch_update(updates).await
        }

        async fn append_sync_entry(&self, entry: SyncLogEntry) -> Result<(), StoreError> {
            self.inner.append_sync_entry(entry).await
        }

        async fn recent_sync_entries(&self, limit: usize) -> Result<Vec<SyncLogEntry>, StoreError> {
            self.inner.recent_sync_entries(limit).await
        }
    }

    #[tokio::test]
    async fn run_survives_a_failed_record_reload() {
        let dir = tempdir().unwrap();
        let inner = JsonFileStore::open(dir.path().join("gameday.json"))
            .await
            .unwrap();
        let seed = partial(date(2025, 10, 18), "Georgia");
        inner
            .create(GameRecord::from_partial(&seed, Utc::now()).unwrap())
            .await
            .unwrap();
        let store: Arc<dyn RecordStore> = Arc::new(ReadFlakyStore { inner });

        let mut from_feed = partial(date(2025, 10, 18), "Georgia");
        from_feed.kickoff_time = Some(time(19, 0));
        let engine = engine_with(
            Arc::clone(&store),
            ScriptedAdapter::up(SourceName::Feed, vec![from_feed]),
            ScriptedAdapter::up(SourceName::OfficialSite, Vec::new()),
            ScriptedAdapter::down(SourceName::Fallback),
        );

        // The post-update reload fails every time; the run still applies the
        // change and stays clean.
        let result = engine.run_for_date(date(2025, 10, 1)).await;
        assert_eq!(result.updated, 1);
        assert!(result.errors.is_empty());
        let records = store.get_all().await.unwrap();
        assert_eq!(records[0].kickoff_time, Some(time(19, 0)));
    }
}
