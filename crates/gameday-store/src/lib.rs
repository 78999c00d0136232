//! Persistent game-record store + HTTP fetch utilities.
//!
//! The store is a small JSON document store: a `games` collection keyed by
//! record id and an append-only `sync_log` collection, flushed to disk with
//! an atomic temp-file rename so readers never observe a half-written file.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use gameday_core::{GameRecord, PartialGame, SyncLogEntry};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "gameday-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(String),
    #[error("record with key {0} already exists")]
    DuplicateKey(String),
    #[error("persisting {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("encoding store state: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("malformed batch-update path `{0}` (expected `id/field`)")]
    BadPath(String),
    #[error("unknown field `{0}` in batch update")]
    UnknownField(String),
}

/// Abstraction over persisted game records and the sync log. The engine and
/// the sweeper are the only writers; `update` tolerates interleaved calls on
/// distinct ids (last write wins on the same id).
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_all(&self) -> Result<Vec<GameRecord>, StoreError>;
    async fn get(&self, id: &str) -> Result<Option<GameRecord>, StoreError>;
    async fn create(&self, record: GameRecord) -> Result<String, StoreError>;
    /// Merge every populated field of `patch` into the record and bump
    /// `last_synced_at`. One batched write per record, not per field.
    async fn update(&self, id: &str, patch: PartialGame) -> Result<(), StoreError>;
    /// Multi-record field writes addressed as `"{id}/{field}"`. Atomic from
    /// the caller's view: either every path applies or none do.
    async fn batch_update(&self, updates: BTreeMap<String, JsonValue>) -> Result<(), StoreError>;
    async fn append_sync_entry(&self, entry: SyncLogEntry) -> Result<(), StoreError>;
    /// Most recent entries first, best effort on an empty log.
    async fn recent_sync_entries(&self, limit: usize) -> Result<Vec<SyncLogEntry>, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    games: HashMap<String, GameRecord>,
    sync_log: Vec<SyncLogEntry>,
}

/// JSON-file-backed [`RecordStore`].
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl JsonFileStore {
    /// Open (or initialize) the store at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let state = if fs::try_exists(&path)
            .await
            .with_context(|| format!("checking {}", path.display()))?
        {
            let text = fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        } else {
            StoreState::default()
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    async fn flush(&self, state: &StoreState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path, &bytes)
            .await
            .map_err(|source| StoreError::Persistence {
                path: self.path.display().to_string(),
                source,
            })
    }
}

/// Write via a temp file in the same directory, then rename into place.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let temp_name = format!(".{}.tmp", Uuid::new_v4());
    let temp_path = path.with_file_name(temp_name);

    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);

    match fs::rename(&temp_path, path).await {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&temp_path).await;
            Err(err)
        }
    }
}

fn apply_patch(record: &mut GameRecord, patch: &PartialGame) {
    if let Some(date) = patch.date {
        record.date = date;
    }
    if let Some(time) = patch.kickoff_time {
        record.kickoff_time = Some(time);
    }
    if let Some(opponent) = &patch.opponent {
        record.opponent = opponent.clone();
    }
    if let Some(is_home) = patch.is_home {
        record.is_home = is_home;
    }
    if let Some(venue) = &patch.venue {
        record.venue = Some(venue.clone());
    }
    if let Some(channel) = &patch.broadcast_channel {
        record.broadcast_channel = Some(channel.clone());
    }
    if let Some(status) = patch.status {
        record.status = status;
    }
    if let Some(score) = patch.home_score {
        record.home_score = Some(score);
    }
    if let Some(score) = patch.away_score {
        record.away_score = Some(score);
    }
    if let Some(result) = patch.game_result {
        record.game_result = Some(result);
    }
    if let Some(flag) = patch.is_postseason {
        record.is_postseason = flag;
    }
    if let Some(name) = &patch.postseason_name {
        record.postseason_name = Some(name.clone());
    }
    if let Some(external_ref) = &patch.external_ref {
        record.external_ref = Some(external_ref.clone());
    }
    record.last_synced_at = Utc::now();
}

fn set_record_field(
    record: &GameRecord,
    field: &str,
    value: JsonValue,
) -> Result<GameRecord, StoreError> {
    let mut as_value = serde_json::to_value(record)?;
    let obj = as_value
        .as_object_mut()
        .expect("GameRecord serializes to an object");
    if !obj.contains_key(field) || matches!(field, "id" | "date" | "opponent") {
        return Err(StoreError::UnknownField(field.to_string()));
    }
    obj.insert(field.to_string(), value);
    obj.insert(
        "last_synced_at".to_string(),
        serde_json::to_value(Utc::now())?,
    );
    Ok(serde_json::from_value(as_value)?)
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn get_all(&self) -> Result<Vec<GameRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state.games.values().cloned().collect();
        records.sort_by_key(|r| (r.date, r.id.clone()));
        Ok(records)
    }

    async fn get(&self, id: &str) -> Result<Option<GameRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state.games.get(id).cloned())
    }

    async fn create(&self, record: GameRecord) -> Result<String, StoreError> {
        let mut state = self.state.write().await;
        let key = record.composite_key();
        if state.games.values().any(|g| g.composite_key() == key) {
            return Err(StoreError::DuplicateKey(key.to_string()));
        }
        let id = record.id.clone();
        state.games.insert(id.clone(), record);
        self.flush(&state).await?;
        Ok(id)
    }

    async fn update(&self, id: &str, patch: PartialGame) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = state
            .games
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        apply_patch(record, &patch);
        self.flush(&state).await
    }

    async fn batch_update(&self, updates: BTreeMap<String, JsonValue>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        // Stage everything before touching the live map so a bad path leaves
        // the store untouched.
        let mut staged: Vec<GameRecord> = Vec::with_capacity(updates.len());
        for (path, value) in updates {
            let (id, field) = path
                .split_once('/')
                .ok_or_else(|| StoreError::BadPath(path.clone()))?;
            let record = state
                .games
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            // Later paths for the same id build on earlier staged values.
            let base = staged
                .iter()
                .rev()
                .find(|r| r.id == id)
                .unwrap_or(record)
                .clone();
            staged.push(set_record_field(&base, field, value)?);
        }
        for record in staged {
            state.games.insert(record.id.clone(), record);
        }
        self.flush(&state).await
    }

    async fn append_sync_entry(&self, entry: SyncLogEntry) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.sync_log.push(entry);
        self.flush(&state).await
    }

    async fn recent_sync_entries(&self, limit: usize) -> Result<Vec<SyncLogEntry>, StoreError> {
        let state = self.state.read().await;
        let mut entries = state.sync_log.clone();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-call bound; a timed-out call surfaces like any other transport
    /// failure, there is no per-run timeout.
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Shared HTTP client with per-call timeout and bounded retry.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            backoff: config.backoff,
        })
    }

    pub async fn fetch_bytes(
        &self,
        source_id: &str,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        debug!(source_id, url, "fetching");

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let body = resp.bytes().await?.to_vec();
                        return Ok(FetchedResponse {
                            status,
                            final_url,
                            body,
                        });
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}
