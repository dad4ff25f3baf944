// Tiered freshness cache.
// Answers "all students" from the local store, then the published snapshot, then a live fetch,
// writing every answer back into the local store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::course::Course;
use crate::error::Result;
use crate::resolver;
use crate::student::{Student, StudentDetails, validate_students};
use crate::sync::{LiveSource, ProgressFn, no_progress};

use super::snapshot::SnapshotSource;
use super::store::{CacheEntry, LocalStore, age_at};

/// Key of the one logical query the dashboard makes.
pub const ALL_STUDENTS_KEY: &str = "all_students";

/// Local entries are served for 30 minutes.
pub const DEFAULT_LOCAL_TTL: Duration = Duration::from_secs(30 * 60);

/// Snapshots are served for 2 hours after generation.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Source of the wall clock, replaceable in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Which tier produced the most recent answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    None,
    Tier1,
    Tier2,
    Tier3,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataSource::None => "none",
            DataSource::Tier1 => "local cache",
            DataSource::Tier2 => "snapshot",
            DataSource::Tier3 => "live",
        })
    }
}

/// Where the current data came from and how old it is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    pub source: DataSource,
    pub timestamp: Option<DateTime<Utc>>,
    pub age: Option<Duration>,
}

/// Steps of one lookup.
#[derive(Debug)]
enum LookupState {
    CheckTier1,
    CheckTier2,
    Tier3Live,
    Settled(Answer),
}

#[derive(Debug)]
struct Answer {
    students: Vec<Student>,
    source: DataSource,
    /// When the data was produced (local write time, snapshot generation, or fetch time).
    timestamp: DateTime<Utc>,
}

/// Strictly younger than `ttl` at `now`. Timestamps in the future count as age zero.
pub fn is_within_ttl(written_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    age_at(written_at, now) < ttl
}

/// Decode a payload as a student list, `None` if it has the wrong shape.
pub fn parse_valid_payload(value: serde_json::Value) -> Option<Vec<Student>> {
    let students: Vec<Student> = match serde_json::from_value(value) {
        Ok(students) => students,
        Err(err) => {
            debug!(error = %err, "payload does not match the student schema");
            return None;
        }
    };
    match validate_students(&students) {
        Ok(()) => Some(students),
        Err(reason) => {
            debug!(%reason, "payload failed student validation");
            None
        }
    }
}

pub fn is_valid_payload(value: &serde_json::Value) -> bool {
    parse_valid_payload(value.clone()).is_some()
}

/// Three-tier cache over the student list.
pub struct TieredCache {
    store: LocalStore,
    snapshot: Option<Arc<dyn SnapshotSource>>,
    live: Arc<dyn LiveSource>,
    course: Arc<Course>,
    local_ttl: Duration,
    snapshot_ttl: Duration,
    clock: Clock,
    progress: Arc<ProgressFn<'static>>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    last: std::sync::Mutex<Option<(DataSource, DateTime<Utc>)>>,
}

impl TieredCache {
    pub fn new(store: LocalStore, live: Arc<dyn LiveSource>, course: Arc<Course>) -> Self {
        Self {
            store,
            snapshot: None,
            live,
            course,
            local_ttl: DEFAULT_LOCAL_TTL,
            snapshot_ttl: DEFAULT_SNAPSHOT_TTL,
            clock: Arc::new(Utc::now),
            progress: Arc::new(no_progress),
            refresh_locks: Mutex::new(HashMap::new()),
            last: std::sync::Mutex::new(None),
        }
    }

    pub fn with_snapshot(mut self, snapshot: Arc<dyn SnapshotSource>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn ttls(mut self, local: Duration, snapshot: Duration) -> Self {
        self.local_ttl = local;
        self.snapshot_ttl = snapshot;
        self
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn progress(mut self, progress: Arc<ProgressFn<'static>>) -> Self {
        self.progress = progress;
        self
    }

    pub fn course(&self) -> &Course {
        &self.course
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// All students, from the fastest tier that has fresh, valid data.
    ///
    /// `force_refresh` goes straight to the live fetch.
    #[instrument(skip(self))]
    pub async fn get_all_students(&self, force_refresh: bool) -> Result<Vec<Student>> {
        let key = ALL_STUDENTS_KEY;
        let mut state = if force_refresh {
            LookupState::Tier3Live
        } else {
            LookupState::CheckTier1
        };

        loop {
            state = match state {
                LookupState::CheckTier1 => match self.check_local(key) {
                    Some(answer) => LookupState::Settled(answer),
                    None => LookupState::CheckTier2,
                },
                LookupState::CheckTier2 => match self.check_snapshot(key).await {
                    Some(answer) => LookupState::Settled(answer),
                    None => LookupState::Tier3Live,
                },
                LookupState::Tier3Live => {
                    LookupState::Settled(self.refresh_live(key, !force_refresh).await?)
                }
                LookupState::Settled(answer) => {
                    info!(source = %answer.source, students = answer.students.len(), "students ready");
                    self.record(answer.source, answer.timestamp);
                    return Ok(answer.students);
                }
            };
        }
    }

    /// One student with the per-entry breakdown, matched case-insensitively.
    pub async fn get_student_details(&self, username: &str) -> Result<Option<StudentDetails>> {
        let students = self.get_all_students(false).await?;
        Ok(students
            .into_iter()
            .find(|s| s.username.eq_ignore_ascii_case(username))
            .map(|student| {
                let entries = resolver::entry_progress(&student, &self.course);
                StudentDetails { student, entries }
            }))
    }

    /// Source and age of the data last handed out, or of the local entry on disk
    /// when nothing has been served yet.
    pub fn get_cache_info(&self) -> CacheInfo {
        let now = self.now();
        let last = self.last.lock().ok().and_then(|guard| *guard);
        let (source, timestamp) = match last {
            Some(last) => last,
            None => match self.store.read_raw(ALL_STUDENTS_KEY) {
                Ok(Some(entry)) => (DataSource::Tier1, entry.written_at),
                _ => {
                    return CacheInfo {
                        source: DataSource::None,
                        timestamp: None,
                        age: None,
                    };
                }
            },
        };

        CacheInfo {
            source,
            timestamp: Some(timestamp),
            age: Some(age_at(timestamp, now)),
        }
    }

    /// Drop every local entry. The published snapshot is left alone.
    pub fn clear_all_caches(&self) -> Result<usize> {
        let removed = self.store.clear()?;
        if let Ok(mut last) = self.last.lock() {
            *last = None;
        }
        info!(removed, "cleared local cache");
        Ok(removed)
    }

    /// Whatever valid data the local store holds, however old. Used to keep
    /// showing something when a refresh fails.
    pub fn peek_local(&self) -> Option<(Vec<Student>, DateTime<Utc>)> {
        let entry = self.store.read_raw(ALL_STUDENTS_KEY).ok()??;
        let written_at = entry.written_at;
        self.course_payload(entry.payload)
            .map(|students| (students, written_at))
    }

    /// A valid payload whose students were graded against this course's entry count.
    fn course_payload(&self, value: serde_json::Value) -> Option<Vec<Student>> {
        let students = parse_valid_payload(value)?;
        let total = self.course.total_entries();
        match students.iter().find(|s| s.total_assignments != total) {
            Some(other) => {
                debug!(
                    username = %other.username,
                    found = other.total_assignments,
                    expected = total,
                    "payload was built for a different course"
                );
                None
            }
            None => Some(students),
        }
    }

    fn record(&self, source: DataSource, timestamp: DateTime<Utc>) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some((source, timestamp));
        }
    }

    fn discard_local(&self, key: &str) {
        if let Err(err) = self.store.delete(key) {
            warn!(%key, error = %err, "failed to delete local cache entry");
        }
    }

    fn write_local(&self, key: &str, students: &[Student], now: DateTime<Utc>) {
        let entry = CacheEntry::new(key, students, now, self.local_ttl);
        if let Err(err) = self.store.write(&entry) {
            warn!(%key, error = %err, "failed to write local cache entry");
        }
    }

    fn check_local(&self, key: &str) -> Option<Answer> {
        let entry = match self.store.read_raw(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(%key, "local cache miss");
                return None;
            }
            Err(err) => {
                warn!(%key, error = %err, "unreadable local cache entry, discarding");
                self.discard_local(key);
                return None;
            }
        };

        let now = self.now();
        let written_at = entry.written_at;
        let expired = entry.is_expired(now);
        let Some(students) = self.course_payload(entry.payload) else {
            warn!(%key, "local cache entry has an invalid shape, discarding");
            self.discard_local(key);
            return None;
        };

        if expired || !is_within_ttl(written_at, now, self.local_ttl) {
            debug!(%key, %written_at, "local cache entry is stale");
            return None;
        }

        Some(Answer {
            students,
            source: DataSource::Tier1,
            timestamp: written_at,
        })
    }

    async fn check_snapshot(&self, key: &str) -> Option<Answer> {
        let source = self.snapshot.as_ref()?;

        let raw = match source.load().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(source = %source.describe(), "no snapshot published");
                return None;
            }
            Err(err) => {
                warn!(source = %source.describe(), error = %err, "snapshot unavailable, falling through");
                return None;
            }
        };

        let now = self.now();
        let generated_at = raw.metadata.generated_at;
        if !is_within_ttl(generated_at, now, self.snapshot_ttl) {
            debug!(%generated_at, "snapshot is stale");
            return None;
        }

        let Some(students) = self.course_payload(raw.students) else {
            warn!(source = %source.describe(), "snapshot has an invalid shape, ignoring");
            return None;
        };

        self.write_local(key, &students, now);
        Some(Answer {
            students,
            source: DataSource::Tier2,
            timestamp: generated_at,
        })
    }

    async fn refresh_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Live fetch under the per-key refresh lock, written through to the local store.
    ///
    /// With `recheck`, a refresh that completed while this call waited for the
    /// lock is reused instead of fetching again.
    async fn refresh_live(&self, key: &str, recheck: bool) -> Result<Answer> {
        let lock = self.refresh_lock(key).await;
        let _guard = lock.lock().await;

        if recheck {
            if let Some(answer) = self.check_local(key) {
                debug!(%key, "refresh finished while waiting, reusing it");
                return Ok(answer);
            }
        }

        let fetch = self.live.fetch_students(self.progress.as_ref()).await?;
        let now = self.now();
        self.write_local(key, &fetch.students, now);

        Ok(Answer {
            students: fetch.students,
            source: DataSource::Tier3,
            timestamp: now,
        })
    }
}
