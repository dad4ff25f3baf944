// Pre-generated snapshot (tier 2).
// Reads and writes the `students.json` + `metadata.json` pair produced by the offline snapshot job.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GradeError, Result};
use crate::student::Student;

use super::paths;
use super::store::write_atomic;

/// Generation details stored next to the student list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub total_students: usize,
    #[serde(default)]
    pub total_repos: usize,
    #[serde(default)]
    pub total_assignments: usize,
}

/// A snapshot as loaded, before its student list has been validated.
#[derive(Debug, Clone)]
pub struct RawSnapshot {
    pub students: serde_json::Value,
    pub metadata: SnapshotMetadata,
}

/// A snapshot ready to be written.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub students: Vec<Student>,
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    pub fn new(
        students: Vec<Student>,
        organization: impl Into<String>,
        total_repos: usize,
        total_assignments: usize,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let metadata = SnapshotMetadata {
            generated_at,
            organization: organization.into(),
            total_students: students.len(),
            total_repos,
            total_assignments,
        };
        Self { students, metadata }
    }

    /// Write both snapshot files into `dir`.
    pub fn write_to_dir(&self, dir: &Path) -> Result<()> {
        let students = serde_json::to_string_pretty(&self.students)?;
        let metadata = serde_json::to_string_pretty(&self.metadata)?;
        // Students first, so a reader never sees fresh metadata over stale data.
        write_atomic(&paths::snapshot_students_path(dir), students.as_bytes())?;
        write_atomic(&paths::snapshot_metadata_path(dir), metadata.as_bytes())?;
        Ok(())
    }
}

/// Where tier 2 comes from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Load the snapshot, `Ok(None)` when none has been published.
    async fn load(&self) -> Result<Option<RawSnapshot>>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Snapshot files in a local directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotSource {
    dir: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    async fn load(&self) -> Result<Option<RawSnapshot>> {
        let students_path = paths::snapshot_students_path(&self.dir);
        let metadata_path = paths::snapshot_metadata_path(&self.dir);
        if !students_path.exists() || !metadata_path.exists() {
            return Ok(None);
        }

        let students = serde_json::from_str(&fs::read_to_string(&students_path)?)?;
        let metadata = serde_json::from_str(&fs::read_to_string(&metadata_path)?)?;
        Ok(Some(RawSnapshot { students, metadata }))
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Snapshot files served as static assets over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSnapshotSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch(&self, file: &str) -> Result<Option<reqwest::Response>> {
        let url = format!("{}/{}", self.base_url, file);
        debug!(%url, "fetching snapshot file");
        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response)),
            status => Err(GradeError::Upstream {
                status: status.as_u16(),
                message: format!("snapshot {} unavailable", url),
            }),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn load(&self) -> Result<Option<RawSnapshot>> {
        let Some(metadata) = self.fetch(paths::METADATA_FILE).await? else {
            return Ok(None);
        };
        let metadata: SnapshotMetadata = metadata.json().await?;

        let Some(students) = self.fetch(paths::STUDENTS_FILE).await? else {
            return Ok(None);
        };
        let students: serde_json::Value = students.json().await?;

        Ok(Some(RawSnapshot { students, metadata }))
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}
