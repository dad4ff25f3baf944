// Application configuration.
// Layered from config/default.toml, config/local.toml, and GRADE_MANAGER__* environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::course::Course;
use crate::error::{GradeError, Result};

const ENV_PREFIX: &str = "GRADE_MANAGER";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub course: CourseConfig,
}

impl AppConfig {
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Config::builder()
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/default")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/local")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Token from configuration, falling back to `GITHUB_TOKEN`.
    pub fn github_token(&self) -> Result<String> {
        self.github
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
            .ok_or(GradeError::MissingToken)
    }

    /// The course to evaluate: the configured JSON definition or the built-in one.
    pub fn load_course(&self) -> Result<Course> {
        let mut course = match &self.course.file {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                serde_json::from_slice(&bytes)?
            }
            None => Course::default(),
        };
        if let Some(prefix) = &self.course.org_prefix {
            course.org_prefix = prefix.clone();
        }
        Ok(course)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub organization: String,
    /// API root override for GitHub Enterprise.
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_ttl_local_secs")]
    pub ttl_local_secs: u64,
    #[serde(default = "CacheConfig::default_ttl_snapshot_secs")]
    pub ttl_snapshot_secs: u64,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl CacheConfig {
    const fn default_ttl_local_secs() -> u64 {
        30 * 60
    }

    const fn default_ttl_snapshot_secs() -> u64 {
        2 * 60 * 60
    }

    pub fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_local_secs)
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_snapshot_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_local_secs: Self::default_ttl_local_secs(),
            ttl_snapshot_secs: Self::default_ttl_snapshot_secs(),
            dir: None,
        }
    }
}

/// Where the published snapshot lives. A directory wins over a URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "SyncConfig::default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "SyncConfig::default_per_page")]
    pub per_page: u32,
}

impl SyncConfig {
    const fn default_batch_size() -> usize {
        crate::sync::DEFAULT_BATCH_SIZE
    }

    const fn default_per_page() -> u32 {
        100
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: Self::default_batch_size(),
            per_page: Self::default_per_page(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseConfig {
    /// JSON course definition; the built-in course is used when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub org_prefix: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_layered_files_with_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("config")).unwrap();
        std::fs::write(
            dir.path().join("config/default.toml"),
            "[github]\norganization = \"cs50-fall\"\n\n[cache]\nttl_local_secs = 60\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("config/local.toml"),
            "[cache]\nttl_local_secs = 90\n\n[sync]\nbatch_size = 10\n",
        )
        .unwrap();

        let config = AppConfig::load_from_path(dir.path()).unwrap();
        assert_eq!(config.github.organization, "cs50-fall");
        assert_eq!(config.cache.local_ttl(), Duration::from_secs(90));
        assert_eq!(config.cache.snapshot_ttl(), Duration::from_secs(7200));
        assert_eq!(config.sync.batch_size, 10);
        assert_eq!(config.sync.per_page, 100);
        assert!(config.snapshot.dir.is_none());
    }

    #[test]
    fn course_file_and_prefix_override() {
        let dir = TempDir::new().unwrap();
        let course_path = dir.path().join("course.json");
        std::fs::write(
            &course_path,
            r#"{"title": "Mini", "orgPrefix": "old-", "entries": [{"kind": "required", "name": "hello"}]}"#,
        )
        .unwrap();

        let mut config = AppConfig::default();
        assert_eq!(config.load_course().unwrap().total_entries(), 14);

        config.course.file = Some(course_path);
        config.course.org_prefix = Some("mini-2024-".to_string());
        let course = config.load_course().unwrap();
        assert_eq!(course.title, "Mini");
        assert_eq!(course.org_prefix, "mini-2024-");
        assert_eq!(course.total_entries(), 1);
    }

    #[test]
    fn configured_token_wins() {
        let mut config = AppConfig::default();
        config.github.token = Some("ghp_configured".to_string());
        assert_eq!(config.github_token().unwrap(), "ghp_configured");
    }
}
