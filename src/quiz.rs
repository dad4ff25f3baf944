// Quiz result submissions.
// Results are appended to a JSON array kept in one file of a gist.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{GradeError, Result};
use crate::github::{Gist, GitHubClient};

/// One submitted quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub username: String,
    pub quiz_id: String,
    pub score: u32,
    pub total: u32,
    pub submitted_at: DateTime<Utc>,
}

impl QuizResult {
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(GradeError::InvalidQuizResult("username is empty".to_string()));
        }
        if self.quiz_id.trim().is_empty() {
            return Err(GradeError::InvalidQuizResult("quiz id is empty".to_string()));
        }
        if self.score > self.total {
            return Err(GradeError::InvalidQuizResult(format!(
                "score {} exceeds total {}",
                self.score, self.total
            )));
        }
        Ok(())
    }
}

/// Gist access needed to record results.
#[async_trait]
pub trait GistStore: Send + Sync {
    async fn fetch_gist(&self, gist_id: &str) -> Result<Gist>;
    async fn write_gist_file(&self, gist_id: &str, file_name: &str, content: &str) -> Result<()>;
}

#[async_trait]
impl GistStore for GitHubClient {
    async fn fetch_gist(&self, gist_id: &str) -> Result<Gist> {
        self.get_gist(gist_id).await
    }

    async fn write_gist_file(&self, gist_id: &str, file_name: &str, content: &str) -> Result<()> {
        self.update_gist_file(gist_id, file_name, content).await?;
        Ok(())
    }
}

/// Existing results in a gist file. A missing or blank file is an empty list.
fn existing_results(gist: &Gist, file_name: &str) -> Result<Vec<Value>> {
    let Some(file) = gist.files.get(file_name) else {
        return Ok(Vec::new());
    };
    if file.truncated {
        return Err(GradeError::Other(format!(
            "gist file {} is truncated, refusing to rewrite it",
            file_name
        )));
    }

    let content = file.content.as_deref().unwrap_or_default();
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(content)? {
        Value::Array(items) => Ok(items),
        _ => Err(GradeError::Other(format!(
            "gist file {} does not hold a JSON array",
            file_name
        ))),
    }
}

/// Append a validated result to the array in `file_name` and write it back.
///
/// Returns the number of results the file holds afterwards.
pub async fn append_quiz_result<S: GistStore + ?Sized>(
    store: &S,
    gist_id: &str,
    file_name: &str,
    result: &QuizResult,
) -> Result<usize> {
    result.validate()?;

    let gist = store.fetch_gist(gist_id).await?;
    let mut results = existing_results(&gist, file_name)?;
    results.push(serde_json::to_value(result)?);

    let content = serde_json::to_string_pretty(&results)?;
    store.write_gist_file(gist_id, file_name, &content).await?;

    info!(
        %gist_id,
        file = %file_name,
        username = %result.username,
        quiz = %result.quiz_id,
        count = results.len(),
        "recorded quiz result"
    );
    Ok(results.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use chrono::TimeZone;

    use crate::github::GistFile;

    struct FakeGists {
        files: Mutex<BTreeMap<String, String>>,
        writes: Mutex<usize>,
    }

    impl FakeGists {
        fn with_file(name: &str, content: &str) -> Self {
            let mut files = BTreeMap::new();
            files.insert(name.to_string(), content.to_string());
            Self {
                files: Mutex::new(files),
                writes: Mutex::new(0),
            }
        }

        fn empty() -> Self {
            Self {
                files: Mutex::new(BTreeMap::new()),
                writes: Mutex::new(0),
            }
        }

        fn content(&self, name: &str) -> Option<String> {
            self.files.lock().unwrap().get(name).cloned()
        }
    }

    #[async_trait]
    impl GistStore for FakeGists {
        async fn fetch_gist(&self, gist_id: &str) -> Result<Gist> {
            let files = self
                .files
                .lock()
                .unwrap()
                .iter()
                .map(|(name, content)| {
                    (
                        name.clone(),
                        GistFile {
                            filename: Some(name.clone()),
                            content: Some(content.clone()),
                            truncated: false,
                        },
                    )
                })
                .collect();
            Ok(Gist {
                id: gist_id.to_string(),
                files,
            })
        }

        async fn write_gist_file(&self, _: &str, file_name: &str, content: &str) -> Result<()> {
            *self.writes.lock().unwrap() += 1;
            self.files
                .lock()
                .unwrap()
                .insert(file_name.to_string(), content.to_string());
            Ok(())
        }
    }

    fn result(username: &str, score: u32, total: u32) -> QuizResult {
        QuizResult {
            username: username.to_string(),
            quiz_id: "week-1".to_string(),
            score,
            total,
            submitted_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn validation() {
        assert!(result("alice", 8, 10).validate().is_ok());
        assert!(result("alice", 10, 10).validate().is_ok());
        assert!(matches!(
            result("alice", 11, 10).validate(),
            Err(GradeError::InvalidQuizResult(_))
        ));
        assert!(result(" ", 1, 10).validate().is_err());
    }

    #[tokio::test]
    async fn appends_to_existing_array() {
        let store = FakeGists::with_file(
            "results.json",
            r#"[{"username":"bob","quizId":"week-1","score":5,"total":10,"submittedAt":"2024-02-01T00:00:00Z"}]"#,
        );

        let count = append_quiz_result(&store, "g1", "results.json", &result("alice", 8, 10))
            .await
            .unwrap();
        assert_eq!(count, 2);

        let saved: Vec<QuizResult> =
            serde_json::from_str(&store.content("results.json").unwrap()).unwrap();
        assert_eq!(saved[0].username, "bob");
        assert_eq!(saved[1], result("alice", 8, 10));
    }

    #[tokio::test]
    async fn missing_file_starts_a_new_array() {
        let store = FakeGists::empty();
        let count = append_quiz_result(&store, "g1", "results.json", &result("alice", 3, 5))
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert!(store.content("results.json").unwrap().contains("\"quizId\": \"week-1\""));
    }

    #[tokio::test]
    async fn non_array_file_is_never_overwritten() {
        let store = FakeGists::with_file("results.json", r#"{"note": "keep me"}"#);
        let err = append_quiz_result(&store, "g1", "results.json", &result("alice", 3, 5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("JSON array"));
        assert_eq!(*store.writes.lock().unwrap(), 0);
        assert_eq!(store.content("results.json").unwrap(), r#"{"note": "keep me"}"#);
    }

    #[tokio::test]
    async fn invalid_result_is_rejected_before_any_request() {
        let store = FakeGists::empty();
        let err = append_quiz_result(&store, "g1", "results.json", &result("alice", 6, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, GradeError::InvalidQuizResult(_)));
        assert_eq!(*store.writes.lock().unwrap(), 0);
    }
}
