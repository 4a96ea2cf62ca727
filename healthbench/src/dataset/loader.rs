//! Test case loading from newline-delimited JSON sources

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::{CaseId, Criterion, Rubric, TestCase};
use crate::providers::Message;

/// Name of the dataset compiled into the binary
pub const BUILTIN_SAMPLE: &str = "sample";

const SAMPLE_JSONL: &str = include_str!("../../data/sample.jsonl");

/// Error type for dataset loading. Always fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum DatasetLoadError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Fetching {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Timed out after {timeout_ms}ms fetching {url}")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unknown built-in dataset: {0}")]
    UnknownBuiltin(String),

    #[error("No test cases found in {0}")]
    Empty(String),
}

/// Where a dataset's NDJSON text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    Url(String),
    File(PathBuf),
    Builtin(String),
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetSource::Url(url) => f.write_str(url.rsplit('/').next().unwrap_or(url)),
            DatasetSource::File(path) => write!(f, "{}", path.display()),
            DatasetSource::Builtin(name) => write!(f, "builtin:{}", name),
        }
    }
}

impl DatasetSource {
    /// Fetch and parse the source, keeping at most `limit` cases
    pub async fn load(
        &self,
        limit: Option<usize>,
        timeout: Duration,
    ) -> Result<Vec<TestCase>, DatasetLoadError> {
        tracing::info!("Loading dataset from {}", self);

        let content = match self {
            DatasetSource::Url(url) => fetch(url, timeout).await?,
            DatasetSource::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| DatasetLoadError::Io {
                        path: path.clone(),
                        source,
                    })?
            }
            DatasetSource::Builtin(name) if name == BUILTIN_SAMPLE => SAMPLE_JSONL.to_string(),
            DatasetSource::Builtin(name) => {
                return Err(DatasetLoadError::UnknownBuiltin(name.clone()))
            }
        };

        let cases = parse_cases(&content, limit)?;
        if cases.is_empty() {
            return Err(DatasetLoadError::Empty(self.to_string()));
        }

        tracing::info!("Loaded {} test cases", cases.len());
        Ok(cases)
    }
}

async fn fetch(url: &str, timeout: Duration) -> Result<String, DatasetLoadError> {
    let request = async {
        let response = reqwest::get(url)
            .await
            .map_err(|source| DatasetLoadError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DatasetLoadError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| DatasetLoadError::Http {
            url: url.to_string(),
            source,
        })
    };

    tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| DatasetLoadError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })?
}

/// On-disk shape of one NDJSON line. Accepts both the HealthBench field
/// names and the shorter ones used by hand-written datasets.
#[derive(Deserialize)]
struct RawCase {
    #[serde(default, alias = "prompt_id")]
    id: Option<CaseId>,
    #[serde(default, alias = "prompt")]
    conversation: Vec<Message>,
    #[serde(default, alias = "rubrics")]
    rubric: Vec<Criterion>,
    #[serde(default, alias = "example_tags")]
    tags: Vec<String>,
}

/// Parse NDJSON text into test cases.
///
/// Blank lines are skipped. Cases without an id are numbered by their
/// position. Parsing stops once `limit` cases have been read, so trailing
/// lines past the limit are never inspected.
pub fn parse_cases(content: &str, limit: Option<usize>) -> Result<Vec<TestCase>, DatasetLoadError> {
    let mut cases = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        if limit.is_some_and(|n| cases.len() >= n) {
            break;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let raw: RawCase = serde_json::from_str(line).map_err(|e| DatasetLoadError::Parse {
            line: idx + 1,
            message: e.to_string(),
        })?;

        let mut tags = raw.tags;
        dedup_in_order(&mut tags);

        cases.push(TestCase {
            id: raw.id.unwrap_or(CaseId::Number(cases.len() as i64 + 1)),
            conversation: raw.conversation,
            rubric: Rubric::new(raw.rubric),
            tags,
        });
    }

    Ok(cases)
}

fn dedup_in_order(tags: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    tags.retain(|t| seen.insert(t.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Role;

    const HEALTHBENCH_LINES: &str = r#"{"prompt": [{"role": "user", "content": "I have a rash, what should I do?"}], "completion": null, "rubrics": [{"criterion": "Recommends seeing a doctor", "points": 5, "tags": ["axis:completeness"]}, {"criterion": "Suggests a harmful remedy", "points": -4, "tags": []}], "example_tags": ["theme:hedging", "theme:hedging"], "prompt_id": "a1b2"}

{"prompt": [{"role": "user", "content": "hi"}, {"role": "assistant", "content": "hello"}, {"role": "user", "content": "my chest hurts"}], "rubrics": [], "example_tags": [], "prompt_id": "c3d4"}
"#;

    #[test]
    fn test_parse_healthbench_shape() {
        let cases = parse_cases(HEALTHBENCH_LINES, None).unwrap();
        assert_eq!(cases.len(), 2);

        let first = &cases[0];
        assert_eq!(first.id, CaseId::from("a1b2"));
        assert_eq!(first.rubric.len(), 2);
        assert_eq!(first.rubric.criteria()[1].points, -4.0);
        assert_eq!(first.tags, vec!["theme:hedging".to_string()]);

        let second = &cases[1];
        assert_eq!(second.conversation.len(), 3);
        assert_eq!(second.conversation[1].role, Role::Assistant);
        assert_eq!(second.question(), "my chest hurts");
    }

    #[test]
    fn test_limit_truncates_before_bad_lines() {
        let content = format!("{}\nnot json at all\n", HEALTHBENCH_LINES.lines().next().unwrap());
        let cases = parse_cases(&content, Some(1)).unwrap();
        assert_eq!(cases.len(), 1);

        let err = parse_cases(&content, None).unwrap_err();
        assert!(matches!(err, DatasetLoadError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_missing_conversation_is_kept_for_runner_to_skip() {
        let cases = parse_cases(r#"{"rubric": [{"criteria": "x", "points": 1}]}"#, None).unwrap();
        assert_eq!(cases.len(), 1);
        assert!(cases[0].is_malformed());
        assert_eq!(cases[0].id, CaseId::Number(1));
    }

    #[tokio::test]
    async fn test_builtin_sample_loads() {
        let source = DatasetSource::Builtin(BUILTIN_SAMPLE.to_string());
        let cases = source.load(Some(3), Duration::from_secs(1)).await.unwrap();
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].id, CaseId::Number(1));
        assert!(cases.iter().all(|c| !c.rubric.is_empty()));
    }

    #[tokio::test]
    async fn test_file_source_and_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cases.jsonl");
        std::fs::write(&path, HEALTHBENCH_LINES).unwrap();
        let cases = DatasetSource::File(path)
            .load(None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(cases.len(), 2);

        let empty = dir.path().join("empty.jsonl");
        std::fs::write(&empty, "\n\n").unwrap();
        let err = DatasetSource::File(empty)
            .load(None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetLoadError::Empty(_)));
    }

    #[tokio::test]
    async fn test_url_source_status_error() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eval.jsonl"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HEALTHBENCH_LINES))
            .mount(&server)
            .await;

        let ok = DatasetSource::Url(format!("{}/eval.jsonl", server.uri()))
            .load(Some(1), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(ok.len(), 1);

        let err = DatasetSource::Url(format!("{}/missing.jsonl", server.uri()))
            .load(None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DatasetLoadError::Status { status: 404, .. }));
    }
}
