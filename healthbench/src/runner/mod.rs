//! Benchmark execution engine

pub mod case_runner;
pub mod progress;

pub use case_runner::{CaseRunner, MalformedCaseError};
pub use progress::{ConsoleProgress, NoOpProgress, ProgressCallback};

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::dataset::{CaseId, DatasetLoadError, DatasetSource, TestCase};
use crate::grading::Evaluation;
use crate::report::{aggregate, EmptyRunError, ResultSink, RunMetadata, RunReport, SinkError};

/// Wall-clock timings for one case, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub response_time: f64,
    pub grading_time: f64,
    pub total_time: f64,
}

impl Timings {
    pub fn new(response_time: f64, grading_time: f64) -> Self {
        Self {
            response_time,
            grading_time,
            total_time: response_time + grading_time,
        }
    }
}

/// A case that was answered and graded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSuccess {
    pub case_id: CaseId,
    pub question: String,
    pub response: String,
    pub evaluation: Evaluation,
    pub timings: Timings,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A case whose chat call failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFailure {
    pub case_id: CaseId,
    pub question: String,
    #[serde(rename = "error")]
    pub error_message: String,
}

/// Per-case record. Serialized with a `status` discriminator so consumers
/// can tell failures from zero-scored successes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CaseResult {
    Success(CaseSuccess),
    Failure(CaseFailure),
}

impl CaseResult {
    pub fn case_id(&self) -> &CaseId {
        match self {
            CaseResult::Success(s) => &s.case_id,
            CaseResult::Failure(f) => &f.case_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CaseResult::Success(_))
    }

    pub fn as_success(&self) -> Option<&CaseSuccess> {
        match self {
            CaseResult::Success(s) => Some(s),
            CaseResult::Failure(_) => None,
        }
    }

    pub fn rubric_score(&self) -> f64 {
        self.as_success().map_or(0.0, |s| s.evaluation.score)
    }

    pub fn rubric_max(&self) -> f64 {
        self.as_success().map_or(0.0, |s| s.evaluation.max_score)
    }

    pub fn percentage(&self) -> f64 {
        self.as_success().map_or(0.0, |s| s.evaluation.percentage)
    }
}

/// Cooperative stop flag, checked between cases
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs cases one after another through a [`CaseRunner`]
pub struct Executor {
    runner: CaseRunner,
    progress: Arc<dyn ProgressCallback>,
    stop: StopSignal,
}

impl Executor {
    pub fn new(runner: CaseRunner) -> Self {
        Self {
            runner,
            progress: Arc::new(NoOpProgress),
            stop: StopSignal::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn model_name(&self) -> &str {
        self.runner.model_name()
    }

    pub fn grader_name(&self) -> String {
        self.runner.grader_name()
    }

    /// Execute cases sequentially. Malformed cases are skipped; a stop
    /// request ends the loop before the next case starts.
    pub async fn execute_cases(&self, cases: &[TestCase]) -> Vec<CaseResult> {
        let total = cases.len();
        let mut results = Vec::with_capacity(total);

        for (i, case) in cases.iter().enumerate() {
            if self.stop.is_stopped() {
                tracing::warn!("Stop requested, {} of {} cases not run", total - i, total);
                break;
            }

            let index = i + 1;
            self.progress.on_case_start(index, total, case);

            match self.runner.run(case).await {
                Ok(result) => {
                    self.progress.on_case_complete(index, total, &result);
                    results.push(result);
                }
                Err(e) => {
                    tracing::warn!("Skipping malformed case: {}", e);
                    self.progress.on_case_skipped(index, total, &e);
                }
            }
        }

        results
    }
}

/// Errors that abort a whole run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Dataset load failed: {0}")]
    DatasetLoad(#[from] DatasetLoadError),

    #[error(transparent)]
    EmptyRun(#[from] EmptyRunError),

    #[error("Failed to persist results: {0}")]
    Sink(#[from] SinkError),
}

/// What to run and how to label it
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: DatasetSource,
    pub dataset_name: String,
    pub limit: Option<usize>,
    pub dataset_timeout: Duration,
    pub pass_threshold: f64,
}

impl RunRequest {
    pub fn new(source: DatasetSource, dataset_name: impl Into<String>) -> Self {
        Self {
            source,
            dataset_name: dataset_name.into(),
            limit: None,
            dataset_timeout: Duration::from_millis(60_000),
            pass_threshold: 50.0,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_dataset_timeout(mut self, timeout: Duration) -> Self {
        self.dataset_timeout = timeout;
        self
    }

    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }
}

/// Load the dataset, run every case, aggregate and persist.
///
/// Nothing is written when no case succeeds.
pub async fn run_benchmark(
    executor: &Executor,
    request: &RunRequest,
    sink: &dyn ResultSink,
) -> Result<RunReport, RunError> {
    let cases = request
        .source
        .load(request.limit, request.dataset_timeout)
        .await?;

    let metadata = RunMetadata::new(executor.model_name(), &request.dataset_name)
        .with_grader(executor.grader_name())
        .with_pass_threshold(request.pass_threshold);

    tracing::info!(
        "Running {} cases with model {} ({} grader)",
        cases.len(),
        metadata.model_name,
        metadata.grader
    );

    let results = executor.execute_cases(&cases).await;
    let report = aggregate(results, metadata)?;

    sink.write(&report)?;
    tracing::info!(
        "Run complete: {}/{} evaluated, average {:.1}%",
        report.evaluated_cases,
        report.total_cases,
        report.average_percentage
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(id: i64, percentage: f64) -> CaseResult {
        CaseResult::Success(CaseSuccess {
            case_id: CaseId::from(id),
            question: "q".to_string(),
            response: "r".to_string(),
            evaluation: Evaluation {
                score: percentage / 10.0,
                max_score: 10.0,
                percentage,
                per_criterion_scores: Vec::new(),
                reasoning: None,
            },
            timings: Timings::new(1.5, 0.5),
            tags: Vec::new(),
        })
    }

    #[test]
    fn test_timings_total() {
        let t = Timings::new(1.25, 0.5);
        assert_eq!(t.total_time, 1.75);
    }

    #[test]
    fn test_result_status_tag() {
        let ok = serde_json::to_value(success(1, 80.0)).unwrap();
        assert_eq!(ok["status"], "success");
        assert_eq!(ok["case_id"], 1);
        assert_eq!(ok["evaluation"]["percentage"], 80.0);

        let failed = CaseResult::Failure(CaseFailure {
            case_id: CaseId::from("abc"),
            question: "q".to_string(),
            error_message: "Timeout after 300000ms".to_string(),
        });
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["error"], "Timeout after 300000ms");
        assert_eq!(failed.rubric_max(), 0.0);

        let back: CaseResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, failed);
    }

    #[test]
    fn test_stop_signal_is_shared() {
        let signal = StopSignal::new();
        let handle = signal.clone();
        assert!(!signal.is_stopped());
        handle.stop();
        assert!(signal.is_stopped());
    }
}
