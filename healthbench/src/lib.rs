//! HealthBench evaluation harness
//!
//! Runs a conversational model over HealthBench test cases and grades each
//! answer against the case's rubric of weighted criteria.
//!
//! # Features
//!
//! - Standard, hard, consensus and built-in sample dataset variants
//! - Ollama and OpenAI-compatible chat providers
//! - Offline keyword-family grader and an LLM judge grader
//! - Penalty (negative-point) criteria
//! - Per-tag breakdown and JSON result output
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use healthbench::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let chat = create_chat_provider(&config.chat, None)?;
//!     let scorer = RubricScorer::new(Arc::new(HeuristicGrader::new()));
//!     let executor = Executor::new(CaseRunner::new(chat, scorer));
//!
//!     let request = RunRequest::new(config.dataset_source("sample")?, "sample");
//!     let sink = JsonFileSink::new("healthbench_results.json");
//!     let report = run_benchmark(&executor, &request, &sink).await?;
//!     print_console_report(&report);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dataset;
pub mod grading;
pub mod providers;
pub mod report;
pub mod runner;

pub use config::Config;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{ChatBackend, Config};
    pub use crate::dataset::{CaseId, Criterion, DatasetLoadError, DatasetSource, Rubric, TestCase};
    pub use crate::grading::{
        create_grader, Evaluation, Grader, GraderKind, GradingError, HeuristicGrader, JudgeGrader,
        PenaltyPolicy, RubricScorer,
    };
    pub use crate::providers::{
        create_chat_provider, create_judge_provider, CompletionRequest, CompletionResponse,
        LLMProvider, Message, ProviderError, ProviderResult, Role,
    };
    pub use crate::report::{
        aggregate, print_console_report, EmptyRunError, JsonFileSink, ResultSink, RunMetadata,
        RunReport,
    };
    pub use crate::runner::{
        run_benchmark, CaseResult, CaseRunner, ConsoleProgress, Executor, NoOpProgress,
        ProgressCallback, RunError, RunRequest, StopSignal,
    };
}
