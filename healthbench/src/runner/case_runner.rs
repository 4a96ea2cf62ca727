//! Drives one test case from chat call to graded result

use std::sync::Arc;
use std::time::Instant;

use super::{CaseFailure, CaseResult, CaseSuccess, Timings};
use crate::dataset::{CaseId, TestCase};
use crate::grading::RubricScorer;
use crate::providers::LLMProvider;

/// The case has no conversation to present to the model. It is skipped and
/// counted neither as a success nor as a failure.
#[derive(Debug, thiserror::Error)]
#[error("case {case_id} has an empty conversation")]
pub struct MalformedCaseError {
    pub case_id: CaseId,
}

/// Runs a single case: chat, then grade
#[derive(Clone)]
pub struct CaseRunner {
    chat: Arc<dyn LLMProvider + Send + Sync>,
    scorer: RubricScorer,
}

impl CaseRunner {
    pub fn new(chat: Arc<dyn LLMProvider + Send + Sync>, scorer: RubricScorer) -> Self {
        Self { chat, scorer }
    }

    pub fn model_name(&self) -> &str {
        self.chat.default_model()
    }

    pub fn grader_name(&self) -> String {
        self.scorer.grader_name()
    }

    /// Run one case. Chat-provider errors become [`CaseResult::Failure`];
    /// they never propagate.
    pub async fn run(&self, case: &TestCase) -> Result<CaseResult, MalformedCaseError> {
        if case.is_malformed() {
            return Err(MalformedCaseError {
                case_id: case.id.clone(),
            });
        }

        let question = case.question().to_string();

        let start = Instant::now();
        let response = match self.chat.chat(&case.conversation).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Chat provider failed on case {}: {}", case.id, e);
                return Ok(CaseResult::Failure(CaseFailure {
                    case_id: case.id.clone(),
                    question,
                    error_message: e.to_string(),
                }));
            }
        };
        let response_time = start.elapsed().as_secs_f64();

        let grading_start = Instant::now();
        let evaluation = self.scorer.score(&response, &case.rubric).await;
        let grading_time = grading_start.elapsed().as_secs_f64();

        tracing::debug!(
            "Case {} scored {}/{} in {:.2}s + {:.2}s",
            case.id,
            evaluation.score,
            evaluation.max_score,
            response_time,
            grading_time
        );

        Ok(CaseResult::Success(CaseSuccess {
            case_id: case.id.clone(),
            question,
            response,
            evaluation,
            timings: Timings::new(response_time, grading_time),
            tags: case.tags.clone(),
        }))
    }
}
