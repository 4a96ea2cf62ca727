//! Rubric scorer: strategy-agnostic wrapper that never fails

use std::sync::Arc;

use super::{Evaluation, Grader};
use crate::dataset::Rubric;

/// Applies a [`Grader`] to a rubric, degrading grader errors to a
/// zero-scored evaluation that records the error in `reasoning`.
#[derive(Clone)]
pub struct RubricScorer {
    grader: Arc<dyn Grader>,
}

impl RubricScorer {
    pub fn new(grader: Arc<dyn Grader>) -> Self {
        Self { grader }
    }

    pub fn grader_name(&self) -> String {
        self.grader.name()
    }

    pub async fn score(&self, response: &str, rubric: &Rubric) -> Evaluation {
        match self.grader.grade(response, rubric).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::warn!("Grading failed, scoring as zero: {}", e);
                Evaluation::fallback(rubric, e.to_string())
            }
        }
    }
}
