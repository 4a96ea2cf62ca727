//! Rubric grading: criterion matching strategies and the rubric scorer

pub mod heuristic;
pub mod intents;
pub mod judge;
pub mod scorer;

pub use heuristic::{HeuristicGrader, PenaltyPolicy};
pub use intents::{classify, CriterionIntent, INTENT_RULES};
pub use judge::JudgeGrader;
pub use scorer::RubricScorer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::dataset::Rubric;
use crate::providers::{create_judge_provider, ProviderError, ProviderResult};

/// Outcome of grading one response against one rubric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: f64,
    pub max_score: f64,
    /// `100 * score / max_score`, or 0 for a zero-point rubric
    pub percentage: f64,
    /// Awarded points per criterion, in rubric order. Empty when the grader
    /// could not produce a per-criterion breakdown.
    #[serde(default)]
    pub per_criterion_scores: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Evaluation {
    /// Build from per-criterion awards; totals are derived from the rubric
    pub fn from_awards(rubric: &Rubric, awards: Vec<f64>, reasoning: Option<String>) -> Self {
        let score: f64 = awards.iter().sum();
        Self::from_total(rubric, score, awards, reasoning)
    }

    /// Build from an overall score when no consistent breakdown exists
    pub fn from_total(
        rubric: &Rubric,
        score: f64,
        per_criterion_scores: Vec<f64>,
        reasoning: Option<String>,
    ) -> Self {
        let max_score = rubric.max_score();
        Self {
            score,
            max_score,
            percentage: percentage_of(score, max_score),
            per_criterion_scores,
            reasoning,
        }
    }

    /// Zero-scored evaluation recording why grading did not happen
    pub fn fallback(rubric: &Rubric, reason: impl Into<String>) -> Self {
        Self::from_total(rubric, 0.0, Vec::new(), Some(reason.into()))
    }
}

/// Percentage of `score` over `max_score`, defined as 0 when `max_score` is 0
pub fn percentage_of(score: f64, max_score: f64) -> f64 {
    if max_score > 0.0 {
        score / max_score * 100.0
    } else {
        0.0
    }
}

/// Grading failures. Only the generative grader produces these; the rubric
/// scorer converts them into a fallback [`Evaluation`].
#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error("judge returned malformed output: {0}")]
    Parse(String),

    #[error("judge call failed: {0}")]
    Provider(#[from] ProviderError),
}

/// A strategy that turns a response and a rubric into an [`Evaluation`]
#[async_trait]
pub trait Grader: Send + Sync {
    /// Label recorded in reports (e.g. "heuristic", "judge:gpt-4")
    fn name(&self) -> String;

    async fn grade(&self, response: &str, rubric: &Rubric) -> Result<Evaluation, GradingError>;
}

/// Grading strategy selected at run construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GraderKind {
    /// Keyword-family matching, offline and deterministic
    Heuristic,
    /// External judge model scoring the whole rubric in one call
    Judge,
}

/// Create the configured grader. Only the judge strategy can fail, when its
/// API key is unavailable.
pub fn create_grader(
    kind: GraderKind,
    config: &Config,
    api_key: Option<&str>,
) -> ProviderResult<Arc<dyn Grader>> {
    match kind {
        GraderKind::Heuristic => Ok(Arc::new(HeuristicGrader::new().with_penalty_policy(
            PenaltyPolicy::LengthProxy {
                min_chars: config.run.penalty_min_chars,
            },
        ))),
        GraderKind::Judge => {
            let provider = create_judge_provider(&config.judge, api_key)?;
            Ok(Arc::new(
                JudgeGrader::new(provider).with_temperature(config.judge.temperature),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Criterion;

    #[test]
    fn test_percentage_zero_max() {
        assert_eq!(percentage_of(0.0, 0.0), 0.0);
        assert_eq!(percentage_of(3.0, 0.0), 0.0);
        assert_eq!(percentage_of(1.0, 4.0), 25.0);
    }

    #[test]
    fn test_fallback_keeps_rubric_max() {
        let rubric = Rubric::new(vec![Criterion::new("a", 2.0), Criterion::new("b", -1.0)]);
        let eval = Evaluation::fallback(&rubric, "judge timed out");
        assert_eq!(eval.score, 0.0);
        assert_eq!(eval.max_score, 3.0);
        assert_eq!(eval.percentage, 0.0);
        assert!(eval.per_criterion_scores.is_empty());
        assert_eq!(eval.reasoning.as_deref(), Some("judge timed out"));
    }

    #[test]
    fn test_create_heuristic_grader_uses_config_threshold() {
        let mut config = Config::default();
        config.run.penalty_min_chars = 5;
        let grader = create_grader(GraderKind::Heuristic, &config, None).unwrap();
        assert_eq!(grader.name(), "heuristic");
    }
}
