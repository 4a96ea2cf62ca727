//! Keyword-family heuristic grader

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::intents::{classify, rule_for, CriterionIntent};
use super::{Evaluation, Grader, GradingError};
use crate::dataset::{Criterion, Rubric};

/// How the heuristic grader decides whether a penalty criterion was avoided.
///
/// Keyword matching cannot tell whether a response contains harmful content,
/// so this is a replaceable policy rather than a fixed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PenaltyPolicy {
    /// Any response longer than `min_chars` characters is assumed to avoid
    /// the undesired behaviour
    LengthProxy { min_chars: usize },
    /// Never credit penalty criteria
    NeverCredit,
}

impl PenaltyPolicy {
    pub fn avoided(&self, response: &str) -> bool {
        match self {
            PenaltyPolicy::LengthProxy { min_chars } => response.chars().count() > *min_chars,
            PenaltyPolicy::NeverCredit => false,
        }
    }
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        PenaltyPolicy::LengthProxy { min_chars: 20 }
    }
}

/// Grades each criterion independently against the intent table.
///
/// Pure: the same response and rubric always produce the same evaluation.
#[derive(Debug, Clone, Default)]
pub struct HeuristicGrader {
    penalty_policy: PenaltyPolicy,
}

impl HeuristicGrader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_penalty_policy(mut self, policy: PenaltyPolicy) -> Self {
        self.penalty_policy = policy;
        self
    }

    /// Whether `criterion` is satisfied by `response`.
    ///
    /// For penalty-intent criteria "satisfied" means the undesired behaviour
    /// was judged absent.
    pub fn matches(&self, response: &str, criterion: &Criterion) -> bool {
        let response_lower = response.to_lowercase();
        self.matches_intents(response, &response_lower, &classify(&criterion.criterion))
    }

    fn matches_intents(
        &self,
        response: &str,
        response_lower: &str,
        intents: &[CriterionIntent],
    ) -> bool {
        if intents.contains(&CriterionIntent::Penalty) {
            return self.penalty_policy.avoided(response);
        }

        intents
            .iter()
            .filter_map(|intent| rule_for(*intent))
            .any(|rule| rule.satisfied_by(response, response_lower))
    }

    /// Points awarded for one criterion
    pub fn award(&self, response: &str, criterion: &Criterion) -> f64 {
        let response_lower = response.to_lowercase();
        self.award_with(response, &response_lower, criterion)
    }

    fn award_with(&self, response: &str, response_lower: &str, criterion: &Criterion) -> f64 {
        let intents = classify(&criterion.criterion);
        if !self.matches_intents(response, response_lower, &intents) {
            return 0.0;
        }

        if intents.contains(&CriterionIntent::Penalty) {
            criterion.points.abs()
        } else {
            criterion.points
        }
    }

    /// Grade a whole rubric
    pub fn evaluate(&self, response: &str, rubric: &Rubric) -> Evaluation {
        let response_lower = response.to_lowercase();
        let awards: Vec<f64> = rubric
            .iter()
            .map(|c| self.award_with(response, &response_lower, c))
            .collect();

        let satisfied = awards.iter().filter(|a| **a != 0.0).count();
        let reasoning = format!(
            "heuristic keyword match: {} of {} criteria satisfied",
            satisfied,
            rubric.len()
        );

        Evaluation::from_awards(rubric, awards, Some(reasoning))
    }
}

#[async_trait]
impl Grader for HeuristicGrader {
    fn name(&self) -> String {
        "heuristic".to_string()
    }

    async fn grade(&self, response: &str, rubric: &Rubric) -> Result<Evaluation, GradingError> {
        Ok(self.evaluate(response, rubric))
    }
}
