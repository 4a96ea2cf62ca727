//! Run-level aggregation of per-case records

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use super::{RunReport, TagSummary};
use crate::runner::{CaseResult, CaseSuccess};

/// No case in the run produced a graded response
#[derive(Debug, thiserror::Error)]
#[error("No case was evaluated successfully ({attempted} attempted)")]
pub struct EmptyRunError {
    pub attempted: usize,
}

/// Labels attached to a report
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub model_name: String,
    pub dataset_name: String,
    pub grader: String,
    pub started_at: DateTime<Utc>,
    pub pass_threshold: f64,
}

impl RunMetadata {
    pub fn new(model_name: impl Into<String>, dataset_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            dataset_name: dataset_name.into(),
            grader: "heuristic".to_string(),
            started_at: Utc::now(),
            pass_threshold: 50.0,
        }
    }

    pub fn with_grader(mut self, grader: impl Into<String>) -> Self {
        self.grader = grader.into();
        self
    }

    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }
}

fn mean(successes: &[&CaseSuccess], value: impl Fn(&CaseSuccess) -> f64) -> f64 {
    successes.iter().map(|s| value(*s)).sum::<f64>() / successes.len() as f64
}

#[derive(Default)]
struct TagAccumulator {
    cases: usize,
    percentage_sum: f64,
}

/// Build the run report.
///
/// Totals and averages cover successes only; `total_cases` counts every
/// record. Fails when there is no success to average over.
pub fn aggregate(
    results: Vec<CaseResult>,
    metadata: RunMetadata,
) -> Result<RunReport, EmptyRunError> {
    let successes: Vec<_> = results.iter().filter_map(CaseResult::as_success).collect();
    if successes.is_empty() {
        return Err(EmptyRunError {
            attempted: results.len(),
        });
    }

    let total_score = successes.iter().map(|s| s.evaluation.score).sum();
    let total_max = successes.iter().map(|s| s.evaluation.max_score).sum();
    let average_percentage = mean(&successes, |s| s.evaluation.percentage);
    let average_response_time = mean(&successes, |s| s.timings.response_time);
    let average_grading_time = mean(&successes, |s| s.timings.grading_time);
    let average_total_time = mean(&successes, |s| s.timings.total_time);

    let passed_cases = successes
        .iter()
        .filter(|s| s.evaluation.percentage >= metadata.pass_threshold)
        .count();

    let mut tags: IndexMap<String, TagAccumulator> = IndexMap::new();
    for s in &successes {
        for tag in &s.tags {
            let acc = tags.entry(tag.clone()).or_default();
            acc.cases += 1;
            acc.percentage_sum += s.evaluation.percentage;
        }
    }
    let tag_breakdown = tags
        .into_iter()
        .map(|(tag, acc)| {
            let summary = TagSummary {
                cases: acc.cases,
                average_percentage: acc.percentage_sum / acc.cases as f64,
            };
            (tag, summary)
        })
        .collect();

    let evaluated_cases = successes.len();
    let total_cases = results.len();

    Ok(RunReport {
        model_name: metadata.model_name,
        dataset_name: metadata.dataset_name,
        grader: metadata.grader,
        started_at: metadata.started_at.to_rfc3339(),
        total_cases,
        evaluated_cases,
        failed_cases: total_cases - evaluated_cases,
        passed_cases,
        pass_threshold: metadata.pass_threshold,
        total_score,
        total_max,
        average_percentage,
        average_response_time,
        average_grading_time,
        average_total_time,
        tag_breakdown,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::CaseId;
    use crate::grading::Evaluation;
    use crate::runner::{CaseFailure, Timings};

    fn success(id: i64, score: f64, max: f64, tags: &[&str]) -> CaseResult {
        CaseResult::Success(CaseSuccess {
            case_id: CaseId::from(id),
            question: format!("question {}", id),
            response: "response".to_string(),
            evaluation: Evaluation {
                score,
                max_score: max,
                percentage: score / max * 100.0,
                per_criterion_scores: Vec::new(),
                reasoning: None,
            },
            timings: Timings::new(2.0, 1.0),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        })
    }

    fn failure(id: i64) -> CaseResult {
        CaseResult::Failure(CaseFailure {
            case_id: CaseId::from(id),
            question: "question".to_string(),
            error_message: "Timeout after 300000ms".to_string(),
        })
    }

    #[test]
    fn test_failures_excluded_from_averages() {
        let results = vec![
            success(1, 4.0, 4.0, &[]),
            success(2, 2.0, 4.0, &[]),
            success(3, 0.0, 4.0, &[]),
            failure(4),
        ];
        let report = aggregate(results, RunMetadata::new("medical-assistant", "standard")).unwrap();

        assert_eq!(report.average_percentage, 50.0);
        assert_eq!(report.total_cases, 4);
        assert_eq!(report.evaluated_cases, 3);
        assert_eq!(report.failed_cases, 1);
        assert_eq!(report.total_score, 6.0);
        assert_eq!(report.total_max, 12.0);
        assert_eq!(report.passed_cases, 2);
        assert_eq!(report.average_total_time, 3.0);
        assert_eq!(report.results.len(), 4);
    }

    #[test]
    fn test_all_failures_is_empty_run() {
        let err = aggregate(vec![failure(1), failure(2)], RunMetadata::new("m", "d")).unwrap_err();
        assert_eq!(err.attempted, 2);
        assert!(aggregate(Vec::new(), RunMetadata::new("m", "d")).is_err());
    }

    #[test]
    fn test_tag_breakdown_keeps_first_seen_order() {
        let results = vec![
            success(1, 3.0, 3.0, &["theme:emergency", "lang:zh"]),
            success(2, 0.0, 3.0, &["lang:zh"]),
            failure(3),
        ];
        let metadata = RunMetadata::new("m", "d").with_pass_threshold(90.0);
        let report = aggregate(results, metadata).unwrap();

        let tags: Vec<_> = report.tag_breakdown.keys().cloned().collect();
        assert_eq!(tags, vec!["theme:emergency", "lang:zh"]);
        assert_eq!(report.tag_breakdown["lang:zh"].cases, 2);
        assert_eq!(report.tag_breakdown["lang:zh"].average_percentage, 50.0);
        assert_eq!(report.passed_cases, 1);
    }
}
