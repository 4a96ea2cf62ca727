//! Results reporting

pub mod aggregate;
pub mod sink;

pub use aggregate::{aggregate, EmptyRunError, RunMetadata};
pub use sink::{JsonFileSink, ResultSink, SinkError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::runner::CaseResult;

/// Per-tag statistics over successful cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSummary {
    pub cases: usize,
    pub average_percentage: f64,
}

/// Final output of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(rename = "model")]
    pub model_name: String,
    #[serde(rename = "dataset")]
    pub dataset_name: String,
    pub grader: String,
    #[serde(rename = "timestamp")]
    pub started_at: String,
    #[serde(rename = "total_examples")]
    pub total_cases: usize,
    #[serde(rename = "evaluated_examples")]
    pub evaluated_cases: usize,
    #[serde(rename = "failed_examples")]
    pub failed_cases: usize,
    pub passed_cases: usize,
    pub pass_threshold: f64,
    pub total_score: f64,
    pub total_max: f64,
    pub average_percentage: f64,
    pub average_response_time: f64,
    pub average_grading_time: f64,
    pub average_total_time: f64,
    pub tag_breakdown: IndexMap<String, TagSummary>,
    pub results: Vec<CaseResult>,
}

/// Generate a console report
pub fn print_console_report(report: &RunReport) {
    println!("\n=== HealthBench Results ===\n");
    println!("Model:   {}", report.model_name);
    println!("Dataset: {}", report.dataset_name);
    println!("Grader:  {}", report.grader);
    println!("Started: {}\n", report.started_at);

    println!("Summary:");
    println!("{:-<50}", "");
    println!(
        "  Evaluated:           {}/{} ({} failed)",
        report.evaluated_cases, report.total_cases, report.failed_cases
    );
    println!(
        "  Total score:         {}/{}",
        report.total_score, report.total_max
    );
    println!("  Average percentage:  {:.1}%", report.average_percentage);
    println!(
        "  Passed (>= {:.0}%):     {}/{}",
        report.pass_threshold, report.passed_cases, report.evaluated_cases
    );
    println!("  Avg response time:   {:.2}s", report.average_response_time);
    println!("  Avg grading time:    {:.2}s", report.average_grading_time);
    println!("  Avg total time:      {:.2}s", report.average_total_time);

    if !report.tag_breakdown.is_empty() {
        println!("\nScores by Tag:");
        println!("{:-<50}", "");
        for (tag, summary) in &report.tag_breakdown {
            println!(
                "  {:<32} {:>4} cases  {:>6.1}%",
                tag, summary.cases, summary.average_percentage
            );
        }
    }

    println!("\n{:=<50}", "");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dataset::CaseId;
    use crate::grading::Evaluation;
    use crate::runner::{CaseFailure, CaseSuccess, Timings};

    /// One success at 75% and one failure
    pub(crate) fn sample_report() -> RunReport {
        let results = vec![
            CaseResult::Success(CaseSuccess {
                case_id: CaseId::from(1),
                question: "我最近总是头痛，应该怎么办？".to_string(),
                response: "建议多休息，如果持续请就医。".to_string(),
                evaluation: Evaluation {
                    score: 3.0,
                    max_score: 4.0,
                    percentage: 75.0,
                    per_criterion_scores: vec![1.0, 2.0, 0.0],
                    reasoning: None,
                },
                timings: Timings::new(1.0, 0.0),
                tags: vec!["theme:symptoms".to_string()],
            }),
            CaseResult::Failure(CaseFailure {
                case_id: CaseId::from(2),
                question: "q".to_string(),
                error_message: "connection refused".to_string(),
            }),
        ];
        aggregate(results, RunMetadata::new("medical-assistant", "sample")).unwrap()
    }

    #[test]
    fn test_report_field_names() {
        let json = serde_json::to_value(sample_report()).unwrap();
        for key in [
            "model",
            "dataset",
            "grader",
            "timestamp",
            "total_examples",
            "evaluated_examples",
            "failed_examples",
            "average_percentage",
            "average_response_time",
            "average_grading_time",
            "tag_breakdown",
            "results",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["average_percentage"], 75.0);
        assert_eq!(json["tag_breakdown"]["theme:symptoms"]["cases"], 1);
    }

    #[test]
    fn test_report_round_trips_through_json() {
        let report = sample_report();
        let text = serde_json::to_string(&report).unwrap();
        let back: RunReport = serde_json::from_str(&text).unwrap();
        assert_eq!(back, report);
    }
}
