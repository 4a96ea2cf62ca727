//! Per-case progress reporting

use super::{CaseResult, MalformedCaseError};
use crate::dataset::TestCase;

/// Progress callback for tracking execution. `index` is 1-based.
pub trait ProgressCallback: Send + Sync {
    fn on_case_start(&self, index: usize, total: usize, case: &TestCase);
    fn on_case_complete(&self, index: usize, total: usize, result: &CaseResult);
    fn on_case_skipped(&self, index: usize, total: usize, error: &MalformedCaseError);
}

/// Default no-op progress callback
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_case_start(&self, _index: usize, _total: usize, _case: &TestCase) {}
    fn on_case_complete(&self, _index: usize, _total: usize, _result: &CaseResult) {}
    fn on_case_skipped(&self, _index: usize, _total: usize, _error: &MalformedCaseError) {}
}

/// Console progress callback
pub struct ConsoleProgress {
    question_chars: usize,
    response_chars: usize,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            question_chars: 100,
            response_chars: 200,
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorten to at most `max` characters, appending "..." when cut
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

impl ProgressCallback for ConsoleProgress {
    fn on_case_start(&self, index: usize, total: usize, case: &TestCase) {
        println!("\n[{}/{}] Case {}", index, total, case.id);
        if !case.tags.is_empty() {
            println!("  Tags: {}", case.tags.join(", "));
        }
        println!("  Question: {}", truncate_chars(case.question(), self.question_chars));
    }

    fn on_case_complete(&self, _index: usize, _total: usize, result: &CaseResult) {
        match result {
            CaseResult::Success(s) => {
                println!("  Response: {}", truncate_chars(&s.response, self.response_chars));
                println!(
                    "  Score: {}/{} ({:.1}%)",
                    s.evaluation.score, s.evaluation.max_score, s.evaluation.percentage
                );
                println!(
                    "  Time: {:.2}s response + {:.2}s grading",
                    s.timings.response_time, s.timings.grading_time
                );
            }
            CaseResult::Failure(f) => {
                println!("  FAILED: {}", f.error_message);
            }
        }
    }

    fn on_case_skipped(&self, index: usize, total: usize, error: &MalformedCaseError) {
        println!("\n[{}/{}] SKIPPED: {}", index, total, error);
    }
}
