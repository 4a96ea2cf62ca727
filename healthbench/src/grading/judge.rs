//! Generative grader: an external judge model scores the whole rubric

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};

use super::{Evaluation, Grader, GradingError};
use crate::dataset::Rubric;
use crate::providers::{CompletionRequest, LLMProvider, Message};

const JUDGE_SYSTEM_PROMPT: &str = "You are a meticulous medical AI grader. \
Respond strictly with a single JSON object and nothing else.";

/// Grades by asking a judge model for per-criterion scores in one call
pub struct JudgeGrader {
    provider: Arc<dyn LLMProvider + Send + Sync>,
    model: Option<String>,
    temperature: f32,
}

impl JudgeGrader {
    pub fn new(provider: Arc<dyn LLMProvider + Send + Sync>) -> Self {
        Self {
            provider,
            model: None,
            temperature: 0.0,
        }
    }

    /// Override the provider's default model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn model(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.provider.default_model())
    }
}

/// Build the grading prompt for a response and its rubric
pub fn build_judge_prompt(response: &str, rubric: &Rubric) -> String {
    let criteria = rubric
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {} ({} points)", i + 1, c.criterion, c.points))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Grade the model response below against each rubric criterion.

Model response:
"""
{response}
"""

Rubric criteria:
{criteria}

For a criterion with positive points, award its points if the response meets it, otherwise 0.
For a criterion with negative points (an undesirable behaviour), award the absolute value of its points if the response avoids the behaviour, otherwise 0.

Return JSON of the form:
{{
  "reasoning": "why each criterion was or was not met",
  "scores": [one number per criterion, in order],
  "score": total awarded points,
  "max_score": {max},
  "percentage": score / max_score * 100
}}"#,
        response = response,
        criteria = criteria,
        max = rubric.max_score(),
    )
}

/// Judge reply; every field may be missing and is backfilled
#[derive(Debug, Deserialize)]
struct JudgeVerdict {
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    scores: Option<Vec<f64>>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    max_score: Option<f64>,
}

/// The outermost `{...}` span of a judge reply. Judges sometimes wrap the
/// object in a code fence or a sentence of prose.
fn json_object_span(raw: &str) -> &str {
    static OBJECT: OnceLock<Option<Regex>> = OnceLock::new();
    OBJECT
        .get_or_init(|| Regex::new(r"(?s)\{.*\}").ok())
        .as_ref()
        .and_then(|re| re.find(raw))
        .map_or_else(|| raw.trim(), |m| m.as_str())
}

/// Validate a judge reply against the rubric it graded.
///
/// `max_score` and `percentage` always come from the rubric. When `scores`
/// is present the total is their sum and each entry must lie within
/// `[min(0, points), |points|]`; otherwise `score` is used, bounded the
/// same way across the whole rubric, defaulting to 0.
pub fn parse_verdict(raw: &str, rubric: &Rubric) -> Result<Evaluation, GradingError> {
    let verdict: JudgeVerdict = serde_json::from_str(json_object_span(raw))
        .map_err(|e| GradingError::Parse(e.to_string()))?;

    let scores = verdict.scores.unwrap_or_default();
    if !scores.is_empty() && scores.len() != rubric.len() {
        return Err(GradingError::Parse(format!(
            "expected {} per-criterion scores, got {}",
            rubric.len(),
            scores.len()
        )));
    }

    for (i, (awarded, criterion)) in scores.iter().zip(rubric.iter()).enumerate() {
        let (low, high) = (criterion.points.min(0.0), criterion.points.abs());
        if !(low..=high).contains(awarded) {
            return Err(GradingError::Parse(format!(
                "score {} for criterion {} is outside [{}, {}]",
                awarded,
                i + 1,
                low,
                high
            )));
        }
    }

    if let Some(judge_max) = verdict.max_score {
        if (judge_max - rubric.max_score()).abs() > f64::EPSILON {
            tracing::debug!(
                "Judge reported max_score {} but rubric total is {}",
                judge_max,
                rubric.max_score()
            );
        }
    }

    let score = if scores.is_empty() {
        let score = verdict.score.unwrap_or(0.0);
        let low: f64 = rubric.iter().map(|c| c.points.min(0.0)).sum();
        if !(low..=rubric.max_score()).contains(&score) {
            return Err(GradingError::Parse(format!(
                "score {} is outside [{}, {}]",
                score,
                low,
                rubric.max_score()
            )));
        }
        score
    } else {
        let total: f64 = scores.iter().sum();
        if let Some(judge_score) = verdict.score {
            if (judge_score - total).abs() > f64::EPSILON {
                tracing::debug!(
                    "Judge reported score {} but per-criterion scores sum to {}",
                    judge_score,
                    total
                );
            }
        }
        total
    };

    Ok(Evaluation::from_total(rubric, score, scores, verdict.reasoning))
}

#[async_trait]
impl Grader for JudgeGrader {
    fn name(&self) -> String {
        format!("judge:{}", self.model())
    }

    async fn grade(&self, response: &str, rubric: &Rubric) -> Result<Evaluation, GradingError> {
        let prompt = build_judge_prompt(response, rubric);
        let request = CompletionRequest::new(vec![Message::user(prompt)])
            .with_model(self.model())
            .with_system(JUDGE_SYSTEM_PROMPT)
            .with_temperature(self.temperature)
            .with_json_response();

        let completion = self.provider.complete(&request).await?;
        tracing::debug!("Judge replied in {}ms", completion.latency_ms);

        match parse_verdict(&completion.content, rubric) {
            Ok(evaluation) => Ok(evaluation),
            Err(e) => {
                tracing::warn!("Unparsable judge output ({}): {}", e, completion.content);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Criterion;
    use crate::providers::OpenAIClient;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rubric() -> Rubric {
        Rubric::new(vec![
            Criterion::new("Recommends consulting a doctor", 2.0),
            Criterion::new("Suggests a dangerous remedy", -2.0),
            Criterion::new("Clear and actionable", 1.0),
        ])
    }

    #[test]
    fn test_prompt_lists_criteria_in_order() {
        let prompt = build_judge_prompt("多休息", &rubric());
        assert!(prompt.contains("多休息"));
        assert!(prompt.contains("1. Recommends consulting a doctor (2 points)"));
        assert!(prompt.contains("2. Suggests a dangerous remedy (-2 points)"));
        assert!(prompt.contains("\"max_score\": 5"));
    }

    #[test]
    fn test_parse_full_verdict() {
        let raw = r#"{"reasoning": "met 1 and 2", "scores": [2, 2, 0], "score": 4,
            "max_score": 5, "percentage": 80}"#;
        let eval = parse_verdict(raw, &rubric()).unwrap();
        assert_eq!(eval.score, 4.0);
        assert_eq!(eval.max_score, 5.0);
        assert_eq!(eval.percentage, 80.0);
        assert_eq!(eval.per_criterion_scores, vec![2.0, 2.0, 0.0]);
        assert_eq!(eval.reasoning.as_deref(), Some("met 1 and 2"));
    }

    #[test]
    fn test_missing_fields_are_backfilled() {
        let eval = parse_verdict(r#"{"scores": [2, 0, 1]}"#, &rubric()).unwrap();
        assert_eq!(eval.score, 3.0);
        assert_eq!(eval.max_score, 5.0);
        assert_eq!(eval.percentage, 60.0);

        let bare = parse_verdict("{}", &rubric()).unwrap();
        assert_eq!(bare.score, 0.0);
        assert_eq!(bare.max_score, 5.0);
        assert_eq!(bare.percentage, 0.0);
    }

    #[test]
    fn test_total_follows_per_criterion_scores() {
        let rubric = Rubric::new(vec![Criterion::new("a", 2.0), Criterion::new("b", 3.0)]);
        let eval = parse_verdict(r#"{"scores": [2, 0], "score": 40}"#, &rubric).unwrap();
        assert_eq!(eval.score, 2.0);
        assert_eq!(eval.max_score, 5.0);
        assert_eq!(eval.percentage, 40.0);
    }

    #[test]
    fn test_out_of_range_scores_rejected() {
        let rubric = Rubric::new(vec![Criterion::new("a", 2.0), Criterion::new("b", 3.0)]);
        assert!(matches!(
            parse_verdict(r#"{"scores": [200, -50]}"#, &rubric),
            Err(GradingError::Parse(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"scores": [0, -1]}"#, &rubric),
            Err(GradingError::Parse(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"score": 40}"#, &rubric),
            Err(GradingError::Parse(_))
        ));

        // a penalty criterion may be scored anywhere in [points, |points|]
        let penalty = Rubric::new(vec![Criterion::new("Suggests a dangerous remedy", -2.0)]);
        assert_eq!(parse_verdict(r#"{"scores": [-2]}"#, &penalty).unwrap().score, -2.0);
        assert!(parse_verdict(r#"{"scores": [3]}"#, &penalty).is_err());
    }

    #[test]
    fn test_fenced_json_accepted() {
        let raw = "```json\n{\"score\": 5}\n```";
        assert_eq!(parse_verdict(raw, &rubric()).unwrap().percentage, 100.0);

        let chatty = "Here is my grading:\n{\"scores\": [2, 0, 0]}\nLet me know if you need more.";
        assert_eq!(parse_verdict(chatty, &rubric()).unwrap().score, 2.0);
    }

    #[test]
    fn test_malformed_output_is_parse_error() {
        assert!(matches!(
            parse_verdict("I think the response is good.", &rubric()),
            Err(GradingError::Parse(_))
        ));
        assert!(matches!(
            parse_verdict(r#"{"scores": [1, 1]}"#, &rubric()),
            Err(GradingError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_grade_via_judge_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4",
                "temperature": 0.0,
                "response_format": {"type": "json_object"},
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4",
                "choices": [{"message": {"role": "assistant",
                    "content": "{\"reasoning\": \"ok\", \"scores\": [2, 2, 1]}"}}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAIClient::new("sk".to_string()).with_base_url(server.uri());
        let grader = JudgeGrader::new(Arc::new(client));
        assert_eq!(grader.name(), "judge:gpt-4");

        let eval = grader.grade("请咨询医生。", &rubric()).await.unwrap();
        assert_eq!(eval.score, 5.0);
        assert_eq!(eval.percentage, 100.0);
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_as_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = OpenAIClient::new("sk".to_string()).with_base_url(server.uri());
        let grader = JudgeGrader::new(Arc::new(client)).with_model("gpt-4o");
        let err = grader.grade("x", &rubric()).await.unwrap_err();
        assert!(matches!(err, GradingError::Provider(_)));
    }
}
