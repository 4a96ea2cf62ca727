//! Ollama chat client for locally served models

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::traits::{
    with_deadline, CompletionRequest, CompletionResponse, LLMProvider, Message, ProviderError,
    ProviderResult, Role,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "medical-assistant";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// Ollama `/api/chat` client
pub struct OllamaClient {
    base_url: String,
    http_client: Client,
    default_model: String,
    temperature: f32,
    timeout_ms: u64,
    system_prompt: Option<String>,
}

impl OllamaClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            http_client: Client::new(),
            default_model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            system_prompt: None,
        }
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set sampling temperature used when the request does not carry one
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    async fn send(&self, body: &OllamaRequest) -> ProviderResult<OllamaResponse> {
        let response = self
            .http_client
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<OllamaError>(&text) {
                Ok(err) => err.error,
                Err(_) => text,
            };
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<OllamaResponse>()
            .await
            .map_err(|e| ProviderError::Parse(format!("Invalid Ollama response: {}", e)))
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL)
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: String,
    message: Option<OllamaMessage>,
}

#[derive(Deserialize)]
struct OllamaError {
    error: String,
}

#[async_trait]
impl LLMProvider for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        let start = Instant::now();

        let mut messages: Vec<OllamaMessage> = Vec::new();
        if let Some(system) = request.system_prompt.as_ref().or(self.system_prompt.as_ref()) {
            messages.push(OllamaMessage {
                role: Role::System.as_str().to_string(),
                content: system.clone(),
            });
        }

        // Dataset conversations may carry their own system turns; only the
        // dialogue itself is forwarded.
        messages.extend(
            request
                .messages
                .iter()
                .filter(|m| matches!(m.role, Role::User | Role::Assistant))
                .map(OllamaMessage::from),
        );

        let body = OllamaRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature.unwrap_or(self.temperature),
            },
            format: request.json_response.then_some("json"),
        };

        let api_response = with_deadline(self.timeout_ms, self.send(&body)).await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("Ollama replied in {}ms", latency_ms);

        Ok(CompletionResponse {
            content: api_response.message.map(|m| m.content).unwrap_or_default(),
            model: if api_response.model.is_empty() {
                body.model
            } else {
                api_response.model
            },
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_chat_forwards_dialogue_and_reads_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "medical-assistant",
                "stream": false,
                "messages": [{"role": "user", "content": "我头痛"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "medical-assistant",
                "message": {"role": "assistant", "content": "建议多休息"},
                "done": true,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OllamaClient::default().with_base_url(server.uri());
        let conversation = vec![Message::system("ignored"), Message::user("我头痛")];
        let reply = client.chat(&conversation).await.unwrap();
        assert_eq!(reply, "建议多休息");
    }

    #[tokio::test]
    async fn test_non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"error": "model not found"})),
            )
            .mount(&server)
            .await;

        let client = OllamaClient::new("missing").with_base_url(server.uri());
        let err = client.chat(&[Message::user("hi")]).await.unwrap_err();
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "model not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(500))
                    .set_body_json(serde_json::json!({
                        "message": {"role": "assistant", "content": "late"}
                    })),
            )
            .mount(&server)
            .await;

        let client = OllamaClient::default()
            .with_base_url(server.uri())
            .with_timeout_ms(50);
        let err = client.chat(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { timeout_ms: 50 }));
    }
}
