use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as _;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::circuit_breaker::{create_completion_circuit_breaker, CompletionCircuitBreaker};
use crate::completion::{CompletionRequest, StructuredCompletion};
use crate::config::{CompletionConfig, ResponseFormat};
use crate::errors::AppError;

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Structured completion over an OpenAI-compatible `/chat/completions`
/// endpoint (Alibaba Model Studio / DashScope compatible mode, OpenAI).
pub struct ChatCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    breaker: CompletionCircuitBreaker,
}

impl ChatCompletionClient {
    /// Creates a new `ChatCompletionClient`.
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoint, credentials, model and timeout settings.
    pub fn new(config: &CompletionConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create completion client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            response_format: config.response_format,
            breaker: create_completion_circuit_breaker(),
        })
    }

    fn request_body(&self, request: &CompletionRequest<'_>) -> Value {
        let (system, response_format) = match self.response_format {
            ResponseFormat::JsonObject => (
                format!(
                    "{}\n\nRespond with a single JSON object that matches this JSON Schema:\n{}",
                    request.instruction, request.schema
                ),
                json!({"type": "json_object"}),
            ),
            ResponseFormat::JsonSchema => (
                request.instruction.to_string(),
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": request.schema_name,
                        "schema": request.schema
                    }
                }),
            ),
        };

        json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": response_format,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": request.input}
            ]
        })
    }

    async fn post(&self, body: &Value) -> Result<ChatCompletionResponse, AppError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::CapabilityError(format!(
                "Completion service returned {}: {}",
                status, error_text
            )));
        }

        response.json().await.map_err(|e| {
            AppError::CapabilityError(format!("Failed to parse completion response: {}", e))
        })
    }
}

#[async_trait]
impl StructuredCompletion for ChatCompletionClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Value, AppError> {
        let body = self.request_body(&request);
        tracing::debug!(
            "Requesting {} completion from {} ({})",
            request.schema_name,
            self.model,
            self.endpoint
        );

        let response = match self.breaker.call(self.post(&body)).await {
            Ok(response) => response,
            Err(failsafe::Error::Inner(e)) => return Err(e),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("⚠️ Completion circuit open, rejecting call");
                return Err(AppError::CapabilityError(
                    "Completion service circuit is open".to_string(),
                ));
            }
        };

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AppError::conformance(request.schema_name, vec!["completion has no content".to_string()])
            })?;

        parse_json_content(&content).map_err(|e| {
            AppError::conformance(
                request.schema_name,
                vec![format!("completion content is not JSON: {}", e)],
            )
        })
    }
}

/// Parses message content as JSON, tolerating a surrounding Markdown code
/// fence.
fn parse_json_content(content: &str) -> Result<Value, serde_json::Error> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```")
        .map(|rest| {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        })
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced)
}
