use anyhow::Context as _;
use async_trait::async_trait;

use crate::error::GenerationError;
use crate::generate::{CompletionRequest, TextGenerator};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-5-mini";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl OpenAiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        let base_url = std::env::var("EPUBDIGEST_OPENAI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let model =
            std::env::var("EPUBDIGEST_OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_owned());
        Ok(Self {
            api_key,
            base_url,
            model,
        })
    }

    /// Replaces the environment's model when `model` is given.
    pub fn with_model(mut self, model: Option<&str>) -> Self {
        if let Some(model) = model {
            self.model = model.to_owned();
        }
        self
    }
}

pub fn responses_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/responses")
}

/// Responses API adapter.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: responses_endpoint(&config.base_url),
            api_key: config.api_key,
            model: config.model,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": request.prompt,
            "max_output_tokens": request.max_output_tokens,
            "text": { "format": { "type": "text" } },
            "store": false,
        });
        if let Some(effort) = request.reasoning_effort
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert(
                "reasoning".to_owned(),
                serde_json::json!({ "effort": effort.as_str() }),
            );
        }
        body
    }

    async fn send(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read OpenAI response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("OpenAI API error ({status}): {message}");
        }

        let value: serde_json::Value = serde_json::from_str(&raw).context("parse OpenAI response")?;
        if let Some(reason) = value
            .pointer("/incomplete_details/reason")
            .and_then(|v| v.as_str())
        {
            tracing::debug!(engine = "openai", reason, "response is incomplete");
        }
        extract_output_text(&value)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        tracing::debug!(
            engine = "openai",
            model = %self.model,
            max_output_tokens = request.max_output_tokens,
            reasoning_effort = ?request.reasoning_effort,
            "responses call"
        );
        self.send(request).await.map_err(GenerationError::Transport)
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

/// Concatenates every `output_text` part of every message item. A response
/// that spent its whole budget on reasoning yields an empty string.
fn extract_output_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let output = value
        .get("output")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("missing `output` array in response"))?;

    let mut text = String::new();
    for item in output {
        if item.get("type").and_then(|v| v.as_str()) != Some("message") {
            continue;
        }
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for part in content {
            if part.get("type").and_then(|v| v.as_str()) != Some("output_text") {
                continue;
            }
            let Some(part_text) = part.get("text").and_then(|v| v.as_str()) else {
                continue;
            };
            text.push_str(part_text);
        }
    }

    Ok(text)
}
