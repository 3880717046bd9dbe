use anyhow::Context as _;
use async_trait::async_trait;

use crate::error::GenerationError;
use crate::generate::{CompletionRequest, ReasoningEffort, TextGenerator};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl AnthropicConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY is not set"))?;
        let base_url = std::env::var("EPUBDIGEST_ANTHROPIC_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let model = std::env::var("EPUBDIGEST_ANTHROPIC_MODEL")
            .unwrap_or_else(|_| DEFAULT_MODEL.to_owned());
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

/// Extended-thinking budget for an effort level.
fn thinking_budget(effort: ReasoningEffort) -> u32 {
    match effort {
        ReasoningEffort::High => 8192,
        ReasoningEffort::Medium => 4096,
        ReasoningEffort::Low | ReasoningEffort::Minimal => 1024,
    }
}

/// Messages API adapter.
#[derive(Debug, Clone)]
pub struct AnthropicGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl AnthropicGenerator {
    pub fn new(config: AnthropicConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("build http client")?;
        let base_url = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            endpoint: format!("{base_url}/messages"),
            api_key: config.api_key,
            model: config.model,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let budget = request.reasoning_effort.map(thinking_budget);
        let max_tokens = request
            .max_output_tokens
            .saturating_add(budget.unwrap_or(0));
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [ { "role": "user", "content": request.prompt } ],
        });
        if let Some(budget) = budget
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert(
                "thinking".to_owned(),
                serde_json::json!({ "type": "enabled", "budget_tokens": budget }),
            );
        }
        body
    }

    async fn send(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request_body(request))
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .context("read Anthropic response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("Anthropic API error ({status}): {message}");
        }

        let value: serde_json::Value =
            serde_json::from_str(&raw).context("parse Anthropic response")?;
        extract_text(&value)
    }
}

#[async_trait]
impl TextGenerator for AnthropicGenerator {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        tracing::debug!(
            engine = "anthropic",
            model = %self.model,
            max_output_tokens = request.max_output_tokens,
            reasoning_effort = ?request.reasoning_effort,
            "messages call"
        );
        self.send(request).await.map_err(GenerationError::Transport)
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

/// Joins the `text` blocks; `thinking` blocks are not part of the answer.
fn extract_text(value: &serde_json::Value) -> anyhow::Result<String> {
    let content = value
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow::anyhow!("missing `content` array in response"))?;

    Ok(content
        .iter()
        .filter(|block| block.get("type").and_then(|v| v.as_str()) == Some("text"))
        .filter_map(|block| block.get("text").and_then(|v| v.as_str()))
        .collect::<String>())
}
