use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{RetryPolicy, SummaryConfig};
use crate::error::GenerationError;
use crate::prompt::Prompt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn lower(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium => Self::Low,
            Self::Low | Self::Minimal => Self::Minimal,
        }
    }
}

impl fmt::Display for ReasoningEffort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempt against a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_output_tokens: u32,
    pub reasoning_effort: Option<ReasoningEffort>,
}

/// Provider capability. Implementations return `Ok` with possibly empty text
/// when the service answered, and `GenerationError::Transport` otherwise.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError>;
}

/// The contract both strategies call: timeout plus retry-on-empty around a
/// provider.
#[derive(Clone)]
pub struct GenerationClient {
    inner: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
    max_output_tokens: u32,
    reasoning_effort: Option<ReasoningEffort>,
    timeout: Duration,
}

impl fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationClient")
            .field("engine", &self.inner.name())
            .field("retry", &self.retry)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("reasoning_effort", &self.reasoning_effort)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GenerationClient {
    pub fn new(inner: Arc<dyn TextGenerator>, config: &SummaryConfig) -> Self {
        Self {
            inner,
            retry: config.retry,
            max_output_tokens: config.max_output_tokens,
            reasoning_effort: config.reasoning_effort,
            timeout: config.timeout(),
        }
    }

    pub fn engine(&self) -> &str {
        self.inner.name()
    }

    /// Request parameters for 0-based `attempt`.
    pub fn attempt_request(&self, prompt: &Prompt, attempt: usize) -> CompletionRequest {
        let mut budget = self.max_output_tokens;
        let mut effort = self.reasoning_effort;
        for _ in 0..attempt {
            budget = budget
                .saturating_mul(self.retry.budget_multiplier)
                .min(self.retry.max_output_tokens_cap.max(self.max_output_tokens));
            if self.retry.lower_effort {
                effort = effort.map(ReasoningEffort::lower);
            }
        }
        CompletionRequest {
            prompt: prompt.text.clone(),
            max_output_tokens: budget,
            reasoning_effort: effort,
        }
    }

    pub async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let attempts = self.retry.max_retries.saturating_add(1);

        for attempt in 0..attempts {
            let request = self.attempt_request(prompt, attempt);
            let output = match tokio::time::timeout(self.timeout, self.inner.complete(&request))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(GenerationError::transport(anyhow::anyhow!(
                        "{} call timed out after {}s",
                        self.inner.name(),
                        self.timeout.as_secs()
                    )));
                }
            };

            if !output.trim().is_empty() {
                return Ok(output.trim().to_owned());
            }

            tracing::warn!(
                engine = self.inner.name(),
                attempt = attempt + 1,
                attempts,
                max_output_tokens = request.max_output_tokens,
                reasoning_effort = ?request.reasoning_effort,
                "generation returned empty output; retrying"
            );
        }

        Err(GenerationError::EmptyOutput { attempts })
    }
}

/// Dry-run engine: answers every call without contacting a service.
#[derive(Debug, Clone, Default)]
pub struct NoopGenerator;

#[async_trait]
impl TextGenerator for NoopGenerator {
    fn name(&self) -> &str {
        "noop"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        let task = request.prompt.lines().next().unwrap_or_default();
        let words = request.prompt.split_whitespace().count();
        Ok(format!("[dry run] {task} ({words} prompt words)"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::prompt::LengthHint;

    fn prompt(text: &str) -> Prompt {
        Prompt {
            text: text.to_owned(),
            length_hint: LengthHint::Suggested(100),
            truncated: false,
        }
    }

    /// Returns empty output for the first `empty_first` calls.
    struct FlakyGenerator {
        empty_first: usize,
        calls: AtomicUsize,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl FlakyGenerator {
        fn new(empty_first: usize) -> Self {
            Self {
                empty_first,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for FlakyGenerator {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push(request.clone());
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.empty_first {
                Ok("  \n".to_owned())
            } else {
                Ok(" done \n".to_owned())
            }
        }
    }

    struct BrokenGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for BrokenGenerator {
        fn name(&self) -> &str {
            "broken"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(GenerationError::transport(anyhow::anyhow!("connection refused")))
        }
    }

    struct SlowGenerator;

    #[async_trait]
    impl TextGenerator for SlowGenerator {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".to_owned())
        }
    }

    fn config(max_retries: usize, effort: Option<ReasoningEffort>) -> SummaryConfig {
        let mut config = SummaryConfig::default();
        config.retry.max_retries = max_retries;
        config.max_output_tokens = 1000;
        config.retry.max_output_tokens_cap = 3000;
        config.reasoning_effort = effort;
        config
    }

    #[tokio::test]
    async fn retries_empty_output_with_bigger_budget_and_lower_effort() {
        let flaky = Arc::new(FlakyGenerator::new(2));
        let client = GenerationClient::new(flaky.clone(), &config(2, Some(ReasoningEffort::High)));

        let out = client.generate(&prompt("p")).await.expect("third attempt succeeds");
        assert_eq!(out, "done");

        let seen = flaky.seen.lock().unwrap();
        let budgets = seen.iter().map(|r| r.max_output_tokens).collect::<Vec<_>>();
        let efforts = seen.iter().map(|r| r.reasoning_effort).collect::<Vec<_>>();
        assert_eq!(budgets, vec![1000, 2000, 3000]);
        assert_eq!(
            efforts,
            vec![
                Some(ReasoningEffort::High),
                Some(ReasoningEffort::Medium),
                Some(ReasoningEffort::Low)
            ]
        );
    }

    #[tokio::test]
    async fn exhausted_retries_surface_empty_output() {
        let flaky = Arc::new(FlakyGenerator::new(usize::MAX));
        let client = GenerationClient::new(flaky.clone(), &config(1, None));

        let err = client.generate(&prompt("p")).await.unwrap_err();
        assert!(matches!(err, GenerationError::EmptyOutput { attempts: 2 }));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transport_errors_are_not_retried() {
        let broken = Arc::new(BrokenGenerator {
            calls: AtomicUsize::new(0),
        });
        let client = GenerationClient::new(broken.clone(), &config(3, None));

        let err = client.generate(&prompt("p")).await.unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_transport_error() {
        let mut config = config(2, None);
        config.timeout_secs = 1;
        let client = GenerationClient::new(Arc::new(SlowGenerator), &config);

        let err = client.generate(&prompt("p")).await.unwrap_err();
        assert!(err.to_string().contains("timed out after 1s"), "{err}");
    }

    #[tokio::test]
    async fn noop_answers_with_task_line() {
        let client = GenerationClient::new(Arc::new(NoopGenerator), &SummaryConfig::default());
        let out = client
            .generate(&prompt("Task: Do it.\nmore words here"))
            .await
            .expect("noop output");
        assert!(out.starts_with("[dry run] Task: Do it."), "{out}");
    }
}
