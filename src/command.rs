use std::process::Stdio;

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt as _;

use crate::error::GenerationError;
use crate::generate::{CompletionRequest, TextGenerator};

/// Runs an external program per call: the prompt goes to stdin and stdout is
/// the generated text. The request's budget and effort are exported as
/// `EPUBDIGEST_MAX_OUTPUT_TOKENS` and `EPUBDIGEST_REASONING_EFFORT`.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    async fn run(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .env(
                "EPUBDIGEST_MAX_OUTPUT_TOKENS",
                request.max_output_tokens.to_string(),
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        match request.reasoning_effort {
            Some(effort) => {
                command.env("EPUBDIGEST_REASONING_EFFORT", effort.as_str());
            }
            None => {
                command.env_remove("EPUBDIGEST_REASONING_EFFORT");
            }
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("spawn generator command: {}", self.program))?;

        let mut stdin = child.stdin.take().context("open generator stdin")?;
        let prompt = request.prompt.clone();
        let writer = tokio::spawn(async move {
            stdin.write_all(prompt.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .context("wait generator process")?;
        match writer.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(engine = "command", error = %err, "generator closed stdin early");
            }
            Err(err) => return Err(err).context("join generator stdin writer"),
        }

        if !output.status.success() {
            anyhow::bail!("generator command failed: {} ({})", self.program, output.status);
        }

        String::from_utf8(output.stdout).context("generator stdout is not valid UTF-8")
    }
}

#[async_trait]
impl TextGenerator for CommandGenerator {
    fn name(&self) -> &str {
        "command"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        tracing::debug!(
            engine = "command",
            command = %self.program,
            max_output_tokens = request.max_output_tokens,
            "generator command"
        );
        self.run(request).await.map_err(GenerationError::Transport)
    }
}
