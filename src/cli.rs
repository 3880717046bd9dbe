use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::ConfigOverrides;
use crate::formats::Strategy;
use crate::generate::ReasoningEffort;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Summarize an EPUB book into a Markdown file.
    Summarize(SummarizeArgs),
    /// Print the chapters resolved from an EPUB's table of contents.
    Chapters(ChaptersArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LlmEngine {
    /// Dry run: placeholder text, no external calls.
    Noop,
    /// Run `--command`, prompt on stdin, summary on stdout.
    Command,
    /// OpenAI Responses API (`OPENAI_API_KEY`).
    Openai,
    /// Anthropic Messages API (`ANTHROPIC_API_KEY`).
    Anthropic,
}

impl LlmEngine {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Command => "command",
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
        }
    }
}

#[derive(Debug, Args)]
pub struct SummarizeArgs {
    /// Input EPUB file.
    pub epub: PathBuf,

    /// Summarization strategy.
    #[arg(long, value_enum, default_value_t = Strategy::MapReduce)]
    pub strategy: Strategy,

    /// Generation engine.
    #[arg(long, value_enum, default_value_t = LlmEngine::Openai)]
    pub engine: LlmEngine,

    /// Book title used in prompts and output (defaults to the EPUB metadata).
    #[arg(long)]
    pub title: Option<String>,

    /// Output Markdown path (defaults to `<epub stem>-<strategy>.md` next to the EPUB).
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Overwrite the output file if it exists.
    #[arg(long)]
    pub force: bool,

    /// YAML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output language (e.g. `zh-TW`, `en`).
    #[arg(long)]
    pub language: Option<String>,

    /// Maximum concurrent chapter calls (map-reduce).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Retries per call when the engine returns no visible output.
    #[arg(long)]
    pub retries: Option<usize>,

    /// Output token budget of the first attempt.
    #[arg(long)]
    pub max_output_tokens: Option<u32>,

    /// Model for the openai/anthropic engines (overrides the environment).
    #[arg(long)]
    pub model: Option<String>,

    /// Reasoning effort requested from the engine.
    #[arg(long, value_enum)]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Per-call timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Program to run when `--engine command`.
    #[arg(long)]
    pub command: Option<String>,

    /// Arguments passed to `--command` (after `--`).
    #[arg(last = true)]
    pub command_args: Vec<String>,
}

impl SummarizeArgs {
    pub fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            language: self.language.clone(),
            concurrency: self.concurrency,
            retries: self.retries,
            max_output_tokens: self.max_output_tokens,
            reasoning_effort: self.reasoning_effort,
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Debug, Args)]
pub struct ChaptersArgs {
    /// Input EPUB file.
    pub epub: PathBuf,

    /// Print chapters as JSON.
    #[arg(long)]
    pub json: bool,
}
