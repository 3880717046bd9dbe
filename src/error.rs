use std::fmt;

/// Failure of a single generation call after the client's own retries.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation produced no visible output after {attempts} attempt(s)")]
    EmptyOutput { attempts: usize },
    #[error("generation transport failed: {0:#}")]
    Transport(anyhow::Error),
}

impl GenerationError {
    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        Self::Transport(err.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// The target matched no spine unit.
    Unresolved,
    /// The target precedes the previously kept chapter in reading order.
    OutOfOrder,
}

/// A navigation entry that was dropped during resolution. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} navigation target {target:?} ({title})")]
pub struct ResolutionWarning {
    pub title: String,
    pub target: String,
    pub kind: WarningKind,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => f.write_str("unresolved"),
            Self::OutOfOrder => f.write_str("out-of-order"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Chapters,
    Reduce,
    Seed,
    /// 1-based chapter index of the failing refine step.
    Refine(usize),
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chapters => f.write_str("chapter summaries"),
            Self::Reduce => f.write_str("book reduce"),
            Self::Seed => f.write_str("refine seed"),
            Self::Refine(index) => write!(f, "refine step {index}"),
            Self::Finalize => f.write_str("refine finalize"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AbortCause {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("run was cancelled")]
    Cancelled,
    #[error("no chapter content to summarize")]
    NoContent,
}

/// Fatal failure of a whole summarization run.
#[derive(Debug)]
pub struct RunAborted {
    pub stage: Stage,
    pub cause: AbortCause,
    /// Map-reduce only: indices of chapters summarized before the abort.
    pub completed_chapters: Vec<usize>,
}

impl RunAborted {
    pub fn new(stage: Stage, cause: impl Into<AbortCause>) -> Self {
        Self {
            stage,
            cause: cause.into(),
            completed_chapters: Vec::new(),
        }
    }

    pub fn with_completed(mut self, completed: Vec<usize>) -> Self {
        self.completed_chapters = completed;
        self
    }
}

impl fmt::Display for RunAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run aborted at {} stage: {}", self.stage, self.cause)?;
        if !self.completed_chapters.is_empty() {
            let list = self
                .completed_chapters
                .iter()
                .map(|idx| (idx + 1).to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, " (chapters summarized: {list})")?;
        }
        Ok(())
    }
}

// The cause is already part of the message.
impl std::error::Error for RunAborted {}
