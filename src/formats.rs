use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One table-of-contents entry, as supplied by the archive layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationNode {
    pub title: String,
    /// Archive-rooted content reference, optionally with a `#fragment`.
    pub target: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavigationNode>,
}

impl NavigationNode {
    pub fn leaf(title: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            target: target.into(),
            children: Vec::new(),
        }
    }

    pub fn branch(
        title: impl Into<String>,
        target: impl Into<String>,
        children: Vec<NavigationNode>,
    ) -> Self {
        Self {
            title: title.into(),
            target: target.into(),
            children,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpineEntry {
    pub identifier: String,
    pub content_reference: String,
    pub position: usize,
}

/// A navigation entry mapped onto the half-open spine range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedChapter {
    pub title: String,
    pub target: String,
    pub start: usize,
    pub end: usize,
}

impl ResolvedChapter {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A resolved chapter together with its loaded plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterText {
    /// 0-based position in the resolved chapter sequence.
    pub index: usize,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChapterStatus {
    Summarized,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSummary {
    pub index: usize,
    pub title: String,
    pub summary: String,
    #[serde(flatten)]
    pub status: ChapterStatus,
}

impl ChapterSummary {
    pub fn is_summarized(&self) -> bool {
        matches!(self.status, ChapterStatus::Summarized)
    }
}

/// Running state of the refine strategy. Each step yields a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryState {
    pub current_text: String,
    /// 1-based index of the chapter folded in most recently.
    pub chapter_index: usize,
    pub total_chapters: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    MapReduce,
    Refine,
}

impl Strategy {
    pub fn file_suffix(self) -> &'static str {
        match self {
            Self::MapReduce => "mapreduce",
            Self::Refine => "refine",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSummary {
    pub title: String,
    pub strategy: Strategy,
    pub full_summary: String,
    /// Empty for the refine strategy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chapters: Vec<ChapterSummary>,
    pub generated_at: DateTime<Utc>,
}

/// Front matter written at the top of the rendered summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryFrontMatter {
    pub title: String,
    pub source: String,
    pub strategy: Strategy,
    pub engine: String,
    pub language: String,
    pub generated_at: String,
    pub chapters: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_chapters: Vec<usize>,
}
