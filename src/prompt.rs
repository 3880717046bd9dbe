use std::fmt;

use crate::config::{LengthRange, SummaryConfig};
use crate::formats::ChapterSummary;

pub const CHAPTER_TASK: &str = "Task: Summarize one chapter of a book.";
pub const BOOK_TASK: &str = "Task: Write a whole-book summary from chapter summaries.";
pub const SEED_TASK: &str = "Task: Write the initial summary of a book from its first chapter.";
pub const REFINE_TASK: &str = "Task: Refine a running book summary with a new chapter.";
pub const FINALIZE_TASK: &str =
    "Task: Polish a chapter-by-chapter refined summary into the final book summary.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthHint {
    Range { min: u32, max: u32 },
    Suggested(u32),
}

impl From<LengthRange> for LengthHint {
    fn from(range: LengthRange) -> Self {
        Self::Range {
            min: range.min,
            max: range.max,
        }
    }
}

impl fmt::Display for LengthHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { min, max } => write!(f, "about {min}-{max} words"),
            Self::Suggested(n) => write!(f, "around {n} words"),
        }
    }
}

/// A fully rendered request text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub length_hint: LengthHint,
    /// Whether any embedded content was cut at its call-site ceiling.
    pub truncated: bool,
}

/// Returns the first `ceiling` characters of `content` and whether it was cut.
pub fn truncate_chars(content: &str, ceiling: usize) -> (&str, bool) {
    match content.char_indices().nth(ceiling) {
        Some((byte_idx, _)) => (&content[..byte_idx], true),
        None => (content, false),
    }
}

fn truncation_notice(truncated: bool) -> &'static str {
    if truncated {
        "Note: the content above was truncated; summarize what is present.\n"
    } else {
        ""
    }
}

pub fn chapter_summary(config: &SummaryConfig, title: &str, content: &str) -> Prompt {
    let (content, truncated) = truncate_chars(content, config.chapter.truncation_ceiling);
    let length_hint = LengthHint::from(config.chapter.length);
    let text = format!(
        "{CHAPTER_TASK}\n\
\n\
Chapter title: {title}\n\
\n\
Requirements:\n\
- Write in {language}.\n\
- Length: {length_hint}.\n\
- Capture the chapter's core ideas and key points.\n\
- Keep an objective, concise style.\n\
\n\
BEGIN_CHAPTER_TEXT\n\
{content}\n\
END_CHAPTER_TEXT\n\
{notice}\
\n\
Output ONLY the summary text, without any prefix or heading.\n",
        language = config.language,
        notice = truncation_notice(truncated),
    );
    Prompt {
        text,
        length_hint,
        truncated,
    }
}

/// Joins successful chapter summaries under their titles, in index order.
pub fn combine_chapter_summaries(chapters: &[ChapterSummary]) -> String {
    chapters
        .iter()
        .filter(|c| c.is_summarized() && !c.summary.trim().is_empty())
        .map(|c| format!("## {}\n{}", c.title, c.summary.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn book_summary(config: &SummaryConfig, book_title: &str, combined: &str) -> Prompt {
    let (combined, truncated) = truncate_chars(combined, config.book.truncation_ceiling);
    let length_hint = LengthHint::from(config.book.length);
    let text = format!(
        "{BOOK_TASK}\n\
\n\
Book title: {book_title}\n\
\n\
Requirements:\n\
- Write in {language}.\n\
- Length: {length_hint}.\n\
- Synthesize the book's main thesis, core arguments and conclusions.\n\
- Convey the overall structure and line of reasoning of the book.\n\
- Keep an objective, academic style.\n\
\n\
BEGIN_CHAPTER_SUMMARIES\n\
{combined}\n\
END_CHAPTER_SUMMARIES\n\
{notice}\
\n\
Output ONLY the book summary text, without any prefix or heading.\n",
        language = config.language,
        notice = truncation_notice(truncated),
    );
    Prompt {
        text,
        length_hint,
        truncated,
    }
}

pub fn refine_seed(
    config: &SummaryConfig,
    book_title: &str,
    chapter_title: &str,
    chapter_index: usize,
    total_chapters: usize,
    content: &str,
) -> Prompt {
    let (content, truncated) = truncate_chars(content, config.seed.truncation_ceiling);
    let length_hint = LengthHint::from(config.seed.length);
    let text = format!(
        "{SEED_TASK}\n\
\n\
Book title: {book_title}\n\
Chapter {chapter_index}/{total_chapters}: {chapter_title}\n\
\n\
Requirements:\n\
- Write in {language}.\n\
- Length: {length_hint}.\n\
- Capture the chapter's core ideas and key points.\n\
- This is the starting point of the book summary; later chapters will refine it.\n\
\n\
BEGIN_CHAPTER_TEXT\n\
{content}\n\
END_CHAPTER_TEXT\n\
{notice}\
\n\
Output ONLY the summary text, without any prefix or heading.\n",
        language = config.language,
        notice = truncation_notice(truncated),
    );
    Prompt {
        text,
        length_hint,
        truncated,
    }
}

pub fn refine_step(
    config: &SummaryConfig,
    book_title: &str,
    current_summary: &str,
    chapter_title: &str,
    chapter_index: usize,
    total_chapters: usize,
    content: &str,
) -> Prompt {
    let (content, truncated) = truncate_chars(content, config.refine.truncation_ceiling);
    let length_hint = LengthHint::Suggested(config.refine.growth.target_for(chapter_index));
    let text = format!(
        "{REFINE_TASK}\n\
\n\
Book title: {book_title}\n\
Progress: chapter {chapter_index}/{total_chapters}\n\
New chapter title: {chapter_title}\n\
\n\
BEGIN_CURRENT_SUMMARY\n\
{current_summary}\n\
END_CURRENT_SUMMARY\n\
\n\
BEGIN_CHAPTER_TEXT\n\
{content}\n\
END_CHAPTER_TEXT\n\
{notice}\
\n\
Requirements:\n\
- Write in {language}.\n\
- Integrate the new chapter's key points into the current summary.\n\
- Keep the summary coherent and logically connected.\n\
- The summary may grow as material accumulates; target length: {length_hint}.\n\
- Avoid repetition; highlight newly introduced core concepts.\n\
- Keep an objective, academic style.\n\
\n\
Output ONLY the complete refined summary, without any prefix or heading.\n",
        language = config.language,
        notice = truncation_notice(truncated),
    );
    Prompt {
        text,
        length_hint,
        truncated,
    }
}

pub fn finalize(config: &SummaryConfig, book_title: &str, refined_summary: &str) -> Prompt {
    let (refined_summary, truncated) =
        truncate_chars(refined_summary, config.finalize.truncation_ceiling);
    let length_hint = LengthHint::from(config.finalize.length);
    let text = format!(
        "{FINALIZE_TASK}\n\
\n\
Book title: {book_title}\n\
\n\
BEGIN_CURRENT_SUMMARY\n\
{refined_summary}\n\
END_CURRENT_SUMMARY\n\
{notice}\
\n\
Requirements:\n\
- Write in {language}.\n\
- Ensure a complete structure and clear logic.\n\
- Length: {length_hint}.\n\
- Cover the book's thesis, core arguments, main methods and conclusions.\n\
- Keep an objective, academic style.\n\
- Use paragraphs for readability.\n\
\n\
Output ONLY the final summary, without any prefix or heading.\n",
        language = config.language,
        notice = truncation_notice(truncated),
    );
    Prompt {
        text,
        length_hint,
        truncated,
    }
}
