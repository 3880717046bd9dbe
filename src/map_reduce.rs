use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::SummaryConfig;
use crate::error::{AbortCause, RunAborted, Stage};
use crate::formats::{ChapterStatus, ChapterSummary, ChapterText};
use crate::generate::GenerationClient;
use crate::prompt;

#[derive(Debug, Clone)]
pub struct MapReduceOutput {
    /// One entry per input chapter, in input order.
    pub chapters: Vec<ChapterSummary>,
    pub full_summary: String,
}

enum ChapterOutcome {
    Ok(String),
    Failed(String),
    Cancelled,
}

/// Summarizes every chapter concurrently, then reduces the successful
/// summaries into one book summary.
pub async fn run(
    client: &GenerationClient,
    config: &SummaryConfig,
    book_title: &str,
    chapters: &[ChapterText],
    cancel: &CancellationToken,
) -> Result<MapReduceOutput, RunAborted> {
    let summaries = summarize_chapters(client, config, chapters, cancel).await?;
    let completed = completed_indices(&summaries);

    let combined = prompt::combine_chapter_summaries(&summaries);
    if combined.is_empty() {
        return Err(RunAborted::new(Stage::Reduce, AbortCause::NoContent));
    }
    if cancel.is_cancelled() {
        return Err(RunAborted::new(Stage::Reduce, AbortCause::Cancelled).with_completed(completed));
    }

    tracing::info!(
        engine = client.engine(),
        summarized = completed.len(),
        total = summaries.len(),
        "map-reduce: reducing chapter summaries"
    );
    let request = prompt::book_summary(config, book_title, &combined);
    if request.truncated {
        tracing::warn!(
            ceiling = config.book.truncation_ceiling,
            "combined chapter summaries exceed the book ceiling; truncating"
        );
    }
    let full_summary = tokio::select! {
        _ = cancel.cancelled() => {
            return Err(RunAborted::new(Stage::Reduce, AbortCause::Cancelled).with_completed(completed));
        }
        result = client.generate(&request) => result
            .map_err(|err| RunAborted::new(Stage::Reduce, err).with_completed(completed))?,
    };

    Ok(MapReduceOutput {
        chapters: summaries,
        full_summary,
    })
}

/// Runs one generation call per chapter with at most `config.concurrency` in
/// flight. Results are stored by chapter index, so completion order does not
/// affect the output order.
pub async fn summarize_chapters(
    client: &GenerationClient,
    config: &SummaryConfig,
    chapters: &[ChapterText],
    cancel: &CancellationToken,
) -> Result<Vec<ChapterSummary>, RunAborted> {
    let total = chapters.len();
    let concurrency = config.concurrency.max(1).min(total.max(1));
    let config = Arc::new(config.clone());
    tracing::info!(
        engine = client.engine(),
        chapters = total,
        concurrency,
        "map-reduce: summarizing chapters"
    );

    let mut join_set = tokio::task::JoinSet::new();
    let mut next_idx = 0usize;
    let mut results: Vec<Option<ChapterSummary>> = vec![None; total];
    let mut done = 0usize;
    let mut failed = 0usize;
    let started_at = Instant::now();
    let mut last_progress_log_at = started_at;

    while next_idx < total || !join_set.is_empty() {
        while next_idx < total && join_set.len() < concurrency && !cancel.is_cancelled() {
            let slot = next_idx;
            let chapter = chapters[slot].clone();
            let client = client.clone();
            let config = Arc::clone(&config);
            let cancel = cancel.clone();

            join_set.spawn(async move {
                tracing::debug!(chapter_index = chapter.index, title = %chapter.title, "summarize chapter");
                let request = prompt::chapter_summary(&config, &chapter.title, &chapter.text);
                if request.truncated {
                    tracing::warn!(
                        chapter_index = chapter.index,
                        ceiling = config.chapter.truncation_ceiling,
                        "chapter text exceeds the chapter ceiling; truncating"
                    );
                }
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => ChapterOutcome::Cancelled,
                    result = client.generate(&request) => match result {
                        Ok(summary) => ChapterOutcome::Ok(summary),
                        Err(err) => ChapterOutcome::Failed(err.to_string()),
                    },
                };
                (slot, chapter, outcome)
            });

            next_idx += 1;
        }

        if cancel.is_cancelled() && next_idx < total {
            tracing::info!(
                dispatched = next_idx,
                total,
                "map-reduce: cancellation requested; not dispatching remaining chapters"
            );
            next_idx = total;
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        let (slot, chapter, outcome) = match joined {
            Ok(joined) => joined,
            Err(err) => {
                tracing::error!(error = %err, "chapter task panicked or was aborted");
                continue;
            }
        };
        match outcome {
            ChapterOutcome::Ok(summary) => {
                results[slot] = Some(ChapterSummary {
                    index: chapter.index,
                    title: chapter.title,
                    summary,
                    status: ChapterStatus::Summarized,
                });
            }
            ChapterOutcome::Failed(error) => {
                failed += 1;
                tracing::warn!(
                    chapter_index = chapter.index,
                    title = %chapter.title,
                    error = %error,
                    "chapter summary failed; recording placeholder"
                );
                results[slot] = Some(failed_placeholder(chapter, error));
            }
            ChapterOutcome::Cancelled => continue,
        }

        done += 1;
        if done == total || last_progress_log_at.elapsed() >= Duration::from_secs(2) {
            tracing::info!(
                done,
                total,
                failed,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "map-reduce: progress"
            );
            last_progress_log_at = Instant::now();
        }
    }

    if cancel.is_cancelled() {
        let completed = results
            .iter()
            .flatten()
            .filter(|s| s.is_summarized())
            .map(|s| s.index)
            .collect();
        return Err(RunAborted::new(Stage::Chapters, AbortCause::Cancelled).with_completed(completed));
    }

    if failed > 0 {
        tracing::warn!(
            failed,
            total,
            "map-reduce: some chapters failed; reducing over the rest"
        );
    }

    Ok(results
        .into_iter()
        .zip(chapters)
        .map(|(slot, chapter)| {
            slot.unwrap_or_else(|| {
                failed_placeholder(chapter.clone(), "chapter task did not complete".to_owned())
            })
        })
        .collect())
}

fn failed_placeholder(chapter: ChapterText, error: String) -> ChapterSummary {
    ChapterSummary {
        index: chapter.index,
        title: chapter.title,
        summary: String::new(),
        status: ChapterStatus::Failed { error },
    }
}

fn completed_indices(summaries: &[ChapterSummary]) -> Vec<usize> {
    summaries
        .iter()
        .filter(|s| s.is_summarized())
        .map(|s| s.index)
        .collect()
}
