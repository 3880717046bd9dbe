use tokio_util::sync::CancellationToken;

use crate::config::SummaryConfig;
use crate::error::{AbortCause, GenerationError, RunAborted, Stage};
use crate::formats::{ChapterText, SummaryState};
use crate::generate::GenerationClient;
use crate::prompt;

/// Folds chapters one at a time into a running summary, then polishes it.
///
/// `total_chapters` is the size of the resolved chapter sequence; chapter
/// numbers in prompts are `index + 1`, so they stay stable when empty chapters
/// were filtered out before this call.
pub async fn run(
    client: &GenerationClient,
    config: &SummaryConfig,
    book_title: &str,
    chapters: &[ChapterText],
    total_chapters: usize,
    cancel: &CancellationToken,
) -> Result<String, RunAborted> {
    let total = total_chapters.max(chapters.len());
    let Some((first, rest)) = chapters.split_first() else {
        return Err(RunAborted::new(Stage::Seed, AbortCause::NoContent));
    };

    check_cancelled(cancel, Stage::Seed)?;
    let seed_number = first.index + 1;
    tracing::info!(
        engine = client.engine(),
        chapter = seed_number,
        total,
        title = %first.title,
        "refine: seeding summary"
    );
    let request = prompt::refine_seed(
        config,
        book_title,
        &first.title,
        seed_number,
        total,
        &first.text,
    );
    let mut state = SummaryState {
        current_text: call(client, &request, cancel, Stage::Seed).await?,
        chapter_index: seed_number,
        total_chapters: total,
    };

    for chapter in rest {
        let number = chapter.index + 1;
        check_cancelled(cancel, Stage::Refine(number))?;
        state = step(client, config, book_title, &state, chapter, cancel).await?;
        tracing::info!(
            step = state.chapter_index,
            total = state.total_chapters,
            chars = state.current_text.chars().count(),
            "refine: progress"
        );
    }

    check_cancelled(cancel, Stage::Finalize)?;
    let request = prompt::finalize(config, book_title, &state.current_text);
    call(client, &request, cancel, Stage::Finalize).await
}

/// One refine step. Returns a new state; `state` is left untouched.
pub async fn step(
    client: &GenerationClient,
    config: &SummaryConfig,
    book_title: &str,
    state: &SummaryState,
    chapter: &ChapterText,
    cancel: &CancellationToken,
) -> Result<SummaryState, RunAborted> {
    let number = chapter.index + 1;
    let request = prompt::refine_step(
        config,
        book_title,
        &state.current_text,
        &chapter.title,
        number,
        state.total_chapters,
        &chapter.text,
    );
    tracing::debug!(
        chapter = number,
        title = %chapter.title,
        target = %request.length_hint,
        truncated = request.truncated,
        "refine step"
    );
    let current_text = call(client, &request, cancel, Stage::Refine(number)).await?;
    Ok(SummaryState {
        current_text,
        chapter_index: number,
        total_chapters: state.total_chapters,
    })
}

async fn call(
    client: &GenerationClient,
    request: &prompt::Prompt,
    cancel: &CancellationToken,
    stage: Stage,
) -> Result<String, RunAborted> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RunAborted::new(stage, AbortCause::Cancelled)),
        result = client.generate(request) => result.map_err(|err: GenerationError| {
            tracing::error!(stage = %stage, error = %err, "refine call failed");
            RunAborted::new(stage, err)
        }),
    }
}

fn check_cancelled(cancel: &CancellationToken, stage: Stage) -> Result<(), RunAborted> {
    if cancel.is_cancelled() {
        return Err(RunAborted::new(stage, AbortCause::Cancelled));
    }
    Ok(())
}
