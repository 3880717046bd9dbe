use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::anthropic::{AnthropicConfig, AnthropicGenerator};
use crate::cli::{ChaptersArgs, LlmEngine, SummarizeArgs};
use crate::command::CommandGenerator;
use crate::config::SummaryConfig;
use crate::content;
use crate::epub::EpubArchive;
use crate::formats::{
    BookSummary, ChapterStatus, ChapterText, ResolvedChapter, Strategy, SummaryFrontMatter,
};
use crate::generate::{GenerationClient, NoopGenerator, TextGenerator};
use crate::map_reduce;
use crate::nav::NavigationIndex;
use crate::openai::{OpenAiConfig, OpenAiGenerator};
use crate::refine;
use crate::resolve::{Resolution, resolve};

const UNKNOWN_TITLE: &str = "Unknown Title";

/// An opened book: resolved chapters with their loaded text.
#[derive(Debug)]
pub struct PreparedBook {
    pub metadata_title: Option<String>,
    pub navigation: &'static str,
    pub spine_len: usize,
    pub resolution: Resolution,
    /// Parallel to `resolution.chapters`.
    pub chapters: Vec<ChapterText>,
}

pub fn prepare_book(path: &Path) -> anyhow::Result<PreparedBook> {
    let mut epub = EpubArchive::open(path)?;
    let spine = epub.spine_index();
    let navigation = NavigationIndex::new(epub.navigation_source());
    if navigation.is_empty() {
        tracing::warn!(path = %path.display(), "epub has no table of contents");
    }

    let resolution = resolve(navigation.roots(), &spine);
    tracing::info!(
        navigation = navigation.kind(),
        spine = spine.len(),
        leaves = navigation.leaves().len(),
        chapters = resolution.chapters.len(),
        warnings = resolution.warnings.len(),
        "resolved chapters"
    );

    let chapters = content::load_chapters(&resolution.chapters, &spine, &mut epub);
    Ok(PreparedBook {
        metadata_title: epub.title().map(str::to_owned),
        navigation: navigation.kind(),
        spine_len: spine.len(),
        resolution,
        chapters,
    })
}

pub fn default_output_path(epub: &Path, strategy: Strategy) -> PathBuf {
    let stem = epub
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_owned());
    let file_name = format!("{stem}-{}.md", strategy.file_suffix());
    match epub.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

fn build_generator(args: &SummarizeArgs) -> anyhow::Result<Arc<dyn TextGenerator>> {
    let model = args.model.as_deref();
    if model.is_some() && matches!(args.engine, LlmEngine::Noop | LlmEngine::Command) {
        tracing::warn!(engine = args.engine.as_str(), "--model has no effect for this engine");
    }
    let generator: Arc<dyn TextGenerator> = match args.engine {
        LlmEngine::Noop => Arc::new(NoopGenerator),
        LlmEngine::Command => {
            let Some(program) = args.command.as_deref() else {
                anyhow::bail!("missing --command (required when --engine=command)");
            };
            Arc::new(CommandGenerator::new(program, args.command_args.clone()))
        }
        LlmEngine::Openai => Arc::new(OpenAiGenerator::new(
            OpenAiConfig::from_env()?.with_model(model),
        )?),
        LlmEngine::Anthropic => Arc::new(AnthropicGenerator::new(
            AnthropicConfig::from_env()?.with_model(model),
        )?),
    };
    Ok(generator)
}

fn spawn_interrupt_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling run");
            cancel.cancel();
        }
    })
}

pub async fn run(args: SummarizeArgs) -> anyhow::Result<()> {
    let config = SummaryConfig::load(args.config.as_deref(), &args.config_overrides())
        .context("load config")?;
    let out = args
        .out
        .clone()
        .unwrap_or_else(|| default_output_path(&args.epub, args.strategy));
    if out.exists() && !args.force {
        anyhow::bail!("output already exists: {}", out.display());
    }
    let generator = build_generator(&args)?;

    let book = tokio::task::block_in_place(|| prepare_book(&args.epub))
        .with_context(|| format!("prepare epub: {}", args.epub.display()))?;
    let title = args
        .title
        .clone()
        .or_else(|| book.metadata_title.clone())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_owned());

    let total_chapters = book.chapters.len();
    let chapters = book
        .chapters
        .into_iter()
        .filter(|chapter| {
            let keep = !chapter.text.trim().is_empty();
            if !keep {
                tracing::info!(
                    chapter_index = chapter.index,
                    title = %chapter.title,
                    "chapter has no text; skipping"
                );
            }
            keep
        })
        .collect::<Vec<_>>();

    tracing::info!(
        title = %title,
        strategy = args.strategy.file_suffix(),
        engine = args.engine.as_str(),
        chapters = chapters.len(),
        total = total_chapters,
        language = %config.language,
        "summarize"
    );

    let client = GenerationClient::new(generator, &config);
    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt_handler(cancel.clone());

    let result = match args.strategy {
        Strategy::MapReduce => {
            map_reduce::run(&client, &config, &title, &chapters, &cancel)
                .await
                .map(|output| (output.full_summary, output.chapters))
        }
        Strategy::Refine => {
            refine::run(&client, &config, &title, &chapters, total_chapters, &cancel)
                .await
                .map(|full_summary| (full_summary, Vec::new()))
        }
    };
    interrupt.abort();
    let (full_summary, chapter_summaries) = result?;

    let summary = BookSummary {
        title,
        strategy: args.strategy,
        full_summary,
        chapters: chapter_summaries,
        generated_at: Utc::now(),
    };
    let front_matter = SummaryFrontMatter {
        title: summary.title.clone(),
        source: args
            .epub
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        strategy: summary.strategy,
        engine: client.engine().to_owned(),
        language: config.language.clone(),
        generated_at: summary
            .generated_at
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        chapters: total_chapters,
        failed_chapters: summary
            .chapters
            .iter()
            .filter(|c| !c.is_summarized())
            .map(|c| c.index + 1)
            .collect(),
    };

    let rendered = render_markdown(&summary, &front_matter)?;
    write_output(&out, &rendered, args.force)?;
    tracing::info!(out = %out.display(), "wrote summary");
    Ok(())
}

pub fn render_markdown(
    summary: &BookSummary,
    front_matter: &SummaryFrontMatter,
) -> anyhow::Result<String> {
    let yaml = serde_yaml::to_string(front_matter).context("serialize front matter")?;
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&yaml);
    out.push_str("---\n\n");
    out.push_str(&format!("# {}\n\n", summary.title));
    out.push_str("## Book Summary\n\n");
    out.push_str(summary.full_summary.trim());
    out.push('\n');

    if summary.strategy == Strategy::MapReduce && !summary.chapters.is_empty() {
        out.push_str("\n## Chapter Summaries\n");
        for chapter in &summary.chapters {
            out.push_str(&format!("\n### {}\n\n", chapter.title));
            match &chapter.status {
                ChapterStatus::Summarized => out.push_str(chapter.summary.trim()),
                ChapterStatus::Failed { error } => {
                    out.push_str(&format!("_Summary unavailable: {error}_"));
                }
            }
            out.push('\n');
        }
    }
    Ok(out)
}

fn write_output(path: &Path, contents: &str, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("output already exists: {}", path.display());
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("open output: {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("write output: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("flush output: {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ChapterListing<'a> {
    index: usize,
    title: &'a str,
    target: &'a str,
    start: usize,
    end: usize,
    chars: usize,
}

#[derive(Debug, Serialize)]
struct WarningListing<'a> {
    kind: String,
    title: &'a str,
    target: &'a str,
}

#[derive(Debug, Serialize)]
struct ChaptersReport<'a> {
    title: Option<&'a str>,
    navigation: &'a str,
    spine: usize,
    chapters: Vec<ChapterListing<'a>>,
    warnings: Vec<WarningListing<'a>>,
}

fn chapters_report(book: &PreparedBook) -> ChaptersReport<'_> {
    let chapters = book
        .resolution
        .chapters
        .iter()
        .zip(&book.chapters)
        .map(|(resolved, text): (&ResolvedChapter, &ChapterText)| ChapterListing {
            index: text.index + 1,
            title: &resolved.title,
            target: &resolved.target,
            start: resolved.start,
            end: resolved.end,
            chars: text.text.chars().count(),
        })
        .collect();
    let warnings = book
        .resolution
        .warnings
        .iter()
        .map(|w| WarningListing {
            kind: w.kind.to_string(),
            title: &w.title,
            target: &w.target,
        })
        .collect();
    ChaptersReport {
        title: book.metadata_title.as_deref(),
        navigation: book.navigation,
        spine: book.spine_len,
        chapters,
        warnings,
    }
}

fn render_chapters_text(report: &ChaptersReport<'_>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} ({} navigation, {} spine units)\n",
        report.title.unwrap_or(UNKNOWN_TITLE),
        report.navigation,
        report.spine
    ));
    for chapter in &report.chapters {
        let content = if chapter.chars == 0 {
            "empty".to_owned()
        } else {
            format!("{} chars", chapter.chars)
        };
        out.push_str(&format!(
            "{:>3}. {} [{}..{}) {}\n",
            chapter.index, chapter.title, chapter.start, chapter.end, content
        ));
    }
    out.push_str(&format!(
        "{} chapters, {} resolution warnings\n",
        report.chapters.len(),
        report.warnings.len()
    ));
    out
}

pub fn chapters(args: ChaptersArgs) -> anyhow::Result<()> {
    let book = prepare_book(&args.epub)
        .with_context(|| format!("prepare epub: {}", args.epub.display()))?;
    let report = chapters_report(&book);
    if args.json {
        let json = serde_json::to_string_pretty(&report).context("serialize chapters")?;
        println!("{json}");
    } else {
        print!("{}", render_chapters_text(&report));
    }
    Ok(())
}
