use anyhow::Context as _;

/// Used when neither `EPUBDIGEST_LOG` nor `RUST_LOG` is set. The markup
/// parser and HTTP stack are chatty at debug level.
pub const DEFAULT_FILTER: &str = "info,html5ever=warn,hyper=warn,reqwest=warn";

fn build_filter() -> anyhow::Result<tracing_subscriber::EnvFilter> {
    let directives = std::env::var("EPUBDIGEST_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| DEFAULT_FILTER.to_owned());
    tracing_subscriber::EnvFilter::try_new(&directives)
        .with_context(|| format!("parse log filter: {directives}"))
}

pub fn init() -> anyhow::Result<()> {
    let filter = build_filter().context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
