use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    epubdigest::logging::init().context("init logging")?;

    let cli = epubdigest::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        epubdigest::cli::Command::Summarize(args) => {
            epubdigest::summarize::run(args).await.context("summarize")?;
        }
        epubdigest::cli::Command::Chapters(args) => {
            epubdigest::summarize::chapters(args).context("chapters")?;
        }
    }

    Ok(())
}
