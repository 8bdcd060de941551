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
    novelgrab::logging::init().context("init logging")?;

    let cli = novelgrab::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        novelgrab::cli::Command::Search(args) => {
            novelgrab::commands::search(args).await.context("search")?;
        }
        novelgrab::cli::Command::Read(args) => {
            novelgrab::commands::read(args).await.context("read")?;
        }
        novelgrab::cli::Command::Download(args) => {
            novelgrab::commands::download(args)
                .await
                .context("download")?;
        }
    }

    Ok(())
}
