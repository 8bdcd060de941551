use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::batch::BatchOutcome;
use crate::cli::{DownloadArgs, OracleArgs, ReadArgs, SearchArgs};
use crate::config::Config;
use crate::export::{ArtifactSink, LocalDirSink, MemorySink};
use crate::model::ChapterStatus;
use crate::openai::OpenAiOracle;
use crate::oracle::ContentOracleClient;
use crate::session::Session;

/// Wires config, the OpenAI oracle and `sink` into a session.
pub fn open_session(config: &Config, sink: Arc<dyn ArtifactSink>) -> anyhow::Result<Session> {
    let oracle = OpenAiOracle::new(&config.oracle).context("create openai oracle")?;
    let client = ContentOracleClient::new(Arc::new(oracle), config.retry);
    Ok(Session::new(client, sink, config))
}

fn load_config(oracle: &OracleArgs) -> anyhow::Result<Config> {
    let mut config = Config::from_env().context("load config")?;
    if let Some(model) = &oracle.model {
        config.oracle.model = model.clone();
    }
    Ok(config)
}

pub async fn search(args: SearchArgs) -> anyhow::Result<()> {
    let config = load_config(&args.oracle)?;
    let session = open_session(&config, Arc::new(MemorySink::new()))?;
    let manifest = session.search(&args.name).await?;

    let mut out = std::io::stdout().lock();
    if args.json {
        let json = serde_json::to_string_pretty(&manifest).context("serialize manifest")?;
        writeln!(out, "{json}")?;
        return Ok(());
    }

    writeln!(out, "{}", manifest.title)?;
    if let Some(author) = &manifest.author {
        writeln!(out, "Author: {author}")?;
    }
    writeln!(out, "Chapters: {}", manifest.total_chapters)?;
    for chapter in &manifest.chapters {
        writeln!(out, "{:>5}. {}", chapter.number, chapter.title)?;
    }
    Ok(())
}

pub async fn read(args: ReadArgs) -> anyhow::Result<()> {
    let config = load_config(&args.oracle)?;
    let session = open_session(&config, Arc::new(MemorySink::new()))?;
    let manifest = session.search(&args.name).await?;

    let Some(id) = manifest
        .chapter_by_number(args.chapter)
        .map(|c| c.id.clone())
    else {
        anyhow::bail!(
            "chapter {} is outside 1-{} for {}",
            args.chapter,
            manifest.total_chapters,
            manifest.title
        );
    };

    let record = session.open_chapter(&id).await?;
    if record.status != ChapterStatus::Completed {
        anyhow::bail!(
            "chapter {}: {}",
            record.number,
            record.error_message.as_deref().unwrap_or("not loaded")
        );
    }

    let mut out = std::io::stdout().lock();
    writeln!(out, "{}\n", record.title)?;
    writeln!(out, "{}", record.content.as_deref().unwrap_or_default().trim_end())?;
    if let Some(source) = &record.source_url {
        tracing::info!(source = %source, "chapter source");
    }
    Ok(())
}

pub async fn download(args: DownloadArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.oracle)?;
    if let Some(delay_ms) = args.delay_ms {
        config.batch_delay = Duration::from_millis(delay_ms);
    }
    let sink = LocalDirSink::new(&args.out, args.force);
    let session = Arc::new(open_session(&config, Arc::new(sink))?);
    session.search(&args.name).await?;

    let batch = session.spawn_download(args.start, args.end)?;

    let interrupt = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; cancelling download");
                session.cancel_batch();
            }
        })
    };
    let reporter = {
        let mut progress = session.subscribe_progress();
        tokio::spawn(async move {
            while progress.changed().await.is_ok() {
                let Some(p) = *progress.borrow_and_update() else {
                    continue;
                };
                tracing::info!(
                    current = p.current,
                    total = p.total,
                    attempted = p.attempted,
                    "progress"
                );
            }
        })
    };

    let outcome = batch.await.context("join download task");
    interrupt.abort();
    reporter.abort();

    match outcome? {
        BatchOutcome::Exported {
            report, location, ..
        } => {
            if report.failed > 0 {
                tracing::warn!(failed = report.failed, "some chapters could not be fetched");
            }
            println!("{location}");
            Ok(())
        }
        BatchOutcome::Empty => anyhow::bail!(
            "no chapters in range {}-{}",
            args.start,
            args.end
        ),
        BatchOutcome::Cancelled { report } => anyhow::bail!(
            "download cancelled after {} of {} chapters",
            report.attempted,
            report.selected - report.already_completed
        ),
        BatchOutcome::ExportFailed { message, .. } => {
            anyhow::bail!("export failed: {message}")
        }
    }
}
