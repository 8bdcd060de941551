use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Context as _;
use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{ChapterRange, Manifest};

pub const GENERATOR_TAG: &str = concat!("novelgrab ", env!("CARGO_PKG_VERSION"));

const SEPARATOR: &str = "---";

/// A compiled text bundle, ready for the host to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub body: String,
    pub chapters: usize,
}

/// Concatenates every chapter with content in `range`, ascending by number.
/// Reads the manifest only.
pub fn compile(manifest: &Manifest, range: ChapterRange) -> Result<ExportArtifact> {
    let mut chapters: Vec<_> = manifest
        .in_range(range)
        .filter_map(|c| c.content.as_deref().map(|content| (c, content)))
        .collect();
    if chapters.is_empty() {
        return Err(Error::ExportEmpty {
            start: range.start,
            end: range.end,
        });
    }
    chapters.sort_by_key(|(c, _)| c.number);

    let mut body = String::new();
    body.push_str(&format!("# {}\n\n", manifest.title));
    if let Some(author) = &manifest.author {
        body.push_str(&format!("Author: {author}\n"));
    }
    body.push_str(&format!("Chapters: {range}\n"));
    body.push_str(&format!("Generated by: {GENERATOR_TAG}\n\n{SEPARATOR}\n\n"));

    for (chapter, content) in &chapters {
        body.push_str(&format!("## {}\n\n", chapter.title));
        body.push_str(content.trim_end());
        body.push_str(&format!("\n\n{SEPARATOR}\n\n"));
    }

    Ok(ExportArtifact {
        filename: export_filename(&manifest.title, range),
        body,
        chapters: chapters.len(),
    })
}

/// `{sanitized-title}_{start}-{end}.md`, lowercased with every non
/// alphanumeric character replaced by `_`.
pub fn export_filename(title: &str, range: ChapterRange) -> String {
    let sanitized: String = title
        .to_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    format!("{sanitized}_{}-{}.md", range.start, range.end)
}

/// Host-side persistence for compiled artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Stores the artifact and returns where it can be found.
    async fn save(&self, artifact: &ExportArtifact) -> anyhow::Result<String>;
}

/// Writes artifacts into a directory.
#[derive(Debug, Clone)]
pub struct LocalDirSink {
    dir: PathBuf,
    force: bool,
}

impl LocalDirSink {
    pub fn new(dir: impl Into<PathBuf>, force: bool) -> Self {
        Self {
            dir: dir.into(),
            force,
        }
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }
}

#[async_trait]
impl ArtifactSink for LocalDirSink {
    async fn save(&self, artifact: &ExportArtifact) -> anyhow::Result<String> {
        let dir = self.dir.clone();
        let path = self.path_for(&artifact.filename);
        let body = artifact.body.clone();
        let force = self.force;
        let path_for_blocking = path.clone();

        tokio::task::spawn_blocking(move || write_file(&dir, &path_for_blocking, &body, force))
            .await
            .context("join export write task")??;

        tracing::info!(path = %path.display(), chapters = artifact.chapters, "export written");
        Ok(path.display().to_string())
    }
}

fn write_file(dir: &Path, path: &Path, body: &str, force: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create export output dir: {}", dir.display()))?;

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
    file.write_all(body.as_bytes())
        .with_context(|| format!("write output: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("flush output: {}", path.display()))?;
    Ok(())
}

/// Keeps artifacts in memory, keyed by filename; nothing touches disk.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: Mutex<BTreeMap<String, ExportArtifact>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filename: &str) -> Option<ExportArtifact> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(filename)
            .cloned()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn save(&self, artifact: &ExportArtifact) -> anyhow::Result<String> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(artifact.filename.clone(), artifact.clone());
        Ok(format!("/exports/{}", artifact.filename))
    }
}
