use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Pending,
    Loading,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChapterRecord {
    pub id: String,
    pub number: u32,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub status: ChapterStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Text and provenance for one chapter, as resolved by the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChapter {
    pub title: String,
    pub content: String,
    pub source_url: Option<String>,
}

impl ChapterRecord {
    pub fn placeholder(number: u32, title: Option<&str>) -> Self {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Chapter {number}"));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            number,
            title,
            content: None,
            status: ChapterStatus::Pending,
            error_message: None,
            source_url: None,
        }
    }

    /// Pending or failed records are eligible for an automatic fetch.
    pub fn needs_fetch(&self) -> bool {
        matches!(self.status, ChapterStatus::Pending | ChapterStatus::Error)
    }

    pub fn begin_loading(&mut self) {
        self.status = ChapterStatus::Loading;
        self.error_message = None;
    }

    pub fn complete(&mut self, resolved: ResolvedChapter) {
        self.title = resolved.title;
        self.content = Some(resolved.content);
        self.source_url = resolved.source_url;
        self.status = ChapterStatus::Completed;
        self.error_message = None;
    }

    /// Records the failure; content from an earlier success is kept.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = ChapterStatus::Error;
        self.error_message = Some(message.into());
    }
}

/// One resolved novel and its chapter records, ordered by number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub total_chapters: u32,
    pub chapters: Vec<ChapterRecord>,
}

impl Manifest {
    pub fn chapter(&self, id: &str) -> Option<&ChapterRecord> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn chapter_mut(&mut self, id: &str) -> Option<&mut ChapterRecord> {
        self.chapters.iter_mut().find(|c| c.id == id)
    }

    pub fn chapter_by_number(&self, number: u32) -> Option<&ChapterRecord> {
        self.chapters.iter().find(|c| c.number == number)
    }

    pub fn in_range(&self, range: ChapterRange) -> impl Iterator<Item = &ChapterRecord> {
        self.chapters
            .iter()
            .filter(move |c| range.contains(c.number))
    }
}

/// Inclusive, 1-based chapter number range. `start > end` selects nothing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChapterRange {
    pub start: u32,
    pub end: u32,
}

impl ChapterRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, number: u32) -> bool {
        self.start <= number && number <= self.end
    }
}

impl std::fmt::Display for ChapterRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Observable state of a running batch job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchProgress {
    /// Records in range that hold content (already completed plus fetched).
    pub current: usize,
    pub total: usize,
    /// Fetches attempted so far in this job, successful or not.
    pub attempted: usize,
    #[serde(flatten)]
    pub range: ChapterRange,
}
