use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::json;
use crate::model::ResolvedChapter;
use crate::retry::RetryPolicy;

/// Chapter replies carry this in `content` when the text cannot be found.
pub const CHAPTER_NOT_FOUND: &str = "CHAPTER_NOT_FOUND";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ResolveNovel,
    ResolveChapter { number: u32 },
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolveNovel => "resolve-novel",
            Self::ResolveChapter { .. } => "resolve-chapter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub intent: Intent,
    pub query: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleReply {
    pub text: String,
    /// Candidate source URLs from grounding metadata, best first.
    pub sources: Vec<String>,
}

/// The external text-generation/search service. Its answers are untrusted.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn ask(&self, request: &OracleRequest) -> Result<OracleReply>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NovelInfo {
    pub exists: bool,
    pub title: String,
    pub author: Option<String>,
    pub total_chapters: Option<u32>,
    pub chapter_titles: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NovelReply {
    exists: bool,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    /// Models sometimes answer `12.0` or `null`; anything usable is rounded.
    #[serde(default)]
    total_chapters: Option<f64>,
    #[serde(default)]
    chapter_titles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ChapterReply {
    found: bool,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Typed front of an [`Oracle`]: builds the queries, parses the replies and
/// applies the retry policy.
#[derive(Clone)]
pub struct ContentOracleClient {
    oracle: Arc<dyn Oracle>,
    retry: RetryPolicy,
}

impl ContentOracleClient {
    pub fn new(oracle: Arc<dyn Oracle>, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    pub async fn resolve_novel(&self, name: &str) -> Result<NovelInfo> {
        let name = validate_name(name)?;
        let request = OracleRequest {
            intent: Intent::ResolveNovel,
            query: novel_query(name),
        };
        tracing::debug!(intent = request.intent.as_str(), name, "ask oracle");

        let reply = self
            .retry
            .run("resolve novel", || self.oracle.ask(&request))
            .await?;
        let parsed: NovelReply = json::parse_object(&reply.text)?;

        let title = parsed
            .title
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| name.to_owned());
        let author = parsed
            .author
            .map(|a| a.trim().to_owned())
            .filter(|a| !a.is_empty());

        Ok(NovelInfo {
            exists: parsed.exists,
            title,
            author,
            total_chapters: parsed.total_chapters.and_then(chapter_estimate),
            chapter_titles: parsed.chapter_titles.unwrap_or_default(),
        })
    }

    pub async fn resolve_chapter(
        &self,
        novel_title: &str,
        number: u32,
        title_hint: &str,
    ) -> Result<ResolvedChapter> {
        let request = OracleRequest {
            intent: Intent::ResolveChapter { number },
            query: chapter_query(novel_title, number, title_hint),
        };
        tracing::debug!(
            intent = request.intent.as_str(),
            novel = novel_title,
            number,
            "ask oracle"
        );

        let reply = self
            .retry
            .run("resolve chapter", || self.oracle.ask(&request))
            .await?;
        let parsed: ChapterReply = json::parse_object(&reply.text)?;

        let content = parsed.content.unwrap_or_default();
        if !parsed.found || content.trim().is_empty() || content.trim() == CHAPTER_NOT_FOUND {
            return Err(Error::ContentUnavailable(format!(
                "chapter {number} of \"{novel_title}\" could not be found"
            )));
        }

        let title = parsed
            .title
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| title_hint.to_owned());

        Ok(ResolvedChapter {
            title,
            content,
            source_url: reply.sources.into_iter().next(),
        })
    }
}

fn chapter_estimate(raw: f64) -> Option<u32> {
    if !raw.is_finite() {
        return None;
    }
    let rounded = raw.round();
    (rounded >= 1.0).then(|| rounded.min(f64::from(u32::MAX)) as u32)
}

/// Trims the name and rejects anything shorter than two characters.
pub fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.chars().count() < 2 {
        return Err(Error::Validation(
            "novel name must be at least 2 characters".to_owned(),
        ));
    }
    Ok(name)
}

fn novel_query(name: &str) -> String {
    format!(
        "Find the serialized web novel or light novel named \"{name}\".\n\
Search the web for its official title, author and the number of chapters published so far.\n\
If you can find chapter titles, list them in order (at most the first 200).\n\
\n\
Output ONLY a single JSON object (no markdown fences, no commentary):\n\
{{\"exists\": true, \"title\": \"...\", \"author\": \"...\", \"totalChapters\": 0, \"chapterTitles\": [\"...\"]}}\n\
If no such novel exists, output {{\"exists\": false}}.\n"
    )
}

fn chapter_query(novel_title: &str, number: u32, title_hint: &str) -> String {
    format!(
        "Find the full text of chapter {number} of the novel \"{novel_title}\".\n\
The chapter may be titled \"{title_hint}\".\n\
Reproduce the chapter text as completely as you can, keeping paragraph breaks.\n\
\n\
Output ONLY a single JSON object (no markdown fences, no commentary):\n\
{{\"found\": true, \"title\": \"<chapter title>\", \"content\": \"<chapter text>\"}}\n\
If the chapter cannot be found, output {{\"found\": false, \"title\": \"\", \"content\": \"{CHAPTER_NOT_FOUND}\"}}.\n"
    )
}
