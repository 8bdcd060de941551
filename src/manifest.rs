use crate::error::{Error, Result};
use crate::model::{ChapterRecord, Manifest};
use crate::oracle::ContentOracleClient;

/// Chapter count used when the oracle gives no estimate.
pub const DEFAULT_TOTAL_CHAPTERS: u32 = 100;

/// Resolves `name` through the oracle and lays out placeholder records
/// numbered `1..=total`.
pub async fn build(
    client: &ContentOracleClient,
    name: &str,
    max_chapters: u32,
) -> Result<Manifest> {
    let info = client.resolve_novel(name).await?;
    if !info.exists {
        return Err(Error::NotFound(name.trim().to_owned()));
    }

    let mut total = info.total_chapters.unwrap_or(DEFAULT_TOTAL_CHAPTERS);
    if total > max_chapters {
        tracing::warn!(
            title = %info.title,
            estimate = total,
            max_chapters,
            "chapter estimate exceeds cap; clamping"
        );
        total = max_chapters;
    }

    let chapters = (1..=total)
        .map(|number| {
            let suggested = info
                .chapter_titles
                .get((number - 1) as usize)
                .map(String::as_str);
            ChapterRecord::placeholder(number, suggested)
        })
        .collect();

    tracing::info!(
        title = %info.title,
        author = ?info.author,
        chapters = total,
        "manifest built"
    );

    Ok(Manifest {
        title: info.title,
        author: info.author,
        total_chapters: total,
        chapters,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::model::ChapterStatus;
    use crate::oracle::OracleReply;
    use crate::retry::RetryPolicy;
    use crate::testing::ScriptedOracle;

    fn client_replying(text: &'static str) -> ContentOracleClient {
        let oracle = ScriptedOracle::new(move |_| {
            Ok(OracleReply {
                text: text.to_owned(),
                sources: vec![],
            })
        });
        ContentOracleClient::new(Arc::new(oracle), RetryPolicy::default())
    }

    #[tokio::test]
    async fn builds_contiguous_pending_records_with_suggested_titles() {
        let client = client_replying(
            r#"{"exists": true, "title": "Novel", "author": "A", "totalChapters": 4, "chapterTitles": ["Start", "", "Third"]}"#,
        );
        let manifest = build(&client, "Novel", 5000).await.unwrap();

        assert_eq!(manifest.total_chapters, 4);
        let numbers: Vec<_> = manifest.chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        let titles: Vec<_> = manifest.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Start", "Chapter 2", "Third", "Chapter 4"]);
        assert!(manifest.chapters.iter().all(|c| c.status == ChapterStatus::Pending));

        let ids: HashSet<_> = manifest.chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), 4);
    }

    #[tokio::test]
    async fn missing_estimate_defaults_to_one_hundred() {
        let client = client_replying(r#"{"exists": true, "title": "Novel"}"#);
        let manifest = build(&client, "Novel", 5000).await.unwrap();
        assert_eq!(manifest.total_chapters, DEFAULT_TOTAL_CHAPTERS);
        assert_eq!(manifest.chapters.len(), 100);
        assert_eq!(manifest.chapters[99].title, "Chapter 100");
    }

    #[tokio::test]
    async fn oversized_estimate_is_clamped() {
        let client = client_replying(r#"{"exists": true, "title": "Novel", "totalChapters": 999999}"#);
        let manifest = build(&client, "Novel", 50).await.unwrap();
        assert_eq!(manifest.chapters.len(), 50);
    }

    #[tokio::test]
    async fn nonexistent_novel_is_not_found() {
        let client = client_replying(r#"{"exists": false}"#);
        let err = build(&client, "Nothing Here", 5000).await.unwrap_err();
        assert_eq!(err, Error::NotFound("Nothing Here".to_owned()));
    }
}
