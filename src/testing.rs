use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::oracle::{Intent, Oracle, OracleReply, OracleRequest};

type Responder = dyn Fn(&OracleRequest) -> Result<OracleReply> + Send + Sync;

/// Oracle backed by a closure; records every request it sees.
pub struct ScriptedOracle {
    respond: Box<Responder>,
    calls: Arc<Mutex<Vec<OracleRequest>>>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: Arc<AtomicUsize>,
}

impl ScriptedOracle {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&OracleRequest) -> Result<OracleReply> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: Arc::new(Mutex::new(Vec::new())),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every answer takes `latency` of (tokio) time to arrive.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Highest number of requests observed in flight at once.
    pub fn peak_in_flight(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.peak_in_flight)
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<OracleRequest>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn ask(&self, request: &OracleRequest) -> Result<OracleReply> {
        self.calls.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.respond)(request)
    }
}

pub fn novel_reply(title: &str, total: u32) -> OracleReply {
    OracleReply {
        text: serde_json::json!({
            "exists": true,
            "title": title,
            "author": "Test Author",
            "totalChapters": total,
            "chapterTitles": [],
        })
        .to_string(),
        sources: vec![],
    }
}

pub fn chapter_reply(number: u32) -> OracleReply {
    OracleReply {
        text: serde_json::json!({
            "found": true,
            "title": format!("Resolved {number}"),
            "content": format!("Body of chapter {number}."),
        })
        .to_string(),
        sources: vec![format!("https://example.com/ch{number}")],
    }
}

/// Chapter numbers requested so far, in call order.
pub fn requested_chapters(calls: &Mutex<Vec<OracleRequest>>) -> Vec<u32> {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter_map(|r| match r.intent {
            Intent::ResolveChapter { number } => Some(number),
            Intent::ResolveNovel => None,
        })
        .collect()
}
