use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct OracleStubConfig {
    pub title: String,
    pub author: String,
    pub total_chapters: u32,
    /// Chapters answered with `{"found": false}`.
    pub missing_chapters: Vec<u32>,
    /// Number of leading requests answered with HTTP 429.
    pub rate_limited_requests: u32,
}

impl Default for OracleStubConfig {
    fn default() -> Self {
        Self {
            title: "Stub Novel".to_owned(),
            author: "Stub Author".to_owned(),
            total_chapters: 5,
            missing_chapters: Vec::new(),
            rate_limited_requests: 0,
        }
    }
}

/// Fake OpenAI Responses endpoint that answers novel and chapter lookups.
pub struct OracleStub {
    pub base_url: String,
    requests: Arc<AtomicU32>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OracleStub {
    pub fn spawn(config: OracleStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start oracle stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let requests = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&requests);

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() != &tiny_http::Method::Post || path != "/v1/responses" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let seen = counter.fetch_add(1, Ordering::SeqCst);
                if seen < config.rate_limited_requests {
                    let body = serde_json::json!({
                        "error": { "message": "Rate limit reached for requests", "type": "requests" }
                    });
                    let _ = request.respond(json_response(&body, 429));
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let Ok(parsed) = serde_json::from_str::<Value>(&body) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid json").with_status_code(400),
                    );
                    continue;
                };

                let input = parsed.get("input").and_then(|v| v.as_str()).unwrap_or("");
                let intent = parsed
                    .pointer("/metadata/intent")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let (text, citations) = match intent {
                    "resolve-novel" => (novel_answer(&config, input), Vec::new()),
                    "resolve-chapter" => {
                        let number = parsed
                            .pointer("/metadata/chapter")
                            .and_then(|v| v.as_str())
                            .and_then(|v| v.parse::<u32>().ok())
                            .unwrap_or(0);
                        chapter_answer(&config, number)
                    }
                    _ => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("unknown intent")
                                .with_status_code(400),
                        );
                        continue;
                    }
                };

                let annotations: Vec<Value> = citations
                    .iter()
                    .map(|url| serde_json::json!({ "type": "url_citation", "url": url }))
                    .collect();
                let response_body = serde_json::json!({
                    "id": "resp_stub",
                    "object": "response",
                    "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                    "output": [
                        { "type": "web_search_call", "status": "completed" },
                        {
                            "type": "message",
                            "role": "assistant",
                            "content": [
                                { "type": "output_text", "text": text, "annotations": annotations }
                            ]
                        }
                    ]
                });
                let _ = request.respond(json_response(&response_body, 200));
            }
        });

        Self {
            base_url,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for OracleStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn json_response(body: &Value, status: u16) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("build header");
    tiny_http::Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(header)
}

fn novel_answer(config: &OracleStubConfig, input: &str) -> String {
    if input.contains("Nonexistent") {
        return r#"{"exists": false}"#.to_owned();
    }
    let answer = serde_json::json!({
        "exists": true,
        "title": config.title,
        "author": config.author,
        "totalChapters": config.total_chapters,
        "chapterTitles": ["Arrival"],
    });
    format!("Here is what I found:\n```json\n{answer}\n```")
}

fn chapter_answer(config: &OracleStubConfig, number: u32) -> (String, Vec<String>) {
    if number == 0 || config.missing_chapters.contains(&number) {
        return (r#"{"found": false}"#.to_owned(), Vec::new());
    }
    let answer = serde_json::json!({
        "found": true,
        "title": format!("Chapter {number}: Stub"),
        "content": format!("Stub text for chapter {number}.\n\nSecond paragraph."),
    });
    (
        answer.to_string(),
        vec![format!("https://stub.example.com/chapter/{number}")],
    )
}
