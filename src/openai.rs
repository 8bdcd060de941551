use std::time::Duration;

use async_trait::async_trait;

use crate::config::OracleConfig;
use crate::error::{Error, Result};
use crate::oracle::{Intent, Oracle, OracleReply, OracleRequest};

const INSTRUCTIONS: &str = "You are a research assistant that locates serialized fiction on the web.\n\
Always answer with exactly one JSON object and nothing else.";

pub fn responses_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/responses")
}

/// [`Oracle`] over the OpenAI Responses API, optionally grounded with the
/// hosted web search tool.
#[derive(Debug, Clone)]
pub struct OpenAiOracle {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    web_search: bool,
}

impl OpenAiOracle {
    pub fn new(config: &OracleConfig) -> anyhow::Result<Self> {
        let Some(api_key) = config.api_key.clone() else {
            anyhow::bail!("OPENAI_API_KEY is not set");
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| anyhow::anyhow!("build http client: {err}"))?;
        Ok(Self {
            client,
            endpoint: responses_endpoint(&config.base_url),
            api_key,
            model: config.model.clone(),
            web_search: config.web_search,
        })
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn ask(&self, request: &OracleRequest) -> Result<OracleReply> {
        let mut body = serde_json::json!({
            "model": self.model,
            "instructions": INSTRUCTIONS,
            "input": request.query,
            "text": { "format": { "type": "text" } },
            "store": false,
            "metadata": metadata(request.intent),
        });
        if self.web_search
            && let Some(obj) = body.as_object_mut()
        {
            obj.insert(
                "tools".to_owned(),
                serde_json::json!([{ "type": "web_search" }]),
            );
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| Error::transport(None, format!("POST {}: {err}", self.endpoint)))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|err| Error::transport(Some(status.as_u16()), format!("read body: {err}")))?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or(raw);
            return Err(Error::transport(Some(status.as_u16()), message));
        }

        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|err| Error::Interpretation(format!("parse OpenAI response: {err}")))?;
        extract_reply(&value)
    }
}

fn metadata(intent: Intent) -> serde_json::Value {
    match intent {
        Intent::ResolveNovel => serde_json::json!({ "intent": intent.as_str() }),
        Intent::ResolveChapter { number } => {
            serde_json::json!({ "intent": intent.as_str(), "chapter": number.to_string() })
        }
    }
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_reply(value: &serde_json::Value) -> Result<OracleReply> {
    let output = value
        .get("output")
        .and_then(|v| v.as_array())
        .ok_or_else(|| Error::Interpretation("missing `output` array in response".to_owned()))?;

    let mut text = String::new();
    let mut sources: Vec<String> = Vec::new();
    for item in output {
        if item.get("type").and_then(|v| v.as_str()) != Some("message") {
            continue;
        }
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for part in content {
            if part.get("type").and_then(|v| v.as_str()) != Some("output_text") {
                continue;
            }
            let Some(part_text) = part.get("text").and_then(|v| v.as_str()) else {
                continue;
            };
            text.push_str(part_text);

            let annotations = part
                .get("annotations")
                .and_then(|v| v.as_array())
                .map(Vec::as_slice)
                .unwrap_or_default();
            for annotation in annotations {
                if annotation.get("type").and_then(|v| v.as_str()) != Some("url_citation") {
                    continue;
                }
                let Some(url) = annotation.get("url").and_then(|v| v.as_str()) else {
                    continue;
                };
                if let Some(url) = normalize_source(url)
                    && !sources.contains(&url)
                {
                    sources.push(url);
                }
            }
        }
    }

    if text.trim().is_empty() {
        return Err(Error::Interpretation("OpenAI output text is empty".to_owned()));
    }
    Ok(OracleReply { text, sources })
}

fn normalize_source(raw: &str) -> Option<String> {
    let url = url::Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}
