use std::time::Duration;

use anyhow::Context as _;

use crate::retry::RetryPolicy;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1-mini";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub web_search: bool,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub oracle: OracleConfig,
    pub retry: RetryPolicy,
    /// Pause between consecutive chapter fetches in a batch.
    pub batch_delay: Duration,
    /// Upper bound on the chapter count a manifest will be built with.
    pub max_chapters: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let oracle = OracleConfig {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("NOVELGRAB_OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_owned()),
            model: get("NOVELGRAB_OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_owned()),
            web_search: match get("NOVELGRAB_OPENAI_WEB_SEARCH") {
                Some(raw) => parse_bool(&raw).with_context(|| {
                    format!("invalid NOVELGRAB_OPENAI_WEB_SEARCH={raw:?}. expected true or false")
                })?,
                None => true,
            },
            timeout_secs: parse_number(get("NOVELGRAB_OPENAI_TIMEOUT_SECS"), "NOVELGRAB_OPENAI_TIMEOUT_SECS", 300)?,
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_number(
                get("NOVELGRAB_RETRY_ATTEMPTS"),
                "NOVELGRAB_RETRY_ATTEMPTS",
                defaults.max_attempts,
            )?
            .max(1),
            base_delay: Duration::from_millis(parse_number(
                get("NOVELGRAB_RETRY_BASE_DELAY_MS"),
                "NOVELGRAB_RETRY_BASE_DELAY_MS",
                defaults.base_delay.as_millis() as u64,
            )?),
        };

        let batch_delay = Duration::from_millis(parse_number(
            get("NOVELGRAB_BATCH_DELAY_MS"),
            "NOVELGRAB_BATCH_DELAY_MS",
            2000,
        )?);

        let max_chapters = parse_number(get("NOVELGRAB_MAX_CHAPTERS"), "NOVELGRAB_MAX_CHAPTERS", 5000)?;
        if max_chapters == 0 {
            anyhow::bail!("NOVELGRAB_MAX_CHAPTERS must be > 0");
        }

        Ok(Self {
            oracle,
            retry,
            batch_delay,
            max_chapters,
        })
    }
}

fn parse_bool(raw: &str) -> anyhow::Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unsupported boolean: {other}"),
    }
}

fn parse_number<T>(raw: Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid {name}={raw:?}")),
        None => Ok(default),
    }
}
