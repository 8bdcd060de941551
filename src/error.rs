use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the acquisition engine.
///
/// Manifest-level variants abort a search; chapter-level variants are captured
/// into the chapter record by the loader and never abort a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Bad user input, rejected before any oracle call.
    #[error("{0}")]
    Validation(String),

    /// The oracle reports that the work does not exist.
    #[error("novel not found: {0}")]
    NotFound(String),

    /// The oracle answered, but not with the expected structure.
    #[error("could not interpret oracle response: {0}")]
    Interpretation(String),

    /// The oracle explicitly could not provide the chapter text.
    #[error("chapter content unavailable: {0}")]
    ContentUnavailable(String),

    /// Rate limiting persisted through every retry attempt.
    #[error("oracle quota exceeded after {attempts} attempts: {message}")]
    QuotaExceeded { attempts: u32, message: String },

    /// Any other failure from the oracle call.
    #[error("{}", transport_message(.status, .message))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("no chapters with content in range {start}-{end}")]
    ExportEmpty { start: u32, end: u32 },

    #[error("a batch download is already running")]
    BatchInProgress,

    #[error("no novel loaded; search for one first")]
    NoManifest,

    #[error("unknown chapter id: {0}")]
    UnknownChapter(String),
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("oracle request failed ({status}): {message}"),
        None => format!("oracle request failed: {message}"),
    }
}

impl Error {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Whether this failure is upstream throttling worth waiting out.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Transport { status, message } => {
                if *status == Some(429) {
                    return true;
                }
                let message = message.to_ascii_lowercase();
                message.contains("429") || message.contains("quota") || message.contains("exhausted")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_detected_from_status() {
        assert!(Error::transport(Some(429), "slow down").is_rate_limited());
        assert!(!Error::transport(Some(500), "boom").is_rate_limited());
    }

    #[test]
    fn rate_limit_is_detected_from_message() {
        assert!(Error::transport(None, "HTTP 429 Too Many Requests").is_rate_limited());
        assert!(Error::transport(Some(403), "You exceeded your current QUOTA").is_rate_limited());
        assert!(Error::transport(None, "RESOURCE_EXHAUSTED").is_rate_limited());
        assert!(!Error::transport(None, "connection reset").is_rate_limited());
    }

    #[test]
    fn only_transport_failures_are_rate_limited() {
        assert!(!Error::Interpretation("quota".to_owned()).is_rate_limited());
        assert!(
            !Error::QuotaExceeded {
                attempts: 3,
                message: "quota".to_owned()
            }
            .is_rate_limited()
        );
    }

    #[test]
    fn transport_display_includes_status_when_known() {
        assert_eq!(
            Error::transport(Some(503), "unavailable").to_string(),
            "oracle request failed (503): unavailable"
        );
        assert_eq!(
            Error::transport(None, "dns").to_string(),
            "oracle request failed: dns"
        );
    }
}
