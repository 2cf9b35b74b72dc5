use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    Http {
        status: u16,
        url: String,
        /// Server-requested delay, populated from `Retry-After` on 429/503.
        retry_after_secs: Option<u64>,
    },

    #[error("request timed out: {url}")]
    Timeout { url: String },

    #[error("parse error for {context}: {reason}")]
    Parse { context: String, reason: String },

    #[error("no usable content extracted from {url}")]
    EmptyContent { url: String },

    #[error("circuit open for domain {domain}")]
    CircuitOpen { domain: String },
}

impl ScrapeError {
    /// Stable, low-cardinality label for the error-type metric dimension.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            ScrapeError::Transport(_) => "transport",
            ScrapeError::Http { status, .. } if *status == 429 => "http_429",
            ScrapeError::Http { status, .. } if (500..600).contains(status) => "http_5xx",
            ScrapeError::Http { .. } => "http_4xx",
            ScrapeError::Timeout { .. } => "timeout",
            ScrapeError::Parse { .. } => "parse",
            ScrapeError::EmptyContent { .. } => "empty_content",
            ScrapeError::CircuitOpen { .. } => "circuit_open",
        }
    }
}
