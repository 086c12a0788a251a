use std::time::Duration;

use thiserror::Error;

/// Errors raised by collaborators, configuration and I/O.
///
/// Low scores and exhausted budgets are not errors; they are reported through
/// [`RenderResult`](crate::models::RenderResult).
#[derive(Debug, Error)]
pub enum ToonError {
    #[error("Gemini client error: {0}")]
    Gemini(#[from] gemini_rust::ClientError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} API error {status}: {body}")]
    Api {
        service: String,
        status: u16,
        body: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: String,
        after: Duration,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {message}\n\nRaw response:\n{raw_text}")]
    ParseWithContext { message: String, raw_text: String },

    #[error("{0} returned an empty response")]
    EmptyResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Context error: {0}")]
    Context(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToonError {
    /// Create a parse error that keeps a truncated copy of the offending text.
    pub fn parse_error(err: serde_json::Error, raw_text: &str) -> Self {
        Self::ParseWithContext {
            message: err.to_string(),
            raw_text: Self::truncate_for_display(raw_text, 500),
        }
    }

    pub fn api(service: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            service: service.into(),
            status,
            body: body.into(),
            retry_after_secs: None,
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Check if this error came from talking to a collaborator.
    ///
    /// The render loop recovers from these by moving on to the next attempt.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Gemini(_)
                | Self::Http(_)
                | Self::Api { .. }
                | Self::Timeout { .. }
                | Self::Json(_)
                | Self::ParseWithContext { .. }
                | Self::EmptyResponse(_)
        )
    }

    /// Check if this error is worth retrying after a pause.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            Self::Gemini(gemini_rust::ClientError::BadResponse { code, .. }) => {
                *code == 503 || *code == 429
            }
            _ => false,
        }
    }

    /// Get the provider's suggested retry delay in seconds, if it sent one.
    pub fn retry_delay(&self) -> Option<u64> {
        match self {
            Self::Api {
                retry_after_secs: Some(secs),
                ..
            } => Some(*secs),
            Self::Api { status: 429, body, .. } => parse_retry_delay(body),
            Self::Gemini(gemini_rust::ClientError::BadResponse {
                code: 429,
                description,
            }) => description.as_deref().and_then(parse_retry_delay),
            _ => None,
        }
    }

    fn truncate_for_display(text: &str, max_len: usize) -> String {
        let total = text.chars().count();
        if total <= max_len {
            text.to_string()
        } else {
            let head: String = text.chars().take(max_len).collect();
            format!("{head}... [truncated, {total} total chars]")
        }
    }
}

/// Pull a delay out of provider error text such as "Please retry in 57s."
fn parse_retry_delay(description: &str) -> Option<u64> {
    let lower = description.to_lowercase();
    let idx = lower.find("retry in ")?;
    let remainder = &lower[idx + "retry in ".len()..];
    let end = remainder
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != 'm' && c != 's')
        .unwrap_or(remainder.len());
    parse_duration_string(&remainder[..end])
}

/// Parse duration strings like "44s", "44.5s", "500ms".
fn parse_duration_string(s: &str) -> Option<u64> {
    let s = s.trim().trim_end_matches('.');

    if let Some(ms_part) = s.strip_suffix("ms") {
        let ms = ms_part.parse::<f64>().ok()?;
        if ms <= 0.0 {
            return Some(0);
        }
        return Some(((ms / 1000.0).ceil() as u64).max(1));
    }

    let secs = s.strip_suffix('s')?.parse::<f64>().ok()?;
    Some(secs.ceil() as u64)
}

pub type Result<T> = std::result::Result<T, ToonError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn with_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<ToonError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let base_err = e.into();
            ToonError::Context(format!("{}: {}", context.into(), base_err))
        })
    }
}
