use reqwest::StatusCode;
use thiserror::Error;

/// Statuses worth another attempt: rate limiting and upstream hiccups.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Errors that can occur while fetching a page from the product API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection-level failure, including timeouts, before a status was received.
    #[error("network error: {0}")]
    Transport(String),
    /// The request could not be built or sent as written, such as an invalid base URL.
    #[error("invalid request: {0}")]
    Request(String),
    #[error("product API returned status {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("failed to decode product API response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("max retries exceeded after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ApiError> },
}

impl ApiError {
    pub fn http(status: StatusCode, body: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Whether the client should try the same request again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Transport(_) => true,
            ApiError::Http { status, .. } => RETRYABLE_STATUSES.contains(&status.as_u16()),
            ApiError::Request(_) | ApiError::Decode(_) | ApiError::RetriesExhausted { .. } => {
                false
            }
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Transport(format!("request timeout: {err}"))
        } else if err.is_connect() {
            ApiError::Transport(format!("connection failed: {err}"))
        } else if err.is_request() || err.is_body() {
            ApiError::Transport(err.to_string())
        } else {
            ApiError::Request(err.to_string())
        }
    }
}
