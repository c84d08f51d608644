use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Pull a readable message out of an openai style error body
pub fn error_summary(body: &str) -> String {
    let trimmed = body.trim();
    let summary = serde_json::from_str::<Value>(trimmed).ok().and_then(|value| {
        value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .or_else(|| value.get("error").and_then(|v| v.as_str()).map(str::to_owned))
            .or_else(|| value.get("message").and_then(|v| v.as_str()).map(str::to_owned))
    });

    match summary {
        Some(text) => text.split_whitespace().collect::<Vec<_>>().join(" "),
        None if trimmed.is_empty() => "<empty response body>".to_string(),
        None => trimmed.to_string(),
    }
}
