//! HTTP clients for the supported model APIs.
//!
//! - `GeminiClient`: Google Gemini, for chat and image generation
//! - `OllamaClient`: a local Ollama server, chat only

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::LlmError;

/// Connection timeout for every provider.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Builds the shared HTTP client.
///
/// No overall timeout is set: chat responses are streamed and may run for
/// a long time. One-shot requests set their own timeout.
pub(crate) fn build_client() -> Result<Client, LlmError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(LlmError::from_reqwest)
}

/// Converts a non-success response into an error, keeping the API's own
/// message when the body carries one.
pub(crate) async fn error_from_response(response: Response) -> LlmError {
    let code = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());

    LlmError::from_status(code, extract_error_message(&body))
}

/// Pulls the message out of `{"error": {"message": ...}}` or
/// `{"error": "..."}` bodies. Falls back to the raw body.
pub(crate) fn extract_error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|value| {
        let error = value.get("error")?;
        error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
            .map(str::to_string)
    });

    message.unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_nested_error_message() {
        let body = r#"{"error":{"code":429,"message":"Resource exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(extract_error_message(body), "Resource exhausted");
    }

    #[test]
    fn test_extract_flat_error_message() {
        let body = r#"{"error":"model 'llava' not found"}"#;
        assert_eq!(extract_error_message(body), "model 'llava' not found");
    }

    #[test]
    fn test_extract_falls_back_to_body() {
        assert_eq!(extract_error_message("Bad Gateway\n"), "Bad Gateway");
        assert_eq!(extract_error_message(r#"{"detail":"x"}"#), r#"{"detail":"x"}"#);
    }
}
