//! Ollama client for a locally hosted vision model.
//!
//! Talks to `/api/chat` with `stream: true`; the response is
//! newline-delimited JSON, one message fragment per line.

use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::config::OllamaConfig;
use crate::llm::stream::lines;
use crate::llm::types::{ChatBackend, ChatTurn, Role, TextChunk, TextStream};
use crate::metrics::MetricsCollector;

use super::{build_client, error_from_response};

/// Chat client for an Ollama server.
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
    metrics: MetricsCollector,
}

impl OllamaClient {
    /// Create a new client. The server is not contacted until the first
    /// message is sent.
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_client()?,
            config,
            metrics: MetricsCollector::new(),
        })
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn open_stream(&self, history: &[ChatTurn]) -> Result<TextStream, LlmError> {
        let url = format!("{}/api/chat", self.config.url);
        let request = ChatRequest::new(&self.config.model, history);
        let started = Instant::now();

        debug!(model = %self.config.model, turns = history.len(), "Opening Ollama stream");

        let result = async {
            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(LlmError::from_reqwest)?;

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }
            Ok::<_, LlmError>(response)
        }
        .await;

        self.metrics
            .record_llm_request(self.name(), result.is_ok(), started.elapsed().as_secs_f64());
        let response = result?;

        let chunks = lines(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_ollama_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(chunks))
    }
}

/// Parses one NDJSON line of a streamed chat response.
///
/// Lines that are not valid JSON are skipped. An `error` field ends the
/// stream with `LlmError::Upstream`.
pub(crate) fn parse_ollama_line(line: &str) -> Option<Result<TextChunk, LlmError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Ok(event) = serde_json::from_str::<ChatResponseLine>(line) else {
        debug!(line = %line, "Skipping unparseable Ollama line");
        return None;
    };

    if let Some(error) = event.error {
        return Some(Err(LlmError::Upstream(error)));
    }

    event
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty())
        .map(|content| Ok(TextChunk::new(content)))
}

// Ollama API request/response types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

impl ChatRequest {
    fn new(model: &str, history: &[ChatTurn]) -> Self {
        Self {
            model: model.to_string(),
            messages: history.iter().map(OllamaMessage::from_turn).collect(),
            stream: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

impl OllamaMessage {
    fn from_turn(turn: &ChatTurn) -> Self {
        let role = match turn.role {
            Role::System => "system",
            Role::User => "user",
            Role::Model => "assistant",
        };
        Self {
            role,
            content: turn.text(),
            images: turn.images().into_iter().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponseLine {
    message: Option<ResponseMessage>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Part;

    #[test]
    fn test_chat_request_serialization() {
        let history = vec![
            ChatTurn::system("Be gentle."),
            ChatTurn::user(vec![Part::text("What is this?"), Part::image("image/png", "abc=")]),
            ChatTurn::model("A cat."),
        ];
        let json = serde_json::to_value(ChatRequest::new("llava:latest", &history))
            .expect("request serializes");

        assert_eq!(json["model"], "llava:latest");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert!(json["messages"][0].get("images").is_none());
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "What is this?");
        assert_eq!(json["messages"][1]["images"], serde_json::json!(["abc="]));
        assert_eq!(json["messages"][2]["role"], "assistant");
    }

    #[test]
    fn test_parse_content_line() {
        let line = r#"{"model":"llava","created_at":"2024-01-01T00:00:00Z","message":{"role":"assistant","content":"Hi"},"done":false}"#;
        let chunk = parse_ollama_line(line).expect("has content").expect("no error");
        assert_eq!(chunk.text, "Hi");
    }

    #[test]
    fn test_parse_skips_done_and_invalid_lines() {
        let done = r#"{"model":"llava","message":{"role":"assistant","content":""},"done":true}"#;
        assert!(parse_ollama_line(done).is_none());
        assert!(parse_ollama_line("not json").is_none());
        assert!(parse_ollama_line("   ").is_none());
    }

    #[test]
    fn test_parse_error_line() {
        let result = parse_ollama_line(r#"{"error":"model runner has unexpectedly stopped"}"#)
            .expect("error line");
        assert!(matches!(result, Err(LlmError::Upstream(ref msg)) if msg.contains("stopped")));
    }

    #[test]
    fn test_new_client() {
        let client = OllamaClient::new(OllamaConfig::default()).expect("client builds");
        assert_eq!(client.config.model, "llava:latest");
        assert_eq!(client.name(), "ollama");
    }
}
