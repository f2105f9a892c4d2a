//! Message types and backend traits shared by every LLM provider.

use std::pin::Pin;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Standing instructions for the model.
    System,
    /// The person using the application.
    User,
    /// The model's replies.
    Model,
}

/// One piece of a message: text or an inline image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    InlineImage {
        /// MIME type such as `image/png`.
        mime_type: String,
        /// Base64-encoded image bytes.
        data: String,
    },
}

impl Part {
    /// Create a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    /// Create an image part from already base64-encoded data.
    pub fn image(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Part::InlineImage {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Create an image part from raw bytes.
    pub fn image_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Part::InlineImage {
            mime_type: mime_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    /// Returns the text of a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::InlineImage { .. } => None,
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ChatTurn {
    /// Create a system turn.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![Part::text(text)],
        }
    }

    /// Create a user turn.
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    /// Create a model turn.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }

    /// Base64 data of all image parts, in order.
    pub fn images(&self) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::InlineImage { data, .. } => Some(data.as_str()),
                Part::Text(_) => None,
            })
            .collect()
    }
}

/// A piece of streamed model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
}

impl TextChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Streamed model reply.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<TextChunk, LlmError>> + Send>>;

/// Input for a one-shot image transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Base64-encoded source image.
    pub image_data: String,
    /// MIME type of the source image.
    pub mime_type: String,
    /// Full instruction sent alongside the image.
    pub prompt: String,
}

/// Backend that can answer a conversation with a stream of text.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Sends the conversation and returns the reply stream once the
    /// response has started.
    ///
    /// Errors returned here happen before any output was produced and are
    /// safe to retry. Errors inside the stream are not.
    async fn open_stream(&self, history: &[ChatTurn]) -> Result<TextStream, LlmError>;
}

/// Backend that can transform an image according to a prompt.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Short backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Returns the base64 data of the generated image, or `None` if the
    /// model answered without one.
    async fn generate_image(&self, request: &ImageRequest) -> Result<Option<String>, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_constructors() {
        let system = ChatTurn::system("Be kind.");
        assert_eq!(system.role, Role::System);
        assert_eq!(system.text(), "Be kind.");

        let model = ChatTurn::model("Hello!");
        assert_eq!(model.role, Role::Model);
        assert_eq!(model.text(), "Hello!");
    }

    #[test]
    fn test_user_turn_text_and_images() {
        let turn = ChatTurn::user(vec![
            Part::text("What is "),
            Part::image("image/png", "aGVsbG8="),
            Part::text("this?"),
        ]);

        assert_eq!(turn.text(), "What is this?");
        assert_eq!(turn.images(), vec!["aGVsbG8="]);
    }

    #[test]
    fn test_image_bytes_are_base64_encoded() {
        let part = Part::image_bytes("image/jpeg", b"hello");
        assert_eq!(part, Part::image("image/jpeg", "aGVsbG8="));
        assert!(part.as_text().is_none());
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::Model).expect("role serializes");
        assert_eq!(json, "\"model\"");
    }
}
