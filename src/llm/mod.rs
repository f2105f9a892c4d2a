//! Generative AI collaborators for sketch-gate.
//!
//! Both collaborators route their API calls through the shared
//! [`RequestController`](crate::scheduler::RequestController):
//!
//! - [`ChatSession`]: streamed conversation about a drawing, submitted at
//!   high priority. Backed by Gemini or a local Ollama server.
//! - [`ImageEnhancer`]: one-shot restyling of a sketch, submitted at normal
//!   priority. Always backed by Gemini.
//!
//! ```ignore
//! use sketch_gate::llm::{create_chat, LlmConfig, Part};
//! use sketch_gate::scheduler::RequestController;
//!
//! let controller = RequestController::from_env()?;
//! let chat = create_chat(&LlmConfig::from_env()?, controller.clone())?;
//!
//! let mut stream = chat
//!     .send_message_stream(vec![Part::image_bytes("image/png", &png), Part::text("What do you see?")])
//!     .await?;
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?.text);
//! }
//! ```

pub mod chat;
pub mod config;
pub mod enhance;
pub mod providers;
mod stream;
pub mod types;

pub use chat::{create_chat, user_facing_message, ChatSession, DEFAULT_SYSTEM_PROMPT};
pub use config::{GeminiConfig, LlmConfig, OllamaConfig, ProviderKind};
pub use enhance::{
    compose_prompt, create_enhancer, find_style, EnhanceImageParams, EnhanceImageResult,
    EnhancementStyle, ImageEnhancer, ENHANCEMENT_STYLES,
};
pub use providers::{GeminiClient, OllamaClient};
pub use types::{
    ChatBackend, ChatTurn, ImageBackend, ImageRequest, Part, Role, TextChunk, TextStream,
};
