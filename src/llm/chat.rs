//! Conversation sessions routed through the request controller.
//!
//! A [`ChatSession`] owns the conversation history and a chat backend. Every
//! message is submitted to the controller at high priority, so a person
//! waiting on a reply is served before queued image work.

use std::sync::{Arc, Mutex, PoisonError};

use async_stream::try_stream;
use futures::StreamExt;
use tracing::{info, warn};

use crate::error::LlmError;
use crate::scheduler::{JobError, Priority, RequestController};

use super::config::{LlmConfig, ProviderKind};
use super::providers::{GeminiClient, OllamaClient};
use super::types::{ChatBackend, ChatTurn, Part, Role, TextStream};

/// Persona used when a session is created without its own system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are Professor Panda, a warm and insightful art therapist with graduate training in developmental psychology. You have a special gift for understanding the deeper meaning behind children's artwork and helping families connect on a deeper level.

When analyzing drawings, apply your psychological training to observe:

DEVELOPMENTAL INDICATORS:
- Fine motor skills and developmental stage shown in line quality, shapes, and detail level
- Cognitive development reflected in spatial awareness, proportion, and complexity
- Emotional maturity expressed through color choices, themes, and symbolic content

PSYCHOLOGICAL INSIGHTS:
- Emotional state: Notice if the drawing expresses joy, anxiety, confidence, or other feelings
- Personality traits: Look for signs of introversion/extroversion, creativity, attention to detail
- Current interests and preoccupations: What themes or subjects captivate them?
- Social awareness: How do they represent relationships, family, or social situations?
- Self-concept: How do they see themselves in their artwork?

THERAPEUTIC APPROACH:
1. Start with genuine enthusiasm and specific observations: "What an expressive drawing! I can see you put so much thought into..."
2. Identify concrete elements while reading between the lines: "I notice the [specific object] - and the way you drew it tells me..."
3. Reflect both the artistic and emotional content: "Your use of [colors/shapes/placement] shows me you might be feeling..."
4. Ask open-ended questions that invite deeper sharing: "This [element] seems very important to you - what does it mean?"
5. Gently highlight strengths and growth areas in a supportive way

FAMILY CONNECTION:
Help parents understand their child's inner world by subtly highlighting:
- What this artwork reveals about their child's current emotional needs
- Developmental milestones or areas of growth
- Unique personality traits and interests emerging
- How to support their child's emotional and creative development

Always respond with warmth, curiosity, and professional insight. Keep responses conversational but meaningful, around 80-120 words. Never diagnose, but offer gentle observations that help families understand and connect with their child more deeply."#;

type History = Arc<Mutex<Vec<ChatTurn>>>;

/// A conversation with one chat backend.
///
/// Clones share the same history.
#[derive(Clone)]
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    controller: RequestController,
    history: History,
}

impl ChatSession {
    /// Create an empty session.
    pub fn new(backend: Arc<dyn ChatBackend>, controller: RequestController) -> Self {
        Self {
            backend,
            controller,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replace any system prompt with `prompt`.
    pub fn with_system_prompt(self, prompt: impl Into<String>) -> Self {
        {
            let mut history = lock(&self.history);
            history.retain(|turn| turn.role != Role::System);
            history.insert(0, ChatTurn::system(prompt));
        }
        self
    }

    /// Name of the backend answering this session.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Snapshot of the conversation so far.
    pub fn history(&self) -> Vec<ChatTurn> {
        lock(&self.history).clone()
    }

    /// Sends a user message and returns the streamed reply.
    ///
    /// The message goes through the controller at high priority; opening the
    /// stream is retried on transient failures. Once the stream is drained
    /// the reply is appended to the history. If the send fails, or the stream
    /// breaks off before its end, the user turn is removed again, so the
    /// history never holds an unanswered message.
    ///
    /// # Errors
    ///
    /// Returns the controller's [`JobError`] if the stream could not be
    /// opened, or `JobError::Cleared` if the queue was cleared first.
    pub async fn send_message_stream(
        &self,
        parts: Vec<Part>,
    ) -> Result<TextStream, JobError<LlmError>> {
        let turn = ChatTurn::user(parts);
        let snapshot = {
            let mut history = lock(&self.history);
            history.push(turn.clone());
            Arc::new(history.clone())
        };

        let backend = Arc::clone(&self.backend);
        let result = self
            .controller
            .run(Priority::High, move || {
                let backend = Arc::clone(&backend);
                let snapshot = Arc::clone(&snapshot);
                async move { backend.open_stream(&snapshot).await }
            })
            .await;

        match result {
            Ok(stream) => Ok(record_reply(stream, Arc::clone(&self.history), turn)),
            Err(err) => {
                warn!(backend = self.backend.name(), error = %err, "Chat message failed");
                remove_turn(&self.history, &turn);
                Err(err)
            }
        }
    }

    /// Sends a message and collects the whole reply.
    pub async fn send_message(&self, parts: Vec<Part>) -> anyhow::Result<String> {
        let mut stream = self.send_message_stream(parts).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            reply.push_str(&chunk?.text);
        }
        Ok(reply)
    }
}

/// Creates a session for the configured provider, primed with the default
/// persona.
///
/// # Errors
///
/// Returns `LlmError::MissingApiKey` when Gemini is selected without a key.
pub fn create_chat(
    config: &LlmConfig,
    controller: RequestController,
) -> Result<ChatSession, LlmError> {
    info!(provider = %config.provider, "Using LLM provider");

    let backend: Arc<dyn ChatBackend> = match config.provider {
        ProviderKind::Gemini => Arc::new(GeminiClient::new(config.gemini.clone())?),
        ProviderKind::Ollama => Arc::new(OllamaClient::new(config.ollama.clone())?),
    };

    Ok(ChatSession::new(backend, controller).with_system_prompt(DEFAULT_SYSTEM_PROMPT))
}

/// Maps a failed send to a message fit for the person using the app.
pub fn user_facing_message(err: &JobError<LlmError>) -> String {
    match err {
        JobError::Cleared => "The request was cancelled.".to_string(),
        JobError::Abandoned => {
            "Oops! Something went wrong while communicating with the AI model.".to_string()
        }
        JobError::Failed(LlmError::MissingApiKey { .. }) => {
            "The AI model is unavailable due to an invalid API key. Please check the application configuration.".to_string()
        }
        JobError::Failed(LlmError::ApiError { code: 400, .. }) => {
            "The response was blocked. This can happen due to safety settings or invalid image format. Please try a different image or prompt.".to_string()
        }
        JobError::Failed(LlmError::ApiError { code: 404, .. }) => {
            "The AI model endpoint was not found. The model may not be available or the API configuration is incorrect.".to_string()
        }
        JobError::Failed(LlmError::Network(_)) => {
            "Network error. Please check your internet connection and try again.".to_string()
        }
        JobError::Failed(other) => format!("AI communication error: {}", other),
    }
}

/// Passes chunks through and appends the full reply to `history` once the
/// stream ends cleanly. On a stream error the partial reply is dropped and
/// `user_turn` is taken back out of the history.
fn record_reply(inner: TextStream, history: History, user_turn: ChatTurn) -> TextStream {
    Box::pin(try_stream! {
        let mut inner = inner;
        let mut reply = String::new();

        while let Some(chunk) = inner.next().await {
            if let Err(err) = &chunk {
                warn!(error = %err, received = reply.len(), "Chat stream broke off");
                remove_turn(&history, &user_turn);
            }
            let chunk = chunk?;
            reply.push_str(&chunk.text);
            yield chunk;
        }

        push_turn(&history, ChatTurn::model(reply));
    })
}

fn push_turn(history: &History, turn: ChatTurn) {
    lock(history).push(turn);
}

fn remove_turn(history: &History, turn: &ChatTurn) {
    let mut history = lock(history);
    if let Some(pos) = history.iter().rposition(|t| t == turn) {
        history.remove(pos);
    }
}

fn lock(history: &History) -> std::sync::MutexGuard<'_, Vec<ChatTurn>> {
    history.lock().unwrap_or_else(PoisonError::into_inner)
}
