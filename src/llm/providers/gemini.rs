//! Google Gemini client.
//!
//! Chat uses `streamGenerateContent` with server-sent events; image
//! enhancement uses a single `generateContent` call that asks for both text
//! and image output.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::config::{GeminiConfig, ENV_GEMINI_API_KEY};
use crate::llm::stream::lines;
use crate::llm::types::{
    ChatBackend, ChatTurn, ImageBackend, ImageRequest, Part, Role, TextChunk, TextStream,
};
use crate::metrics::MetricsCollector;

use super::{build_client, error_from_response};

/// Timeout for one-shot image generation.
const IMAGE_TIMEOUT_SECS: u64 = 120;

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Harm categories whose blocking is disabled for chat.
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Gemini API client implementing both chat and image generation.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    config: GeminiConfig,
    metrics: MetricsCollector,
}

impl GeminiClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiKey` if the configuration carries no key.
    pub fn new(config: GeminiConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey {
                var: ENV_GEMINI_API_KEY,
            })?;

        Ok(Self {
            client: build_client()?,
            api_key,
            config,
            metrics: MetricsCollector::new(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.config.api_base, model, method)
    }
}

#[async_trait]
impl ChatBackend for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn open_stream(&self, history: &[ChatTurn]) -> Result<TextStream, LlmError> {
        let url = format!(
            "{}?alt=sse",
            self.model_url(&self.config.chat_model, "streamGenerateContent")
        );
        let request = GenerateRequest::chat(history);
        let started = Instant::now();

        debug!(model = %self.config.chat_model, turns = history.len(), "Opening Gemini stream");

        let result = async {
            let response = self
                .client
                .post(&url)
                .header(API_KEY_HEADER, &self.api_key)
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

        self.metrics.record_llm_request(
            ChatBackend::name(self),
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );
        let response = result?;

        let chunks = lines(response.bytes_stream()).filter_map(|line| async move {
            match line {
                Ok(line) => parse_sse_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(chunks))
    }
}

#[async_trait]
impl ImageBackend for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<Option<String>, LlmError> {
        let url = self.model_url(&self.config.image_model, "generateContent");
        let body = GenerateRequest::image(request);
        let started = Instant::now();

        debug!(model = %self.config.image_model, "Requesting image generation");

        let result = async {
            let response = self
                .client
                .post(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .timeout(Duration::from_secs(IMAGE_TIMEOUT_SECS))
                .json(&body)
                .send()
                .await
                .map_err(LlmError::from_reqwest)?;

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            response
                .json::<GenerateResponse>()
                .await
                .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))
        }
        .await;

        self.metrics.record_llm_request(
            ImageBackend::name(self),
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );

        let image = result?.first_image();
        if image.is_none() {
            warn!(model = %self.config.image_model, "Response contained no image");
        }
        Ok(image)
    }
}

/// Parses one server-sent-event line of a streamed response.
///
/// Returns `None` for lines that carry no text: comments, blank keep-alive
/// lines, and events with empty candidates.
pub(crate) fn parse_sse_line(line: &str) -> Option<Result<TextChunk, LlmError>> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    let event: GenerateResponse = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            return Some(Err(LlmError::ParseError(format!(
                "Invalid stream event: {}",
                e
            ))))
        }
    };

    if let Some(error) = event.error {
        return Some(Err(LlmError::from_status(
            error.code.unwrap_or(500),
            error.message,
        )));
    }

    let text = event.text();
    if text.is_empty() {
        None
    } else {
        Some(Ok(TextChunk::new(text)))
    }
}

// Gemini API request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<SafetySetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

impl GenerateRequest {
    /// Conversation request. System turns become the system instruction.
    fn chat(history: &[ChatTurn]) -> Self {
        let system_text: Vec<String> = history
            .iter()
            .filter(|turn| turn.role == Role::System)
            .map(ChatTurn::text)
            .collect();

        let system_instruction = if system_text.is_empty() {
            None
        } else {
            Some(ApiContent {
                role: None,
                parts: vec![ApiPart::text(system_text.join("\n\n"))],
            })
        };

        let contents = history
            .iter()
            .filter(|turn| turn.role != Role::System)
            .map(ApiContent::from_turn)
            .collect();

        let safety_settings = SAFETY_CATEGORIES
            .iter()
            .map(|category| SafetySetting {
                category: category.to_string(),
                threshold: "BLOCK_NONE".to_string(),
            })
            .collect();

        Self {
            contents,
            system_instruction,
            safety_settings,
            generation_config: None,
        }
    }

    /// Image request: the source image, then the instruction.
    fn image(request: &ImageRequest) -> Self {
        let contents = vec![
            ApiContent {
                role: Some("user".to_string()),
                parts: vec![ApiPart::inline(&request.mime_type, &request.image_data)],
            },
            ApiContent {
                role: Some("user".to_string()),
                parts: vec![ApiPart::text(request.prompt.clone())],
            },
        ];

        Self {
            contents,
            system_instruction: None,
            safety_settings: Vec::new(),
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

impl ApiContent {
    fn from_turn(turn: &ChatTurn) -> Self {
        let role = match turn.role {
            Role::Model => "model",
            Role::User | Role::System => "user",
        };
        let parts = turn
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => ApiPart::text(text.clone()),
                Part::InlineImage { mime_type, data } => ApiPart::inline(mime_type, data),
            })
            .collect();

        Self {
            role: Some(role.to_string()),
            parts,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl ApiPart {
    fn text(text: String) -> Self {
        Self {
            text: Some(text),
            inline_data: None,
        }
    }

    fn inline(mime_type: &str, data: &str) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: String,
    threshold: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiErrorDetail>,
}

impl GenerateResponse {
    fn parts(&self) -> impl Iterator<Item = &ApiPart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter())
            .into_iter()
            .flatten()
    }

    fn text(&self) -> String {
        self.parts().filter_map(|p| p.text.as_deref()).collect()
    }

    fn first_image(&self) -> Option<String> {
        self.parts()
            .find_map(|p| p.inline_data.as_ref())
            .map(|inline| inline.data.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ApiContent>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    code: Option<u16>,
}
