//! Sketch enhancement: turns a drawing into a styled image.
//!
//! Requests go through the controller at normal priority, behind any
//! waiting chat messages. Transient API failures are retried by the
//! controller; the caller always gets an [`EnhanceImageResult`].

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::LlmError;
use crate::scheduler::{Priority, RequestController};

use super::config::LlmConfig;
use super::providers::GeminiClient;
use super::types::{ImageBackend, ImageRequest};

/// Appended to every enhancement prompt.
pub const PRESERVE_COMPOSITION: &str = "Keep the essence and main elements of the original sketch but enhance it according to the style description. Make it visually appealing and maintain the same general composition.";

/// A visual style a sketch can be enhanced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnhancementStyle {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
    pub emoji: &'static str,
}

/// All available styles, in display order.
pub const ENHANCEMENT_STYLES: &[EnhancementStyle] = &[
    EnhancementStyle {
        id: "childhood",
        name: "Childhood Magic",
        description: "Whimsical, colorful, childlike wonder",
        prompt: "Transform this sketch into a magical childhood illustration with bright colors, playful elements, and innocent wonder. Make it look like a beautiful children's book illustration.",
        emoji: "🌈",
    },
    EnhancementStyle {
        id: "digital",
        name: "Digital Art",
        description: "Modern digital illustration style",
        prompt: "Convert this sketch into a polished digital artwork with clean lines, vibrant colors, and modern digital art styling. Use contemporary illustration techniques.",
        emoji: "💻",
    },
    EnhancementStyle {
        id: "graphic",
        name: "Graphic Design",
        description: "Bold, clean, professional design",
        prompt: "Transform this sketch into a professional graphic design with bold shapes, clean typography elements, and modern design principles. Make it suitable for branding or marketing.",
        emoji: "🎨",
    },
    EnhancementStyle {
        id: "photorealistic",
        name: "Photorealistic",
        description: "Realistic, detailed, lifelike",
        prompt: "Convert this sketch into a photorealistic image with detailed textures, proper lighting, shadows, and realistic proportions. Make it look like a high-quality photograph.",
        emoji: "📸",
    },
    EnhancementStyle {
        id: "artistic",
        name: "Artistic Painting",
        description: "Traditional art style with brushstrokes",
        prompt: "Transform this sketch into a beautiful artistic painting with visible brushstrokes, rich colors, and traditional painting techniques like oil or watercolor.",
        emoji: "🖼️",
    },
    EnhancementStyle {
        id: "abstract",
        name: "Abstract Modern",
        description: "Abstract interpretation with modern elements",
        prompt: "Reimagine this sketch as an abstract modern artwork with geometric shapes, bold colors, and contemporary artistic interpretation.",
        emoji: "🔲",
    },
    EnhancementStyle {
        id: "minimalist",
        name: "Minimalist",
        description: "Clean, simple, elegant design",
        prompt: "Convert this sketch into a minimalist design with clean lines, simple shapes, limited color palette, and elegant simplicity.",
        emoji: "⚪",
    },
    EnhancementStyle {
        id: "impressive",
        name: "Dramatic & Impressive",
        description: "Bold, striking, attention-grabbing",
        prompt: "Transform this sketch into an impressive, dramatic artwork with bold colors, striking composition, dynamic lighting, and powerful visual impact.",
        emoji: "⚡",
    },
];

/// Looks up a style by id, case-insensitively.
pub fn find_style(id: &str) -> Option<&'static EnhancementStyle> {
    ENHANCEMENT_STYLES
        .iter()
        .find(|style| style.id.eq_ignore_ascii_case(id.trim()))
}

/// Builds the instruction sent with the image. A blank custom prompt falls
/// back to the style's own prompt.
pub fn compose_prompt(style: &EnhancementStyle, custom_prompt: Option<&str>) -> String {
    let base = custom_prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(style.prompt);
    format!("{}. {}", base, PRESERVE_COMPOSITION)
}

/// Input for [`ImageEnhancer::enhance_image`].
#[derive(Debug, Clone)]
pub struct EnhanceImageParams {
    /// Base64-encoded source image.
    pub image_data: String,
    /// MIME type of the source image.
    pub mime_type: String,
    pub style: &'static EnhancementStyle,
    /// Replaces the style's prompt when set.
    pub custom_prompt: Option<String>,
}

impl EnhanceImageParams {
    /// Params for a PNG sketch in the given style.
    pub fn new(image_data: impl Into<String>, style: &'static EnhancementStyle) -> Self {
        Self {
            image_data: image_data.into(),
            mime_type: "image/png".to_string(),
            style,
            custom_prompt: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }
}

/// Outcome of an enhancement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceImageResult {
    pub success: bool,
    /// Base64-encoded enhanced image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnhanceImageResult {
    pub fn success(image_data: String) -> Self {
        Self {
            success: true,
            image_data: Some(image_data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            image_data: None,
            error: Some(error.into()),
        }
    }
}

/// Runs enhancements through the request controller.
#[derive(Clone)]
pub struct ImageEnhancer {
    backend: Arc<dyn ImageBackend>,
    controller: RequestController,
}

impl ImageEnhancer {
    pub fn new(backend: Arc<dyn ImageBackend>, controller: RequestController) -> Self {
        Self {
            backend,
            controller,
        }
    }

    /// Enhances a sketch in the requested style.
    ///
    /// Never fails: errors, including a response without an image, are
    /// reported in the result.
    pub async fn enhance_image(&self, params: EnhanceImageParams) -> EnhanceImageResult {
        let style_id = params.style.id;
        let request = Arc::new(ImageRequest {
            prompt: compose_prompt(params.style, params.custom_prompt.as_deref()),
            image_data: params.image_data,
            mime_type: params.mime_type,
        });

        let backend = Arc::clone(&self.backend);
        let result = self
            .controller
            .run(Priority::Normal, move || {
                let backend = Arc::clone(&backend);
                let request = Arc::clone(&request);
                async move {
                    backend
                        .generate_image(&request)
                        .await?
                        .ok_or(LlmError::NoImageData)
                }
            })
            .await;

        match result {
            Ok(image_data) => {
                info!(style = style_id, "Image enhanced");
                EnhanceImageResult::success(image_data)
            }
            Err(err) => {
                warn!(style = style_id, error = %err, "Image enhancement failed");
                EnhanceImageResult::failure(err.to_string())
            }
        }
    }
}

/// Creates an enhancer backed by Gemini, whatever the chat provider is.
///
/// # Errors
///
/// Returns `LlmError::MissingApiKey` if no Gemini key is configured.
pub fn create_enhancer(
    config: &LlmConfig,
    controller: RequestController,
) -> Result<ImageEnhancer, LlmError> {
    let backend = GeminiClient::new(config.gemini.clone())?;
    Ok(ImageEnhancer::new(Arc::new(backend), controller))
}
