//! Provider selection and connection settings.

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Environment variable selecting the chat provider.
pub const ENV_PROVIDER: &str = "LLM_PROVIDER";
/// Environment variable holding the Gemini API key.
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
/// Environment variable overriding the Gemini API base URL.
pub const ENV_GEMINI_API_BASE: &str = "GEMINI_API_BASE";
/// Environment variable overriding the Ollama server URL.
pub const ENV_OLLAMA_URL: &str = "OLLAMA_URL";
/// Environment variable overriding the Ollama model.
pub const ENV_OLLAMA_MODEL: &str = "OLLAMA_MODEL";

/// Default Gemini API base URL.
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Model used for conversation.
pub const DEFAULT_GEMINI_CHAT_MODEL: &str = "gemini-2.0-flash-exp";
/// Model used for image generation.
pub const DEFAULT_GEMINI_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
/// Default local Ollama server.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
/// Default vision-capable Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "llava:latest";

/// Which backend answers chat messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ProviderKind {
    /// Google Gemini API.
    #[default]
    Gemini,
    /// Local Ollama server.
    Ollama,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Settings for the Gemini API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    /// API key; required only when a Gemini client is built.
    pub api_key: Option<String>,
    pub api_base: String,
    pub chat_model: String,
    pub image_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            chat_model: DEFAULT_GEMINI_CHAT_MODEL.to_string(),
            image_model: DEFAULT_GEMINI_IMAGE_MODEL.to_string(),
        }
    }
}

impl GeminiConfig {
    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the API base URL, e.g. to point at a proxy.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// Settings for a local Ollama server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_OLLAMA_MODEL.to_string(),
        }
    }
}

/// Complete LLM configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmConfig {
    /// Backend for chat. Image enhancement always uses Gemini.
    pub provider: ProviderKind,
    pub gemini: GeminiConfig,
    pub ollama: OllamaConfig,
}

impl LlmConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownProvider` if `LLM_PROVIDER` names an
    /// unsupported backend.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(provider) = get(ENV_PROVIDER) {
            config.provider = provider.parse()?;
        }

        config.gemini.api_key = get(ENV_GEMINI_API_KEY);
        if let Some(base) = get(ENV_GEMINI_API_BASE) {
            config.gemini.api_base = base.trim_end_matches('/').to_string();
        }

        if let Some(url) = get(ENV_OLLAMA_URL) {
            config.ollama.url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get(ENV_OLLAMA_MODEL) {
            config.ollama.model = model;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LlmConfig::from_lookup(|_| None).expect("defaults are valid");
        assert_eq!(config.provider, ProviderKind::Gemini);
        assert_eq!(config.gemini.api_key, None);
        assert_eq!(config.gemini.chat_model, "gemini-2.0-flash-exp");
        assert_eq!(config.gemini.image_model, "gemini-2.5-flash-image-preview");
        assert_eq!(config.ollama.url, "http://localhost:11434");
        assert_eq!(config.ollama.model, "llava:latest");
    }

    #[test]
    fn test_ollama_from_lookup() {
        let config = LlmConfig::from_lookup(lookup_from(&[
            ("LLM_PROVIDER", "Ollama"),
            ("OLLAMA_URL", "http://gpu-box:11434/"),
            ("OLLAMA_MODEL", "llama3.2-vision"),
        ]))
        .expect("valid config");

        assert_eq!(config.provider, ProviderKind::Ollama);
        assert_eq!(config.ollama.url, "http://gpu-box:11434");
        assert_eq!(config.ollama.model, "llama3.2-vision");
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = LlmConfig::from_lookup(lookup_from(&[
            ("LLM_PROVIDER", ""),
            ("GEMINI_API_KEY", "  "),
        ]))
        .expect("valid config");

        assert_eq!(config.provider, ProviderKind::Gemini);
        assert_eq!(config.gemini.api_key, None);
    }

    #[test]
    fn test_unknown_provider() {
        let err = LlmConfig::from_lookup(lookup_from(&[("LLM_PROVIDER", "openai")]))
            .expect_err("openai is not supported");
        assert!(matches!(err, ConfigError::UnknownProvider(ref p) if p == "openai"));
    }

    #[test]
    fn test_provider_display_roundtrip() {
        for kind in [ProviderKind::Gemini, ProviderKind::Ollama] {
            assert_eq!(kind.to_string().parse::<ProviderKind>().ok(), Some(kind));
        }
    }
}
