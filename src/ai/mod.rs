pub mod client;
pub mod dto;
pub mod extract;

use tracing::warn;

use crate::config::EnvReader;
use crate::error::AppError;

pub use client::{ChatClient, HttpChatClient};
pub use extract::{Extraction, ExtractionInput, ImageSource};

const DEFAULT_TEXT_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_TEXT_MODEL: &str = "deepseek-chat";

/// Which upstream model family handles a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Text,
    Vision,
}

impl Provider {
    /// Any image, remote or inline, routes to the vision model.
    pub fn select(input: &ExtractionInput) -> Self {
        if input.image.is_some() {
            Provider::Vision
        } else {
            Provider::Text
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Text => "text",
            Provider::Vision => "vision",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl ProviderSettings {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
    pub text: Option<ProviderSettings>,
    pub vision: Option<ProviderSettings>,
}

impl ProviderRegistry {
    pub fn from_env<F>(env: &EnvReader<F>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = env.get("OPENAI_API_KEY").map(|api_key| {
            ProviderSettings::new(
                api_key,
                env.get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_TEXT_BASE_URL.to_string()),
                env.get("OPENAI_MODEL")
                    .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            )
        });

        let vision = match (
            env.get("VISION_API_KEY"),
            env.get("VISION_BASE_URL"),
            env.get("VISION_MODEL"),
        ) {
            (Some(api_key), Some(base_url), Some(model)) => {
                Some(ProviderSettings::new(api_key, base_url, model))
            }
            (None, None, None) => None,
            _ => {
                warn!("vision provider is partially configured; image extraction is disabled");
                None
            }
        };

        Self { text, vision }
    }

    pub fn settings(&self, provider: Provider) -> Result<&ProviderSettings, AppError> {
        let settings = match provider {
            Provider::Text => self.text.as_ref(),
            Provider::Vision => self.vision.as_ref(),
        };
        settings.ok_or_else(|| {
            AppError::Config(format!("{} provider is not configured", provider.name()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(text: Option<&str>, image: Option<ImageSource>) -> ExtractionInput {
        ExtractionInput {
            user_id: "u1".to_string(),
            text: text.map(str::to_string),
            image,
            image_url: None,
        }
    }

    #[test]
    fn text_only_selects_text_provider() {
        assert_eq!(Provider::select(&input(Some("buy milk"), None)), Provider::Text);
    }

    #[test]
    fn any_image_selects_vision_provider() {
        let remote = ImageSource::Remote("https://cdn.example.com/a.png".to_string());
        let inline = ImageSource::Inline("data:image/png;base64,AAAA".to_string());
        assert_eq!(Provider::select(&input(Some("x"), Some(remote))), Provider::Vision);
        assert_eq!(Provider::select(&input(None, Some(inline))), Provider::Vision);
    }

    #[test]
    fn missing_vision_settings_is_a_config_error() {
        let registry = ProviderRegistry {
            text: Some(ProviderSettings::new("k", "https://api.deepseek.com/", "deepseek-chat")),
            vision: None,
        };
        assert_eq!(
            registry.settings(Provider::Text).unwrap().completions_url(),
            "https://api.deepseek.com/chat/completions"
        );
        let err = registry.settings(Provider::Vision).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("vision")));
    }
}
