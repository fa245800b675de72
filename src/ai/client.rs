use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};

use crate::ai::ProviderSettings;
use crate::ai::dto::{ChatCompletionRequest, ChatCompletionResponse};
use crate::error::AppError;

/// OpenAI-compatible chat completion endpoint.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Returns the first choice's message content, if any.
    async fn complete(
        &self,
        settings: &ProviderSettings,
        request: &ChatCompletionRequest,
    ) -> Result<Option<String>, AppError>;
}

pub struct HttpChatClient {
    client: Client,
}

impl HttpChatClient {
    pub fn new() -> Result<Self, AppError> {
        // No timeout: a slow provider holds the request open.
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn complete(
        &self,
        settings: &ProviderSettings,
        request: &ChatCompletionRequest,
    ) -> Result<Option<String>, AppError> {
        debug!("requesting completion from {} ({})", settings.base_url, settings.model);

        let response = self
            .client
            .post(settings.completions_url())
            .bearer_auth(&settings.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("AI provider request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("AI provider error {}: {}", status, body);
            return Err(AppError::Upstream(format!("AI provider error {}", status)));
        }

        let body_text = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&body_text).map_err(|e| {
            error!("Failed to parse completion envelope: {}", e);
            AppError::InvalidAiResponse(e.to_string())
        })?;

        Ok(parsed.into_content())
    }
}
