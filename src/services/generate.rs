use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use crate::ai::extract::{self, Extraction, ExtractionInput};
use crate::ai::{ChatClient, Provider, ProviderRegistry};
use crate::error::{AppError, ErrorResponse};
use crate::models::{GenerateTodosRequest, GenerateTodosResponse, NewTodo};
use crate::store::TodoStore;

/// Turns free text or an image into todo rows.
#[async_trait]
pub trait TodoGenerator: Send + Sync {
    async fn generate(&self, req: GenerateTodosRequest) -> Result<GenerateTodosResponse, AppError>;
}

pub struct GenerateService {
    store: Arc<dyn TodoStore>,
    chat: Arc<dyn ChatClient>,
    providers: ProviderRegistry,
}

impl GenerateService {
    /// `store` runs with elevated credentials; rows are owned by the submitted user id.
    pub fn new(store: Arc<dyn TodoStore>, chat: Arc<dyn ChatClient>, providers: ProviderRegistry) -> Self {
        Self {
            store,
            chat,
            providers,
        }
    }
}

#[async_trait]
impl TodoGenerator for GenerateService {
    async fn generate(&self, req: GenerateTodosRequest) -> Result<GenerateTodosResponse, AppError> {
        let input = ExtractionInput::from_request(req)?;
        let provider = Provider::select(&input);
        let settings = self.providers.settings(provider)?;
        info!(
            "extracting todos for {} via {} provider ({})",
            input.user_id,
            provider.name(),
            settings.model
        );

        let request = extract::build_request(provider, settings, &input);
        let content = self.chat.complete(settings, &request).await?;

        let titles = match extract::parse_reply(content.as_deref()) {
            Ok(Extraction::Todos(titles)) => titles,
            Ok(Extraction::Nothing) => {
                info!("no todos found for {}", input.user_id);
                return Ok(GenerateTodosResponse::nothing_found());
            }
            Err(e) => {
                warn!("unusable AI reply: {}", e);
                return Err(e);
            }
        };

        // The source image is analysis input only and is not attached to generated rows.
        let rows: Vec<NewTodo> = titles
            .into_iter()
            .map(|title| NewTodo::new(input.user_id.clone(), title))
            .collect();

        let inserted = self.store.insert_many(rows).await?;
        info!("created {} todos for {}", inserted.len(), input.user_id);
        Ok(GenerateTodosResponse::created(inserted.len()))
    }
}

/// Calls a running server's `POST /api/generate-todos`.
pub struct HttpTodoGenerator {
    client: Client,
    endpoint: String,
}

impl HttpTodoGenerator {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/generate-todos", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl TodoGenerator for HttpTodoGenerator {
    async fn generate(&self, req: GenerateTodosRequest) -> Result<GenerateTodosResponse, AppError> {
        let response = self.client.post(&self.endpoint).json(&req).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<GenerateTodosResponse>().await?);
        }

        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| format!("generate-todos failed with status {}", status));
        if status.is_client_error() {
            Err(AppError::BadRequest(message))
        } else {
            Err(AppError::Backend(message))
        }
    }
}
