pub mod auth;
pub mod dto;
pub mod realtime;
pub mod rest;
pub mod storage;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::error;

use crate::config::EnvReader;
use crate::error::AppError;

pub use auth::AuthClient;
pub use realtime::RealtimeFeed;
pub use rest::SupabaseTodoStore;
pub use storage::StorageClient;

const DEFAULT_STORAGE_BUCKET: &str = "todo-images";

#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub service_role_key: Option<String>,
    pub storage_bucket: String,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            service_role_key: None,
            storage_bucket: DEFAULT_STORAGE_BUCKET.to_string(),
        }
    }

    pub fn with_service_role_key(mut self, key: impl Into<String>) -> Self {
        self.service_role_key = Some(key.into());
        self
    }

    /// `None` when no project URL is configured.
    pub fn from_env<F>(env: &EnvReader<F>) -> Result<Option<Self>, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(url) = env.get("SUPABASE_URL") else {
            return Ok(None);
        };
        let anon_key = env
            .get("SUPABASE_ANON_KEY")
            .or_else(|| env.get("SUPABASE_PUBLISHABLE_KEY"))
            .ok_or_else(|| AppError::Config("SUPABASE_ANON_KEY is not set".to_string()))?;

        let mut config = Self::new(url, anon_key);
        config.service_role_key = env.get("SUPABASE_SERVICE_ROLE_KEY");
        if let Some(bucket) = env.get("SUPABASE_STORAGE_BUCKET") {
            config.storage_bucket = bucket;
        }
        Ok(Some(config))
    }

    pub fn service_role(&self) -> Result<Credentials, AppError> {
        self.service_role_key
            .clone()
            .map(Credentials::ServiceRole)
            .ok_or_else(|| AppError::Config("SUPABASE_SERVICE_ROLE_KEY is not set".to_string()))
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }
}

/// Who a request runs as.
#[derive(Clone, Debug)]
pub enum Credentials {
    /// Bypasses row-level security.
    ServiceRole(String),
    /// A signed-in user's access token; row-level security applies.
    User(String),
}

impl Credentials {
    pub fn apply(&self, config: &SupabaseConfig, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::ServiceRole(key) => request.header("apikey", key).bearer_auth(key),
            Credentials::User(token) => request
                .header("apikey", &config.anon_key)
                .bearer_auth(token),
        }
    }
}

/// Reads a failed response into its status and the service's message.
pub(crate) async fn read_error(response: Response, context: &str) -> (StatusCode, String) {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!("{} error {}: {}", context, status, body);

    let message = serde_json::from_str::<dto::ApiErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.message())
        .unwrap_or_else(|| format!("{} failed with status {}", context, status));
    (status, message)
}

/// Data and storage calls: any failure other than an auth rejection is a backend error.
pub(crate) async fn ensure_success(response: Response, context: &str) -> Result<Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let (status, message) = read_error(response, context).await;
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Unauthorized(message)),
        _ => Err(AppError::Backend(message)),
    }
}
