use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use tracing::debug;

use crate::error::AppError;
use crate::models::{NewTodo, Todo};
use crate::store::TodoStore;
use crate::supabase::dto::CompletedPatch;
use crate::supabase::{Credentials, SupabaseConfig, ensure_success};

const TODOS_PATH: &str = "/rest/v1/todos";

/// `todos` table through PostgREST.
pub struct SupabaseTodoStore {
    client: Client,
    config: SupabaseConfig,
    credentials: Credentials,
}

impl SupabaseTodoStore {
    pub fn new(config: SupabaseConfig, credentials: Credentials) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            config,
            credentials,
        })
    }

    /// Elevated store used by server-side handlers.
    pub fn service_role(config: SupabaseConfig) -> Result<Self, AppError> {
        let credentials = config.service_role()?;
        Self::new(config, credentials)
    }

    /// Store scoped to a signed-in user by row-level security.
    pub fn for_user(config: SupabaseConfig, access_token: impl Into<String>) -> Result<Self, AppError> {
        Self::new(config, Credentials::User(access_token.into()))
    }

    fn request(&self, method: Method) -> RequestBuilder {
        let request = self
            .client
            .request(method, self.config.endpoint(TODOS_PATH));
        self.credentials.apply(&self.config, request)
    }

    async fn fetch_rows(&self, request: RequestBuilder, context: &str) -> Result<Vec<Todo>, AppError> {
        let response = request.send().await?;
        let response = ensure_success(response, context).await?;
        let rows = response.json::<Vec<Todo>>().await?;
        Ok(rows)
    }
}

#[async_trait]
impl TodoStore for SupabaseTodoStore {
    async fn ping(&self) -> Result<(), AppError> {
        let request = self
            .request(Method::GET)
            .query(&[("select", "id"), ("limit", "1")]);
        self.fetch_rows(request, "ping").await?;
        Ok(())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Todo>, AppError> {
        let request = self.request(Method::GET).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("order", "created_at.desc".to_string()),
        ]);
        self.fetch_rows(request, "list todos").await
    }

    async fn insert_many(&self, rows: Vec<NewTodo>) -> Result<Vec<Todo>, AppError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        debug!("inserting {} todos", rows.len());
        let request = self
            .request(Method::POST)
            .header("Prefer", "return=representation")
            .json(&rows);
        self.fetch_rows(request, "insert todos").await
    }

    async fn set_completed(&self, id: &str, completed: bool) -> Result<Todo, AppError> {
        let request = self
            .request(Method::PATCH)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&CompletedPatch { completed });
        self.fetch_rows(request, "update todo")
            .await?
            .into_iter()
            .next()
            .ok_or(AppError::NotFound)
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        let request = self
            .request(Method::DELETE)
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation");
        let deleted = self.fetch_rows(request, "delete todo").await?;
        if deleted.is_empty() {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
