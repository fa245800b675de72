use async_trait::async_trait;
use reqwest::Client;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::ImageUpload;
use crate::store::ImageStore;
use crate::supabase::{Credentials, SupabaseConfig, ensure_success};

pub struct StorageClient {
    client: Client,
    config: SupabaseConfig,
    credentials: Credentials,
}

impl StorageClient {
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

    pub fn object_path(user_id: &str, image: &ImageUpload) -> String {
        format!("{}/{}.{}", user_id, Uuid::new_v4(), image.extension())
    }

    pub fn public_url(&self, path: &str) -> String {
        self.config.endpoint(&format!(
            "/storage/v1/object/public/{}/{}",
            self.config.storage_bucket, path
        ))
    }
}

#[async_trait]
impl ImageStore for StorageClient {
    async fn upload(&self, user_id: &str, image: &ImageUpload) -> Result<String, AppError> {
        let path = Self::object_path(user_id, image);
        let url = self.config.endpoint(&format!(
            "/storage/v1/object/{}/{}",
            self.config.storage_bucket, path
        ));

        let request = self
            .client
            .post(url)
            .header("Content-Type", image.content_type.as_str())
            .header("x-upsert", "false")
            .body(image.bytes.clone());
        let response = self.credentials.apply(&self.config, request).send().await?;
        ensure_success(response, "storage upload").await?;

        info!("uploaded {} ({} bytes)", path, image.bytes.len());
        Ok(self.public_url(&path))
    }
}
