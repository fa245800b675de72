use serde::{Deserialize, Serialize};

/// Body of `POST /api/generate-todos`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTodosRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerateTodosResponse {
    Created { success: bool, count: usize },
    NothingFound { message: String },
}

impl GenerateTodosResponse {
    pub const NOTHING_FOUND: &'static str = "No todos found";

    pub fn created(count: usize) -> Self {
        GenerateTodosResponse::Created { success: true, count }
    }

    pub fn nothing_found() -> Self {
        GenerateTodosResponse::NothingFound {
            message: Self::NOTHING_FOUND.to_string(),
        }
    }
}
