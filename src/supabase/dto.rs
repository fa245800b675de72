use serde::{Deserialize, Serialize};

use crate::models::{AuthUser, Todo};

/// Error shapes returned by PostgREST, GoTrue and Storage.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorBody {
    pub fn message(self) -> Option<String> {
        self.msg
            .or(self.error_description)
            .or(self.message)
            .or(self.error)
    }
}

#[derive(Debug, Serialize)]
pub struct CompletedPatch {
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct EmailPasswordRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RecoverRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub struct UpdateUserRequest<'a> {
    pub password: &'a str,
}

/// GoTrue token grant response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

/// Phoenix channel frame used by the realtime socket.
#[derive(Debug, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostgresChangesPayload {
    pub data: PostgresChange,
}

#[derive(Debug, Deserialize)]
pub struct PostgresChange {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub record: Option<Todo>,
    #[serde(default)]
    pub old_record: Option<OldRecord>,
}

#[derive(Debug, Deserialize)]
pub struct OldRecord {
    pub id: String,
}
