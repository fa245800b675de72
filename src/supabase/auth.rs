use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::info;

use crate::error::AppError;
use crate::models::{AuthUser, Session};
use crate::supabase::SupabaseConfig;
use crate::supabase::dto::{EmailPasswordRequest, RecoverRequest, TokenResponse, UpdateUserRequest};
use crate::supabase::read_error;

/// Email/password identity flows against the project's auth service.
pub struct AuthClient {
    client: Client,
    config: SupabaseConfig,
}

impl AuthClient {
    pub fn new(config: SupabaseConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(self.config.endpoint(path))
            .header("apikey", &self.config.anon_key)
    }

    /// Registers a new account. A confirmation mail links back to `redirect_to`.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        repeat_password: &str,
        redirect_to: &str,
    ) -> Result<(), AppError> {
        if password != repeat_password {
            return Err(AppError::BadRequest("Passwords do not match".to_string()));
        }

        let response = self
            .post("/auth/v1/signup")
            .query(&[("redirect_to", redirect_to)])
            .json(&EmailPasswordRequest { email, password })
            .send()
            .await?;
        ensure_auth_success(response).await?;

        info!("sign-up requested for {}", email);
        Ok(())
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let response = self
            .post("/auth/v1/token")
            .query(&[("grant_type", "password")])
            .json(&EmailPasswordRequest { email, password })
            .send()
            .await?;
        let token = ensure_auth_success(response)
            .await?
            .json::<TokenResponse>()
            .await?;

        Ok(Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            user: token.user,
        })
    }

    /// Sends a reset mail whose link opens `redirect_to` with a recovery session.
    pub async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<(), AppError> {
        let response = self
            .post("/auth/v1/recover")
            .query(&[("redirect_to", redirect_to)])
            .json(&RecoverRequest { email })
            .send()
            .await?;
        ensure_auth_success(response).await?;
        Ok(())
    }

    pub async fn update_password(&self, session: &Session, password: &str) -> Result<AuthUser, AppError> {
        let response = self
            .client
            .put(self.config.endpoint("/auth/v1/user"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&session.access_token)
            .json(&UpdateUserRequest { password })
            .send()
            .await?;
        let user = ensure_auth_success(response).await?.json::<AuthUser>().await?;
        Ok(user)
    }

    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, AppError> {
        let response = self
            .client
            .get(self.config.endpoint("/auth/v1/user"))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        let user = ensure_auth_success(response).await?.json::<AuthUser>().await?;
        Ok(user)
    }

    pub async fn sign_out(&self, session: &Session) -> Result<(), AppError> {
        let response = self
            .post("/auth/v1/logout")
            .bearer_auth(&session.access_token)
            .send()
            .await?;
        ensure_auth_success(response).await?;
        Ok(())
    }
}

async fn ensure_auth_success(response: Response) -> Result<Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let (status, message) = read_error(response, "auth").await;
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Unauthorized(message)),
        s if s.is_client_error() => Err(AppError::BadRequest(message)),
        _ => Err(AppError::Backend(message)),
    }
}
