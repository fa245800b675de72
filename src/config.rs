use std::net::SocketAddr;

use crate::ai::ProviderRegistry;
use crate::error::AppError;
use crate::supabase::SupabaseConfig;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DATABASE_URL: &str = "sqlite://babeat.db";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub supabase: Option<SupabaseConfig>,
    pub providers: ProviderRegistry,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(lookup);

        let bind_addr = env
            .get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR is invalid: {}", e)))?;
        let database_url = env
            .get("DATABASE_URL")
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        Ok(Self {
            bind_addr,
            database_url,
            supabase: SupabaseConfig::from_env(&env)?,
            providers: ProviderRegistry::from_env(&env),
        })
    }
}

/// Reads sanitized, non-empty values through a lookup function.
pub struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| sanitize_env(&value))
            .filter(|value| !value.is_empty())
    }
}

/// Trims whitespace and surrounding quotes or backticks copied in from dashboards.
pub fn sanitize_env(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}
