use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use babeat::ai::HttpChatClient;
use babeat::api::router;
use babeat::config::AppConfig;
use babeat::services::GenerateService;
use babeat::state::AppState;
use babeat::store::{SqliteTodoStore, TodoStore};
use babeat::supabase::SupabaseTodoStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "babeat=debug,tower_http=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env()?;

    let store: Arc<dyn TodoStore> = match &config.supabase {
        Some(supabase) => {
            info!("using Supabase project at {}", supabase.url);
            Arc::new(SupabaseTodoStore::service_role(supabase.clone())?)
        }
        None => {
            info!("SUPABASE_URL not set, using local store at {}", config.database_url);
            Arc::new(SqliteTodoStore::connect(&config.database_url).await?)
        }
    };

    let generator = GenerateService::new(
        store.clone(),
        Arc::new(HttpChatClient::new()?),
        config.providers.clone(),
    );

    let state = AppState {
        store,
        generator: Arc::new(generator),
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
