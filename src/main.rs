use std::sync::Arc;

use flashdeck::api::{app_router, ApiState};
use flashdeck::db::SqliteStore;
use flashdeck::gemini::{Advisory, GeminiAdvisory};
use flashdeck::session::SessionSelector;
use flashdeck::srs::Scheduler;
use flashdeck::store::EntityStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://flashdeck.db?mode=rwc".to_string());
    let store: Arc<dyn EntityStore> = Arc::new(SqliteStore::connect(&database_url).await?);

    let advisory: Option<Arc<dyn Advisory>> = match GeminiAdvisory::from_env() {
        Some(client) => Some(Arc::new(client)),
        None => {
            log::info!("GEMINI_API_KEY not set, scheduling uses the deterministic fallback only");
            None
        }
    };

    let state = ApiState {
        scheduler: Arc::new(Scheduler::new(store.clone(), advisory)),
        sessions: Arc::new(SessionSelector::new(store.clone())),
        store,
    };

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");

    axum::serve(listener, app_router(state)).await?;
    Ok(())
}
