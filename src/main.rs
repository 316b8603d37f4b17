mod admission;
mod auth;
mod config;
mod error;
mod models;
mod routes;
mod storage;
mod store;

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use admission::AdmissionController;
use config::Config;
use storage::LocalStorage;
use store::{EventStore, MemoryStore, PgStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: EventStore,
    pub admission: AdmissionController,
    pub storage: LocalStorage,
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let store_ok = state.store.ping().await.is_ok();
    Json(serde_json::json!({ "status": "ok", "store": store_ok }))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env();

    let store = match &config.database_url {
        Some(url) => {
            let db = sqlx::PgPool::connect(url)
                .await
                .expect("failed to connect to database");

            sqlx::migrate!()
                .run(&db)
                .await
                .expect("failed to run migrations");

            EventStore::Postgres(PgStore::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is not persisted)");
            EventStore::Memory(MemoryStore::new())
        }
    };

    let admission = AdmissionController::new(store.clone(), config.rsvp_grace_seconds);
    let storage = LocalStorage::new(&config.upload_dir);

    let state = AppState {
        config: Arc::new(config),
        store,
        admission,
        storage,
    };

    let app = Router::new()
        .route("/api/health", get(health))
        .merge(routes::api_router())
        .nest_service("/uploads", ServeDir::new(state.storage.upload_dir()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
