use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, Method};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use flux_coordinator::Coordinator;
use flux_dispatch::HttpDispatcher;
use flux_engine::Engine;
use flux_persistence::PostgresStore;
use flux_requests::EmailNotifier;

use flux_api::clients::{ApiUrlMinter, HttpEmailSender, HttpSubjectDirectory};
use flux_api::config::Config;
use flux_api::api;
use flux_api::openapi::ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flux_api=info,tower_http=info")))
        .init();

    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to DATABASE_URL")?;
    tracing::info!("connected to database");

    let store = Arc::new(PostgresStore::new(pool));
    let dispatcher = Arc::new(HttpDispatcher::new(config.scheduler_base_url.clone()));
    let engine = Arc::new(Engine::new(store.clone(), dispatcher.clone(), config.callback_base_url.clone()));

    let subjects = Arc::new(HttpSubjectDirectory::new(config.subject_directory_base_url.clone()));
    let email_sender = Arc::new(HttpEmailSender::new(config.email_base_url.clone()));
    let url_minter = Arc::new(ApiUrlMinter { base: config.callback_base_url.clone() });
    let notifier = Arc::new(EmailNotifier::new(store.clone(), subjects, email_sender, url_minter));

    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        dispatcher.clone(),
        engine.clone(),
        notifier,
        config.callback_base_url.clone(),
        config.fallback_assignee,
    ));

    let app = Router::new()
        .route("/health", get(health))
        .merge(api::workflows::routes(api::workflows::AppState { store: store.clone() }))
        .merge(api::runs::routes(api::runs::AppState {
            store: store.clone(),
            coordinator: coordinator.clone(),
        }))
        .merge(api::executions::routes(api::executions::AppState {
            store: store.clone(),
            coordinator: coordinator.clone(),
        }))
        .merge(api::operations::routes(api::operations::AppState {
            store: store.clone(),
            engine: engine.clone(),
            coordinator: coordinator.clone(),
        }))
        .merge(api::requests::routes(api::requests::AppState {
            store: store.clone(),
            coordinator: coordinator.clone(),
        }))
        .merge(api::email_templates::routes(api::email_templates::AppState { store: store.clone() }))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE]),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "flux-api listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn health() -> Json<&'static str> {
    Json("ok")
}
