//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{FsStoryStore, GeminiImageAdapter, OpenAiTextAdapter},
    config::Config,
    error::ApiError,
    web::{self, rest::ApiDoc, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use storybook_core::{PromptBuilder, Retrying, StoryStore, Storyteller};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize Service Adapters ---
    info!("Stories are stored under {}", config.stories_dir.display());
    let store = Arc::new(FsStoryStore::new(config.stories_dir.clone()));
    let existing = store.load_all().await?;
    info!("Found {} stories", existing.len());

    // Bounds every outbound model request.
    let http_client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| ApiError::Internal(format!("Failed to build HTTP client: {}", e)))?;

    let openai_config = OpenAIConfig::new()
        .with_api_key(config.gemini_api_key.clone())
        .with_api_base(config.text_api_base.clone());
    let text_client = Client::with_config(openai_config).with_http_client(http_client.clone());
    let text_adapter = OpenAiTextAdapter::new(text_client, config.text_model.clone());
    let image_adapter = GeminiImageAdapter::new(
        http_client,
        config.image_api_base.clone(),
        config.gemini_api_key.clone(),
        config.image_model.clone(),
    );

    // Every outbound generative call goes through the retry policy.
    let retry = config.retry_policy();
    let storyteller = Arc::new(Storyteller::new(
        store,
        Arc::new(Retrying::new(text_adapter, retry)),
        Arc::new(Retrying::new(image_adapter, retry)),
        PromptBuilder::new(config.integrate_text_in_image),
    ));

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(config.clone(), storyteller));

    // Sweep idle sessions in the background.
    let sessions = app_state.sessions.clone();
    let max_idle = chrono::Duration::from_std(config.session_idle_timeout).map_err(|e| {
        ApiError::Internal(format!("Invalid session idle timeout: {}", e))
    })?;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_idle(max_idle);
            if evicted > 0 {
                info!("Evicted {} idle sessions; {} remain", evicted, sessions.len());
            }
        }
    });

    let origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    let api_router = web::router(app_state).layer(cors);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
