pub mod flipbook;
pub mod middleware;
pub mod rest;
pub mod session;
pub mod state;

pub use middleware::session_context;
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use rest::{
    clear_session_handler, create_story_handler, example_request_handler, flipbook_handler,
    generate_all_assets_handler, generate_character_sheet_handler, generate_cover_handler,
    generate_page_handler, get_story_handler, list_assets_handler, list_stories_handler,
    story_image_handler,
};
use std::sync::Arc;

/// Builds the API router. Every route runs inside a session context.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/stories/example", get(example_request_handler))
        .route("/stories", post(create_story_handler).get(list_stories_handler))
        .route("/stories/{slug}", get(get_story_handler))
        .route(
            "/stories/{slug}/assets",
            get(list_assets_handler).post(generate_all_assets_handler),
        )
        .route(
            "/stories/{slug}/assets/character-sheet",
            post(generate_character_sheet_handler),
        )
        .route("/stories/{slug}/assets/cover", post(generate_cover_handler))
        .route(
            "/stories/{slug}/assets/pages/{page_number}",
            post(generate_page_handler),
        )
        .route("/stories/{slug}/images/{file}", get(story_image_handler))
        .route("/stories/{slug}/flipbook", get(flipbook_handler))
        .route("/session/clear", post(clear_session_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            session_context,
        ))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(app_state)
}
