//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::{
    flipbook::{self, FlipbookLayout, FlipbookPage},
    middleware::{cleared_session_cookie, SessionId},
    state::AppState,
};
use axum::{
    extract::{Extension, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storybook_core::{
    domain::{AssetKind, Audience, PageCount, Story, StoryRequest, Style},
    ports::PortError,
    AssetBatch, AssetGeneration, AssetOutcome,
};
use tracing::{error, info, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        example_request_handler,
        create_story_handler,
        list_stories_handler,
        get_story_handler,
        list_assets_handler,
        generate_all_assets_handler,
        generate_character_sheet_handler,
        generate_cover_handler,
        generate_page_handler,
        story_image_handler,
        flipbook_handler,
        clear_session_handler,
    ),
    components(
        schemas(
            StoryForm,
            StorySummary,
            StoryDetail,
            AssetView,
            AssetResult,
            AssetBatchResponse,
            FlipbookPage,
        )
    ),
    tags(
        (name = "Storybook API", description = "Create illustrated children's stories and their images.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The five story inputs plus every accepted categorical value.
#[derive(Serialize, ToSchema)]
pub struct StoryForm {
    protagonist: String,
    premise: String,
    audience: String,
    style: String,
    page_count: String,
    audiences: Vec<String>,
    styles: Vec<String>,
    page_counts: Vec<String>,
}

impl StoryForm {
    fn prefilled(request: &StoryRequest) -> Self {
        Self {
            protagonist: request.protagonist.clone(),
            premise: request.premise.clone(),
            audience: request.audience.to_string(),
            style: request.style.to_string(),
            page_count: request.page_count.to_string(),
            audiences: Audience::ALL.iter().map(ToString::to_string).collect(),
            styles: Style::ALL.iter().map(ToString::to_string).collect(),
            page_counts: PageCount::ALL.iter().map(ToString::to_string).collect(),
        }
    }
}

/// One entry of the story list.
#[derive(Serialize, ToSchema)]
pub struct StorySummary {
    slug: String,
    title: String,
    premise: String,
    audience: String,
    style: String,
    pages: usize,
    owned: bool,
}

impl StorySummary {
    fn new(story: &Story, owner: &str) -> Self {
        Self {
            slug: story.slug(),
            title: story.title.clone(),
            premise: story.premise.clone(),
            audience: story.audience.to_string(),
            style: story.style.to_string(),
            pages: story.pages.len(),
            owned: story.user_id.as_deref() == Some(owner),
        }
    }
}

/// A story together with what is still missing and how its pages are shaped.
#[derive(Serialize, ToSchema)]
pub struct StoryDetail {
    slug: String,
    #[schema(value_type = Object)]
    story: Story,
    missing_assets: Vec<String>,
    orientation: String,
}

/// One generatable image of a story.
#[derive(Serialize, ToSchema)]
pub struct AssetView {
    name: String,
    prompt: Option<String>,
    path: Option<String>,
    present: bool,
}

/// What one asset-generation request did.
#[derive(Serialize, ToSchema)]
pub struct AssetResult {
    name: String,
    /// `existing`, `generated` or `empty`.
    status: String,
    path: Option<String>,
    message: Option<String>,
}

impl AssetResult {
    fn new(kind: AssetKind, outcome: &AssetOutcome) -> Self {
        let (status, message) = match outcome {
            AssetOutcome::Existing(_) => ("existing", None),
            AssetOutcome::Generated(_) => ("generated", None),
            AssetOutcome::Empty { .. } => (
                "empty",
                Some(format!("No image was generated for {}. Please try again.", kind)),
            ),
        };
        Self {
            name: kind.to_string(),
            status: status.to_string(),
            path: outcome.path().map(str::to_string),
            message,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct AssetBatchResponse {
    slug: String,
    results: Vec<AssetResult>,
    missing_assets: Vec<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Rescan the story directory instead of using the session's cached list.
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ForceQuery {
    /// Regenerate even when the image already exists.
    #[serde(default)]
    pub force: bool,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FlipbookQuery {
    /// Width of the container the flip-book is shown in, in pixels.
    pub width: Option<u32>,
}

//=========================================================================================
// Helpers
//=========================================================================================

type HandlerError = (StatusCode, String);

/// Maps a port error to a status code and a message fit for a toast.
fn port_error(action: &str, e: PortError) -> HandlerError {
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PortError::EmptyResult(_) | PortError::Transient(_) | PortError::Fatal(_) => {
            StatusCode::BAD_GATEWAY
        }
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::NOT_FOUND {
        warn!("{}: {}", action, e);
    } else {
        error!("{}: {:?}", action, e);
    }
    (status, format!("{}: {}", action, e))
}

fn bad_request(message: impl Into<String>) -> HandlerError {
    (StatusCode::BAD_REQUEST, message.into())
}

/// The owner id recorded for stories created in this session.
fn session_owner(state: &AppState, session: SessionId) -> String {
    state
        .sessions
        .get(session.0)
        .map(|context| context.user_id)
        .unwrap_or_else(|| session.0.to_string())
}

async fn story_detail(state: &AppState, story: Story) -> StoryDetail {
    let storyteller = &state.storyteller;
    let missing_assets = storyteller
        .missing_assets(&story)
        .await
        .iter()
        .map(ToString::to_string)
        .collect();
    let orientation = storyteller.orientation(&story).await.to_string();
    StoryDetail {
        slug: story.slug(),
        story,
        missing_assets,
        orientation,
    }
}

async fn visible_story(state: &AppState, session: SessionId, slug: &str) -> Result<Story, HandlerError> {
    let owner = session_owner(state, session);
    state
        .storyteller
        .find_story(slug, Some(&owner))
        .await
        .map_err(|e| port_error("Failed to load story", e))
}

async fn generate_single(
    state: &AppState,
    session: SessionId,
    slug: &str,
    kind: AssetKind,
    force: bool,
) -> Result<Json<AssetResult>, HandlerError> {
    visible_story(state, session, slug).await?;
    let AssetGeneration { outcome, .. } = state
        .storyteller
        .generate_asset(slug, kind, force)
        .await
        .map_err(|e| port_error(&format!("Failed to generate {}", kind), e))?;
    if outcome.is_generated() {
        state.sessions.invalidate_stories(session.0);
    }
    Ok(Json(AssetResult::new(kind, &outcome)))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Get an example story request, for pre-filling the creation form.
#[utoipa::path(
    get,
    path = "/stories/example",
    responses(
        (status = 200, description = "Example inputs and the accepted values", body = StoryForm)
    )
)]
pub async fn example_request_handler() -> Json<StoryForm> {
    Json(StoryForm::prefilled(&StoryRequest::example()))
}

/// Create a new story with the text model.
///
/// Accepts a multipart/form-data request with the fields `protagonist`,
/// `premise`, `audience`, `style`, `page_count` and an optional
/// `protagonist_image` file.
#[utoipa::path(
    post,
    path = "/stories",
    request_body(content_type = "multipart/form-data", description = "The story inputs."),
    responses(
        (status = 201, description = "Story created successfully", body = StoryDetail),
        (status = 400, description = "Bad request (e.g., missing field or unknown style)"),
        (status = 409, description = "This session is already writing a story"),
        (status = 502, description = "The text model failed"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_story_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let mut protagonist = None;
    let mut premise = None;
    let mut audience = None;
    let mut style = None;
    let mut page_count = None;
    let mut protagonist_image: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        bad_request(format!("Failed to read multipart data: {}", e))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "protagonist_image" {
            let data = field.bytes().await.map_err(|e| {
                bad_request(format!("Failed to read image bytes: {}", e))
            })?;
            if !data.is_empty() {
                protagonist_image = Some(data.to_vec());
            }
            continue;
        }

        let value = field.text().await.map_err(|e| {
            bad_request(format!("Failed to read field '{}': {}", name, e))
        })?;
        match name.as_str() {
            "protagonist" => protagonist = Some(value),
            "premise" => premise = Some(value),
            "audience" => audience = Some(value),
            "style" => style = Some(value),
            "page_count" => page_count = Some(value),
            other => warn!("Ignoring unknown form field '{}'", other),
        }
    }

    let required = |value: Option<String>, field: &str| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| bad_request(format!("The '{}' field is required", field)))
    };
    let request = StoryRequest {
        protagonist: required(protagonist, "protagonist")?,
        premise: required(premise, "premise")?,
        audience: required(audience, "audience")?
            .parse::<Audience>()
            .map_err(|e| bad_request(format!("{}", e)))?,
        style: required(style, "style")?
            .parse::<Style>()
            .map_err(|e| bad_request(format!("{}", e)))?,
        page_count: required(page_count, "page_count")?
            .parse::<PageCount>()
            .map_err(|e| bad_request(format!("{}", e)))?,
    };

    let Some(_ticket) = app_state.sessions.begin_create(session.0) else {
        return Err((
            StatusCode::CONFLICT,
            "A story is already being written for this session".to_string(),
        ));
    };

    let owner = session_owner(&app_state, session);
    info!("Session {} is creating a story", session.0);
    let story = app_state
        .storyteller
        .create_story(&request, Some(&owner), protagonist_image.as_deref())
        .await
        .map_err(|e| port_error("Failed to create story", e))?;

    app_state.sessions.invalidate_stories(session.0);
    let detail = story_detail(&app_state, story).await;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// List the stories visible to this session.
#[utoipa::path(
    get,
    path = "/stories",
    params(ListQuery),
    responses(
        (status = 200, description = "The visible stories", body = [StorySummary]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_stories_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let owner = session_owner(&app_state, session);
    let cached = if query.refresh {
        None
    } else {
        app_state.sessions.cached_stories(session.0)
    };

    let stories = match cached {
        Some(stories) => stories,
        None => {
            let stories = app_state
                .storyteller
                .list_stories(Some(&owner))
                .await
                .map_err(|e| port_error("Failed to list stories", e))?;
            app_state.sessions.set_stories(session.0, stories.clone());
            stories
        }
    };

    let summaries: Vec<StorySummary> = stories
        .iter()
        .map(|story| StorySummary::new(story, &owner))
        .collect();
    Ok(Json(summaries))
}

/// Get a story with its missing assets and page orientation.
#[utoipa::path(
    get,
    path = "/stories/{slug}",
    params(("slug" = String, Path, description = "The story slug")),
    responses(
        (status = 200, description = "The story", body = StoryDetail),
        (status = 404, description = "No such story")
    )
)]
pub async fn get_story_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let story = visible_story(&app_state, session, &slug).await?;
    Ok(Json(story_detail(&app_state, story).await))
}

/// List every asset of a story with its prompt and presence.
#[utoipa::path(
    get,
    path = "/stories/{slug}/assets",
    params(("slug" = String, Path, description = "The story slug")),
    responses(
        (status = 200, description = "The assets in generation order", body = [AssetView]),
        (status = 404, description = "No such story")
    )
)]
pub async fn list_assets_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, HandlerError> {
    let story = visible_story(&app_state, session, &slug).await?;
    let storyteller = &app_state.storyteller;

    let mut assets = Vec::new();
    for kind in story.asset_kinds() {
        assets.push(AssetView {
            name: kind.to_string(),
            prompt: storyteller.asset_prompt(&story, kind).await,
            path: story.asset_path(kind).map(str::to_string),
            present: storyteller.is_asset_present(&story, kind).await,
        });
    }
    Ok(Json(assets))
}

/// Generate every missing asset: character sheet, cover, then each page.
#[utoipa::path(
    post,
    path = "/stories/{slug}/assets",
    params(("slug" = String, Path, description = "The story slug"), ForceQuery),
    responses(
        (status = 200, description = "What was generated", body = AssetBatchResponse),
        (status = 404, description = "No such story"),
        (status = 502, description = "The image model failed")
    )
)]
pub async fn generate_all_assets_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    Path(slug): Path<String>,
    Query(query): Query<ForceQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    visible_story(&app_state, session, &slug).await?;
    let AssetBatch { story, outcomes } = app_state
        .storyteller
        .generate_all_assets(&slug, query.force)
        .await
        .map_err(|e| port_error("Failed to generate assets", e))?;
    app_state.sessions.invalidate_stories(session.0);

    let missing_assets = app_state
        .storyteller
        .missing_assets(&story)
        .await
        .iter()
        .map(ToString::to_string)
        .collect();
    Ok(Json(AssetBatchResponse {
        slug,
        results: outcomes
            .iter()
            .map(|(kind, outcome)| AssetResult::new(*kind, outcome))
            .collect(),
        missing_assets,
    }))
}

/// Generate the character sheet.
#[utoipa::path(
    post,
    path = "/stories/{slug}/assets/character-sheet",
    params(("slug" = String, Path, description = "The story slug"), ForceQuery),
    responses(
        (status = 200, description = "Generation result", body = AssetResult),
        (status = 404, description = "No such story"),
        (status = 502, description = "The image model failed")
    )
)]
pub async fn generate_character_sheet_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    Path(slug): Path<String>,
    Query(query): Query<ForceQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    generate_single(&app_state, session, &slug, AssetKind::CharacterSheet, query.force).await
}

/// Generate the cover image.
#[utoipa::path(
    post,
    path = "/stories/{slug}/assets/cover",
    params(("slug" = String, Path, description = "The story slug"), ForceQuery),
    responses(
        (status = 200, description = "Generation result", body = AssetResult),
        (status = 404, description = "No such story"),
        (status = 502, description = "The image model failed")
    )
)]
pub async fn generate_cover_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    Path(slug): Path<String>,
    Query(query): Query<ForceQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    generate_single(&app_state, session, &slug, AssetKind::CoverImage, query.force).await
}

/// Generate the illustration of one page (1-based).
#[utoipa::path(
    post,
    path = "/stories/{slug}/assets/pages/{page_number}",
    params(
        ("slug" = String, Path, description = "The story slug"),
        ("page_number" = usize, Path, description = "1-based page number"),
        ForceQuery
    ),
    responses(
        (status = 200, description = "Generation result", body = AssetResult),
        (status = 400, description = "Page number out of range"),
        (status = 404, description = "No such story"),
        (status = 502, description = "The image model failed")
    )
)]
pub async fn generate_page_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    Path((slug, page_number)): Path<(String, usize)>,
    Query(query): Query<ForceQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let index = page_number
        .checked_sub(1)
        .ok_or_else(|| bad_request("Page numbers start at 1"))?;
    generate_single(&app_state, session, &slug, AssetKind::Illustration(index), query.force).await
}

/// Serve one of the story's stored images by file name.
#[utoipa::path(
    get,
    path = "/stories/{slug}/images/{file}",
    params(
        ("slug" = String, Path, description = "The story slug"),
        ("file" = String, Path, description = "Image file name, e.g. cover_image.jpeg")
    ),
    responses(
        (status = 200, description = "The image bytes"),
        (status = 404, description = "No such story or image")
    )
)]
pub async fn story_image_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    Path((slug, file)): Path<(String, String)>,
) -> Result<impl IntoResponse, HandlerError> {
    let story = visible_story(&app_state, session, &slug).await?;
    let image = app_state
        .storyteller
        .image_by_file_name(&story, &file)
        .await
        .map_err(|e| port_error("Failed to read image", e))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Image {} not found", file)))?;
    Ok(([(header::CONTENT_TYPE, image.mime_type)], image.bytes))
}

/// Render the story as an HTML flip-book.
#[utoipa::path(
    get,
    path = "/stories/{slug}/flipbook",
    params(("slug" = String, Path, description = "The story slug"), FlipbookQuery),
    responses(
        (status = 200, description = "The flip-book page", body = String, content_type = "text/html"),
        (status = 404, description = "No such story")
    )
)]
pub async fn flipbook_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    Path(slug): Path<String>,
    Query(query): Query<FlipbookQuery>,
) -> Result<impl IntoResponse, HandlerError> {
    let story = visible_story(&app_state, session, &slug).await?;
    let pages = flipbook::build_pages(&app_state.storyteller, &story)
        .await
        .map_err(|e| port_error("Failed to build flip-book", e))?;
    let html = flipbook::render(FlipbookLayout::for_container(query.width), &pages).map_err(|e| {
        error!("Failed to render flip-book: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to render flip-book".to_string(),
        )
    })?;
    Ok(Html(html))
}

/// Drop this session's context and its cookie.
#[utoipa::path(
    post,
    path = "/session/clear",
    responses(
        (status = 204, description = "Session cleared")
    )
)]
pub async fn clear_session_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
) -> impl IntoResponse {
    app_state.sessions.clear(session.0);
    info!("Cleared session {}", session.0);
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, cleared_session_cookie())],
    )
}
