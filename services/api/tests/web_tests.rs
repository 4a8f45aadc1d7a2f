//! Handler-level tests of the web layer against a real filesystem store and
//! scripted generative services.

use api_lib::{
    adapters::FsStoryStore,
    config::Config,
    web::{
        middleware::SessionId,
        rest::{
            flipbook_handler, generate_cover_handler, generate_page_handler, get_story_handler,
            list_assets_handler, list_stories_handler, story_image_handler, ForceQuery,
            FlipbookQuery, ListQuery,
        },
        state::AppState,
    },
};
use async_trait::async_trait;
use axum::{
    body::to_bytes,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use storybook_core::{
    domain::{Audience, CharacterSheet, CoverImage, Page, PageCount, Story, Style},
    ImageData, ImageGenerationService, OutputSchema, PortResult, PromptBuilder, StoryStore,
    Storyteller, TextGenerationService,
};
use tempfile::TempDir;
use uuid::Uuid;

struct NoText;

#[async_trait]
impl TextGenerationService for NoText {
    async fn generate_structured(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _schema: &OutputSchema,
    ) -> PortResult<Option<serde_json::Value>> {
        Ok(None)
    }
}

struct LandscapeImages;

#[async_trait]
impl ImageGenerationService for LandscapeImages {
    async fn generate_image(
        &self,
        _prompt: &str,
        _reference_image: Option<&ImageData>,
    ) -> PortResult<Option<ImageData>> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(96, 54));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        Ok(Some(ImageData::new(out, "image/png")))
    }
}

fn story(title: &str, user_id: Option<&str>) -> Story {
    Story {
        protagonist: "Luna".to_string(),
        image_path: None,
        user_id: user_id.map(str::to_string),
        page_count: PageCount::Tenish,
        style: Style::Cartoon,
        premise: "A locket opens a door".to_string(),
        audience: Audience::Kids,
        title: title.to_string(),
        moral: "Be brave".to_string(),
        character_sheet: CharacterSheet {
            image_path: None,
            prompt: "Luna and Hoot".to_string(),
        },
        cover_image: CoverImage {
            image_path: None,
            prompt: "Luna at the door".to_string(),
        },
        pages: vec![
            Page {
                text: "Luna found a locket.".to_string(),
                illustration_prompt: "A shiny locket in the grass".to_string(),
                image_path: None,
            },
            Page {
                text: "The locket whispered.".to_string(),
                illustration_prompt: "Luna listening".to_string(),
                image_path: None,
            },
        ],
    }
}

struct TestApp {
    _root: TempDir,
    store: Arc<FsStoryStore>,
    state: Arc<AppState>,
    session: SessionId,
}

impl TestApp {
    async fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(FsStoryStore::new(root.path()));
        let storyteller = Arc::new(Storyteller::new(
            store.clone(),
            Arc::new(NoText),
            Arc::new(LandscapeImages),
            PromptBuilder::default(),
        ));
        let config = Config::from_lookup(|key| match key {
            "GEMINI_API_KEY" => Some("test-key".to_string()),
            "STORIES_DIR" => Some(root.path().to_string_lossy().into_owned()),
            _ => None,
        })
        .unwrap();
        let state = Arc::new(AppState::new(Arc::new(config), storyteller));

        let session = SessionId(Uuid::new_v4());
        state.sessions.init(session.0);

        Self {
            _root: root,
            store,
            state,
            session,
        }
    }

    fn owner(&self) -> String {
        self.session.0.to_string()
    }
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn status_of<T: IntoResponse, E: IntoResponse>(result: Result<T, E>) -> StatusCode {
    match result {
        Ok(ok) => ok.into_response().status(),
        Err(err) => err.into_response().status(),
    }
}

#[tokio::test]
async fn list_is_cached_until_refreshed() {
    let app = TestApp::new().await;
    app.store
        .save_story(&story("Shared Tale", None))
        .await
        .unwrap();

    let first = list_stories_handler(
        State(app.state.clone()),
        Extension(app.session),
        Query(ListQuery { refresh: false }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(body_json(first).await.as_array().unwrap().len(), 1);

    app.store
        .save_story(&story("My Tale", Some(&app.owner())))
        .await
        .unwrap();
    app.store
        .save_story(&story("Someone Else's Tale", Some("stranger")))
        .await
        .unwrap();

    let cached = list_stories_handler(
        State(app.state.clone()),
        Extension(app.session),
        Query(ListQuery { refresh: false }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(body_json(cached).await.as_array().unwrap().len(), 1);

    let refreshed = list_stories_handler(
        State(app.state.clone()),
        Extension(app.session),
        Query(ListQuery { refresh: true }),
    )
    .await
    .unwrap()
    .into_response();
    let list = body_json(refreshed).await;
    let titles: Vec<_> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["My Tale".to_string(), "Shared Tale".to_string()]);
}

#[tokio::test]
async fn stories_of_other_owners_are_not_found() {
    let app = TestApp::new().await;
    app.store
        .save_story(&story("Secret Tale", Some("stranger")))
        .await
        .unwrap();

    let result = get_story_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path("secret-tale".to_string()),
    )
    .await;
    assert_eq!(status_of(result), StatusCode::NOT_FOUND);

    let result = generate_cover_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path("secret-tale".to_string()),
        Query(ForceQuery { force: false }),
    )
    .await;
    assert_eq!(status_of(result), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn story_detail_reports_missing_assets_and_orientation() {
    let app = TestApp::new().await;
    app.store
        .save_story(&story("Luna's Locket", Some(&app.owner())))
        .await
        .unwrap();

    let detail = get_story_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path("lunas-locket".to_string()),
    )
    .await
    .unwrap()
    .into_response();
    let detail = body_json(detail).await;
    assert_eq!(
        detail["missing_assets"],
        serde_json::json!(["Character Sheet", "Cover Image", "Page 1", "Page 2"])
    );
    assert_eq!(detail["orientation"], "unknown");

    for page_number in [1, 2] {
        let result = generate_page_handler(
            State(app.state.clone()),
            Extension(app.session),
            Path(("lunas-locket".to_string(), page_number)),
            Query(ForceQuery { force: false }),
        )
        .await
        .unwrap()
        .into_response();
        let result = body_json(result).await;
        assert_eq!(result["status"], "generated");
    }

    let detail = get_story_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path("lunas-locket".to_string()),
    )
    .await
    .unwrap()
    .into_response();
    let detail = body_json(detail).await;
    assert_eq!(
        detail["missing_assets"],
        serde_json::json!(["Character Sheet", "Cover Image"])
    );
    assert_eq!(detail["orientation"], "landscape");
}

#[tokio::test]
async fn page_numbers_are_one_based() {
    let app = TestApp::new().await;
    app.store
        .save_story(&story("Counting Tale", None))
        .await
        .unwrap();

    let result = generate_page_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path(("counting-tale".to_string(), 0)),
        Query(ForceQuery { force: false }),
    )
    .await;
    assert_eq!(status_of(result), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn second_generation_reuses_the_existing_image() {
    let app = TestApp::new().await;
    app.store
        .save_story(&story("Cover Tale", None))
        .await
        .unwrap();

    let first = generate_cover_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path("cover-tale".to_string()),
        Query(ForceQuery { force: false }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(body_json(first).await["status"], "generated");

    let second = generate_cover_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path("cover-tale".to_string()),
        Query(ForceQuery { force: false }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(body_json(second).await["status"], "existing");

    let image = story_image_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path(("cover-tale".to_string(), "cover_image.jpeg".to_string())),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(image.status(), StatusCode::OK);
    assert_eq!(image.headers()["content-type"], "image/jpeg");

    let missing = story_image_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path(("cover-tale".to_string(), "character_sheet.jpeg".to_string())),
    )
    .await;
    assert_eq!(status_of(missing), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn asset_listing_shows_prompts_and_presence() {
    let app = TestApp::new().await;
    app.store
        .save_story(&story("Listing Tale", None))
        .await
        .unwrap();

    let assets = list_assets_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path("listing-tale".to_string()),
    )
    .await
    .unwrap()
    .into_response();
    let assets = body_json(assets).await;
    let assets = assets.as_array().unwrap();
    assert_eq!(assets.len(), 4);
    assert_eq!(assets[0]["name"], "Character Sheet");
    assert_eq!(assets[0]["present"], false);
    assert!(assets[3]["prompt"]
        .as_str()
        .unwrap()
        .contains("Luna listening"));
}

#[tokio::test]
async fn flipbook_embeds_cover_and_pages() {
    let app = TestApp::new().await;
    app.store
        .save_story(&story("Book Tale", None))
        .await
        .unwrap();
    generate_cover_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path("book-tale".to_string()),
        Query(ForceQuery { force: false }),
    )
    .await
    .unwrap();

    let html = flipbook_handler(
        State(app.state.clone()),
        Extension(app.session),
        Path("book-tale".to_string()),
        Query(FlipbookQuery { width: Some(1000) }),
    )
    .await
    .unwrap()
    .into_response();
    assert_eq!(html.status(), StatusCode::OK);
    let html = body_text(html).await;
    assert!(html.contains("width: 900"));
    assert!(html.contains("height: 1260"));
    assert!(html.contains("data:image/jpeg;base64,"));
    assert!(html.contains("The locket whispered."));
}
