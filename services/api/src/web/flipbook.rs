//! services/api/src/web/flipbook.rs
//!
//! Builds the page payload of the flip-book viewer and renders it into the
//! HTML template.

use serde::Serialize;
use storybook_core::{
    domain::{AssetKind, Story},
    imaging,
    ports::PortResult,
    Storyteller,
};
use utoipa::ToSchema;

const TEMPLATE: &str = include_str!("../../templates/flipbook.html");

const DEFAULT_WIDTH: u32 = 600;

/// One page of the flip-book. `image` is a data URI, or empty when the image is missing.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FlipbookPage {
    pub title: String,
    pub image: String,
    pub text: String,
}

/// Pixel size of one flip-book page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipbookLayout {
    pub width: u32,
    pub height: u32,
}

impl FlipbookLayout {
    /// Uses 90% of the container width, or 600 px when it is unknown.
    pub fn for_container(container_width: Option<u32>) -> Self {
        let width = match container_width {
            Some(w) if w > 0 => w / 10 * 9 + w % 10 * 9 / 10,
            _ => DEFAULT_WIDTH,
        };
        // Height is 1.4 times the width.
        let height = width / 5 * 7 + width % 5 * 7 / 5;
        Self { width, height }
    }
}

/// The cover (image only), followed by one entry per page in order.
pub async fn build_pages(storyteller: &Storyteller, story: &Story) -> PortResult<Vec<FlipbookPage>> {
    let mut pages = Vec::with_capacity(story.pages.len() + 1);
    pages.push(FlipbookPage {
        title: String::new(),
        image: image_uri(storyteller, story, AssetKind::CoverImage).await?,
        text: String::new(),
    });
    for (index, page) in story.pages.iter().enumerate() {
        pages.push(FlipbookPage {
            title: String::new(),
            image: image_uri(storyteller, story, AssetKind::Illustration(index)).await?,
            text: page.text.clone(),
        });
    }
    Ok(pages)
}

async fn image_uri(storyteller: &Storyteller, story: &Story, kind: AssetKind) -> PortResult<String> {
    Ok(storyteller
        .asset_image(story, kind)
        .await?
        .map(|image| imaging::data_uri(&image.mime_type, &image.bytes))
        .unwrap_or_default())
}

/// Fills the HTML template. The page payload is embedded as a script literal.
pub fn render(layout: FlipbookLayout, pages: &[FlipbookPage]) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_string(pages)?.replace("</", "<\\/");
    Ok(TEMPLATE
        .replace("{{WIDTH}}", &layout.width.to_string())
        .replace("{{HEIGHT}}", &layout.height.to_string())
        .replace("{{PAGES_DATA}}", &payload))
}
