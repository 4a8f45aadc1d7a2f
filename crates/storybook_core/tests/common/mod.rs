//! In-memory fakes of the core ports shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use storybook_core::{
    ImageData, ImageGenerationService, OutputSchema, PortError, PortResult, PromptBuilder, Story,
    StoryStore, Storyteller, TextGenerationService,
};

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

/// A story record as the text model would return it.
pub fn generated_story_json(pages: usize) -> serde_json::Value {
    let pages: Vec<_> = (0..pages)
        .map(|i| {
            serde_json::json!({
                "text": format!("Page {} text. Luna smiles.", i + 1),
                "illustration_prompt": format!("Scene {}", i + 1),
                "image_path": null
            })
        })
        .collect();
    serde_json::json!({
        "protagonist": "Luna, a curious girl",
        "image_path": null,
        "user_id": null,
        "page_count": "8-10 pages",
        "style": "Cartoon: Bold outlines, simplified shapes, and vibrant flat colors that create a playful, high-energy feel.",
        "premise": "A locket opens a door",
        "audience": "Kids (Ages 7-12)",
        "title": "Luna & The Whispering Locket!",
        "moral": "Courage grows when shared",
        "character_sheet": { "prompt": "Luna and Hoot the owl", "image_path": null },
        "cover_image": { "prompt": "Luna and Hoot", "image_path": null },
        "pages": pages
    })
}

//=========================================================================================
// Store
//=========================================================================================

#[derive(Default)]
pub struct MemoryStore {
    pub stories: Mutex<HashMap<String, Story>>,
    pub assets: Mutex<HashMap<String, Vec<u8>>>,
    pub saves: AtomicUsize,
}

impl MemoryStore {
    pub fn insert_story(&self, story: Story) {
        self.stories
            .lock()
            .unwrap()
            .insert(story.slug(), story);
    }

    pub fn put_asset(&self, path: &str, bytes: Vec<u8>) {
        self.assets.lock().unwrap().insert(path.to_string(), bytes);
    }

    pub fn remove_asset(&self, path: &str) {
        self.assets.lock().unwrap().remove(path);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoryStore for MemoryStore {
    async fn save_story(&self, story: &Story) -> PortResult<String> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let slug = story.slug();
        self.stories
            .lock()
            .unwrap()
            .insert(slug.clone(), story.clone());
        Ok(format!("{slug}/{slug}.json"))
    }

    async fn load_story(&self, slug: &str) -> PortResult<Story> {
        self.stories
            .lock()
            .unwrap()
            .get(slug)
            .cloned()
            .ok_or_else(|| PortError::NotFound(slug.to_string()))
    }

    async fn load_all(&self) -> PortResult<Vec<Story>> {
        let mut stories: Vec<Story> = self.stories.lock().unwrap().values().cloned().collect();
        stories.sort_by_key(|s| s.slug());
        Ok(stories)
    }

    async fn write_asset(&self, slug: &str, file_name: &str, bytes: &[u8]) -> PortResult<String> {
        let path = format!("{slug}/{file_name}");
        self.put_asset(&path, bytes.to_vec());
        Ok(path)
    }

    async fn read_asset(&self, path: &str) -> PortResult<Option<Vec<u8>>> {
        Ok(self.assets.lock().unwrap().get(path).cloned())
    }

    async fn asset_exists(&self, path: &str) -> bool {
        self.assets.lock().unwrap().contains_key(path)
    }
}

//=========================================================================================
// Generative Services
//=========================================================================================

/// Returns a fixed record and remembers the prompts it was given.
pub struct FakeText {
    pub response: Option<serde_json::Value>,
    pub calls: Mutex<Vec<(String, String, OutputSchema)>>,
}

impl FakeText {
    pub fn returning(response: Option<serde_json::Value>) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextGenerationService for FakeText {
    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &OutputSchema,
    ) -> PortResult<Option<serde_json::Value>> {
        self.calls.lock().unwrap().push((
            system_prompt.to_string(),
            user_prompt.to_string(),
            schema.clone(),
        ));
        Ok(self.response.clone())
    }
}

/// One scripted reply of [`FakeImages`].
pub enum ImageReply {
    Png(u32, u32),
    Nothing,
    Transient,
}

/// Replays scripted replies (falling back to a square PNG) and records each
/// prompt with whether a reference image was attached.
#[derive(Default)]
pub struct FakeImages {
    pub replies: Mutex<VecDeque<ImageReply>>,
    pub calls: Mutex<Vec<(String, Option<ImageData>)>>,
}

impl FakeImages {
    pub fn scripted(replies: Vec<ImageReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageGenerationService for FakeImages {
    async fn generate_image(
        &self,
        prompt: &str,
        reference_image: Option<&ImageData>,
    ) -> PortResult<Option<ImageData>> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), reference_image.cloned()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ImageReply::Png(64, 64));
        match reply {
            ImageReply::Png(w, h) => Ok(Some(ImageData::new(png(w, h), "image/png"))),
            ImageReply::Nothing => Ok(None),
            ImageReply::Transient => Err(PortError::Transient("503 from fake".to_string())),
        }
    }
}

//=========================================================================================
// Harness
//=========================================================================================

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub text: Arc<FakeText>,
    pub images: Arc<FakeImages>,
    pub storyteller: Storyteller,
}

impl Harness {
    pub fn new(text: FakeText, images: FakeImages) -> Self {
        let store = Arc::new(MemoryStore::default());
        let text = Arc::new(text);
        let images = Arc::new(images);
        let storyteller = Storyteller::new(
            store.clone(),
            text.clone(),
            images.clone(),
            PromptBuilder::default(),
        );
        Self {
            store,
            text,
            images,
            storyteller,
        }
    }

    pub fn with_images(images: FakeImages) -> Self {
        Self::new(FakeText::returning(Some(generated_story_json(3))), images)
    }
}
