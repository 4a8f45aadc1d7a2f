//! crates/storybook_core/src/storyteller.rs
//!
//! The application service: creates stories through the text model, generates
//! their images through the image model and answers read-only questions about
//! them (missing assets, orientation, visibility).
//!
//! Asset presence is decided by the store, not by an in-memory flag: an asset
//! is present when its path is recorded *and* the file exists. Deleting a file
//! therefore reverts the asset to missing. Generation for one story is
//! serialized by a per-slug lock held from reload to save.

use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::{AssetKind, Orientation, Story, StoryRequest, PROTAGONIST_FILE_NAME};
use crate::imaging::{self, DEFAULT_ASPECT_TOLERANCE};
use crate::ports::{
    ImageData, ImageGenerationService, OutputSchema, PortError, PortResult, StoryStore,
    TextGenerationService,
};
use crate::prompts::{story_schema, PromptBuilder, STORY_SCHEMA_NAME};

//=========================================================================================
// Outcomes
//=========================================================================================

/// What a single asset-generation call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    /// The asset was already present and `force` was not set. No model call was made.
    Existing(String),
    /// A new image was generated, written and recorded.
    Generated(String),
    /// The model returned no image. The story is unchanged.
    Empty { previous: Option<String> },
}

impl AssetOutcome {
    /// The recorded path after the call, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Existing(path) | Self::Generated(path) => Some(path),
            Self::Empty { previous } => previous.as_deref(),
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated(_))
    }
}

/// Result of generating one asset: the story as persisted afterwards and the outcome.
#[derive(Debug, Clone)]
pub struct AssetGeneration {
    pub story: Story,
    pub outcome: AssetOutcome,
}

/// Result of generating several assets of one story in order.
#[derive(Debug, Clone)]
pub struct AssetBatch {
    pub story: Story,
    pub outcomes: Vec<(AssetKind, AssetOutcome)>,
}

//=========================================================================================
// Storyteller
//=========================================================================================

pub struct Storyteller {
    store: Arc<dyn StoryStore>,
    text: Arc<dyn TextGenerationService>,
    images: Arc<dyn ImageGenerationService>,
    prompts: PromptBuilder,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Storyteller {
    pub fn new(
        store: Arc<dyn StoryStore>,
        text: Arc<dyn TextGenerationService>,
        images: Arc<dyn ImageGenerationService>,
        prompts: PromptBuilder,
    ) -> Self {
        Self {
            store,
            text,
            images,
            prompts,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, slug: &str) -> Arc<Mutex<()>> {
        self.locks.entry(slug.to_string()).or_default().clone()
    }

    // --- Story Creation ---

    /// Generates a new story from user input and persists it.
    ///
    /// The categorical fields of the result are forced to the requested values
    /// and any image paths the model invented are discarded. A story whose
    /// title maps to an existing slug replaces the older one.
    pub async fn create_story(
        &self,
        request: &StoryRequest,
        owner: Option<&str>,
        protagonist_image: Option<&[u8]>,
    ) -> PortResult<Story> {
        let protagonist_jpeg = protagonist_image
            .map(imaging::to_jpeg)
            .transpose()
            .map_err(|e| PortError::InvalidInput(format!("Protagonist image: {e}")))?;

        let schema = OutputSchema {
            name: STORY_SCHEMA_NAME.to_string(),
            schema: story_schema(),
        };
        let schema_text = serde_json::to_string_pretty(&schema.schema)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let system_prompt = self.prompts.story_system_prompt(&schema_text);
        let user_prompt = self.prompts.story_user_prompt(request);

        info!("Generating story text for owner {:?}", owner);
        let value = self
            .text
            .generate_structured(&system_prompt, &user_prompt, &schema)
            .await?
            .ok_or_else(|| PortError::EmptyResult("no story was generated".to_string()))?;

        let mut story: Story = serde_json::from_value(value)
            .map_err(|e| PortError::Fatal(format!("Generated story does not match the schema: {e}")))?;
        story.page_count = request.page_count;
        story.style = request.style;
        story.audience = request.audience;
        story.user_id = owner.map(str::to_string);
        story.image_path = None;
        story.character_sheet.image_path = None;
        story.cover_image.image_path = None;
        for page in &mut story.pages {
            page.image_path = None;
        }

        let slug = story.slug();
        if slug.is_empty() {
            return Err(PortError::Fatal(format!(
                "Generated title '{}' has no usable characters",
                story.title
            )));
        }
        if story.pages.is_empty() {
            return Err(PortError::Fatal("Generated story has no pages".to_string()));
        }

        let lock = self.lock_for(&slug);
        let _guard = lock.lock().await;

        if self.store.load_story(&slug).await.is_ok() {
            warn!("A story with slug '{}' already exists and will be replaced", slug);
        }

        match protagonist_jpeg {
            Some(bytes) => {
                let path = self
                    .store
                    .write_asset(&slug, PROTAGONIST_FILE_NAME, &bytes)
                    .await?;
                story.image_path = Some(path);
            }
            None => debug!("No protagonist image provided."),
        }

        let location = self.store.save_story(&story).await?;
        info!("Story '{}' saved to {}", story.title, location);
        Ok(story)
    }

    // --- Asset Generation ---

    pub async fn generate_character_sheet(
        &self,
        slug: &str,
        force: bool,
    ) -> PortResult<AssetGeneration> {
        self.generate_asset(slug, AssetKind::CharacterSheet, force).await
    }

    pub async fn generate_cover_image(&self, slug: &str, force: bool) -> PortResult<AssetGeneration> {
        self.generate_asset(slug, AssetKind::CoverImage, force).await
    }

    pub async fn generate_illustration(
        &self,
        slug: &str,
        page_index: usize,
        force: bool,
    ) -> PortResult<AssetGeneration> {
        self.generate_asset(slug, AssetKind::Illustration(page_index), force)
            .await
    }

    /// Generates every page illustration in page order.
    pub async fn generate_illustrations(&self, slug: &str, force: bool) -> PortResult<AssetBatch> {
        let story = self.store.load_story(slug).await?;
        let kinds = (0..story.pages.len()).map(AssetKind::Illustration).collect();
        self.generate_batch(slug, story, kinds, force).await
    }

    /// Generates the character sheet, then the cover, then every illustration.
    /// Stops at the first error; assets generated before it stay saved.
    pub async fn generate_all_assets(&self, slug: &str, force: bool) -> PortResult<AssetBatch> {
        let story = self.store.load_story(slug).await?;
        let kinds = story.asset_kinds();
        self.generate_batch(slug, story, kinds, force).await
    }

    async fn generate_batch(
        &self,
        slug: &str,
        mut story: Story,
        kinds: Vec<AssetKind>,
        force: bool,
    ) -> PortResult<AssetBatch> {
        let total = kinds.len();
        let mut outcomes = Vec::with_capacity(total);
        for (i, kind) in kinds.into_iter().enumerate() {
            info!("Generating {} ({}/{}) for '{}'", kind, i + 1, total, slug);
            let generation = self.generate_asset(slug, kind, force).await?;
            story = generation.story;
            outcomes.push((kind, generation.outcome));
        }
        Ok(AssetBatch { story, outcomes })
    }

    /// The idempotent-generate transition shared by every asset kind.
    pub async fn generate_asset(
        &self,
        slug: &str,
        kind: AssetKind,
        force: bool,
    ) -> PortResult<AssetGeneration> {
        let lock = self.lock_for(slug);
        let _guard = lock.lock().await;

        let mut story = self.store.load_story(slug).await?;
        if !story.has_asset(kind) {
            return Err(PortError::InvalidInput(format!(
                "'{}' has no {}",
                story.title, kind
            )));
        }

        if !force {
            if let Some(path) = self.present_path(&story, kind).await {
                info!("{} for '{}' already exists. Skipping generation.", kind, slug);
                return Ok(AssetGeneration {
                    story,
                    outcome: AssetOutcome::Existing(path),
                });
            }
        }

        let reference = self.reference_image(&story, kind).await?;
        let prompt = self
            .build_prompt(&story, kind, reference.is_some())
            .ok_or_else(|| PortError::InvalidInput(format!("'{}' has no {}", story.title, kind)))?;

        let Some(image) = self.images.generate_image(&prompt, reference.as_ref()).await? else {
            warn!("Failed to generate {} for '{}': no image returned", kind, slug);
            let previous = story.asset_path(kind).map(str::to_string);
            return Ok(AssetGeneration {
                story,
                outcome: AssetOutcome::Empty { previous },
            });
        };

        let jpeg = imaging::to_jpeg(&image.bytes)
            .map_err(|e| PortError::Fatal(format!("Generated {kind} is not a readable image: {e}")))?;
        let path = self
            .store
            .write_asset(slug, &kind.file_name(), &jpeg)
            .await?;
        story.set_asset_path(kind, path.clone());
        self.store.save_story(&story).await?;
        info!("Generated {} for '{}' at {}", kind, slug, path);

        Ok(AssetGeneration {
            story,
            outcome: AssetOutcome::Generated(path),
        })
    }

    async fn present_path(&self, story: &Story, kind: AssetKind) -> Option<String> {
        let path = story.asset_path(kind)?;
        if self.store.asset_exists(path).await {
            Some(path.to_string())
        } else {
            None
        }
    }

    /// Protagonist photo for the character sheet; the character sheet for everything else.
    fn reference_path(story: &Story, kind: AssetKind) -> Option<&str> {
        match kind {
            AssetKind::CharacterSheet => story.image_path.as_deref(),
            AssetKind::CoverImage | AssetKind::Illustration(_) => {
                story.character_sheet.image_path.as_deref()
            }
        }
    }

    async fn reference_image(&self, story: &Story, kind: AssetKind) -> PortResult<Option<ImageData>> {
        let Some(path) = Self::reference_path(story, kind) else {
            return Ok(None);
        };
        match self.store.read_asset(path).await? {
            Some(bytes) => {
                let mime = imaging::mime_for_path(path).unwrap_or("image/jpeg");
                Ok(Some(ImageData::new(bytes, mime)))
            }
            None => {
                debug!("Reference image {} is missing; generating without it", path);
                Ok(None)
            }
        }
    }

    fn build_prompt(&self, story: &Story, kind: AssetKind, has_reference: bool) -> Option<String> {
        match kind {
            AssetKind::CharacterSheet => Some(self.prompts.character_sheet_prompt(
                &story.character_sheet.prompt,
                story.style,
                has_reference,
            )),
            AssetKind::CoverImage => Some(self.prompts.cover_image_prompt(&story.title, story.style)),
            AssetKind::Illustration(index) => story.pages.get(index).map(|page| {
                self.prompts
                    .illustration_prompt(&page.illustration_prompt, &page.text)
            }),
        }
    }

    /// The prompt an asset would be generated with, for display.
    /// A reference image counts only when its file is still there.
    pub async fn asset_prompt(&self, story: &Story, kind: AssetKind) -> Option<String> {
        let has_reference = match Self::reference_path(story, kind) {
            Some(path) => self.store.asset_exists(path).await,
            None => false,
        };
        self.build_prompt(story, kind, has_reference)
    }

    // --- Read-only Queries ---

    pub async fn is_asset_present(&self, story: &Story, kind: AssetKind) -> bool {
        self.present_path(story, kind).await.is_some()
    }

    /// Assets that are not present, in order: character sheet, cover, pages.
    pub async fn missing_assets(&self, story: &Story) -> Vec<AssetKind> {
        let mut missing = Vec::new();
        for kind in story.asset_kinds() {
            if !self.is_asset_present(story, kind).await {
                missing.push(kind);
            }
        }
        missing
    }

    /// Plurality orientation of the present page illustrations.
    /// Ties go to the orientation seen first; `Unknown` when there are none.
    pub async fn orientation(&self, story: &Story) -> Orientation {
        let mut counts: Vec<(Orientation, usize)> = Vec::new();
        for page in &story.pages {
            let Some(path) = page.image_path.as_deref() else {
                continue;
            };
            let bytes = match self.store.read_asset(path).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Could not read illustration {}: {}", path, e);
                    continue;
                }
            };
            let orientation = match imaging::dimensions(&bytes) {
                Ok((width, height)) => {
                    imaging::classify_aspect(width, height, DEFAULT_ASPECT_TOLERANCE)
                }
                Err(e) => {
                    warn!("Could not inspect illustration {}: {}", path, e);
                    continue;
                }
            };
            match counts.iter_mut().find(|(o, _)| *o == orientation) {
                Some((_, n)) => *n += 1,
                None => counts.push((orientation, 1)),
            }
        }

        counts
            .into_iter()
            .fold(None, |best: Option<(Orientation, usize)>, (o, n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((o, n)),
            })
            .map(|(o, _)| o)
            .unwrap_or(Orientation::Unknown)
    }

    /// The stored image of an asset, if present.
    pub async fn asset_image(&self, story: &Story, kind: AssetKind) -> PortResult<Option<ImageData>> {
        let Some(path) = self.present_path(story, kind).await else {
            return Ok(None);
        };
        self.read_image(&path).await
    }

    /// Looks up one of the story's recorded images by file name.
    /// Only paths recorded in the story can be served.
    pub async fn image_by_file_name(
        &self,
        story: &Story,
        file_name: &str,
    ) -> PortResult<Option<ImageData>> {
        let recorded = story
            .asset_kinds()
            .into_iter()
            .filter_map(|kind| story.asset_path(kind))
            .chain(story.image_path.as_deref())
            .find(|path| {
                Path::new(path)
                    .file_name()
                    .is_some_and(|name| name == file_name)
            })
            .map(str::to_string);
        match recorded {
            Some(path) => self.read_image(&path).await,
            None => Ok(None),
        }
    }

    async fn read_image(&self, path: &str) -> PortResult<Option<ImageData>> {
        let mime = imaging::mime_for_path(path).unwrap_or("image/jpeg");
        Ok(self
            .store
            .read_asset(path)
            .await?
            .map(|bytes| ImageData::new(bytes, mime)))
    }

    // --- Story Repository ---

    /// Every story visible to `owner`: its own and the unowned ones.
    pub async fn list_stories(&self, owner: Option<&str>) -> PortResult<Vec<Story>> {
        let stories = self.store.load_all().await?;
        Ok(stories
            .into_iter()
            .filter(|story| story.is_visible_to(owner))
            .collect())
    }

    /// Loads one story; hidden stories are reported as not found.
    pub async fn find_story(&self, slug: &str, owner: Option<&str>) -> PortResult<Story> {
        let story = self.store.load_story(slug).await?;
        if story.is_visible_to(owner) {
            Ok(story)
        } else {
            Err(PortError::NotFound(format!("Story {slug} not found")))
        }
    }
}
