//! crates/storybook_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, keeping the
//! core independent of the generative-model vendors and of the storage medium.

use async_trait::async_trait;

use crate::domain::Story;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// Generative calls distinguish `Transient` failures (worth retrying) from
/// `Fatal` ones. An empty generation result is not an error at the port level;
/// ports return `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("The model returned no usable result: {0}")]
    EmptyResult(String),
    #[error("Transient service failure: {0}")]
    Transient(String),
    #[error("Service failure: {0}")]
    Fatal(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Port Payloads
//=========================================================================================

/// An encoded image together with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageData {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

/// The schema a structured text response must conform to.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    /// Generates a JSON record constrained to `schema`.
    /// Returns `Ok(None)` when the model produced no parseable record.
    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &OutputSchema,
    ) -> PortResult<Option<serde_json::Value>>;
}

#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    /// Generates an image, optionally guided by a reference image.
    /// Returns `Ok(None)` when the response contained no image part.
    async fn generate_image(
        &self,
        prompt: &str,
        reference_image: Option<&ImageData>,
    ) -> PortResult<Option<ImageData>>;
}

/// Persistence of story records and their sibling image files.
///
/// Asset paths handed out by `write_asset` are the strings stored in the
/// `Story` record and accepted back by `read_asset` / `asset_exists`.
#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Writes the whole record, replacing any previous version. Returns its location.
    async fn save_story(&self, story: &Story) -> PortResult<String>;

    async fn load_story(&self, slug: &str) -> PortResult<Story>;

    /// Loads every readable story. Unreadable records are skipped, not reported.
    async fn load_all(&self) -> PortResult<Vec<Story>>;

    async fn write_asset(&self, slug: &str, file_name: &str, bytes: &[u8]) -> PortResult<String>;

    /// Reads an asset; `Ok(None)` when it does not exist.
    async fn read_asset(&self, path: &str) -> PortResult<Option<Vec<u8>>>;

    async fn asset_exists(&self, path: &str) -> bool;
}
