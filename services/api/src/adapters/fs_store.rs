//! services/api/src/adapters/fs_store.rs
//!
//! This module contains the filesystem adapter for story persistence.
//! It implements the `StoryStore` port from the `core` crate.
//!
//! Every story lives in its own directory named after its slug:
//! `<root>/<slug>/<slug>.json` next to the story's image files. All writes go
//! to a temporary sibling first and are renamed into place.
//!
//! A record whose title does not map back to its directory is ignored, since
//! it would be listed and saved under a different slug than it is read from.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use storybook_core::{
    domain::Story,
    ports::{PortError, PortResult, StoryStore},
};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `StoryStore` on top of a local directory tree.
#[derive(Clone, Debug)]
pub struct FsStoryStore {
    root: PathBuf,
}

impl FsStoryStore {
    /// Creates a new `FsStoryStore` rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn story_dir(&self, slug: &str) -> PortResult<PathBuf> {
        if slug.is_empty() || slug.contains(['/', '\\']) || slug.starts_with('.') {
            return Err(PortError::InvalidInput(format!("Invalid story slug '{}'", slug)));
        }
        Ok(self.root.join(slug))
    }

    /// Picks the record file of a story directory: `<dirname>.json` when it
    /// exists, otherwise the lexicographically first `*.json`.
    async fn record_path(dir: &Path) -> PortResult<Option<PathBuf>> {
        if let Some(name) = dir.file_name() {
            let preferred = dir.join(format!("{}.json", name.to_string_lossy()));
            if is_file(&preferred).await {
                return Ok(Some(preferred));
            }
        }

        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(dir, e)),
        };
        let mut candidates = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(dir, e))? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") && is_file(&path).await {
                candidates.push(path);
            }
        }
        candidates.sort();
        if candidates.len() > 1 {
            warn!(
                "Directory {} holds {} JSON files; using {}",
                dir.display(),
                candidates.len(),
                candidates[0].display()
            );
        }
        Ok(candidates.into_iter().next())
    }

    async fn read_record(path: &Path) -> PortResult<Story> {
        let raw = fs::read(path).await.map_err(|e| io_error(path, e))?;
        serde_json::from_slice(&raw).map_err(|e| {
            PortError::Unexpected(format!("Malformed story record {}: {}", path.display(), e))
        })
    }

    /// Reads the record of `dir`, which must belong to the story `slug`.
    async fn read_story_dir(dir: &Path, slug: &str) -> PortResult<Option<Story>> {
        let Some(path) = Self::record_path(dir).await? else {
            return Ok(None);
        };
        let story = Self::read_record(&path).await?;
        if story.slug() != slug {
            warn!(
                "Ignoring {}: title '{}' belongs in '{}', not '{}'",
                path.display(),
                story.title,
                story.slug(),
                slug
            );
            return Ok(None);
        }
        Ok(Some(story))
    }
}

//=========================================================================================
// `StoryStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl StoryStore for FsStoryStore {
    async fn save_story(&self, story: &Story) -> PortResult<String> {
        let slug = story.slug();
        let dir = self.story_dir(&slug)?;
        fs::create_dir_all(&dir).await.map_err(|e| io_error(&dir, e))?;

        let path = dir.join(format!("{}.json", slug));
        let json = serde_json::to_vec_pretty(story)
            .map_err(|e| PortError::Unexpected(format!("Failed to serialize story: {}", e)))?;
        write_atomic(&path, &json).await?;

        debug!("Saved story '{}' to {}", story.title, path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    async fn load_story(&self, slug: &str) -> PortResult<Story> {
        let dir = self.story_dir(slug)?;
        Self::read_story_dir(&dir, slug)
            .await?
            .ok_or_else(|| PortError::NotFound(format!("Story {} not found", slug)))
    }

    async fn load_all(&self) -> PortResult<Vec<Story>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Story root {} does not exist yet", self.root.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut dirs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                dirs.push(entry.path());
            }
        }
        dirs.sort();

        let mut stories = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let Some(slug) = dir.file_name().map(|name| name.to_string_lossy().into_owned()) else {
                continue;
            };
            match Self::read_story_dir(&dir, &slug).await {
                Ok(Some(story)) => stories.push(story),
                Ok(None) => continue,
                Err(e) => warn!("Skipping {}: {}", dir.display(), e),
            }
        }
        Ok(stories)
    }

    async fn write_asset(&self, slug: &str, file_name: &str, bytes: &[u8]) -> PortResult<String> {
        if file_name.is_empty() || file_name.contains(['/', '\\']) {
            return Err(PortError::InvalidInput(format!(
                "Invalid asset file name '{}'",
                file_name
            )));
        }
        let dir = self.story_dir(slug)?;
        fs::create_dir_all(&dir).await.map_err(|e| io_error(&dir, e))?;

        let path = dir.join(file_name);
        write_atomic(&path, bytes).await?;
        Ok(path.to_string_lossy().into_owned())
    }

    async fn read_asset(&self, path: &str) -> PortResult<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(Path::new(path), e)),
        }
    }

    async fn asset_exists(&self, path: &str) -> bool {
        is_file(Path::new(path)).await
    }
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Writes `bytes` to a temporary sibling of `path` and renames it into place,
/// so readers never observe a partially written file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> PortResult<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| PortError::InvalidInput(format!("No file name in {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    if let Err(e) = fs::write(&tmp, bytes).await {
        return Err(io_error(&tmp, e));
    }
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_error(path, e));
    }
    Ok(())
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn io_error(path: &Path, e: std::io::Error) -> PortError {
    PortError::Unexpected(format!("I/O error on {}: {}", path.display(), e))
}
