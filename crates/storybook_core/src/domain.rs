//! crates/storybook_core/src/domain.rs
//!
//! Defines the core data structures of a generated story.
//! The serialized form of `Story` is the on-disk record, so field names and
//! enum string values must stay stable.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::slug::slugify;

/// File name of the stored protagonist reference photo.
pub const PROTAGONIST_FILE_NAME: &str = "protagonist.jpeg";

//=========================================================================================
// Categorical Inputs
//=========================================================================================

/// Approximate length of a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum PageCount {
    #[serde(rename = "8-10 pages")]
    Tenish,
    #[serde(rename = "15-20 pages")]
    Twentyish,
    #[serde(rename = "25-30 pages")]
    Thirtyish,
}

/// Art style used for every generated image of a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Style {
    #[serde(rename = "Cartoon: Bold outlines, simplified shapes, and vibrant flat colors that create a playful, high-energy feel.")]
    Cartoon,
    #[serde(rename = "Realistic: Detailed proportions, nuanced lighting, and textured rendering that aim for a lifelike, authentic depiction.")]
    Realistic,
    #[serde(rename = "Watercolour: Soft translucent washes, organic bleeds, and gentle gradients that evoke a dreamy, storybook atmosphere.")]
    Watercolour,
    #[serde(rename = "Pencil Sketch: Visible graphite strokes, shading, and cross-hatching that give an intimate, hand-drawn, organic feel.")]
    PencilSketch,
    #[serde(rename = "Digital Art: Clean, polished forms with smooth gradients and controlled lighting, providing a modern, versatile aesthetic.")]
    DigitalArt,
    #[serde(rename = "Pixar Style: 3D-inspired expressive characters with cinematic lighting and warm stylization balancing realism and charm.")]
    PixarStyle,
}

/// Target age group of a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Audience {
    #[serde(rename = "Toddlers (Ages 1-4)")]
    Toddlers,
    #[serde(rename = "Preschoolers (Ages 5-7)")]
    Preschoolers,
    #[serde(rename = "Kids (Ages 7-12)")]
    Kids,
    #[serde(rename = "Teens (Ages 12-18)")]
    Teens,
}

impl PageCount {
    pub const ALL: [PageCount; 3] = [Self::Tenish, Self::Twentyish, Self::Thirtyish];

    /// The stored string value, e.g. `"8-10 pages"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenish => "8-10 pages",
            Self::Twentyish => "15-20 pages",
            Self::Thirtyish => "25-30 pages",
        }
    }
}

impl Style {
    pub const ALL: [Style; 6] = [
        Self::Cartoon,
        Self::Realistic,
        Self::Watercolour,
        Self::PencilSketch,
        Self::DigitalArt,
        Self::PixarStyle,
    ];

    /// The stored string value: the style name followed by its description.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cartoon => "Cartoon: Bold outlines, simplified shapes, and vibrant flat colors that create a playful, high-energy feel.",
            Self::Realistic => "Realistic: Detailed proportions, nuanced lighting, and textured rendering that aim for a lifelike, authentic depiction.",
            Self::Watercolour => "Watercolour: Soft translucent washes, organic bleeds, and gentle gradients that evoke a dreamy, storybook atmosphere.",
            Self::PencilSketch => "Pencil Sketch: Visible graphite strokes, shading, and cross-hatching that give an intimate, hand-drawn, organic feel.",
            Self::DigitalArt => "Digital Art: Clean, polished forms with smooth gradients and controlled lighting, providing a modern, versatile aesthetic.",
            Self::PixarStyle => "Pixar Style: 3D-inspired expressive characters with cinematic lighting and warm stylization balancing realism and charm.",
        }
    }
}

impl Audience {
    pub const ALL: [Audience; 4] = [
        Self::Toddlers,
        Self::Preschoolers,
        Self::Kids,
        Self::Teens,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Toddlers => "Toddlers (Ages 1-4)",
            Self::Preschoolers => "Preschoolers (Ages 5-7)",
            Self::Kids => "Kids (Ages 7-12)",
            Self::Teens => "Teens (Ages 12-18)",
        }
    }
}

/// Error returned when a categorical value does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} value: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! categorical_str_impls {
    ($ty:ty, $kind:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

categorical_str_impls!(PageCount, "page count");
categorical_str_impls!(Style, "style");
categorical_str_impls!(Audience, "audience");

//=========================================================================================
// Orientation
//=========================================================================================

/// Dominant shape of a story's page illustrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
    Unknown,
}

impl Orientation {
    /// Reference render size `(width, height)` for this orientation.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Portrait => Some((1080, 1920)),
            Self::Landscape => Some((1920, 1080)),
            Self::Square => Some((1080, 1080)),
            Self::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
            Self::Square => "square",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//=========================================================================================
// Story Record
//=========================================================================================

/// A single page of a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Page {
    #[schemars(description = "Text content for the page. Maximum of 2 to 3 sentences")]
    pub text: String,
    #[schemars(
        description = "Prompt for generating the illustration for the page. This should be detailed. Include details of the scene, characters in the scene, background, mood, colors, lighting, and more. This includes the names of the characters in the scene."
    )]
    pub illustration_prompt: String,
    #[serde(default)]
    pub image_path: Option<String>,
}

/// The character sheet of a story: one image showing every character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CharacterSheet {
    #[serde(default)]
    pub image_path: Option<String>,
    #[schemars(
        description = "Prompt for generating character sheet. This should be detailed. Include details of the protagonist interms of clothing, features, plus more. Include details of other characters in the story. This prompt will be used to generate a character sheet comprising of the full body view of the protagonist and other characters in the story."
    )]
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CoverImage {
    #[serde(default)]
    pub image_path: Option<String>,
    #[schemars(
        description = "Prompt for generating cover image. This should be detailed. Include all the characters in the story as a collage. Include the name of the story. This prompt will be used to generate the cover image for the story."
    )]
    pub prompt: String,
}

/// A complete story record.
///
/// Identity is derived from the title (see [`Story::slug`]); there is no
/// separate id. Image paths are weak references into the store and must be
/// re-checked for presence on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Story {
    #[schemars(description = "Name and details of the protagonist")]
    pub protagonist: String,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[schemars(description = "Desired length of the story")]
    pub page_count: PageCount,
    #[schemars(description = "Art style for illustrations")]
    pub style: Style,
    #[schemars(description = "Short summary of the story")]
    pub premise: String,
    #[schemars(description = "Target age group for the story")]
    pub audience: Audience,
    #[schemars(description = "Title of the story")]
    pub title: String,
    #[schemars(description = "Moral or lesson of the story")]
    pub moral: String,
    #[schemars(description = "Character sheet for the protagonist and other characters")]
    pub character_sheet: CharacterSheet,
    #[schemars(description = "Cover image for the story")]
    pub cover_image: CoverImage,
    #[schemars(
        description = "The page text and illustration prompt. The number of Pages is based on the `page_count` field. This should be detailed. Include details of the scene, characters in the scene, background, mood, colors, lighting, and more. This prompt will be used to generate the illustrations for each page of the story."
    )]
    pub pages: Vec<Page>,
}

impl Story {
    /// The filesystem-safe identifier of this story.
    pub fn slug(&self) -> String {
        slugify(&self.title)
    }

    /// Stories without an owner are shared with everyone.
    pub fn is_visible_to(&self, owner: Option<&str>) -> bool {
        match self.user_id.as_deref() {
            None => true,
            Some(id) => Some(id) == owner,
        }
    }

    /// Every asset of this story in generation order.
    pub fn asset_kinds(&self) -> Vec<AssetKind> {
        let mut kinds = vec![AssetKind::CharacterSheet, AssetKind::CoverImage];
        kinds.extend((0..self.pages.len()).map(AssetKind::Illustration));
        kinds
    }

    /// The recorded path of an asset, if any. `None` also for out-of-range pages.
    pub fn asset_path(&self, kind: AssetKind) -> Option<&str> {
        match kind {
            AssetKind::CharacterSheet => self.character_sheet.image_path.as_deref(),
            AssetKind::CoverImage => self.cover_image.image_path.as_deref(),
            AssetKind::Illustration(index) => {
                self.pages.get(index).and_then(|p| p.image_path.as_deref())
            }
        }
    }

    /// Records the path of a freshly written asset. Returns `false` for an
    /// out-of-range page.
    pub fn set_asset_path(&mut self, kind: AssetKind, path: String) -> bool {
        match kind {
            AssetKind::CharacterSheet => self.character_sheet.image_path = Some(path),
            AssetKind::CoverImage => self.cover_image.image_path = Some(path),
            AssetKind::Illustration(index) => match self.pages.get_mut(index) {
                Some(page) => page.image_path = Some(path),
                None => return false,
            },
        }
        true
    }

    pub fn has_asset(&self, kind: AssetKind) -> bool {
        match kind {
            AssetKind::Illustration(index) => index < self.pages.len(),
            _ => true,
        }
    }
}

//=========================================================================================
// Assets
//=========================================================================================

/// One of the generated images of a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    CharacterSheet,
    CoverImage,
    /// Zero-based page index.
    Illustration(usize),
}

impl AssetKind {
    /// Fixed file name of the asset inside the story directory.
    pub fn file_name(&self) -> String {
        match self {
            Self::CharacterSheet => "character_sheet.jpeg".to_string(),
            Self::CoverImage => "cover_image.jpeg".to_string(),
            Self::Illustration(index) => format!("illustration_{index}.jpeg"),
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CharacterSheet => f.write_str("Character Sheet"),
            Self::CoverImage => f.write_str("Cover Image"),
            Self::Illustration(index) => write!(f, "Page {}", index + 1),
        }
    }
}

impl FromStr for AssetKind {
    type Err = UnknownVariant;

    /// Accepts `"Character Sheet"`, `"Cover Image"`, `"Page N"` and
    /// `"Page N Illustration"` (1-based page numbers).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownVariant {
            kind: "asset",
            value: s.to_string(),
        };
        match s.trim() {
            "Character Sheet" => Ok(Self::CharacterSheet),
            "Cover Image" => Ok(Self::CoverImage),
            other => {
                let number = other
                    .strip_prefix("Page ")
                    .map(|rest| rest.trim_end_matches(" Illustration").trim())
                    .ok_or_else(unknown)?;
                match number.parse::<usize>() {
                    Ok(n) if n >= 1 => Ok(Self::Illustration(n - 1)),
                    _ => Err(unknown()),
                }
            }
        }
    }
}

//=========================================================================================
// User Input
//=========================================================================================

/// The five inputs a user supplies to start a new story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryRequest {
    pub protagonist: String,
    pub premise: String,
    pub audience: Audience,
    pub style: Style,
    pub page_count: PageCount,
}

impl StoryRequest {
    /// A ready-made request used to pre-fill the creation form.
    pub fn example() -> Self {
        Self {
            protagonist: "Luna is a curious, adventurous girl who loves exploring the outdoors and has a magical locket.".to_string(),
            premise: "Luna discovers a magical locket that transports her to a whimsical world where she learns valuable life lesson about friendship and bravery.".to_string(),
            audience: Audience::Preschoolers,
            style: Style::Cartoon,
            page_count: PageCount::Tenish,
        }
    }
}
