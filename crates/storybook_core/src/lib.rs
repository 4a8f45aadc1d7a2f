pub mod domain;
pub mod imaging;
pub mod ports;
pub mod prompts;
pub mod retry;
pub mod slug;
pub mod storyteller;

pub use domain::{
    AssetKind, Audience, CharacterSheet, CoverImage, Orientation, Page, PageCount, Story,
    StoryRequest, Style,
};
pub use ports::{
    ImageData, ImageGenerationService, OutputSchema, PortError, PortResult, StoryStore,
    TextGenerationService,
};
pub use prompts::PromptBuilder;
pub use retry::{RetryPolicy, Retrying};
pub use slug::slugify;
pub use storyteller::{AssetBatch, AssetGeneration, AssetOutcome, Storyteller};
