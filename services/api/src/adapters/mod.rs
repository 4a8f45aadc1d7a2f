pub mod fs_store;
pub mod image_llm;
pub mod text_llm;

pub use fs_store::FsStoryStore;
pub use image_llm::GeminiImageAdapter;
pub use text_llm::OpenAiTextAdapter;
