pub mod backend;
pub mod crop_provider;
pub mod prompt_store;

pub use backend::{BackendError, OpenAiBackend, RequestPart, VisionBackend};
pub use crop_provider::{CropProvider, DirCropProvider};
pub use prompt_store::{MemoryPromptStore, PromptStore, TomlPromptStore};
