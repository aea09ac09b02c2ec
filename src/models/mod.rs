pub mod batch;
pub mod loaders;
pub mod region;
pub mod result;

pub use batch::{Batch, BatchItem, PromptGroup, ResolvedPrompt};
pub use loaders::{load_all_manifests, load_manifest, DocumentManifest, ManifestRegion};
pub use region::{BoundingBox, Region, RegionId, RegionKind};
pub use result::{RegionResult, ResultMap};
