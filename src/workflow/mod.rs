pub mod context_tracker;
pub mod group_flow;
pub mod grouper;
pub mod job_ctx;

pub use context_tracker::ContextTracker;
pub use group_flow::{BatchProgress, GroupFlow, ProgressCallback};
pub use grouper::SequentialGrouper;
pub use job_ctx::JobCtx;
