pub mod batch_packer;
pub mod demultiplexer;
pub mod dispatcher;
pub mod fallback;
pub mod prompt_resolver;
pub mod retry;
pub mod warn_writer;

pub use batch_packer::{BatchPacker, ItemPlacement, PackConfig, PackOutput};
pub use demultiplexer::{
    build_protocol, JsonArrayProtocol, MarkerProtocol, ResponseDemultiplexer, ResponseProtocol,
};
pub use dispatcher::RequestDispatcher;
pub use fallback::FallbackExecutor;
pub use prompt_resolver::{PromptResolver, PromptStrategy};
pub use retry::RetryPolicy;
pub use warn_writer::WarnWriter;
