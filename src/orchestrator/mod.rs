//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和任务调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量文档处理器
//! - 管理应用生命周期（初始化、运行、清理）
//! - 批量加载文档清单（Vec<DocumentManifest>）
//! - 控制并发数量（Semaphore，默认 2 个并发任务）
//! - 显式构造并持有后端客户端与提示词库
//! - 输出全局统计信息
//!
//! ### `job_processor` - 单个文档任务处理器
//! - 暴露核心入口 `run_batch_ocr`
//! - 取裁剪图、解析提示词、分组、逐组跑流程
//! - 保证组/批次按文档顺序串行（上下文窗口依赖这一点）
//! - 落盘结果、登记失败区域
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<DocumentManifest>)
//!     ↓
//! job_processor (处理单个文档的 Vec<(Region, Crop)>)
//!     ↓
//! workflow::GroupFlow (处理单个 PromptGroup)
//!     ↓
//! services (能力层：resolver / packer / dispatcher / demux / fallback / retry)
//!     ↓
//! infrastructure (基础设施：VisionBackend / PromptStore / CropProvider)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，job_processor 管单个文档
//! 2. **部分成功**：单个区域的失败不中止整次运行
//! 3. **任务隔离**：上下文窗口与取消通道都是任务私有的

pub mod batch_processor;
pub mod job_processor;

pub use batch_processor::App;
pub use job_processor::{process_document, run_batch_ocr, DocumentStats};
