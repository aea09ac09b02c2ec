//! # Region Batch OCR
//!
//! 一个把 PDF 标注区域批量送往远程视觉识别后端的编排引擎
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 对外部协作者的最小封装，只暴露能力
//! - `VisionBackend` - 视觉识别后端（async-openai 实现 `OpenAiBackend`）
//! - `PromptStore` - 提示词库（TOML 文件 / 内存实现）
//! - `CropProvider` - 裁剪图提供者（页面未渲染的区域直接跳过）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个分组/批次/请求
//! - `PromptResolver` - 提示词解析（分类 → 类型 → 内置兜底的责任链）
//! - `BatchPacker` - 裁剪图缩放、超高切片、贪心装箱
//! - `RequestDispatcher` - 批次 → 一次多图请求（token 预算随条目数扩大）
//! - `ResponseDemultiplexer` - 响应拆分（可插拔协议：标记 / JSON 数组）
//! - `FallbackExecutor` - 批次失败后的逐条降级重发
//! - `RetryPolicy` - 瞬时失败重试，永久失败立即上抛
//! - `WarnWriter` - 失败区域登记
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个分组"的完整处理流程
//! - `SequentialGrouper` - 连续段分组（run-length，不跨段归并）
//! - `GroupFlow` - 流程编排（打包 → 派发 → 拆分 → 归位 → 推进上下文）
//! - `ContextTracker` - 有界滚动上下文窗口
//! - `JobCtx` - 任务上下文封装
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/job_processor` - 单个文档任务处理器，暴露 `run_batch_ocr`
//! - `orchestrator/batch_processor` - 批量文档处理器，管理资源和并发
//!
//! ## 治理原则
//!
//! **部分成功**：单个区域的失败永远不会中止整次运行；正常结束时
//! 每个输入区域 id 在 ResultMap 里恰好有一条结果（成功或失败占位）。

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{BatchImageLayout, Config, ProtocolKind, UnmarkedResponsePolicy};
pub use error::{AppError, AppResult};
pub use infrastructure::{
    BackendError, CropProvider, MemoryPromptStore, OpenAiBackend, PromptStore, RequestPart,
    TomlPromptStore, VisionBackend,
};
pub use models::{Region, RegionId, RegionKind, RegionResult, ResultMap};
pub use orchestrator::{process_document, run_batch_ocr, App};
pub use workflow::{BatchProgress, ContextTracker, JobCtx, ProgressCallback};
