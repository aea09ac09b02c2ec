//! 批量文档处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量文档的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：启动日志、构造后端客户端、加载提示词库
//! 2. **批量加载**：扫描并加载所有待处理的文档清单（`Vec<DocumentManifest>`）
//! 3. **并发控制**：使用 Semaphore 限制同时活跃的任务数（默认 2），
//!    封顶对后端的在途请求量
//! 4. **任务隔离**：每个文档任务持有独立的上下文窗口与取消通道，
//!    任务之间没有共享可变状态
//! 5. **全局统计**：汇总所有文档的处理结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个文档的细节
//! - **资源所有者**：后端客户端与提示词库在这里显式构造、向下注入
//! - **向下委托**：委托 job_processor 处理单个文档

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::backend::OpenAiBackend;
use crate::infrastructure::prompt_store::{PromptStore, TomlPromptStore};
use crate::models::loaders::{load_all_manifests, DocumentManifest};
use crate::orchestrator::job_processor;
use anyhow::Result;
use futures::future::join_all;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    backend: Arc<OpenAiBackend>,
    store: Arc<TomlPromptStore>,
}

impl App {
    /// 初始化应用
    ///
    /// 配置校验与后端构造都在这里完成：配置错误在发起任何请求前中止
    pub async fn initialize(config: Config) -> AppResult<Self> {
        // 初始化日志文件
        if let Err(e) = init_log_file(&config.output_log_file) {
            warn!("⚠️ 日志文件初始化失败: {}", e);
        }

        log_startup(&config);

        config.validate()?;

        // 加载提示词库；不可用时降级为空库
        let store =
            Arc::new(TomlPromptStore::load_or_empty(Path::new(&config.prompt_store_file)).await);

        // 显式构造后端客户端（连接池随客户端实例走，不用进程级单例）
        let mut backend = OpenAiBackend::new(&config)?;
        if let Some(system_prompt) = store.load("system") {
            backend = backend.with_system_prompt(system_prompt);
        }
        let backend = Arc::new(backend);

        Ok(Self {
            config,
            backend,
            store,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        // 加载所有待处理的文档清单
        let manifests = load_all_manifests(&self.config.manifest_folder).await?;

        if manifests.is_empty() {
            warn!("⚠️ 没有找到待处理的清单文件，程序结束");
            return Ok(());
        }

        log_manifests_loaded(manifests.len(), self.config.max_concurrent_jobs);

        // 处理所有文档
        let stats = self.process_all_documents(manifests).await?;

        // 输出最终统计
        print_final_stats(&stats, &self.config);

        Ok(())
    }

    /// 处理所有文档
    ///
    /// Semaphore 限并发；组/批次在单个任务内部仍严格串行
    async fn process_all_documents(
        &self,
        manifests: Vec<DocumentManifest>,
    ) -> Result<ProcessingStats> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs));
        let total = manifests.len();
        let mut handles = Vec::new();

        for (idx, manifest) in manifests.into_iter().enumerate() {
            let job_index = idx + 1;
            let permit = semaphore.clone().acquire_owned().await?;

            let backend = self.backend.clone();
            let store = self.store.clone();
            let config = self.config.clone();

            // 任务粒度的取消通道；CLI 模式不主动取消，仅保证接口语义完整
            let (_cancel_tx, cancel_rx) = watch::channel(false);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                job_processor::process_document(
                    backend.as_ref(),
                    store.as_ref(),
                    &config,
                    &manifest,
                    job_index,
                    cancel_rx,
                )
                .await
            });
            handles.push((job_index, handle));
        }

        // 等待所有任务完成
        let mut stats = ProcessingStats {
            total,
            ..Default::default()
        };

        let joined = join_all(
            handles
                .into_iter()
                .map(|(job_index, handle)| async move { (job_index, handle.await) }),
        )
        .await;

        for (job_index, outcome) in joined {
            match outcome {
                Ok(Ok(doc_stats)) => {
                    stats.documents_ok += 1;
                    stats.regions_recognized += doc_stats.recognized;
                    stats.regions_failed += doc_stats.failed;
                    stats.regions_skipped += doc_stats.skipped;
                }
                Ok(Err(e)) => {
                    error!("[文档 {}] ❌ 处理过程中发生错误: {}", job_index, e);
                    stats.documents_failed += 1;
                }
                Err(e) => {
                    error!("[文档 {}] 任务执行失败: {}", job_index, e);
                    stats.documents_failed += 1;
                }
            }
        }

        Ok(stats)
    }
}

/// 处理统计
#[derive(Debug, Default)]
struct ProcessingStats {
    total: usize,
    documents_ok: usize,
    documents_failed: usize,
    regions_recognized: usize,
    regions_failed: usize,
    regions_skipped: usize,
}

// ========== 日志辅助函数 ==========

fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n批量识别日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量区域识别模式");
    info!("📊 最大并发任务数: {}", config.max_concurrent_jobs);
    info!("🤖 识别模型: {}", config.llm_model_name);
    info!("{}", "=".repeat(60));
}

fn log_manifests_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 个待处理的文档清单", total);
    info!("📋 同时最多处理 {} 个文档", max_concurrent);
    info!("💡 单个文档内的批次严格按文档顺序串行\n");
}

fn print_final_stats(stats: &ProcessingStats, config: &Config) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 文档: {}/{}", stats.documents_ok, stats.total);
    info!("❌ 文档失败: {}", stats.documents_failed);
    info!(
        "🔍 区域: 成功 {} / 失败 {} / 跳过 {}",
        stats.regions_recognized, stats.regions_failed, stats.regions_skipped
    );
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", config.output_log_file);
}
