//! 单个文档任务处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责单个文档的完整识别流水线，是文档级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **核心入口**：`run_batch_ocr`，有序 (区域, 裁剪图) → ResultMap
//! 2. **顺序保证**：组与批次严格按文档顺序串行处理，
//!    上下文窗口必须在下一组请求组装前推进完毕
//! 3. **完整性保证**：运行正常结束后每个输入区域 id 恰有一条结果
//! 4. **清单模式**：`process_document` 从清单取裁剪图、跑流水线、
//!    落盘结果并登记失败区域

use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::backend::VisionBackend;
use crate::infrastructure::crop_provider::{CropProvider, DirCropProvider};
use crate::infrastructure::prompt_store::PromptStore;
use crate::models::loaders::DocumentManifest;
use crate::models::region::{Region, RegionId};
use crate::models::result::{RegionResult, ResultMap};
use crate::services::prompt_resolver::PromptResolver;
use crate::services::warn_writer::WarnWriter;
use crate::utils::logging::truncate_text;
use crate::workflow::context_tracker::ContextTracker;
use crate::workflow::group_flow::{GroupFlow, ProgressCallback};
use crate::workflow::grouper::SequentialGrouper;
use crate::workflow::job_ctx::JobCtx;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// 批量 OCR 核心入口
///
/// 把一个文档里有序的 (区域, 裁剪图) 序列变成 ResultMap：
/// 解析提示词 → 连续段分组 → 打包 → 派发（重试 + 降级）→ 拆分归位，
/// 组间由上下文窗口衔接。
///
/// # 参数
/// - `ctx`: 任务标识（文档 id + 任务序号）
/// - `entries`: 文档顺序排列的 (区域, 裁剪图字节)
/// - `store`: 提示词库
/// - `backend`: 视觉识别后端（由调用方构造注入，生命周期随本次任务）
/// - `progress`: 批间进度回调（侧信道，不得阻塞）
/// - `cancel`: 任务取消信号；取消后丢弃结果并返回 `Cancelled`
///
/// # 返回
/// 运行正常结束时，每个输入区域 id 恰好对应一条结果：
/// 成功文本或失败占位，绝不缺席
pub async fn run_batch_ocr(
    ctx: &JobCtx,
    entries: Vec<(Region, Vec<u8>)>,
    store: &dyn PromptStore,
    backend: &dyn VisionBackend,
    progress: Option<ProgressCallback>,
    cancel: watch::Receiver<bool>,
    config: &Config,
) -> AppResult<ResultMap> {
    // 配置错误是致命的，在任何派发前中止
    config.validate()?;

    let mut results = ResultMap::new();
    if entries.is_empty() {
        return Ok(results);
    }

    let input_ids: Vec<RegionId> = entries.iter().map(|(r, _)| r.id.clone()).collect();

    // 解析提示词并做连续段分组
    let resolver = PromptResolver::new(store);
    let groups = SequentialGrouper::group(&resolver, entries);

    info!(
        "[文档 {}] 共 {} 个区域，分成 {} 个组",
        ctx.job_index,
        input_ids.len(),
        groups.len()
    );

    // 组间串行：上下文窗口按文档顺序推进
    let flow = GroupFlow::new(config, backend);
    let mut tracker = ContextTracker::new(config); // 首组空窗口
    let group_count = groups.len();

    for (gi, group) in groups.iter().enumerate() {
        flow.run(
            ctx,
            group,
            gi + 1,
            group_count,
            &mut tracker,
            &mut results,
            progress.as_ref(),
            &cancel,
        )
        .await?;
    }

    // 完整性兜底：每个输入区域 id 都必须有一条结果
    for id in input_ids {
        if !results.contains(&id) {
            results.insert(id, RegionResult::failed("未产生识别结果"));
        }
    }

    Ok(results)
}

/// 文档处理统计
#[derive(Debug, Default)]
pub struct DocumentStats {
    /// 进入流水线的区域数
    pub processed: usize,
    /// 识别成功数
    pub recognized: usize,
    /// 失败占位数
    pub failed: usize,
    /// 没有裁剪图而跳过的区域数
    pub skipped: usize,
}

/// 处理单个文档清单
///
/// # 参数
/// - `backend`: 视觉识别后端
/// - `store`: 提示词库
/// - `config`: 配置
/// - `manifest`: 文档清单
/// - `job_index`: 任务索引（用于日志）
/// - `cancel`: 任务取消信号
///
/// # 返回
/// 返回该文档的处理统计
pub async fn process_document(
    backend: &dyn VisionBackend,
    store: &dyn PromptStore,
    config: &Config,
    manifest: &DocumentManifest,
    job_index: usize,
    cancel: watch::Receiver<bool>,
) -> Result<DocumentStats> {
    let ctx = JobCtx::new(&manifest.document_id, job_index);

    log_document_start(job_index, manifest.display_name(), manifest.regions.len());

    // ========== 取裁剪图（页面未渲染的区域直接跳过） ==========
    let provider = DirCropProvider::from_manifest(manifest);
    let mut entries: Vec<(Region, Vec<u8>)> = Vec::new();
    let mut skipped = 0;

    for manifest_region in &manifest.regions {
        match provider.crop(&manifest_region.region).await {
            Ok(Some(bytes)) => entries.push((manifest_region.region.clone(), bytes)),
            Ok(None) => {
                info!(
                    "[文档 {}] 区域 {} 无裁剪图，跳过",
                    job_index, manifest_region.region.id
                );
                skipped += 1;
            }
            Err(e) => {
                warn!(
                    "[文档 {}] 区域 {} 裁剪图读取失败，跳过: {}",
                    job_index, manifest_region.region.id, e
                );
                skipped += 1;
            }
        }
    }

    // 批间进度日志（侧信道）
    let progress_job_index = job_index;
    let progress: ProgressCallback = Arc::new(move |p| {
        info!(
            "[文档 {}] 进度: 组 {}/{} 批次 {}/{} ({} 个条目)",
            progress_job_index, p.group_index, p.group_count, p.batch_index, p.batch_count, p.item_count
        );
    });

    // ========== 跑流水线 ==========
    let processed = entries.len();
    let results = run_batch_ocr(&ctx, entries, store, backend, Some(progress), cancel, config)
        .await
        .with_context(|| format!("文档 {} 流水线执行失败", manifest.document_id))?;

    // ========== 落盘结果 ==========
    write_results(config, &manifest.document_id, &results).await?;

    // ========== 登记失败区域 ==========
    let warn_writer = WarnWriter::with_path(&config.warn_file);
    for (region_id, result) in results.iter() {
        if let RegionResult::Failed { reason } = result {
            if let Err(e) = warn_writer.write(&manifest.document_id, region_id, reason) {
                warn!("[文档 {}] 写入 warn 文件失败: {}", job_index, e);
            }
        }
    }

    let stats = DocumentStats {
        processed,
        recognized: results.recognized_count(),
        failed: results.failed_count(),
        skipped,
    };

    log_document_complete(job_index, &stats);

    if config.verbose_logging {
        for (region_id, result) in results.iter() {
            info!(
                "[文档 {}]   {} → {}",
                job_index,
                region_id,
                truncate_text(&result.output_text(), 60)
            );
        }
    }

    Ok(stats)
}

/// 把 ResultMap 写成 JSON 文件
async fn write_results(config: &Config, document_id: &str, results: &ResultMap) -> Result<()> {
    tokio::fs::create_dir_all(&config.result_folder)
        .await
        .with_context(|| format!("无法创建结果目录: {}", config.result_folder))?;

    let path = Path::new(&config.result_folder).join(format!("{}.json", document_id));
    let json = serde_json::to_string_pretty(results).context("结果序列化失败")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("无法写入结果文件: {}", path.display()))?;

    info!("💾 结果已保存至: {}", path.display());
    Ok(())
}

// ========== 日志辅助函数 ==========

fn log_document_start(job_index: usize, name: &str, region_count: usize) {
    info!("\n{}", "─".repeat(60));
    info!("[文档 {}] 📄 开始处理: {} ({} 个区域)", job_index, name, region_count);
    info!("{}", "─".repeat(60));
}

fn log_document_complete(job_index: usize, stats: &DocumentStats) {
    info!(
        "[文档 {}] ✓ 处理完成: 成功 {}/{}, 失败 {}, 跳过 {}",
        job_index,
        stats.recognized,
        stats.processed,
        stats.failed,
        stats.skipped
    );
}
