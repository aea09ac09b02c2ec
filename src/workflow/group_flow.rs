//! 分组处理流程 - 流程层
//!
//! 核心职责：定义"一个提示词分组"的完整处理流程
//!
//! 流程顺序：
//! 1. 打包：分组裁剪图 → 批次（解码失败的区域直接记失败占位）
//! 2. 逐批派发（重试策略包在请求上），拆分响应归位到条目
//! 3. 批次失败或整批解析失败 → 降级逐条重发
//! 4. 按切片顺序把条目文本拼回区域，写入 ResultMap
//! 5. 用最近一次成功条目推进上下文窗口（失败条目不推进）
//!
//! 治理原则是**部分成功**：单个区域的失败永远不会中止整次运行，
//! 只会换来一条失败占位

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::backend::VisionBackend;
use crate::models::batch::{Batch, PromptGroup};
use crate::models::region::RegionId;
use crate::models::result::{RegionResult, ResultMap};
use crate::services::batch_packer::BatchPacker;
use crate::services::demultiplexer::{build_protocol, ResponseDemultiplexer};
use crate::services::dispatcher::RequestDispatcher;
use crate::services::fallback::FallbackExecutor;
use crate::utils::logging::truncate_text;
use crate::workflow::context_tracker::ContextTracker;
use crate::workflow::job_ctx::JobCtx;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// 批间进度事件（侧信道，不参与控制流）
#[derive(Debug, Clone)]
pub struct BatchProgress {
    pub document_id: String,
    /// 组序号（从 1 开始）
    pub group_index: usize,
    pub group_count: usize,
    /// 组内批次序号（从 1 开始）
    pub batch_index: usize,
    pub batch_count: usize,
    /// 本批条目数
    pub item_count: usize,
}

/// 进度回调
///
/// 在每个批次完成后调用；实现必须立刻返回，不得阻塞流水线
pub type ProgressCallback = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

/// 条目结果：成功文本或失败原因
type ItemOutcome = Result<String, String>;

/// 分组处理流程
///
/// - 编排单个分组的打包、派发、拆分、降级与归位
/// - 不持有跨组状态（上下文窗口由调用方传入）
/// - 只依赖业务能力（services）
pub struct GroupFlow<'a> {
    packer: BatchPacker,
    dispatcher: RequestDispatcher<'a>,
    demux: ResponseDemultiplexer,
    fallback: FallbackExecutor,
    verbose_logging: bool,
}

impl<'a> GroupFlow<'a> {
    /// 创建新的分组处理流程
    pub fn new(config: &Config, backend: &'a dyn VisionBackend) -> Self {
        let protocol = build_protocol(config.response_protocol);
        Self {
            packer: BatchPacker::new(config),
            dispatcher: RequestDispatcher::new(config, backend, protocol.clone()),
            demux: ResponseDemultiplexer::new(protocol, config.unmarked_response_policy),
            fallback: FallbackExecutor::new(),
            verbose_logging: config.verbose_logging,
        }
    }

    /// 处理一个分组，把每个区域的最终结果写进 `results`
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        &self,
        ctx: &JobCtx,
        group: &PromptGroup,
        group_index: usize,
        group_count: usize,
        tracker: &mut ContextTracker,
        results: &mut ResultMap,
        progress: Option<&ProgressCallback>,
        cancel: &watch::Receiver<bool>,
    ) -> AppResult<()> {
        info!(
            "[文档 {}] 📦 处理组 {}/{} (键: {}, 区域数: {})",
            ctx.job_index,
            group_index,
            group_count,
            group.key,
            group.len()
        );

        // ========== 打包 ==========
        let packed = self.packer.pack(&group.items);

        for (region_id, reason) in &packed.undecodable {
            results.insert(
                region_id.clone(),
                RegionResult::failed(format!("图像解码失败: {}", reason)),
            );
        }

        if packed.batches.is_empty() {
            warn!("[文档 {}] 组 {} 没有可派发的批次", ctx.job_index, group_index);
            return Ok(());
        }

        // 切片结果表：区域 id → 按切片序排列的条目结果
        let mut slice_results: HashMap<RegionId, Vec<Option<ItemOutcome>>> = HashMap::new();
        for batch in &packed.batches {
            for item in &batch.items {
                slice_results
                    .entry(item.region_id.clone())
                    .or_insert_with(|| vec![None; item.slice_count]);
            }
        }

        // ========== 逐批派发（文档顺序，严格串行） ==========
        let batch_count = packed.batches.len();
        let mut last_success: Option<String> = None;

        for (bi, batch) in packed.batches.iter().enumerate() {
            // 取消是任务粒度的：后续批次不再派发，本任务结果整体作废
            if *cancel.borrow() {
                warn!("[文档 {}] ⚠️ 任务已取消，停止派发后续批次", ctx.job_index);
                return Err(AppError::cancelled(&ctx.document_id));
            }

            let label = format!(
                "文档 {} 组 {}/{} 批次 {}/{}",
                ctx.job_index, group_index, group_count, bi + 1, batch_count
            );

            let outcomes = self
                .process_batch(&label, batch, &group.prompt, tracker.window())
                .await;

            for (item, outcome) in batch.items.iter().zip(outcomes) {
                if let Ok(text) = &outcome {
                    if !text.trim().is_empty() {
                        last_success = Some(text.clone());
                    }
                }
                if let Some(slots) = slice_results.get_mut(&item.region_id) {
                    slots[item.slice_index] = Some(outcome);
                }
            }

            // 批间进度回调
            if let Some(callback) = progress {
                callback(&BatchProgress {
                    document_id: ctx.document_id.clone(),
                    group_index,
                    group_count,
                    batch_index: bi + 1,
                    batch_count,
                    item_count: batch.len(),
                });
            }
        }

        // ========== 区域归位（按组内文档顺序） ==========
        for (region, _) in &group.items {
            if results.contains(&region.id) {
                continue; // 解码失败的区域已经记过占位
            }
            let result = assemble_region(slice_results.get(&region.id));
            match &result {
                RegionResult::Recognized { text } => {
                    if self.verbose_logging {
                        info!(
                            "[文档 {}] ✓ 区域 {} 识别成功: {}",
                            ctx.job_index,
                            region.id,
                            truncate_text(text, 40)
                        );
                    }
                }
                RegionResult::Failed { reason } => {
                    warn!(
                        "[文档 {}] ⚠️ 区域 {} 识别失败: {}",
                        ctx.job_index, region.id, reason
                    );
                }
            }
            results.insert(region.id.clone(), result);
        }

        // ========== 推进上下文窗口 ==========
        if let Some(text) = last_success {
            tracker.update(&text);
        }

        Ok(())
    }

    /// 派发一个批次并把响应拆回条目
    ///
    /// 任何整批性的失败（请求失败、整批解析失败）都转入降级重发
    async fn process_batch(
        &self,
        label: &str,
        batch: &Batch,
        prompt: &str,
        context: &str,
    ) -> Vec<ItemOutcome> {
        let item_count = batch.len();

        match self
            .dispatcher
            .dispatch_batch(label, batch, prompt, context)
            .await
        {
            Ok(response) => {
                // 单条目批次：原始响应即结果，不走协议解析
                if item_count == 1 {
                    return vec![Ok(response)];
                }

                match self.demux.demux(&response, item_count) {
                    Ok(parts) => parts
                        .into_iter()
                        .map(|part| part.ok_or_else(|| "响应中缺少该条目的标记".to_string()))
                        .collect(),
                    Err(e) => {
                        warn!("[{}] ⚠️ 批次响应整体解析失败: {}", label, e);
                        self.fallback.run(label, &self.dispatcher, batch, prompt).await
                    }
                }
            }
            Err(e) => {
                warn!("[{}] ⚠️ 批次请求失败: {}", label, e);
                self.fallback.run(label, &self.dispatcher, batch, prompt).await
            }
        }
    }
}

/// 把一个区域的切片结果按序拼回最终结果
///
/// 至少一个切片成功 → 成功（拼接成功部分）；全部失败 → 失败占位
fn assemble_region(slots: Option<&Vec<Option<ItemOutcome>>>) -> RegionResult {
    let Some(slots) = slots else {
        return RegionResult::failed("未产生识别结果");
    };

    let mut texts: Vec<&str> = Vec::new();
    let mut first_failure: Option<&str> = None;
    let mut incomplete = false;

    for slot in slots {
        match slot {
            Some(Ok(text)) => texts.push(text.as_str()),
            Some(Err(reason)) => {
                incomplete = true;
                if first_failure.is_none() {
                    first_failure = Some(reason.as_str());
                }
            }
            None => incomplete = true,
        }
    }

    if texts.is_empty() {
        return RegionResult::failed(first_failure.unwrap_or("未产生识别结果"));
    }
    if incomplete {
        warn!("区域部分切片失败，结果不完整");
    }
    RegionResult::recognized(texts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(outcome: ItemOutcome) -> Option<ItemOutcome> {
        Some(outcome)
    }

    #[test]
    fn test_assemble_joins_slices_in_order() {
        let slots = vec![
            slot(Ok("上半部分".to_string())),
            slot(Ok("下半部分".to_string())),
        ];
        let result = assemble_region(Some(&slots));
        assert_eq!(
            result,
            RegionResult::recognized("上半部分\n下半部分".to_string())
        );
    }

    #[test]
    fn test_assemble_partial_success_keeps_good_slices() {
        let slots = vec![
            slot(Ok("第一片".to_string())),
            slot(Err("超时".to_string())),
            slot(Ok("第三片".to_string())),
        ];
        let result = assemble_region(Some(&slots));
        assert_eq!(result, RegionResult::recognized("第一片\n第三片".to_string()));
    }

    #[test]
    fn test_assemble_all_failed_yields_placeholder() {
        let slots = vec![
            slot(Err("超时".to_string())),
            slot(Err("被拒绝".to_string())),
        ];
        let result = assemble_region(Some(&slots));
        assert_eq!(result, RegionResult::failed("超时"));
    }

    #[test]
    fn test_assemble_missing_region_yields_placeholder() {
        assert_eq!(
            assemble_region(None),
            RegionResult::failed("未产生识别结果")
        );
    }
}
