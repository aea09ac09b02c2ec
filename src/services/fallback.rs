//! 降级重发服务 - 业务能力层
//!
//! 批次请求失败（重试耗尽的传输失败、永久拒绝、或整批解析失败）时，
//! 把该批次拆成逐条单图请求重发：同一段提示词、不带上下文前言和标记，
//! 每条独立记录成功或失败，一条坏数据不抹掉其余 N-1 条结果

use crate::models::batch::Batch;
use crate::services::dispatcher::RequestDispatcher;
use tracing::{error, info};

/// 降级重发服务
#[derive(Default)]
pub struct FallbackExecutor;

impl FallbackExecutor {
    pub fn new() -> Self {
        Self
    }

    /// 把一个批次逐条重发
    ///
    /// # 返回
    /// 与批次条目一一对应的结果列表：`Ok(文本)` 或 `Err(失败原因)`
    pub async fn run(
        &self,
        label: &str,
        dispatcher: &RequestDispatcher<'_>,
        batch: &Batch,
        prompt: &str,
    ) -> Vec<Result<String, String>> {
        info!("[{}] 🔁 批次降级：逐条重发 {} 个条目", label, batch.len());

        let mut outcomes = Vec::with_capacity(batch.len());
        for (i, item) in batch.items.iter().enumerate() {
            let item_label = format!("{} 降级 {}/{} ({})", label, i + 1, batch.len(), item.label());
            match dispatcher.dispatch_single(&item_label, &item.image, prompt).await {
                Ok(text) => {
                    info!("[{}] ✓ 降级重发成功", item_label);
                    outcomes.push(Ok(text));
                }
                Err(e) => {
                    error!("[{}] ❌ 降级重发失败: {}", item_label, e);
                    outcomes.push(Err(e.detail().to_string()));
                }
            }
        }
        outcomes
    }
}
