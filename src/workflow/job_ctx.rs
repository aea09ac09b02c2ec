//! 任务上下文
//!
//! 封装"我正在处理哪个文档"这一信息

use std::fmt::Display;

/// 任务上下文
///
/// 包含处理单个文档任务所需的标识信息
#[derive(Debug, Clone)]
pub struct JobCtx {
    /// 文档ID
    pub document_id: String,

    /// 任务索引（仅用于日志显示）
    pub job_index: usize,
}

impl JobCtx {
    /// 创建新的任务上下文
    pub fn new(document_id: impl Into<String>, job_index: usize) -> Self {
        Self {
            document_id: document_id.into(),
            job_index,
        }
    }
}

impl Display for JobCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[文档 ID#{} 任务#{}]", self.document_id, self.job_index)
    }
}
