//! 警告写入服务 - 业务能力层
//!
//! 只负责"把识别失败的区域写进 warn.txt"，不关心流程

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

/// 警告写入服务
///
/// 职责：
/// - 将最终落在失败占位上的区域写入 warn.txt
/// - 只处理单个区域的警告
/// - 写入失败只记日志，绝不打断流水线
pub struct WarnWriter {
    warn_file_path: String,
}

impl WarnWriter {
    /// 创建新的警告写入服务
    pub fn new() -> Self {
        Self {
            warn_file_path: "warn.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            warn_file_path: path.into(),
        }
    }

    /// 写入警告信息
    ///
    /// # 参数
    /// - `document_id`: 文档ID
    /// - `region_id`: 区域ID
    /// - `reason`: 失败原因
    pub fn write(&self, document_id: &str, region_id: &str, reason: &str) -> Result<()> {
        debug!(
            "写入警告: 文档 {} | 区域 {} | 原因: {}",
            document_id, region_id, reason
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.warn_file_path)?;

        let warn_msg = format!("文档 {} | 区域 {} | 原因: {}\n", document_id, region_id, reason);

        file.write_all(warn_msg.as_bytes())?;

        Ok(())
    }
}

impl Default for WarnWriter {
    fn default() -> Self {
        Self::new()
    }
}
