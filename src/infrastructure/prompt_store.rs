//! 提示词库 - 基础设施层
//!
//! 只暴露"按键取提示词"的能力；查找是本地内存操作，不发网络请求。
//! 库整体不可用（文件缺失）时返回空库，由上层的解析链兜底降级

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// 提示词库
///
/// 约定的键：
/// - `category_<分类名>`: 按区域分类查找
/// - `kind_text` / `kind_table` / `kind_image`: 按区域类型查找
pub trait PromptStore: Send + Sync {
    /// 按键查找提示词，缺失返回 None
    fn load(&self, key: &str) -> Option<String>;
}

/// 基于 TOML 文件的提示词库
///
/// 文件格式为扁平的 `键 = "提示词"` 表
pub struct TomlPromptStore {
    prompts: HashMap<String, String>,
}

impl TomlPromptStore {
    /// 从 TOML 文件加载提示词库
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("无法读取提示词库: {}", path.display()))?;

        let prompts: HashMap<String, String> = toml::from_str(&content)
            .with_context(|| format!("无法解析提示词库: {}", path.display()))?;

        info!("✓ 提示词库加载完成，共 {} 条", prompts.len());
        Ok(Self { prompts })
    }

    /// 加载提示词库；文件缺失时降级为空库（解析链会走内置兜底）
    pub async fn load_or_empty(path: &Path) -> Self {
        match Self::load_from_file(path).await {
            Ok(store) => store,
            Err(e) => {
                warn!("⚠️ 提示词库不可用，使用内置兜底提示词: {}", e);
                Self::empty()
            }
        }
    }

    pub fn empty() -> Self {
        Self {
            prompts: HashMap::new(),
        }
    }
}

impl PromptStore for TomlPromptStore {
    fn load(&self, key: &str) -> Option<String> {
        self.prompts.get(key).cloned()
    }
}

/// 内存提示词库（测试与程序化调用方使用）
#[derive(Default)]
pub struct MemoryPromptStore {
    prompts: HashMap<String, String>,
}

impl MemoryPromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.prompts.insert(key.into(), text.into());
        self
    }
}

impl PromptStore for MemoryPromptStore {
    fn load(&self, key: &str) -> Option<String> {
        self.prompts.get(key).cloned()
    }
}
