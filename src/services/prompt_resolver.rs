//! 提示词解析服务 - 业务能力层
//!
//! 只负责"这个区域该用哪段提示词"，不关心分组与流程
//!
//! 解析策略按固定优先级依次尝试（责任链）：
//! 1. 分类策略：区域带非空分类标签，且库中 `category_<分类名>` 有非空文本
//! 2. 类型策略：按区域类型查库（`kind_text` / `kind_table` / `kind_image`）
//! 3. 兜底策略：内置的最小通用提示词，保证永远解析得出非空文本
//!
//! 新增策略只需要往链上加一环，调用方不用动

use crate::infrastructure::prompt_store::PromptStore;
use crate::models::batch::ResolvedPrompt;
use crate::models::region::Region;
use phf::phf_map;
use tracing::debug;

/// 兜底中的兜底：类型未知时的最小通用指令
const FALLBACK_PROMPT: &str =
    "请逐字识别图片中的全部文字，保持原有的行与段落顺序，直接输出文本。";

/// 内置兜底提示词，按区域类型给出最小可用指令
static GENERIC_PROMPTS: phf::Map<&'static str, &'static str> = phf_map! {
    "text" => "请逐字识别图片中的全部文字，保持原有的行与段落顺序，直接输出文本。",
    "table" => "请识别图片中的表格，以 Markdown 表格格式输出单元格内容。",
    "image" => "请用一段简洁的文字描述图片内容。",
};

/// 单个解析策略
///
/// 命中则返回非空提示词，未命中返回 None 交给下一环
pub trait PromptStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, region: &Region, store: &dyn PromptStore) -> Option<ResolvedPrompt>;
}

/// 分类策略：`category_<分类名>`
pub struct CategoryStrategy;

impl PromptStrategy for CategoryStrategy {
    fn name(&self) -> &'static str {
        "category"
    }

    fn resolve(&self, region: &Region, store: &dyn PromptStore) -> Option<ResolvedPrompt> {
        let category = region.category_label()?;
        let key = format!("category_{}", category);
        let text = store.load(&key)?;
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(ResolvedPrompt {
            key,
            text: text.to_string(),
        })
    }
}

/// 类型策略：`kind_text` / `kind_table` / `kind_image`
pub struct KindStrategy;

impl PromptStrategy for KindStrategy {
    fn name(&self) -> &'static str {
        "kind"
    }

    fn resolve(&self, region: &Region, store: &dyn PromptStore) -> Option<ResolvedPrompt> {
        let key = region.kind.prompt_key();
        let text = store.load(key)?;
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(ResolvedPrompt {
            key: key.to_string(),
            text: text.to_string(),
        })
    }
}

/// 兜底策略：内置通用提示词，永远命中
pub struct GenericStrategy;

impl PromptStrategy for GenericStrategy {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn resolve(&self, region: &Region, _store: &dyn PromptStore) -> Option<ResolvedPrompt> {
        let generic_key = region.kind.generic_key();
        let text = GENERIC_PROMPTS
            .get(generic_key)
            .copied()
            .unwrap_or(FALLBACK_PROMPT);
        Some(ResolvedPrompt {
            key: format!("generic_{}", generic_key),
            text: text.to_string(),
        })
    }
}

/// 提示词解析服务
///
/// 职责：
/// - 对单个区域解析出 (键, 提示词)
/// - 纯函数：只依赖区域与库的当前状态
/// - 不发网络请求、不重试
pub struct PromptResolver<'a> {
    strategies: Vec<Box<dyn PromptStrategy>>,
    store: &'a dyn PromptStore,
}

impl<'a> PromptResolver<'a> {
    /// 创建默认解析链：分类 → 类型 → 兜底
    pub fn new(store: &'a dyn PromptStore) -> Self {
        Self {
            strategies: vec![
                Box::new(CategoryStrategy),
                Box::new(KindStrategy),
                Box::new(GenericStrategy),
            ],
            store,
        }
    }

    /// 使用自定义策略链创建
    pub fn with_strategies(store: &'a dyn PromptStore, strategies: Vec<Box<dyn PromptStrategy>>) -> Self {
        Self { strategies, store }
    }

    /// 解析区域的提示词，保证返回非空文本
    pub fn resolve(&self, region: &Region) -> ResolvedPrompt {
        for strategy in &self.strategies {
            if let Some(resolved) = strategy.resolve(region, self.store) {
                debug!(
                    "区域 {} 由 {} 策略解析出提示词 (键: {})",
                    region.id,
                    strategy.name(),
                    resolved.key
                );
                return resolved;
            }
        }

        // 自定义策略链可能全部未命中，仍然走内置兜底
        GenericStrategy
            .resolve(region, self.store)
            .expect("内置兜底策略必定命中")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::prompt_store::MemoryPromptStore;
    use crate::models::region::{BoundingBox, RegionKind};

    fn region(kind: RegionKind, category: Option<&str>) -> Region {
        Region {
            id: "r1".to_string(),
            page_index: 0,
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
            kind,
            category: category.map(str::to_string),
        }
    }

    #[test]
    fn test_category_wins_over_kind() {
        let store = MemoryPromptStore::new()
            .with("category_标题", "识别标题文字")
            .with("kind_text", "识别正文");
        let resolver = PromptResolver::new(&store);

        let resolved = resolver.resolve(&region(RegionKind::Text, Some("标题")));
        assert_eq!(resolved.key, "category_标题");
        assert_eq!(resolved.text, "识别标题文字");
    }

    #[test]
    fn test_empty_category_text_falls_through_to_kind() {
        let store = MemoryPromptStore::new()
            .with("category_标题", "   ")
            .with("kind_text", "识别正文");
        let resolver = PromptResolver::new(&store);

        let resolved = resolver.resolve(&region(RegionKind::Text, Some("标题")));
        assert_eq!(resolved.key, "kind_text");
    }

    #[test]
    fn test_offline_store_degrades_to_generic() {
        let store = MemoryPromptStore::new();
        let resolver = PromptResolver::new(&store);

        let resolved = resolver.resolve(&region(RegionKind::Table, Some("统计表")));
        assert_eq!(resolved.key, "generic_table");
        assert!(!resolved.text.is_empty());
    }

    #[test]
    fn test_resolve_never_returns_empty_text() {
        let store = MemoryPromptStore::new();
        let resolver = PromptResolver::new(&store);
        for kind in [RegionKind::Text, RegionKind::Table, RegionKind::Image] {
            assert!(!resolver.resolve(&region(kind, None)).text.is_empty());
        }
    }
}
