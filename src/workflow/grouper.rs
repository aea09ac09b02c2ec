//! 顺序分组 - 流程层
//!
//! 对有序的 (区域, 裁剪图) 序列做**连续段分组**（run-length grouping）：
//! 逐个解析提示词键，与当前组同键则追加，否则封组另起。
//!
//! 注意这不是按键全量归并：两段同提示词的区域中间隔着别的提示词时，
//! 会落进两个不同的组。这样保住了文档里的视觉/语义局部性，
//! 也限制了上下文窗口偏离邻近内容的距离

use crate::models::batch::PromptGroup;
use crate::models::region::Region;
use crate::services::prompt_resolver::PromptResolver;
use tracing::debug;

/// 顺序分组器
pub struct SequentialGrouper;

impl SequentialGrouper {
    /// 消费一次输入序列，产出按文档顺序排列的提示词分组
    pub fn group(
        resolver: &PromptResolver<'_>,
        entries: Vec<(Region, Vec<u8>)>,
    ) -> Vec<PromptGroup> {
        let mut groups: Vec<PromptGroup> = Vec::new();

        for (region, bytes) in entries {
            let resolved = resolver.resolve(&region);
            match groups.last_mut() {
                Some(current) if current.key == resolved.key => {
                    current.items.push((region, bytes));
                }
                _ => {
                    groups.push(PromptGroup {
                        key: resolved.key,
                        prompt: resolved.text,
                        items: vec![(region, bytes)],
                    });
                }
            }
        }

        debug!(
            "分组完成: {} 个组, 大小 {:?}",
            groups.len(),
            groups.iter().map(PromptGroup::len).collect::<Vec<_>>()
        );
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::prompt_store::MemoryPromptStore;
    use crate::models::region::{BoundingBox, RegionKind};

    fn region(id: &str, category: &str) -> (Region, Vec<u8>) {
        (
            Region {
                id: id.to_string(),
                page_index: 0,
                bbox: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                },
                kind: RegionKind::Text,
                category: Some(category.to_string()),
            },
            Vec::new(),
        )
    }

    #[test]
    fn test_run_length_grouping_does_not_merge_distant_runs() {
        let store = MemoryPromptStore::new()
            .with("category_t", "提示T")
            .with("category_i", "提示I")
            .with("category_a", "提示A");
        let resolver = PromptResolver::new(&store);

        // 提示词序列 [T,T,I,T,A,A] → 分组 [[T,T],[I],[T],[A,A]]
        let entries = vec![
            region("r1", "t"),
            region("r2", "t"),
            region("r3", "i"),
            region("r4", "t"),
            region("r5", "a"),
            region("r6", "a"),
        ];
        let groups = SequentialGrouper::group(&resolver, entries);

        let sizes: Vec<usize> = groups.iter().map(PromptGroup::len).collect();
        assert_eq!(sizes, vec![2, 1, 1, 2]);
        assert_eq!(groups[0].key, "category_t");
        assert_eq!(groups[1].key, "category_i");
        assert_eq!(groups[2].key, "category_t");
        assert_eq!(groups[3].key, "category_a");
        assert_eq!(groups[2].items[0].0.id, "r4");
    }

    #[test]
    fn test_group_order_follows_document_order() {
        let store = MemoryPromptStore::new();
        let resolver = PromptResolver::new(&store);

        let entries = vec![region("r1", "x"), region("r2", "x"), region("r3", "x")];
        let groups = SequentialGrouper::group(&resolver, entries);

        // 库不可用时全部落到同一个兜底提示词 → 单组
        assert_eq!(groups.len(), 1);
        let ids: Vec<&str> = groups[0].items.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn test_empty_input_yields_no_groups() {
        let store = MemoryPromptStore::new();
        let resolver = PromptResolver::new(&store);
        assert!(SequentialGrouper::group(&resolver, Vec::new()).is_empty());
    }
}
