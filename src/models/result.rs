//! 识别结果模型
//!
//! ResultMap 是流水线唯一交还给调用方的实体：
//! 运行正常结束后，每个输入区域 id 恰好对应一条结果，成功或失败占位，绝不缺席

use crate::models::region::RegionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单个区域的最终结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegionResult {
    /// 识别成功
    Recognized { text: String },
    /// 识别失败（占位，带失败原因）
    Failed { reason: String },
}

impl RegionResult {
    pub fn recognized(text: impl Into<String>) -> Self {
        RegionResult::Recognized { text: text.into() }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        RegionResult::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, RegionResult::Recognized { .. })
    }

    /// 下游可直接拼接的文本；失败时给出占位文本
    pub fn output_text(&self) -> String {
        match self {
            RegionResult::Recognized { text } => text.clone(),
            RegionResult::Failed { reason } => format!("[识别失败] {}", reason),
        }
    }
}

/// 区域 id → 最终结果
#[derive(Debug, Default, Clone, Serialize)]
pub struct ResultMap {
    entries: BTreeMap<RegionId, RegionResult>,
}

impl ResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, region_id: impl Into<RegionId>, result: RegionResult) {
        self.entries.insert(region_id.into(), result);
    }

    pub fn get(&self, region_id: &str) -> Option<&RegionResult> {
        self.entries.get(region_id)
    }

    pub fn contains(&self, region_id: &str) -> bool {
        self.entries.contains_key(region_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegionId, &RegionResult)> {
        self.entries.iter()
    }

    pub fn recognized_count(&self) -> usize {
        self.entries.values().filter(|r| r.is_recognized()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.len() - self.recognized_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_text_for_failure_is_placeholder() {
        let result = RegionResult::failed("网络错误");
        assert_eq!(result.output_text(), "[识别失败] 网络错误");
        assert!(!result.is_recognized());
    }

    #[test]
    fn test_counts() {
        let mut map = ResultMap::new();
        map.insert("a", RegionResult::recognized("文本"));
        map.insert("b", RegionResult::failed("超时"));
        assert_eq!(map.len(), 2);
        assert_eq!(map.recognized_count(), 1);
        assert_eq!(map.failed_count(), 1);
        assert!(map.contains("a"));
    }

    #[test]
    fn test_insert_overwrites_same_id() {
        let mut map = ResultMap::new();
        map.insert("a", RegionResult::failed("先失败"));
        map.insert("a", RegionResult::recognized("后成功"));
        assert_eq!(map.len(), 1);
        assert!(map.get("a").unwrap().is_recognized());
    }
}
