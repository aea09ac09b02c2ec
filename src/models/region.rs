//! 区域模型
//!
//! 区域由调用方（标注工具）提供，本子系统只读不改

use serde::{Deserialize, Serialize};

/// 区域标识
pub type RegionId = String;

/// 页面上的矩形包围盒（PDF 坐标）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// 区域类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Text,
    Table,
    Image,
}

impl RegionKind {
    /// 提示词库中按类型查找用的键
    pub fn prompt_key(&self) -> &'static str {
        match self {
            RegionKind::Text => "kind_text",
            RegionKind::Table => "kind_table",
            RegionKind::Image => "kind_image",
        }
    }

    /// 内置兜底提示词表中的键
    pub fn generic_key(&self) -> &'static str {
        match self {
            RegionKind::Text => "text",
            RegionKind::Table => "table",
            RegionKind::Image => "image",
        }
    }
}

/// 标注区域
///
/// 字段含义：
/// - `id`: 稳定标识，最终结果按它归位
/// - `page_index`: 所在页（从 0 开始）
/// - `bbox`: 包围盒
/// - `kind`: 区域类型（文本/表格/图片）
/// - `category`: 可选的分类标签，优先用于提示词解析
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub page_index: usize,
    pub bbox: BoundingBox,
    pub kind: RegionKind,
    #[serde(default)]
    pub category: Option<String>,
}

impl Region {
    /// 分类标签（空白视为无）
    pub fn category_label(&self) -> Option<&str> {
        self.category.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_with_category(category: Option<&str>) -> Region {
        Region {
            id: "r1".to_string(),
            page_index: 0,
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 40.0,
            },
            kind: RegionKind::Text,
            category: category.map(str::to_string),
        }
    }

    #[test]
    fn test_category_label_filters_blank() {
        assert_eq!(region_with_category(None).category_label(), None);
        assert_eq!(region_with_category(Some("")).category_label(), None);
        assert_eq!(region_with_category(Some("   ")).category_label(), None);
        assert_eq!(region_with_category(Some("标题")).category_label(), Some("标题"));
    }

    #[test]
    fn test_kind_deserializes_snake_case() {
        #[derive(serde::Deserialize)]
        struct Wrap {
            v: RegionKind,
        }
        let wrap: Wrap = toml::from_str("v = \"table\"").unwrap();
        assert_eq!(wrap.v, RegionKind::Table);
    }
}
