//! 分组与批次模型
//!
//! 这些实体只活在一次流水线运行内，运行结束即丢弃

use crate::models::region::{Region, RegionId};
use image::RgbImage;

/// 解析后的提示词
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    /// 分组用的键（同键连续区域进同一组）
    pub key: String,
    /// 发给后端的提示词正文，保证非空
    pub text: String,
}

/// 提示词分组
///
/// 文档顺序上连续、且解析出同一提示词的 (区域, 裁剪图字节) 连续段
#[derive(Debug)]
pub struct PromptGroup {
    pub key: String,
    pub prompt: String,
    pub items: Vec<(Region, Vec<u8>)>,
}

impl PromptGroup {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 批次条目：一张完整裁剪图，或超高裁剪图的一个纵向切片
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub region_id: RegionId,
    /// 切片序号（从 0 开始；未切片的条目恒为 0）
    pub slice_index: usize,
    /// 该区域切片总数（未切片为 1）
    pub slice_count: usize,
    /// 已缩放到统一宽度的图像
    pub image: RgbImage,
}

impl BatchItem {
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// 日志用标签，如 `r3#2/5`
    pub fn label(&self) -> String {
        if self.slice_count > 1 {
            format!("{}#{}/{}", self.region_id, self.slice_index + 1, self.slice_count)
        } else {
            self.region_id.clone()
        }
    }
}

/// 批次：发往后端的一次识别请求所含的有序条目
#[derive(Debug)]
pub struct Batch {
    pub items: Vec<BatchItem>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 条目总高度（含条目间空白带）
    pub fn stacked_height(&self, padding: u32) -> u32 {
        let items_h: u32 = self.items.iter().map(BatchItem::height).sum();
        let pads = self.items.len().saturating_sub(1) as u32 * padding;
        items_h + pads
    }

    /// 把条目纵向拼接成一张画布（条目间留白）
    ///
    /// 用于 `Stacked` 请求布局；画布底色为白色
    pub fn compose_canvas(&self, padding: u32) -> RgbImage {
        let width = self.items.iter().map(|i| i.image.width()).max().unwrap_or(1);
        let height = self.stacked_height(padding).max(1);
        let mut canvas = RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));

        let mut y: i64 = 0;
        for item in &self.items {
            image::imageops::replace(&mut canvas, &item.image, 0, y);
            y += i64::from(item.image.height()) + i64::from(padding);
        }
        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(region_id: &str, width: u32, height: u32) -> BatchItem {
        BatchItem {
            region_id: region_id.to_string(),
            slice_index: 0,
            slice_count: 1,
            image: RgbImage::from_pixel(width, height, image::Rgb([0, 0, 0])),
        }
    }

    #[test]
    fn test_stacked_height_counts_padding_between_items() {
        let batch = Batch {
            items: vec![item("a", 10, 300), item("b", 10, 300)],
        };
        assert_eq!(batch.stacked_height(50), 650);
    }

    #[test]
    fn test_compose_canvas_places_items_with_padding() {
        let batch = Batch {
            items: vec![item("a", 10, 4), item("b", 10, 6)],
        };
        let canvas = batch.compose_canvas(2);
        assert_eq!(canvas.width(), 10);
        assert_eq!(canvas.height(), 12);
        // 条目像素为黑，空白带保持白色
        assert_eq!(canvas.get_pixel(0, 0), &image::Rgb([0, 0, 0]));
        assert_eq!(canvas.get_pixel(0, 4), &image::Rgb([255, 255, 255]));
        assert_eq!(canvas.get_pixel(0, 6), &image::Rgb([0, 0, 0]));
    }

    #[test]
    fn test_item_label_marks_slices() {
        let mut sliced = item("r9", 4, 4);
        sliced.slice_index = 1;
        sliced.slice_count = 3;
        assert_eq!(sliced.label(), "r9#2/3");
        assert_eq!(item("r1", 4, 4).label(), "r1");
    }
}
