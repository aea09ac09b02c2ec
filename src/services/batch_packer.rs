//! 批次打包服务 - 业务能力层
//!
//! 只负责把一个分组的裁剪图压进尽量少的批次里，不关心请求与响应
//!
//! ## 算法
//!
//! 1. 所有裁剪图统一缩放到 `target_width`，保持纵横比
//! 2. 缩放后高度超过 `max_single_item_height` 的图，自上而下切成连续切片
//!    （最后一片可以更矮），切片仍归属原区域、保持切片顺序
//! 3. 贪心装箱：`当前高度 + 空白带(非空批才算) + 下一条目高度 ≤ max_batch_height`
//!    则追加，否则封箱并用该条目开新批
//! 4. 记录每个条目落在哪个批次的哪个位置，供结果归位
//!
//! 边界：单个切片高度本身超过 `max_batch_height` 时，独占一个批次发出，
//! 绝不丢弃、也不再二次切分

use crate::config::Config;
use crate::models::batch::{Batch, BatchItem};
use crate::models::region::{Region, RegionId};
use image::imageops::FilterType;
use image::RgbImage;
use tracing::{debug, warn};

/// 打包配置
#[derive(Debug, Clone, Copy)]
pub struct PackConfig {
    pub target_width: u32,
    pub inter_item_padding: u32,
    pub max_batch_height: u32,
    pub max_single_item_height: u32,
}

impl PackConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_width: config.target_width,
            inter_item_padding: config.inter_item_padding,
            max_batch_height: config.max_batch_height,
            max_single_item_height: config.max_single_item_height,
        }
    }
}

/// 条目落位记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPlacement {
    pub region_id: RegionId,
    pub slice_index: usize,
    pub batch_index: usize,
    /// 批内位置（从 0 开始）
    pub position: usize,
}

/// 打包结果
#[derive(Debug)]
pub struct PackOutput {
    /// 按文档顺序排列的批次
    pub batches: Vec<Batch>,
    /// 条目落位表
    pub placements: Vec<ItemPlacement>,
    /// 解码失败的区域 (id, 原因)，直接记失败占位
    pub undecodable: Vec<(RegionId, String)>,
}

/// 批次打包服务
pub struct BatchPacker {
    cfg: PackConfig,
}

impl BatchPacker {
    pub fn new(config: &Config) -> Self {
        Self {
            cfg: PackConfig::from_config(config),
        }
    }

    pub fn with_pack_config(cfg: PackConfig) -> Self {
        Self { cfg }
    }

    /// 把一个分组的 (区域, 裁剪图字节) 打包成批次
    pub fn pack(&self, items: &[(Region, Vec<u8>)]) -> PackOutput {
        // 1/2. 解码、缩放、按需切片
        let mut prepared: Vec<BatchItem> = Vec::new();
        let mut undecodable = Vec::new();

        for (region, bytes) in items {
            match self.prepare_items(region, bytes) {
                Ok(slices) => prepared.extend(slices),
                Err(reason) => {
                    warn!("区域 {} 的裁剪图无法解码: {}", region.id, reason);
                    undecodable.push((region.id.clone(), reason));
                }
            }
        }

        // 3. 贪心装箱
        let mut batches: Vec<Batch> = Vec::new();
        let mut current: Vec<BatchItem> = Vec::new();
        let mut current_height: u32 = 0;

        for item in prepared {
            let item_height = item.height();

            if current.is_empty() {
                if item_height > self.cfg.max_batch_height {
                    // 超高切片独占一批
                    debug!(
                        "条目 {} 高度 {} 超过批次上限 {}，独占一批",
                        item.label(),
                        item_height,
                        self.cfg.max_batch_height
                    );
                    batches.push(Batch { items: vec![item] });
                    continue;
                }
                current_height = item_height;
                current.push(item);
            } else if current_height + self.cfg.inter_item_padding + item_height
                <= self.cfg.max_batch_height
            {
                current_height += self.cfg.inter_item_padding + item_height;
                current.push(item);
            } else {
                batches.push(Batch {
                    items: std::mem::take(&mut current),
                });
                if item_height > self.cfg.max_batch_height {
                    batches.push(Batch { items: vec![item] });
                    current_height = 0;
                } else {
                    current_height = item_height;
                    current.push(item);
                }
            }
        }
        if !current.is_empty() {
            batches.push(Batch { items: current });
        }

        // 4. 记录落位
        let mut placements = Vec::new();
        for (batch_index, batch) in batches.iter().enumerate() {
            for (position, item) in batch.items.iter().enumerate() {
                placements.push(ItemPlacement {
                    region_id: item.region_id.clone(),
                    slice_index: item.slice_index,
                    batch_index,
                    position,
                });
            }
        }

        PackOutput {
            batches,
            placements,
            undecodable,
        }
    }

    /// 解码一张裁剪图，缩放到统一宽度，超高则切片
    fn prepare_items(&self, region: &Region, bytes: &[u8]) -> Result<Vec<BatchItem>, String> {
        let decoded = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
        let resized = self.resize_to_width(decoded);
        Ok(self.slice_if_needed(&region.id, resized))
    }

    /// 缩放到 `target_width`，保持纵横比
    fn resize_to_width(&self, img: image::DynamicImage) -> RgbImage {
        let (w, h) = (img.width(), img.height());
        if w == self.cfg.target_width {
            return img.to_rgb8();
        }
        let scale = self.cfg.target_width as f32 / w as f32;
        let new_height = ((h as f32 * scale).round() as u32).max(1);
        img.resize_exact(self.cfg.target_width, new_height, FilterType::Lanczos3)
            .to_rgb8()
    }

    /// 高度超限时自上而下切片；切片顺序即文档顺序
    fn slice_if_needed(&self, region_id: &RegionId, img: RgbImage) -> Vec<BatchItem> {
        let max_h = self.cfg.max_single_item_height;
        let height = img.height();

        if height <= max_h {
            return vec![BatchItem {
                region_id: region_id.clone(),
                slice_index: 0,
                slice_count: 1,
                image: img,
            }];
        }

        let slice_count = height.div_ceil(max_h) as usize;
        debug!("区域 {} 高度 {} 超限，切为 {} 片", region_id, height, slice_count);

        let width = img.width();
        let mut slices = Vec::with_capacity(slice_count);
        let mut y = 0;
        let mut slice_index = 0;
        while y < height {
            let part_height = max_h.min(height - y);
            let part = image::imageops::crop_imm(&img, 0, y, width, part_height).to_image();
            slices.push(BatchItem {
                region_id: region_id.clone(),
                slice_index,
                slice_count,
                image: part,
            });
            y += part_height;
            slice_index += 1;
        }
        slices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::region::{BoundingBox, RegionKind};
    use std::io::Cursor;

    fn region(id: &str) -> Region {
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
            category: None,
        }
    }

    /// 生成指定尺寸的 PNG 字节
    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([128, 128, 128]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn packer(target_width: u32, padding: u32, max_batch: u32, max_single: u32) -> BatchPacker {
        BatchPacker::with_pack_config(PackConfig {
            target_width,
            inter_item_padding: padding,
            max_batch_height: max_batch,
            max_single_item_height: max_single,
        })
    }

    #[test]
    fn test_greedy_packing_respects_height_budget() {
        // 高度 [300,300,300]，上限 700，空白带 50 → [[300,300],[300]]
        let packer = packer(64, 50, 700, 2000);
        let items = vec![
            (region("a"), png_bytes(64, 300)),
            (region("b"), png_bytes(64, 300)),
            (region("c"), png_bytes(64, 300)),
        ];
        let output = packer.pack(&items);

        assert_eq!(output.batches.len(), 2);
        assert_eq!(output.batches[0].len(), 2);
        assert_eq!(output.batches[1].len(), 1);
        assert_eq!(output.batches[0].items[0].region_id, "a");
        assert_eq!(output.batches[0].items[1].region_id, "b");
        assert_eq!(output.batches[1].items[0].region_id, "c");
        assert!(output.undecodable.is_empty());
    }

    #[test]
    fn test_oversized_crop_is_sliced_in_order() {
        // 高度 5000，单条目上限 2000 → 切片 [2000,2000,1000]
        let packer = packer(64, 0, 10_000, 2000);
        let items = vec![(region("tall"), png_bytes(64, 5000))];
        let output = packer.pack(&items);

        let slices: Vec<&BatchItem> = output.batches.iter().flat_map(|b| b.items.iter()).collect();
        assert_eq!(slices.len(), 3);
        let heights: Vec<u32> = slices.iter().map(|s| s.height()).collect();
        assert_eq!(heights, vec![2000, 2000, 1000]);
        for (i, slice) in slices.iter().enumerate() {
            assert_eq!(slice.region_id, "tall");
            assert_eq!(slice.slice_index, i);
            assert_eq!(slice.slice_count, 3);
        }
    }

    #[test]
    fn test_slice_taller_than_batch_limit_gets_own_batch() {
        // 单条目上限 3000 > 批次上限 1000：1500 高的图不切片，但必须独占一批发出
        let packer = packer(64, 10, 1000, 3000);
        let items = vec![
            (region("a"), png_bytes(64, 200)),
            (region("big"), png_bytes(64, 1500)),
            (region("b"), png_bytes(64, 200)),
        ];
        let output = packer.pack(&items);

        assert_eq!(output.batches.len(), 3);
        assert_eq!(output.batches[0].items[0].region_id, "a");
        assert_eq!(output.batches[1].items[0].region_id, "big");
        assert_eq!(output.batches[1].len(), 1);
        assert_eq!(output.batches[2].items[0].region_id, "b");
    }

    #[test]
    fn test_resize_preserves_aspect_ratio() {
        let packer = packer(100, 0, 10_000, 10_000);
        let items = vec![(region("a"), png_bytes(200, 600))];
        let output = packer.pack(&items);

        let item = &output.batches[0].items[0];
        assert_eq!(item.image.width(), 100);
        assert_eq!(item.image.height(), 300);
    }

    #[test]
    fn test_undecodable_crop_is_reported_not_packed() {
        let packer = packer(64, 0, 1000, 1000);
        let items = vec![
            (region("good"), png_bytes(64, 100)),
            (region("bad"), vec![0x00, 0x01, 0x02]),
        ];
        let output = packer.pack(&items);

        assert_eq!(output.batches.len(), 1);
        assert_eq!(output.undecodable.len(), 1);
        assert_eq!(output.undecodable[0].0, "bad");
    }

    #[test]
    fn test_placements_track_batch_and_position() {
        let packer = packer(64, 50, 700, 2000);
        let items = vec![
            (region("a"), png_bytes(64, 300)),
            (region("b"), png_bytes(64, 300)),
            (region("c"), png_bytes(64, 300)),
        ];
        let output = packer.pack(&items);

        assert_eq!(
            output.placements,
            vec![
                ItemPlacement {
                    region_id: "a".to_string(),
                    slice_index: 0,
                    batch_index: 0,
                    position: 0
                },
                ItemPlacement {
                    region_id: "b".to_string(),
                    slice_index: 0,
                    batch_index: 0,
                    position: 1
                },
                ItemPlacement {
                    region_id: "c".to_string(),
                    slice_index: 0,
                    batch_index: 1,
                    position: 0
                },
            ]
        );
    }

    #[test]
    fn test_slices_keep_relative_order_across_batches() {
        // 每批最多装下一片，切片跨批也要保持相对顺序
        let packer = packer(64, 10, 900, 800);
        let items = vec![(region("tall"), png_bytes(64, 2000))];
        let output = packer.pack(&items);

        let slices: Vec<(usize, usize)> = output
            .placements
            .iter()
            .map(|p| (p.batch_index, p.slice_index))
            .collect();
        // 3 片 (800+800+400)，逐批递增
        assert_eq!(slices, vec![(0, 0), (1, 1), (2, 2)]);
    }
}
