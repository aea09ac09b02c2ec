//! 裁剪图提供者 - 基础设施层
//!
//! 区域对应页面没有渲染过时拿不到裁剪图，这不算错误：
//! 该区域直接跳过，不进入流水线

use crate::models::loaders::DocumentManifest;
use crate::models::region::{Region, RegionId};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// 裁剪图提供者
#[async_trait]
pub trait CropProvider: Send + Sync {
    /// 取出区域的裁剪图字节
    ///
    /// # 返回
    /// - `Ok(Some(bytes))`: 正常取得
    /// - `Ok(None)`: 该区域无裁剪图（页面未渲染），跳过即可
    /// - `Err`: 真正的读取故障
    async fn crop(&self, region: &Region) -> Result<Option<Vec<u8>>>;
}

/// 从清单引用的图片文件中读取裁剪图
pub struct DirCropProvider {
    paths: HashMap<RegionId, PathBuf>,
}

impl DirCropProvider {
    /// 按清单建立 区域 id → 裁剪图路径 的映射
    pub fn from_manifest(manifest: &DocumentManifest) -> Self {
        let base = manifest.base_dir();
        let paths = manifest
            .regions
            .iter()
            .map(|r| (r.region.id.clone(), base.join(&r.crop_path)))
            .collect();
        Self { paths }
    }
}

#[async_trait]
impl CropProvider for DirCropProvider {
    async fn crop(&self, region: &Region) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.paths.get(&region.id) else {
            debug!("区域 {} 在清单中没有裁剪图路径，跳过", region.id);
            return Ok(None);
        };

        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            // 文件不存在等同于页面未渲染，跳过该区域
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("区域 {} 的裁剪图不存在 ({})，跳过", region.id, path.display());
                Ok(None)
            }
            Err(e) => Err(crate::error::AppError::file_read_failed(path.to_string_lossy(), e).into()),
        }
    }
}
