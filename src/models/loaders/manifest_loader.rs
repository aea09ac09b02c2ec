use crate::models::region::Region;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 清单中的一个区域：标注信息 + 裁剪图文件相对路径
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestRegion {
    #[serde(flatten)]
    pub region: Region,
    /// 裁剪图路径，相对于清单文件所在目录
    pub crop_path: String,
}

/// 一个文档的区域清单
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentManifest {
    pub document_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub regions: Vec<ManifestRegion>,
    /// 清单文件自身路径（加载后填入）
    #[serde(skip)]
    pub file_path: Option<String>,
}

impl DocumentManifest {
    /// 裁剪图路径的基准目录
    pub fn base_dir(&self) -> PathBuf {
        self.file_path
            .as_ref()
            .and_then(|p| Path::new(p).parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.document_id)
    }
}

/// 从 TOML 文件加载数据并转换为 DocumentManifest 对象
pub async fn load_manifest(manifest_path: &Path) -> Result<DocumentManifest> {
    let content = fs::read_to_string(manifest_path)
        .await
        .with_context(|| format!("无法读取清单文件: {}", manifest_path.display()))?;

    let mut manifest: DocumentManifest = toml::from_str(&content)
        .with_context(|| format!("无法解析清单文件: {}", manifest_path.display()))?;

    // 设置文件路径
    manifest.file_path = Some(manifest_path.to_string_lossy().to_string());

    Ok(manifest)
}

/// 从文件夹中加载所有 TOML 清单并转换为 DocumentManifest 对象列表
pub async fn load_all_manifests(folder_path: &str) -> Result<Vec<DocumentManifest>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut manifests = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            tracing::info!(
                "正在加载: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );

            match load_manifest(&path).await {
                Ok(manifest) => {
                    tracing::info!("成功加载 {} 个区域", manifest.regions.len());
                    manifests.push(manifest);
                }
                Err(e) => {
                    tracing::warn!("加载文件失败 {}: {}", path.display(), e);
                }
            }
        }
    }

    // 按文档 id 排序，保证多次运行处理顺序一致
    manifests.sort_by(|a, b| a.document_id.cmp(&b.document_id));

    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::region::RegionKind;

    #[test]
    fn test_manifest_parses_from_toml() {
        let text = r#"
document_id = "doc-001"
name = "测试文档"

[[regions]]
id = "r1"
page_index = 0
kind = "text"
category = "标题"
crop_path = "crops/r1.png"
bbox = { x = 0.0, y = 10.0, width = 200.0, height = 48.0 }

[[regions]]
id = "r2"
page_index = 1
kind = "table"
crop_path = "crops/r2.png"
bbox = { x = 5.0, y = 5.0, width = 300.0, height = 120.0 }
"#;
        let manifest: DocumentManifest = toml::from_str(text).unwrap();
        assert_eq!(manifest.document_id, "doc-001");
        assert_eq!(manifest.regions.len(), 2);
        assert_eq!(manifest.regions[0].region.kind, RegionKind::Text);
        assert_eq!(manifest.regions[0].region.category.as_deref(), Some("标题"));
        assert_eq!(manifest.regions[1].region.category, None);
        assert_eq!(manifest.regions[1].crop_path, "crops/r2.png");
    }
}
