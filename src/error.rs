use crate::infrastructure::backend::BackendError;
use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 配置错误（致命，发起任何请求前中止）
    Config(ConfigError),
    /// 文件操作错误
    File(FileError),
    /// 图像处理错误
    Image(ImageError),
    /// 后端调用错误（已分类为瞬时/永久）
    Backend(BackendError),
    /// 响应解析错误
    Parse(ParseError),
    /// 任务已取消（任务粒度，已在途的批次结果被丢弃）
    Cancelled {
        document_id: String,
    },
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::File(e) => write!(f, "文件错误: {}", e),
            AppError::Image(e) => write!(f, "图像错误: {}", e),
            AppError::Backend(e) => write!(f, "后端错误: {}", e),
            AppError::Parse(e) => write!(f, "解析错误: {}", e),
            AppError::Cancelled { document_id } => {
                write!(f, "任务已取消 (文档: {})", document_id)
            }
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Image(e) => Some(e),
            AppError::Backend(e) => Some(e),
            AppError::Parse(e) => Some(e),
            AppError::Cancelled { .. } => None,
            AppError::Other(_) => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// API Key 缺失
    MissingApiKey,
    /// 配置项取值非法
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingApiKey => {
                write!(f, "缺少 LLM API Key（请设置 LLM_API_KEY 环境变量）")
            }
            ConfigError::InvalidValue {
                field,
                value,
                reason,
            } => {
                write!(f, "配置项 {} 取值非法: '{}' ({})", field, value, reason)
            }
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 文件不存在
    NotFound {
        path: String,
    },
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    TomlParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 目录不存在
    DirectoryNotFound {
        path: String,
    },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::NotFound { path } => write!(f, "文件不存在: {}", path),
            FileError::ReadFailed { path, source } => {
                write!(f, "读取文件失败 ({}): {}", path, source)
            }
            FileError::WriteFailed { path, source } => {
                write!(f, "写入文件失败 ({}): {}", path, source)
            }
            FileError::TomlParseFailed { path, source } => {
                write!(f, "TOML解析失败 ({}): {}", path, source)
            }
            FileError::DirectoryNotFound { path } => write!(f, "目录不存在: {}", path),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. }
            | FileError::WriteFailed { source, .. }
            | FileError::TomlParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 图像处理错误
#[derive(Debug)]
pub enum ImageError {
    /// 图像解码失败（只跳过该区域，不影响整次运行）
    DecodeFailed {
        region_id: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 图像编码失败
    EncodeFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageError::DecodeFailed { region_id, source } => {
                write!(f, "图像解码失败 (区域: {}): {}", region_id, source)
            }
            ImageError::EncodeFailed { source } => {
                write!(f, "图像编码失败: {}", source)
            }
        }
    }
}

impl std::error::Error for ImageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImageError::DecodeFailed { source, .. } | ImageError::EncodeFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

/// 响应解析错误
///
/// 整批解析失败时触发 FallbackExecutor 降级重发
#[derive(Debug)]
pub enum ParseError {
    /// 多图响应中没有任何可用的 [编号] 标记
    NoMarkersFound {
        item_count: usize,
    },
    /// JSON 数组响应非法
    JsonArrayInvalid {
        detail: String,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NoMarkersFound { item_count } => {
                write!(f, "响应中未找到任何 [编号] 标记 (条目数: {})", item_count)
            }
            ParseError::JsonArrayInvalid { detail } => {
                write!(f, "响应不是合法的 JSON 字符串数组: {}", detail)
            }
        }
    }
}

impl std::error::Error for ParseError {}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Backend(err)
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(ParseError::JsonArrayInvalid {
            detail: err.to_string(),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建配置项非法错误
    pub fn invalid_config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AppError::Config(ConfigError::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        })
    }

    /// 创建图像解码错误
    pub fn image_decode_failed(
        region_id: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Image(ImageError::DecodeFailed {
            region_id: region_id.into(),
            source: Box::new(source),
        })
    }

    /// 创建图像编码错误
    pub fn image_encode_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AppError::Image(ImageError::EncodeFailed {
            source: Box::new(source),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建任务取消错误
    pub fn cancelled(document_id: impl Into<String>) -> Self {
        AppError::Cancelled {
            document_id: document_id.into(),
        }
    }

    /// 是否为取消错误
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled { .. })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
