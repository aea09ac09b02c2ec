use crate::error::{AppError, AppResult};

/// 多图请求的组织方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchImageLayout {
    /// N 张图片按序发送，每张前面插入 `[i]` 文本标记
    Marked,
    /// 整批拼接成一张纵向长图发送
    Stacked,
}

impl std::str::FromStr for BatchImageLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "marked" => Ok(BatchImageLayout::Marked),
            "stacked" => Ok(BatchImageLayout::Stacked),
            other => Err(format!("未知的图片组织方式: {}", other)),
        }
    }
}

/// 响应拆分协议
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolKind {
    /// `[1] ... [2] ...` 文本标记协议
    Marker,
    /// JSON 字符串数组协议
    JsonArray,
}

impl std::str::FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "marker" => Ok(ProtocolKind::Marker),
            "json_array" | "json" => Ok(ProtocolKind::JsonArray),
            other => Err(format!("未知的响应协议: {}", other)),
        }
    }
}

/// 多图响应中一个标记都没有时的处理策略
///
/// 旧实现会把整段原始响应静默塞给第一个条目，这里改为显式可配置
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnmarkedResponsePolicy {
    /// 整段响应归给第一个条目，其余条目记解析失败占位
    AssignFirst,
    /// 视为整批解析失败，触发逐条降级重发
    FailBatch,
}

impl std::str::FromStr for UnmarkedResponsePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "assign_first" => Ok(UnmarkedResponsePolicy::AssignFirst),
            "fail_batch" => Ok(UnmarkedResponsePolicy::FailBatch),
            other => Err(format!("未知的无标记响应策略: {}", other)),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时处理的文档任务数量
    pub max_concurrent_jobs: usize,
    /// 区域清单（manifest）TOML 文件存放目录
    pub manifest_folder: String,
    /// 识别结果 JSON 输出目录
    pub result_folder: String,
    /// 识别失败区域的警告文件
    pub warn_file: String,
    /// 提示词库 TOML 文件路径
    pub prompt_store_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 打包配置 ---
    /// 所有裁剪图统一缩放到的宽度（像素）
    pub target_width: u32,
    /// 批内条目之间的空白带高度（像素）
    pub inter_item_padding: u32,
    /// 单个批次允许的最大累计高度（像素）
    pub max_batch_height: u32,
    /// 单个条目允许的最大高度，超出则纵向切片（像素）
    pub max_single_item_height: u32,
    // --- 请求配置 ---
    pub max_tokens_base: u32,
    pub max_tokens_per_item: u32,
    pub max_tokens_cap: u32,
    pub batch_image_layout: BatchImageLayout,
    pub response_protocol: ProtocolKind,
    pub unmarked_response_policy: UnmarkedResponsePolicy,
    // --- 重试配置 ---
    pub max_retry_attempts: usize,
    pub retry_delay_ms: u64,
    // --- 上下文窗口配置 ---
    // 截断长度沿袭旧实现的取值，集中在这里便于按需覆盖
    /// 上一窗口保留的尾部字符数
    pub context_carry_chars: usize,
    /// 最近一次成功文本取用的尾部字符数
    pub context_take_chars: usize,
    /// 窗口总长度上限（字符）
    pub context_max_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            manifest_folder: "manifests".to_string(),
            result_folder: "ocr_results".to_string(),
            warn_file: "warn.txt".to_string(),
            prompt_store_file: "prompts.toml".to_string(),
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            target_width: 1024,
            inter_item_padding: 24,
            max_batch_height: 4096,
            max_single_item_height: 2048,
            max_tokens_base: 1024,
            max_tokens_per_item: 512,
            max_tokens_cap: 8192,
            batch_image_layout: BatchImageLayout::Marked,
            response_protocol: ProtocolKind::Marker,
            unmarked_response_policy: UnmarkedResponsePolicy::FailBatch,
            max_retry_attempts: 3,
            retry_delay_ms: 1500,
            context_carry_chars: 200,
            context_take_chars: 300,
            context_max_chars: 480,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("MAX_CONCURRENT_JOBS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_jobs),
            manifest_folder: std::env::var("MANIFEST_FOLDER").unwrap_or(default.manifest_folder),
            result_folder: std::env::var("RESULT_FOLDER").unwrap_or(default.result_folder),
            warn_file: std::env::var("WARN_FILE").unwrap_or(default.warn_file),
            prompt_store_file: std::env::var("PROMPT_STORE_FILE").unwrap_or(default.prompt_store_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            target_width: std::env::var("TARGET_WIDTH").ok().and_then(|v| v.parse().ok()).unwrap_or(default.target_width),
            inter_item_padding: std::env::var("INTER_ITEM_PADDING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.inter_item_padding),
            max_batch_height: std::env::var("MAX_BATCH_HEIGHT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_batch_height),
            max_single_item_height: std::env::var("MAX_SINGLE_ITEM_HEIGHT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_single_item_height),
            max_tokens_base: std::env::var("MAX_TOKENS_BASE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_tokens_base),
            max_tokens_per_item: std::env::var("MAX_TOKENS_PER_ITEM").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_tokens_per_item),
            max_tokens_cap: std::env::var("MAX_TOKENS_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_tokens_cap),
            batch_image_layout: std::env::var("BATCH_IMAGE_LAYOUT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.batch_image_layout),
            response_protocol: std::env::var("RESPONSE_PROTOCOL").ok().and_then(|v| v.parse().ok()).unwrap_or(default.response_protocol),
            unmarked_response_policy: std::env::var("UNMARKED_RESPONSE_POLICY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.unmarked_response_policy),
            max_retry_attempts: std::env::var("MAX_RETRY_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_retry_attempts),
            retry_delay_ms: std::env::var("RETRY_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_delay_ms),
            context_carry_chars: std::env::var("CONTEXT_CARRY_CHARS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.context_carry_chars),
            context_take_chars: std::env::var("CONTEXT_TAKE_CHARS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.context_take_chars),
            context_max_chars: std::env::var("CONTEXT_MAX_CHARS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.context_max_chars),
        }
    }

    /// 校验配置取值
    ///
    /// 配置错误是致命的：在发起任何后端请求之前中止本次运行
    pub fn validate(&self) -> AppResult<()> {
        if self.target_width == 0 {
            return Err(AppError::invalid_config("target_width", "0", "必须大于 0"));
        }
        if self.max_single_item_height == 0 {
            return Err(AppError::invalid_config("max_single_item_height", "0", "必须大于 0"));
        }
        if self.max_batch_height == 0 {
            return Err(AppError::invalid_config("max_batch_height", "0", "必须大于 0"));
        }
        if self.max_retry_attempts == 0 {
            return Err(AppError::invalid_config("max_retry_attempts", "0", "至少尝试 1 次"));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(AppError::invalid_config("max_concurrent_jobs", "0", "至少 1 个并发任务"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_width() {
        let config = Config {
            target_width: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("marked".parse::<BatchImageLayout>().unwrap(), BatchImageLayout::Marked);
        assert_eq!("stacked".parse::<BatchImageLayout>().unwrap(), BatchImageLayout::Stacked);
        assert_eq!("marker".parse::<ProtocolKind>().unwrap(), ProtocolKind::Marker);
        assert_eq!("json_array".parse::<ProtocolKind>().unwrap(), ProtocolKind::JsonArray);
        assert_eq!(
            "assign_first".parse::<UnmarkedResponsePolicy>().unwrap(),
            UnmarkedResponsePolicy::AssignFirst
        );
        assert!("bogus".parse::<ProtocolKind>().is_err());
    }
}
