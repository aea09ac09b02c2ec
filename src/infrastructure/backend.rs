//! 视觉后端 - 基础设施层
//!
//! 只负责"把一组图文内容发给识别后端、拿回文本"，不认识 Region / Batch，
//! 也不关心分组、打包、重试这些流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）
//!
//! 客户端由调用方显式构造后注入，生命周期随任务结束而结束，
//! 不存在进程级单例

use crate::config::Config;
use crate::error::{AppResult, ConfigError};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    error::OpenAIError,
    Client,
};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

/// 默认系统提示词（可被提示词库中的 `system` 键覆盖）
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "你是一个专业的 OCR 识别助手。你会收到文档页面上裁剪出来的区域图片，\
     需要按要求把图片内容转写为文本。只输出要求的内容，不要添加任何解释。";

/// 后端调用错误
///
/// 在这里完成瞬时/永久分类，重试与降级逻辑只看分类，不再关心底层细节
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// 连接失败、超时、限流、服务端过载等，值得重试
    #[error("瞬时网络错误: {detail}")]
    Transient { detail: String },
    /// 请求被拒绝、负载非法等，重试无意义
    #[error("永久请求错误: {detail}")]
    Permanent { detail: String },
}

impl BackendError {
    pub fn transient(detail: impl Into<String>) -> Self {
        BackendError::Transient {
            detail: detail.into(),
        }
    }

    pub fn permanent(detail: impl Into<String>) -> Self {
        BackendError::Permanent {
            detail: detail.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient { .. })
    }

    pub fn detail(&self) -> &str {
        match self {
            BackendError::Transient { detail } | BackendError::Permanent { detail } => detail,
        }
    }
}

/// 请求内容的一个部分：一段文本，或一张图（data URL / 外部 URL）
#[derive(Debug, Clone)]
pub enum RequestPart {
    Text(String),
    Image(String),
}

/// 视觉识别后端
///
/// 每次调用都是一次完整的请求-响应，本子系统内不做流式
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// 发送一次识别请求
    ///
    /// # 参数
    /// - `parts`: 按序排列的图文内容
    /// - `max_tokens`: 本次请求的 token 预算
    ///
    /// # 返回
    /// 返回后端的响应文本（已去除首尾空白）
    async fn complete(&self, parts: &[RequestPart], max_tokens: u32) -> Result<String, BackendError>;
}

/// OpenAI 兼容的视觉后端
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model_name: String,
    system_prompt: String,
}

impl OpenAiBackend {
    /// 创建新的后端客户端
    ///
    /// API Key 缺失属于配置错误，在发起任何请求前就中止
    pub fn new(config: &Config) -> AppResult<Self> {
        if config.llm_api_key.trim().is_empty() {
            return Err(crate::error::AppError::Config(ConfigError::MissingApiKey));
        }

        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Ok(Self {
            client,
            model_name: config.llm_model_name.clone(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    /// 覆盖系统提示词
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// 把 OpenAI 错误分类为瞬时/永久
    ///
    /// 先沿 source 链找 reqwest 传输层错误（连接失败/超时 → 瞬时），
    /// 再按错误文本中的限流/过载特征兜底判断
    fn classify_error(err: &OpenAIError) -> BackendError {
        let mut source = std::error::Error::source(err);
        while let Some(e) = source {
            if let Some(req_err) = e.downcast_ref::<reqwest::Error>() {
                if req_err.is_timeout() || req_err.is_connect() || req_err.is_request() {
                    return BackendError::transient(err.to_string());
                }
            }
            source = e.source();
        }

        let lowered = err.to_string().to_ascii_lowercase();
        const TRANSIENT_HINTS: [&str; 10] = [
            "timeout",
            "timed out",
            "connection",
            "rate limit",
            "overloaded",
            "unavailable",
            "429",
            "500",
            "502",
            "503",
        ];
        if TRANSIENT_HINTS.iter().any(|hint| lowered.contains(hint)) {
            BackendError::transient(err.to_string())
        } else {
            BackendError::permanent(err.to_string())
        }
    }
}

#[async_trait]
impl VisionBackend for OpenAiBackend {
    async fn complete(&self, parts: &[RequestPart], max_tokens: u32) -> Result<String, BackendError> {
        let image_count = parts.iter().filter(|p| matches!(p, RequestPart::Image(_))).count();
        debug!(
            "调用视觉后端，模型: {}, 内容块: {}, 图片: {}, max_tokens: {}",
            self.model_name,
            parts.len(),
            image_count,
            max_tokens
        );

        // 构建消息列表
        let mut messages = Vec::new();

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(self.system_prompt.as_str())
            .build()
            .map_err(|e| BackendError::permanent(format!("构建系统消息失败: {}", e)))?;
        messages.push(ChatCompletionRequestMessage::System(system_msg));

        // 构建用户消息内容（文本与图片按序交错）
        let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
        for part in parts {
            match part {
                RequestPart::Text(text) => {
                    content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                        ChatCompletionRequestMessageContentPartText { text: text.clone() },
                    ));
                }
                RequestPart::Image(url) => {
                    content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: url.clone(),
                                detail: Some(ImageDetail::Auto), // Auto, High, Low
                            },
                        },
                    ));
                }
            }
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()
            .map_err(|e| BackendError::permanent(format!("构建用户消息失败: {}", e)))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.0)
            .max_tokens(max_tokens)
            .build()
            .map_err(|e| BackendError::permanent(format!("构建请求失败: {}", e)))?;

        // 调用 API
        let response = self.client.chat().create(request).await.map_err(|e| {
            let classified = Self::classify_error(&e);
            warn!("视觉后端调用失败 ({}): {}", if classified.is_transient() { "瞬时" } else { "永久" }, e);
            classified
        })?;

        debug!("视觉后端调用成功");

        // 提取响应内容；空响应视为负载异常，不重试
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| BackendError::permanent("后端返回内容为空"))?;

        Ok(content.trim().to_string())
    }
}
