//! 响应拆分服务 - 业务能力层
//!
//! 把一次多图请求的响应文本拆回各条目。标记式拆分本质上是尽力而为的
//! 文本解析，因此协议做成可插拔接口：将来换成结构化输出协议时，
//! 分组与打包逻辑都不用动
//!
//! 约定：
//! - N=1 的批次完全绕开协议解析，原始响应即结果
//! - 越界编号直接忽略
//! - 找到的标记数少于条目数时，缺席条目记解析失败占位，不拖垮整批
//! - 一个标记都没有时按 `UnmarkedResponsePolicy` 处理（显式配置，
//!   不再沿用旧实现静默塞给第一条的行为）

use crate::config::{ProtocolKind, UnmarkedResponsePolicy};
use crate::error::{AppError, AppResult, ParseError};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

/// 响应拆分协议
pub trait ResponseProtocol: Send + Sync {
    fn name(&self) -> &'static str;

    /// 多图请求的响应格式指令（拼进请求提示词）
    fn directive(&self, item_count: usize) -> String;

    /// 把响应拆成每条目文本；`None` 表示该条目在响应中缺席
    ///
    /// 整段响应完全不可解析时返回 `ParseError`
    fn split(&self, response: &str, item_count: usize) -> AppResult<Vec<Option<String>>>;
}

/// `[1] ... [2] ...` 文本标记协议
pub struct MarkerProtocol {
    marker_re: Regex,
}

impl MarkerProtocol {
    pub fn new() -> Self {
        Self {
            marker_re: Regex::new(r"\[(\d+)\]").expect("标记正则必定合法"),
        }
    }
}

impl Default for MarkerProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseProtocol for MarkerProtocol {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn directive(&self, item_count: usize) -> String {
        format!(
            "图片共 {} 张，每张图片前都有对应的 [编号] 文本标记。\
             请按编号顺序逐一识别，并严格按照 `[1] 第1张的内容 [2] 第2张的内容 …` 的格式返回，\
             编号从 [1] 到 [{}]，不要输出任何其他说明。",
            item_count, item_count
        )
    }

    fn split(&self, response: &str, item_count: usize) -> AppResult<Vec<Option<String>>> {
        // 收集范围内的标记及其位置；越界编号忽略
        let mut markers: Vec<(usize, usize, usize)> = Vec::new(); // (编号, 标记起点, 标记终点)
        for caps in self.marker_re.captures_iter(response) {
            let whole = caps.get(0).expect("捕获组 0 必定存在");
            if let Ok(index) = caps[1].parse::<usize>() {
                if (1..=item_count).contains(&index) {
                    markers.push((index, whole.start(), whole.end()));
                } else {
                    debug!("忽略越界标记 [{}] (条目数: {})", index, item_count);
                }
            }
        }

        if markers.is_empty() {
            return Err(AppError::Parse(ParseError::NoMarkersFound { item_count }));
        }

        // 相邻有效标记之间的文本归前一个标记的条目；同号后出现者覆盖先出现者
        let mut parts: Vec<Option<String>> = vec![None; item_count];
        for (i, (index, _start, end)) in markers.iter().enumerate() {
            let text_end = if i + 1 < markers.len() {
                markers[i + 1].1
            } else {
                response.len()
            };
            let text = response[*end..text_end].trim();
            parts[index - 1] = Some(text.to_string());
        }

        let missing = parts.iter().filter(|p| p.is_none()).count();
        if missing > 0 {
            warn!(
                "响应中只找到 {}/{} 个条目的标记，缺席条目将记解析失败",
                item_count - missing,
                item_count
            );
        }

        Ok(parts)
    }
}

/// JSON 字符串数组协议（结构化输出替代方案）
pub struct JsonArrayProtocol;

impl ResponseProtocol for JsonArrayProtocol {
    fn name(&self) -> &'static str {
        "json_array"
    }

    fn directive(&self, item_count: usize) -> String {
        format!(
            "请识别全部 {} 张图片，并以 JSON 字符串数组返回：数组第 i 个元素是第 i 张图片的内容，\
             数组长度必须为 {}，除这个数组外不要输出任何内容。",
            item_count, item_count
        )
    }

    fn split(&self, response: &str, item_count: usize) -> AppResult<Vec<Option<String>>> {
        // 容忍围栏代码块等杂质：截取首个 '[' 到最后一个 ']'
        let start = response.find('[');
        let end = response.rfind(']');
        let (Some(start), Some(end)) = (start, end) else {
            return Err(AppError::Parse(ParseError::JsonArrayInvalid {
                detail: "响应中没有 JSON 数组".to_string(),
            }));
        };
        if end < start {
            return Err(AppError::Parse(ParseError::JsonArrayInvalid {
                detail: "括号顺序非法".to_string(),
            }));
        }

        let texts: Vec<String> = serde_json::from_str(&response[start..=end]).map_err(|e| {
            AppError::Parse(ParseError::JsonArrayInvalid {
                detail: e.to_string(),
            })
        })?;

        if texts.is_empty() {
            return Err(AppError::Parse(ParseError::JsonArrayInvalid {
                detail: "数组为空".to_string(),
            }));
        }
        if texts.len() != item_count {
            warn!("JSON 数组长度 {} 与条目数 {} 不一致", texts.len(), item_count);
        }

        let mut parts: Vec<Option<String>> = vec![None; item_count];
        for (i, text) in texts.into_iter().take(item_count).enumerate() {
            parts[i] = Some(text);
        }
        Ok(parts)
    }
}

/// 按配置构建协议实例
pub fn build_protocol(kind: ProtocolKind) -> Arc<dyn ResponseProtocol> {
    match kind {
        ProtocolKind::Marker => Arc::new(MarkerProtocol::new()),
        ProtocolKind::JsonArray => Arc::new(JsonArrayProtocol),
    }
}

/// 响应拆分服务
///
/// 在协议之上套一层无标记响应策略
pub struct ResponseDemultiplexer {
    protocol: Arc<dyn ResponseProtocol>,
    unmarked_policy: UnmarkedResponsePolicy,
}

impl ResponseDemultiplexer {
    pub fn new(protocol: Arc<dyn ResponseProtocol>, unmarked_policy: UnmarkedResponsePolicy) -> Self {
        Self {
            protocol,
            unmarked_policy,
        }
    }

    /// 拆分一次批次响应
    ///
    /// N=1 时绕开协议解析，原始响应即该条目结果
    pub fn demux(&self, response: &str, item_count: usize) -> AppResult<Vec<Option<String>>> {
        if item_count <= 1 {
            return Ok(vec![Some(response.to_string())]);
        }

        match self.protocol.split(response, item_count) {
            Ok(parts) => Ok(parts),
            Err(AppError::Parse(parse_err)) => match self.unmarked_policy {
                UnmarkedResponsePolicy::AssignFirst => {
                    warn!(
                        "响应整体不可拆分 ({})，按配置归给第一个条目",
                        parse_err
                    );
                    let mut parts: Vec<Option<String>> = vec![None; item_count];
                    parts[0] = Some(response.trim().to_string());
                    Ok(parts)
                }
                UnmarkedResponsePolicy::FailBatch => Err(AppError::Parse(parse_err)),
            },
            Err(other) => Err(other),
        }
    }
}
