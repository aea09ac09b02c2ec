//! 请求派发服务 - 业务能力层
//!
//! 只负责"把一个批次变成一次后端请求并拿回响应文本"：
//! 组装指令（上下文前言 + 分组提示词 + 响应格式指令）、编码图片、
//! 套上重试策略。不关心拆分结果怎么归位
//!
//! 请求的 token 预算随条目数线性扩大，封顶于配置上限

use crate::config::{BatchImageLayout, Config};
use crate::infrastructure::backend::{BackendError, RequestPart, VisionBackend};
use crate::models::batch::Batch;
use crate::services::demultiplexer::ResponseProtocol;
use crate::services::retry::RetryPolicy;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbImage;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// 把图像编码为 PNG data URL
pub fn encode_data_url(img: &RgbImage) -> Result<String, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(buf.get_ref())))
}

/// 请求派发服务
pub struct RequestDispatcher<'a> {
    backend: &'a dyn VisionBackend,
    retry: RetryPolicy,
    protocol: Arc<dyn ResponseProtocol>,
    layout: BatchImageLayout,
    inter_item_padding: u32,
    max_tokens_base: u32,
    max_tokens_per_item: u32,
    max_tokens_cap: u32,
}

impl<'a> RequestDispatcher<'a> {
    pub fn new(
        config: &Config,
        backend: &'a dyn VisionBackend,
        protocol: Arc<dyn ResponseProtocol>,
    ) -> Self {
        Self {
            backend,
            retry: RetryPolicy::from_config(config),
            protocol,
            layout: config.batch_image_layout,
            inter_item_padding: config.inter_item_padding,
            max_tokens_base: config.max_tokens_base,
            max_tokens_per_item: config.max_tokens_per_item,
            max_tokens_cap: config.max_tokens_cap,
        }
    }

    /// 本次请求的 token 预算：基数 + 每条目增量，封顶
    fn max_tokens_for(&self, item_count: usize) -> u32 {
        if item_count <= 1 {
            return self.max_tokens_base;
        }
        let scaled = self
            .max_tokens_base
            .saturating_add(self.max_tokens_per_item.saturating_mul(item_count as u32));
        scaled.min(self.max_tokens_cap)
    }

    /// 派发一个批次
    ///
    /// # 参数
    /// - `label`: 日志用标签
    /// - `batch`: 待识别批次
    /// - `prompt`: 分组提示词
    /// - `context`: 上下文窗口（空串表示首组，省略前言）
    pub async fn dispatch_batch(
        &self,
        label: &str,
        batch: &Batch,
        prompt: &str,
        context: &str,
    ) -> Result<String, BackendError> {
        let parts = self.build_batch_parts(batch, prompt, context)?;
        let max_tokens = self.max_tokens_for(batch.len());

        debug!(
            "[{}] 派发批次: {} 个条目, 布局 {:?}, max_tokens {}",
            label,
            batch.len(),
            self.layout,
            max_tokens
        );

        self.retry
            .run(label, || self.backend.complete(&parts, max_tokens))
            .await
    }

    /// 派发单张图（降级重发用：不带上下文前言、不带标记）
    pub async fn dispatch_single(
        &self,
        label: &str,
        image: &RgbImage,
        prompt: &str,
    ) -> Result<String, BackendError> {
        let url = encode_data_url(image)
            .map_err(|e| BackendError::permanent(format!("图像编码失败: {}", e)))?;
        let parts = vec![RequestPart::Text(prompt.to_string()), RequestPart::Image(url)];
        let max_tokens = self.max_tokens_for(1);

        self.retry
            .run(label, || self.backend.complete(&parts, max_tokens))
            .await
    }

    /// 组装一个批次的请求内容
    fn build_batch_parts(
        &self,
        batch: &Batch,
        prompt: &str,
        context: &str,
    ) -> Result<Vec<RequestPart>, BackendError> {
        let item_count = batch.len();
        let mut instruction = String::new();

        if !context.is_empty() {
            instruction.push_str(
                "以下是本文档前文已识别内容的结尾，仅用于衔接上下文，不要把它复述进结果：\n",
            );
            instruction.push_str(context);
            instruction.push_str("\n\n");
        }

        instruction.push_str(prompt);

        // N=1 不启用标记协议：原始响应即结果
        if item_count == 1 {
            let url = encode_data_url(&batch.items[0].image)
                .map_err(|e| BackendError::permanent(format!("图像编码失败: {}", e)))?;
            return Ok(vec![RequestPart::Text(instruction), RequestPart::Image(url)]);
        }

        instruction.push_str("\n\n");
        let mut parts = Vec::with_capacity(item_count * 2 + 1);

        match self.layout {
            BatchImageLayout::Marked => {
                instruction.push_str(&self.protocol.directive(item_count));
                parts.push(RequestPart::Text(instruction));
                for (i, item) in batch.items.iter().enumerate() {
                    let url = encode_data_url(&item.image)
                        .map_err(|e| BackendError::permanent(format!("图像编码失败: {}", e)))?;
                    parts.push(RequestPart::Text(format!("[{}]", i + 1)));
                    parts.push(RequestPart::Image(url));
                }
            }
            BatchImageLayout::Stacked => {
                instruction.push_str(&format!(
                    "图片是一张纵向拼接的长图，共 {} 段，段与段之间以空白带分隔，\
                     从上到下依次是第 1 到第 {} 段。",
                    item_count, item_count
                ));
                instruction.push_str(&self.protocol.directive(item_count));
                let canvas = batch.compose_canvas(self.inter_item_padding);
                let url = encode_data_url(&canvas)
                    .map_err(|e| BackendError::permanent(format!("图像编码失败: {}", e)))?;
                parts.push(RequestPart::Text(instruction));
                parts.push(RequestPart::Image(url));
            }
        }

        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::demultiplexer::MarkerProtocol;

    fn dispatcher_for<'a>(config: &Config, backend: &'a dyn VisionBackend) -> RequestDispatcher<'a> {
        RequestDispatcher::new(config, backend, Arc::new(MarkerProtocol::new()))
    }

    struct NoopBackend;

    #[async_trait::async_trait]
    impl VisionBackend for NoopBackend {
        async fn complete(&self, _parts: &[RequestPart], _max_tokens: u32) -> Result<String, BackendError> {
            Ok(String::new())
        }
    }

    fn batch_of(n: usize) -> Batch {
        Batch {
            items: (0..n)
                .map(|i| crate::models::batch::BatchItem {
                    region_id: format!("r{}", i),
                    slice_index: 0,
                    slice_count: 1,
                    image: RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 0])),
                })
                .collect(),
        }
    }

    #[test]
    fn test_max_tokens_scales_with_item_count_and_caps() {
        let config = Config {
            max_tokens_base: 1000,
            max_tokens_per_item: 500,
            max_tokens_cap: 3000,
            ..Config::default()
        };
        let backend = NoopBackend;
        let dispatcher = dispatcher_for(&config, &backend);

        assert_eq!(dispatcher.max_tokens_for(1), 1000);
        assert_eq!(dispatcher.max_tokens_for(2), 2000);
        assert_eq!(dispatcher.max_tokens_for(3), 2500);
        assert_eq!(dispatcher.max_tokens_for(10), 3000);
    }

    #[test]
    fn test_marked_layout_interleaves_markers_and_images() {
        let config = Config::default();
        let backend = NoopBackend;
        let dispatcher = dispatcher_for(&config, &backend);

        let parts = dispatcher.build_batch_parts(&batch_of(3), "识别文字", "").unwrap();
        // 指令 + 3 × (标记, 图片)
        assert_eq!(parts.len(), 7);
        assert!(matches!(&parts[0], RequestPart::Text(t) if t.contains("识别文字")));
        assert!(matches!(&parts[1], RequestPart::Text(t) if t == "[1]"));
        assert!(matches!(&parts[2], RequestPart::Image(u) if u.starts_with("data:image/png;base64,")));
        assert!(matches!(&parts[5], RequestPart::Text(t) if t == "[3]"));
    }

    #[test]
    fn test_stacked_layout_sends_single_canvas() {
        let config = Config {
            batch_image_layout: BatchImageLayout::Stacked,
            ..Config::default()
        };
        let backend = NoopBackend;
        let dispatcher = dispatcher_for(&config, &backend);

        let parts = dispatcher.build_batch_parts(&batch_of(3), "识别文字", "").unwrap();
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], RequestPart::Text(t) if t.contains("纵向拼接")));
        assert!(matches!(&parts[1], RequestPart::Image(_)));
    }

    #[test]
    fn test_single_item_request_has_no_directive() {
        let config = Config::default();
        let backend = NoopBackend;
        let dispatcher = dispatcher_for(&config, &backend);

        let parts = dispatcher.build_batch_parts(&batch_of(1), "识别文字", "").unwrap();
        assert_eq!(parts.len(), 2);
        assert!(matches!(&parts[0], RequestPart::Text(t) if t == "识别文字"));
    }

    #[test]
    fn test_context_preamble_prepended_when_present() {
        let config = Config::default();
        let backend = NoopBackend;
        let dispatcher = dispatcher_for(&config, &backend);

        let parts = dispatcher
            .build_batch_parts(&batch_of(1), "识别文字", "……前文结尾")
            .unwrap();
        assert!(matches!(&parts[0], RequestPart::Text(t) if t.contains("……前文结尾") && t.contains("识别文字")));

        let parts = dispatcher.build_batch_parts(&batch_of(1), "识别文字", "").unwrap();
        assert!(matches!(&parts[0], RequestPart::Text(t) if !t.contains("前文")));
    }
}
