//! 重试策略 - 业务能力层
//!
//! 作用在单次网络调用（一个批次请求或一条降级重发）上：
//! 瞬时失败按固定间隔重试到次数上限，永久失败立刻上抛，
//! 由 FallbackExecutor 或占位记录接手

use crate::config::Config;
use crate::infrastructure::backend::BackendError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// 重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: usize,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_retry_attempts,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    /// 执行一次网络调用，瞬时失败自动重试
    ///
    /// # 参数
    /// - `label`: 日志用标签（如 "文档 doc-1 批次 2"）
    /// - `op`: 每次尝试都重新发起的调用
    pub async fn run<F, Fut>(&self, label: &str, mut op: F) -> Result<String, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, BackendError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(text) => {
                    if attempt > 1 {
                        debug!("[{}] 第 {} 次尝试成功", label, attempt);
                    }
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        "[{}] 第 {}/{} 次尝试瞬时失败: {}，{}ms 后重试",
                        label,
                        attempt,
                        self.max_attempts,
                        e.detail(),
                        self.delay.as_millis()
                    );
                    sleep(self.delay).await;
                }
                Err(e) => {
                    warn!(
                        "[{}] 调用失败 (已尝试 {} 次, {}): {}",
                        label,
                        attempt,
                        if e.is_transient() { "瞬时" } else { "永久" },
                        e.detail()
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn test_transient_failures_are_retried_until_success() {
        let attempts = Cell::new(0);
        let result = tokio_test::block_on(policy().run("测试", || {
            attempts.set(attempts.get() + 1);
            let n = attempts.get();
            async move {
                if n < 3 {
                    Err(BackendError::transient("连接超时"))
                } else {
                    Ok("成功".to_string())
                }
            }
        }));
        assert_eq!(result.unwrap(), "成功");
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_transient_failures_exhaust_attempts() {
        let attempts = Cell::new(0);
        let result = tokio_test::block_on(policy().run("测试", || {
            attempts.set(attempts.get() + 1);
            async { Err(BackendError::transient("连接超时")) }
        }));
        assert!(result.is_err());
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_permanent_failure_is_not_retried() {
        let attempts = Cell::new(0);
        let result = tokio_test::block_on(policy().run("测试", || {
            attempts.set(attempts.get() + 1);
            async { Err(BackendError::permanent("请求被拒绝")) }
        }));
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }
}
