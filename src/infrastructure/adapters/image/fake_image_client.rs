//! Fake Image Client - 用于测试与离线运行的图像客户端
//!
//! 始终返回固定的 base64 载荷，或按配置始终失败; 记录调用次数供断言

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::application::ports::{ImageEnginePort, ImageError};

/// 1x1 透明 PNG，离线运行时的占位图
const PLACEHOLDER_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

enum FakeImageMode {
    Fixed(String),
    AlwaysFail(String),
}

/// Fake Image Client
pub struct FakeImageClient {
    mode: FakeImageMode,
    calls: AtomicU32,
}

impl FakeImageClient {
    /// 始终返回同一段 base64 数据
    pub fn with_fixed(image_base64: impl Into<String>) -> Self {
        Self {
            mode: FakeImageMode::Fixed(image_base64.into()),
            calls: AtomicU32::new(0),
        }
    }

    /// 使用内置占位图
    pub fn with_placeholder() -> Self {
        Self::with_fixed(PLACEHOLDER_PNG_BASE64)
    }

    /// 每次调用都失败
    pub fn always_failing(message: impl Into<String>) -> Self {
        Self {
            mode: FakeImageMode::AlwaysFail(message.into()),
            calls: AtomicU32::new(0),
        }
    }

    /// 已发生的调用次数
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageEnginePort for FakeImageClient {
    async fn generate_image(&self, prompt: &str) -> Result<String, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(prompt_len = prompt.len(), "FakeImageClient called");

        match &self.mode {
            FakeImageMode::Fixed(image) => Ok(image.clone()),
            FakeImageMode::AlwaysFail(message) => Err(ImageError::ServiceError {
                status: 500,
                message: message.clone(),
            }),
        }
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_mode_counts_calls() {
        let client = FakeImageClient::with_fixed("abc123");
        assert_eq!(client.generate_image("p").await.unwrap(), "abc123");
        assert_eq!(client.generate_image("p").await.unwrap(), "abc123");
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_always_failing_mode() {
        let client = FakeImageClient::always_failing("boom");
        assert!(client.generate_image("p").await.is_err());
        assert_eq!(client.calls(), 1);
    }
}
