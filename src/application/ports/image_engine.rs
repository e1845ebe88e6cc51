//! Image Engine Port - 图像生成抽象
//!
//! 定义文生图服务的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// 图像生成错误
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    /// 服务端限流，可携带服务端给出的重置提示
    #[error("Rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Service error (HTTP {status}): {message}")]
    ServiceError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Image engine not configured: {0}")]
    NotConfigured(String),
}

/// Image Engine Port
///
/// 外部图像生成服务的抽象接口
#[async_trait]
pub trait ImageEnginePort: Send + Sync {
    /// 按提示词生成图像，返回 base64 编码的图像数据或外部引用
    async fn generate_image(&self, prompt: &str) -> Result<String, ImageError>;

    /// 检查服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
