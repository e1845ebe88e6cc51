//! LLM Engine Port - 结构化文本生成抽象
//!
//! 定义 LLM 结构化 JSON 生成的抽象接口，具体实现在 infrastructure/adapters 层
//! 任何实现都必须自带请求超时、速率限制与瞬态错误重试

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// LLM 错误
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    /// 服务端限流（HTTP 429 或等价信号），可携带服务端给出的重置提示
    #[error("Rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    /// 本地日配额耗尽，与每分钟限流相互独立
    #[error("Daily quota exceeded: {0}")]
    QuotaExhausted(String),

    #[error("Service error (HTTP {status}): {message}")]
    ServiceError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty response from llm")]
    EmptyResponse,

    #[error("LLM engine not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// 是否为服务端限流（管线据此采用更长的固定冷却而非指数退避）
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }
}

/// LLM Engine Port
///
/// 外部文本生成服务的抽象接口
#[async_trait]
pub trait LlmEnginePort: Send + Sync {
    /// 按约束 schema 生成结构化 JSON
    ///
    /// schema 为 JSON Schema 字面值；返回值是未解析的 JSON 字符串，
    /// 由调用方按自身的响应类型反序列化
    async fn generate_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<String, LlmError>;

    /// 检查服务是否可用
    async fn health_check(&self) -> bool {
        true // 默认实现
    }
}
