//! Gemini LLM Client - 调用 Google Gemini generateContent API
//!
//! 实现 LlmEnginePort trait:
//! - 按模型配置每分钟限流与日配额（免费档的官方额度）
//! - 429/503 指数退避重试，优先采用 Retry-After 提示
//! - 其余错误不重试，立即上抛

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::super::rate_limit::{DailyQuota, RateLimiter};
use crate::application::ports::{LlmEnginePort, LlmError};

/// Gemini 客户端配置
#[derive(Debug, Clone)]
pub struct GeminiClientConfig {
    pub api_key: String,
    pub model: String,
    /// API 基础 URL（测试时指向本地桩服务）
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
    /// 瞬态错误的最大尝试次数
    pub max_attempts: u32,
}

impl Default for GeminiClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 60,
            max_attempts: 5,
        }
    }
}

/// Gemini 客户端
pub struct GeminiClient {
    client: Client,
    config: GeminiClientConfig,
    rpm_limiter: RateLimiter,
    daily_quota: DailyQuota,
}

impl GeminiClient {
    pub fn new(config: GeminiClientConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::NotConfigured("api key is not set".to_string()));
        }

        // 按模型配置限额
        let (rpm_limiter, daily_quota) = match config.model.as_str() {
            "gemini-2.5-flash-lite" => (RateLimiter::per_minute(15, 3), DailyQuota::new(1000)),
            "gemini-2.5-flash" => (RateLimiter::per_minute(10, 2), DailyQuota::new(200)),
            "gemini-2.5-pro" => (RateLimiter::per_minute(5, 1), DailyQuota::new(50)),
            "gemini-2.0-flash" => (RateLimiter::per_minute(10, 2), DailyQuota::new(0)),
            other => {
                return Err(LlmError::NotConfigured(format!(
                    "unsupported Gemini model: {}",
                    other
                )))
            }
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        tracing::info!(model = %config.model, "LLM engine initialized (Gemini)");
        Ok(Self {
            client,
            config,
            rpm_limiter,
            daily_quota,
        })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LlmEnginePort for GeminiClient {
    async fn generate_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<String, LlmError> {
        // 每分钟限流: 拿到令牌前挂起
        self.rpm_limiter.acquire().await;

        // 日配额: 耗尽立即失败
        self.daily_quota
            .try_acquire()
            .map_err(|e| LlmError::QuotaExhausted(e.to_string()))?;

        let body = json!({
            "system_instruction": { "parts": [{ "text": system_prompt }] },
            "contents": [{ "parts": [{ "text": user_prompt }] }],
            "generation_config": {
                "response_mime_type": "application/json",
                "response_schema": schema
            }
        });

        let mut backoff = Duration::from_secs(1);

        for attempt in 1..=self.config.max_attempts {
            let response = self
                .client
                .post(self.generate_url())
                .header("x-goog-api-key", &self.config.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        LlmError::Timeout
                    } else if e.is_connect() {
                        LlmError::NetworkError(format!("cannot connect to Gemini: {}", e))
                    } else {
                        LlmError::NetworkError(e.to_string())
                    }
                })?;

            let status = response.status();

            // 瞬态条件: 限流或服务暂不可用
            if status.as_u16() == 429 || status.as_u16() == 503 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                let err = if status.as_u16() == 429 {
                    LlmError::RateLimited { retry_after }
                } else {
                    LlmError::ServiceError {
                        status: status.as_u16(),
                        message: "service unavailable".to_string(),
                    }
                };

                if attempt == self.config.max_attempts {
                    return Err(err);
                }

                let delay = retry_after.unwrap_or(backoff);
                tracing::warn!(
                    attempt = attempt,
                    status = status.as_u16(),
                    delay_ms = delay.as_millis() as u64,
                    "Gemini transient error, backing off"
                );
                tokio::time::sleep(delay).await;
                backoff *= 2;
                continue;
            }

            // 非瞬态错误: 不重试
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(LlmError::ServiceError {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: GenerateResponse = response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

            for candidate in parsed.candidates {
                if let Some(content) = candidate.content {
                    for part in content.parts {
                        if !part.text.is_empty() {
                            return Ok(part.text);
                        }
                    }
                }
            }
            return Err(LlmError::EmptyResponse);
        }

        Err(LlmError::EmptyResponse)
    }

    async fn health_check(&self) -> bool {
        true
    }
}
