//! Hugging Face Image Client - 调用 HF Inference API 生成图像
//!
//! 实现 ImageEnginePort trait:
//! - 令牌桶限流（2 req/s，突发 5）
//! - 429 优先采用 RateLimit 头的重置提示，503 指数退避，有限次重试
//! - 200 但返回 JSON 内容视为服务端错误载荷，不重试
//! - 成功时返回 base64 编码的图像字节

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use super::super::rate_limit::RateLimiter;
use crate::application::ports::{ImageEnginePort, ImageError};

/// Hugging Face 图像客户端配置
#[derive(Debug, Clone)]
pub struct HuggingFaceImageConfig {
    pub api_key: String,
    pub model: String,
    /// 模型推理 API 基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
    /// 最大尝试次数
    pub max_attempts: u32,
}

impl Default for HuggingFaceImageConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "stabilityai/stable-diffusion-xl-base-1.0".to_string(),
            base_url: "https://api-inference.huggingface.co/models".to_string(),
            timeout_secs: 120,
            max_attempts: 5,
        }
    }
}

/// Hugging Face 图像客户端
pub struct HuggingFaceImageClient {
    client: Client,
    config: HuggingFaceImageConfig,
    limiter: RateLimiter,
}

impl HuggingFaceImageClient {
    pub fn new(config: HuggingFaceImageConfig) -> Result<Self, ImageError> {
        if config.api_key.is_empty() {
            return Err(ImageError::NotConfigured("api key is missing".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ImageError::NetworkError(e.to_string()))?;

        tracing::info!(model = %config.model, "Image engine initialized (Hugging Face)");
        Ok(Self {
            client,
            config,
            // 2 req/s，突发 5
            limiter: RateLimiter::new(Duration::from_millis(500), 5),
        })
    }

    fn infer_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl ImageEnginePort for HuggingFaceImageClient {
    async fn generate_image(&self, prompt: &str) -> Result<String, ImageError> {
        self.limiter.acquire().await;

        // wait_for_model 让服务端在模型加载时挂起而不是直接 503
        let body = json!({
            "inputs": prompt,
            "options": { "wait_for_model": true }
        });

        let mut last_err: Option<ImageError> = None;

        for attempt in 1..=self.config.max_attempts {
            let response = self
                .client
                .post(self.infer_url())
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ImageError::Timeout
                    } else {
                        ImageError::NetworkError(e.to_string())
                    }
                })?;

            let status = response.status();

            if status.is_success() {
                // 200 但内容是 JSON: 服务端以错误载荷响应
                let content_type = response
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| ImageError::InvalidResponse(e.to_string()))?;

                if content_type.contains("application/json") {
                    return Err(ImageError::InvalidResponse(format!(
                        "API returned JSON instead of image: {}",
                        String::from_utf8_lossy(&bytes)
                    )));
                }
                return Ok(BASE64.encode(&bytes));
            }

            // 限流: 优先采用服务端的重置提示
            if status.as_u16() == 429 {
                let reset = response
                    .headers()
                    .get("RateLimit")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_reset_seconds);

                last_err = Some(ImageError::RateLimited {
                    retry_after: reset.map(Duration::from_secs),
                });

                if attempt < self.config.max_attempts {
                    let delay = match reset {
                        Some(secs) => Duration::from_secs(secs),
                        None => Duration::from_secs(2u64.pow(attempt)),
                    };
                    tracing::warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Image provider rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            // 模型加载/服务暂不可用
            if status.as_u16() == 503 {
                last_err = Some(ImageError::ServiceError {
                    status: 503,
                    message: "model loading".to_string(),
                });
                if attempt < self.config.max_attempts {
                    let delay = Duration::from_secs(2u64.pow(attempt));
                    tracing::warn!(attempt = attempt, "Image provider unavailable, backing off");
                    tokio::time::sleep(delay).await;
                }
                continue;
            }

            // 其余错误不重试
            let message = response.text().await.unwrap_or_default();
            return Err(ImageError::ServiceError {
                status: status.as_u16(),
                message,
            });
        }

        Err(last_err.unwrap_or_else(|| {
            ImageError::ServiceError {
                status: 0,
                message: "retries exhausted".to_string(),
            }
        }))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// 解析 HF RateLimit 头的重置秒数，如 `"api|resolvers";r=0;t=23`
fn parse_reset_seconds(header: &str) -> Option<u64> {
    header.split(';').find_map(|part| {
        part.trim()
            .strip_prefix("t=")
            .and_then(|v| v.parse::<u64>().ok())
    })
}
