//! Ollama LLM Client - 调用本地 Ollama 服务
//!
//! 本地推理没有厂商限流，不配限流器; schema 不下发
//! （Ollama 仅支持 format=json 约束），系统提示并入 prompt 正文

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::application::ports::{LlmEnginePort, LlmError};

/// Ollama 客户端配置
#[derive(Debug, Clone)]
pub struct OllamaClientConfig {
    pub base_url: String,
    pub model: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
    /// 瞬态错误的最大尝试次数
    pub max_attempts: u32,
}

impl Default for OllamaClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            timeout_secs: 120,
            max_attempts: 3,
        }
    }
}

/// Ollama 客户端
pub struct OllamaClient {
    client: Client,
    config: OllamaClientConfig,
}

impl OllamaClient {
    pub fn new(config: OllamaClientConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        tracing::info!(model = %config.model, url = %config.base_url, "LLM engine initialized (Ollama)");
        Ok(Self { client, config })
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.config.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

#[async_trait]
impl LlmEnginePort for OllamaClient {
    async fn generate_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _schema: &serde_json::Value,
    ) -> Result<String, LlmError> {
        // Ollama 在 prompt 内接收指令效果最好
        let full_prompt = format!("System: {}\n\nUser: {}", system_prompt, user_prompt);

        let body = json!({
            "model": self.config.model,
            "prompt": full_prompt,
            "stream": false,
            "format": "json"
        });

        let mut backoff = Duration::from_secs(1);

        for attempt in 1..=self.config.max_attempts {
            let response = self
                .client
                .post(self.generate_url())
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        LlmError::Timeout
                    } else {
                        LlmError::NetworkError(e.to_string())
                    }
                })?;

            let status = response.status();

            if status.as_u16() == 429 || status.as_u16() == 503 {
                let err = LlmError::ServiceError {
                    status: status.as_u16(),
                    message: "transient ollama error".to_string(),
                };
                if attempt == self.config.max_attempts {
                    return Err(err);
                }
                tracing::warn!(attempt = attempt, status = status.as_u16(), "Ollama transient error, backing off");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                continue;
            }

            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(LlmError::ServiceError {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: OllamaResponse = response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

            if parsed.response.is_empty() {
                return Err(LlmError::EmptyResponse);
            }
            return Ok(parsed.response);
        }

        Err(LlmError::EmptyResponse)
    }

    async fn health_check(&self) -> bool {
        match self.client.get(self.tags_url()).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
