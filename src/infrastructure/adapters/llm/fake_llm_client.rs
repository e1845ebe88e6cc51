//! Fake LLM Client - 用于测试与离线运行的 LLM 客户端
//!
//! 按脚本顺序回放预置的响应/错误，脚本耗尽后返回固定 JSON;
//! 记录调用次数供断言

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::application::ports::{LlmEnginePort, LlmError};

/// Fake LLM Client
pub struct FakeLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: String,
    calls: AtomicU32,
}

impl FakeLlmClient {
    /// 始终返回同一段 JSON
    pub fn with_fixed(json: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: json.into(),
            calls: AtomicU32::new(0),
        }
    }

    /// 先按脚本回放，耗尽后回落到固定 JSON
    pub fn with_script(
        script: Vec<Result<String, LlmError>>,
        fallback: impl Into<String>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: fallback.into(),
            calls: AtomicU32::new(0),
        }
    }

    /// 追加一条脚本响应
    pub fn push_response(&self, response: Result<String, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
    }

    /// 已发生的调用次数
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmEnginePort for FakeLlmClient {
    async fn generate_json(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _schema: &serde_json::Value,
    ) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            prompt_len = user_prompt.len(),
            "FakeLlmClient: replaying scripted response"
        );

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(response) => response,
            None => Ok(self.fallback.clone()),
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
    async fn test_script_then_fallback() {
        let client = FakeLlmClient::with_script(
            vec![
                Err(LlmError::RateLimited { retry_after: None }),
                Ok(r#"{"first":1}"#.to_string()),
            ],
            r#"{"fallback":true}"#,
        );

        let schema = serde_json::json!({});
        assert!(client.generate_json("s", "u", &schema).await.is_err());
        assert_eq!(
            client.generate_json("s", "u", &schema).await.unwrap(),
            r#"{"first":1}"#
        );
        assert_eq!(
            client.generate_json("s", "u", &schema).await.unwrap(),
            r#"{"fallback":true}"#
        );
        assert_eq!(client.calls(), 3);
    }
}
