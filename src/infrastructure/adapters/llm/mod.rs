//! LLM Adapters - 文本生成适配器

mod fake_llm_client;
mod gemini_client;
mod ollama_client;

pub use fake_llm_client::FakeLlmClient;
pub use gemini_client::{GeminiClient, GeminiClientConfig};
pub use ollama_client::{OllamaClient, OllamaClientConfig};
