//! Configuration Types
//!
//! 定义所有配置结构体
//!
//! provider/driver 开关是封闭的枚举集合，启动时一次性解析成具体适配器，
//! 下游只依赖端口接口

use serde::Deserialize;
use std::path::PathBuf;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// LLM 引擎配置
    #[serde(default)]
    pub llm: LlmConfig,

    /// 图像引擎配置
    #[serde(default)]
    pub image: ImageConfig,

    /// 文件存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,

    /// 任务调度配置
    #[serde(default)]
    pub worker: WorkerConfig,

    /// 管线重试配置
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// LLM 提供方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LlmProvider {
    Gemini,
    Ollama,
    /// 离线/测试: 回放固定响应
    Fake,
}

/// LLM 引擎配置
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: LlmProvider,

    /// API 密钥（gemini 必填）
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// 服务地址覆盖（ollama 本地地址或测试桩）
    #[serde(default)]
    pub base_url: Option<String>,

    /// 请求超时时间（秒）
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// 瞬态错误的最大尝试次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_llm_provider() -> LlmProvider {
    LlmProvider::Gemini
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    5
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: String::new(),
            model: default_llm_model(),
            base_url: None,
            timeout_secs: default_llm_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// 图像提供方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageProvider {
    HuggingFace,
    /// 离线/测试: 返回占位图
    Fake,
}

/// 图像引擎配置
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_provider")]
    pub provider: ImageProvider,

    /// API 密钥（hugging-face 必填）
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_image_model")]
    pub model: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,

    /// 最大尝试次数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_image_provider() -> ImageProvider {
    ImageProvider::Fake
}

fn default_image_model() -> String {
    "stabilityai/stable-diffusion-xl-base-1.0".to_string()
}

fn default_image_timeout() -> u64 {
    120
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            provider: default_image_provider(),
            api_key: String::new(),
            model: default_image_model(),
            timeout_secs: default_image_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// 存储驱动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageDriver {
    Local,
}

/// 文件存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_driver")]
    pub driver: StorageDriver,

    /// 上传稿件存储目录
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,

    /// 上传文件最大大小（字节）
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

fn default_storage_driver() -> StorageDriver {
    StorageDriver::Local
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("data/uploads")
}

fn default_max_upload_size() -> u64 {
    50 * 1024 * 1024 // 50 MB
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: default_storage_driver(),
            uploads_dir: default_uploads_dir(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库文件路径
    #[serde(default = "default_db_path")]
    pub path: String,

    /// 最大连接数
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "data/bookforge.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// 获取数据库 URL
    pub fn database_url(&self) -> String {
        format!("sqlite:{}?mode=rwc", self.path)
    }
}

/// 任务调度配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// 并发 worker 数
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// 任务队列容量（满时投递被拒绝）
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

fn default_worker_count() -> usize {
    2
}

fn default_queue_size() -> usize {
    32
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            queue_size: default_queue_size(),
        }
    }
}

/// 管线重试配置
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// 单章/单场景的最大尝试次数
    #[serde(default = "default_pipeline_retries")]
    pub max_retries: u32,

    /// 指数退避基础间隔（秒）
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// 命中限流后的固定冷却（秒）
    #[serde(default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown_secs: u64,
}

fn default_pipeline_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_rate_limit_cooldown() -> u64 {
    60
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_retries: default_pipeline_retries(),
            retry_delay_secs: default_retry_delay(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.image.provider, ImageProvider::Fake);
        assert_eq!(config.database.path, "data/bookforge.db");
        assert_eq!(config.worker.count, 2);
        assert_eq!(config.pipeline.max_retries, 3);
    }

    #[test]
    fn test_database_url() {
        let config = DatabaseConfig::default();
        assert_eq!(config.database_url(), "sqlite:data/bookforge.db?mode=rwc");
    }

    #[test]
    fn test_provider_enums_parse_kebab_case() {
        let llm: LlmProvider = serde_json::from_str(r#""gemini""#).unwrap();
        assert_eq!(llm, LlmProvider::Gemini);
        let image: ImageProvider = serde_json::from_str(r#""hugging-face""#).unwrap();
        assert_eq!(image, ImageProvider::HuggingFace);
        assert!(serde_json::from_str::<LlmProvider>(r#""unknown""#).is_err());
    }
}
