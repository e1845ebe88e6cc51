//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）:
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置:
/// 1. 环境变量（前缀 `BOOKFORGE_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `BOOKFORGE_LLM__PROVIDER=gemini`
/// - `BOOKFORGE_LLM__API_KEY=...`
/// - `BOOKFORGE_IMAGE__PROVIDER=hugging-face`
/// - `BOOKFORGE_DATABASE__PATH=/data/bookforge.db`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("llm.provider", "gemini")?
        .set_default("llm.api_key", "")?
        .set_default("llm.model", "gemini-2.0-flash")?
        .set_default("llm.timeout_secs", 60)?
        .set_default("llm.max_attempts", 5)?
        .set_default("image.provider", "fake")?
        .set_default("image.api_key", "")?
        .set_default("image.model", "stabilityai/stable-diffusion-xl-base-1.0")?
        .set_default("image.timeout_secs", 120)?
        .set_default("image.max_attempts", 5)?
        .set_default("storage.driver", "local")?
        .set_default("storage.uploads_dir", "data/uploads")?
        .set_default("storage.max_upload_size", 50 * 1024 * 1024)?
        .set_default("database.path", "data/bookforge.db")?
        .set_default("database.max_connections", 5)?
        .set_default("worker.count", 2)?
        .set_default("worker.queue_size", 32)?
        .set_default("pipeline.max_retries", 3)?
        .set_default("pipeline.retry_delay_secs", 5)?
        .set_default("pipeline.rate_limit_cooldown_secs", 60)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    builder = builder.add_source(
        Environment::with_prefix("BOOKFORGE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::ParseError(format!("Failed to deserialize config: {}", e)))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.database.path.is_empty() {
        return Err(ConfigError::ValidationError(
            "Database path cannot be empty".to_string(),
        ));
    }

    if config.worker.count == 0 {
        return Err(ConfigError::ValidationError(
            "Worker count cannot be 0".to_string(),
        ));
    }

    if config.worker.queue_size == 0 {
        return Err(ConfigError::ValidationError(
            "Worker queue size cannot be 0".to_string(),
        ));
    }

    if config.pipeline.max_retries == 0 {
        return Err(ConfigError::ValidationError(
            "Pipeline max_retries cannot be 0".to_string(),
        ));
    }

    if config.llm.model.is_empty() {
        return Err(ConfigError::ValidationError(
            "LLM model cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("LLM Provider: {:?}", config.llm.provider);
    tracing::info!("LLM Model: {}", config.llm.model);
    tracing::info!("Image Provider: {:?}", config.image.provider);
    tracing::info!("Image Model: {}", config.image.model);
    tracing::info!("Storage Driver: {:?}", config.storage.driver);
    tracing::info!("Uploads Directory: {:?}", config.storage.uploads_dir);
    tracing::info!("Database: {}", config.database.path);
    tracing::info!("Workers: {}", config.worker.count);
    tracing::info!("Queue Size: {}", config.worker.queue_size);
    tracing::info!("Pipeline Retries: {}", config.pipeline.max_retries);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_passes_for_default_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_empty_db_path() {
        let mut config = AppConfig::default();
        config.database.path = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_workers() {
        let mut config = AppConfig::default();
        config.worker.count = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_retries() {
        let mut config = AppConfig::default();
        config.pipeline.max_retries = 0;
        assert!(validate_config(&config).is_err());
    }
}
