//! Enhancement Pipeline - 增强管线
//!
//! 驱动一卷稿件走完全部处理阶段:
//! 1. 结构解析 (0-30%): 提取器 + LLM 元数据推断 + 入库
//! 2. 场景生成 (30-60%): 按章调用 LLM 生成场景
//! 3. 图像生成 (60-95%): 按场景提示词生成配图
//! 4. 收尾: completed / progress 100 / 完成时间
//!
//! 失败语义:
//! - 结构解析失败中止整卷（卷置 error）
//! - 单章场景生成重试耗尽后跳过该章，管线继续
//! - 单场景图像生成重试耗尽后跳过该场景，阶段整体失败也不置 error

mod image_gen;
mod metadata;
mod orchestrator;
mod scene_gen;
pub mod schema;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::application::ports::{
    BookRepositoryPort, ExtractError, ImageEnginePort, LlmEnginePort, LlmError, RepositoryError,
    VolumeExtractorPort, VolumeRepositoryPort,
};
use crate::domain::volume::VolumeStatus;

/// 管线错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Volume not found: {0}")]
    VolumeNotFound(Uuid),

    #[error("Invalid status transition: {} -> {}", .from.as_str(), .to.as_str())]
    InvalidTransition {
        from: VolumeStatus,
        to: VolumeStatus,
    },

    #[error("Structural parse failed: {0}")]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("LLM generation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("No chapters found for volume {0}")]
    NoChapters(Uuid),
}

impl PipelineError {
    /// 是否为服务端限流（重试时采用固定冷却）
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PipelineError::Llm(e) if e.is_rate_limited())
    }
}

/// 管线配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 单章场景生成 / 单场景图像生成的最大尝试次数
    pub max_retries: u32,
    /// 指数退避基础间隔
    pub retry_delay: Duration,
    /// 命中服务端限流时的固定冷却时长
    pub rate_limit_cooldown: Duration,
    /// 元数据推断的调用截止时间
    pub metadata_timeout: Duration,
    /// 场景生成的调用截止时间
    pub scene_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            rate_limit_cooldown: Duration::from_secs(60),
            metadata_timeout: Duration::from_secs(30),
            scene_timeout: Duration::from_secs(60),
        }
    }
}

/// 增强管线
///
/// 持有全部出站端口; 卷状态只由它变更
pub struct VolumePipeline {
    volume_repo: Arc<dyn VolumeRepositoryPort>,
    book_repo: Arc<dyn BookRepositoryPort>,
    extractor: Arc<dyn VolumeExtractorPort>,
    llm: Arc<dyn LlmEnginePort>,
    image: Arc<dyn ImageEnginePort>,
    config: PipelineConfig,
}

impl VolumePipeline {
    pub fn new(
        volume_repo: Arc<dyn VolumeRepositoryPort>,
        book_repo: Arc<dyn BookRepositoryPort>,
        extractor: Arc<dyn VolumeExtractorPort>,
        llm: Arc<dyn LlmEnginePort>,
        image: Arc<dyn ImageEnginePort>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            volume_repo,
            book_repo,
            extractor,
            llm,
            image,
            config,
        }
    }

    /// 带截止时间的 LLM 调用
    async fn generate_json_with_deadline(
        &self,
        deadline: Duration,
        system_prompt: &str,
        user_prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<String, LlmError> {
        match tokio::time::timeout(
            deadline,
            self.llm.generate_json(system_prompt, user_prompt, schema),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout),
        }
    }
}
