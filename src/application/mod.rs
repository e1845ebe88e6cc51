//! 应用层 - 用例编排
//!
//! 包含:
//! - ports: 六边形架构端口定义（Repository、LlmEngine、ImageEngine、
//!   FileStorage、VolumeExtractor、JobQueue）
//! - pipeline: 增强管线（解析 -> 场景生成 -> 图像生成）
//! - ingest: 上传入库与任务提交
//! - error: 应用层错误定义

pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod ports;

pub use error::ApplicationError;
pub use ingest::{IngestService, TaskProgress};
pub use pipeline::{PipelineConfig, PipelineError, VolumePipeline};
