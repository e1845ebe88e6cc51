//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod extractor;
mod file_storage;
mod image_engine;
mod job_queue;
mod llm_engine;
mod repositories;

pub use extractor::{ExtractError, VolumeExtractorPort};
pub use file_storage::{FileStoragePort, StorageError};
pub use image_engine::{ImageEnginePort, ImageError};
pub use job_queue::{DispatchError, JobQueuePort, ProcessingJob, ProgressReporter};
pub use llm_engine::{LlmEnginePort, LlmError};
pub use repositories::{
    BookRecord, BookRepositoryPort, BookStatus, ChapterRecord, ChapterWithSections,
    RepositoryError, SceneRecord, SectionRecord, VolumeRecord, VolumeRepositoryPort,
};
