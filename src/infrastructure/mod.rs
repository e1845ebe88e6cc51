//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现

pub mod adapters;
pub mod extractor;
pub mod persistence;
pub mod worker;

pub use extractor::FileExtractor;
pub use worker::{DispatcherConfig, DispatcherHandle, JobDispatcher};
