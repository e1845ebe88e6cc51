//! Bookforge - 稿件结构化与 AI 增强系统
//!
//! 架构设计: Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Volume Context: 卷/章/节结构与状态机
//! - 章节检测器: 纯文本的结构推断
//!
//! 应用层 (application/):
//! - Ports: 端口定义（Repository, LlmEngine, ImageEngine, FileStorage,
//!   VolumeExtractor, JobQueue）
//! - Pipeline: 增强管线（解析 -> 元数据推断 -> 场景生成 -> 图像生成）
//! - Ingest: 上传入库与任务提交
//!
//! 基础设施层 (infrastructure/):
//! - Extractor: EPUB/TXT/PDF 结构提取
//! - Adapters: Gemini/Ollama/HuggingFace 客户端、限流器、本地存储
//! - Worker: JobDispatcher 后台任务调度
//! - Persistence: SQLite 存储

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
