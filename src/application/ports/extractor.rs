//! Extractor Port - 结构提取抽象
//!
//! 把原始稿件文件解码为结构化文档树（章 -> 节），按声明的文件格式分派

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use crate::domain::volume::{FileFormat, ParsedVolume};

/// 结构提取错误
///
/// 任何一种都会中止整卷管线并把卷置为 error
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// EPUB 包内缺少 OPF 包描述文件
    #[error("Package document (.opf) not found in EPUB")]
    MissingPackageDocument,

    #[error("Failed to parse package document: {0}")]
    InvalidPackageDocument(String),

    /// 遍历完 spine 后没有提取到任何内容
    #[error("No content extracted from EPUB")]
    NoContent,

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// Volume Extractor Port
#[async_trait]
pub trait VolumeExtractorPort: Send + Sync {
    /// 解析文件为结构化文档树
    async fn extract(
        &self,
        path: &Path,
        format: FileFormat,
    ) -> Result<ParsedVolume, ExtractError>;
}
