//! Structural Extractor - 结构提取器
//!
//! 按声明的文件格式把原始稿件解码为章/节文档树:
//! - EPUB: zip 包 + OPF 元数据 + spine 顺序拼接内容
//! - TXT: 原文直接送入章节检测
//! - PDF: 显式拒绝（文本提取未实现）

mod epub;
mod pdf;
mod text;

use async_trait::async_trait;
use std::path::Path;

use crate::application::ports::{ExtractError, VolumeExtractorPort};
use crate::domain::volume::{FileFormat, ParsedVolume};

/// 基于文件格式分派的结构提取器
#[derive(Debug, Default)]
pub struct FileExtractor;

impl FileExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VolumeExtractorPort for FileExtractor {
    async fn extract(
        &self,
        path: &Path,
        format: FileFormat,
    ) -> Result<ParsedVolume, ExtractError> {
        match format {
            FileFormat::Epub => {
                tracing::info!(path = %path.display(), "Parsing EPUB");
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|e| ExtractError::IoError(e.to_string()))?;
                epub::parse(&data)
            }
            FileFormat::Txt => {
                tracing::info!(path = %path.display(), "Parsing plain text file");
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|e| ExtractError::IoError(e.to_string()))?;
                Ok(text::parse(&String::from_utf8_lossy(&data)))
            }
            FileFormat::Pdf => {
                tracing::warn!(path = %path.display(), "PDF text extraction is not implemented");
                pdf::parse(path)
            }
        }
    }
}
