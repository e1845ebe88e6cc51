//! File Storage Port - 原始文件存储抽象
//!
//! 定义上传稿件落盘的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// 存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Storage path unavailable: {0}")]
    Unavailable(String),
}

/// File Storage Port
#[async_trait]
pub trait FileStoragePort: Send + Sync {
    /// 保存一卷的原始文件，返回落盘路径
    async fn save_book_file(
        &self,
        book_id: Uuid,
        volume_id: Uuid,
        file_name: &str,
        data: &[u8],
    ) -> Result<PathBuf, StorageError>;
}
