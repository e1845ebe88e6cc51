//! Local File Storage - 本地文件存储
//!
//! 上传稿件按 book_<id>/vol_<id>/source_file.<ext> 的层级落盘

use async_trait::async_trait;
use std::path::PathBuf;
use uuid::Uuid;

use crate::application::ports::{FileStoragePort, StorageError};

/// 本地文件存储
pub struct LocalFileStorage {
    base_path: PathBuf,
}

impl LocalFileStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }
}

#[async_trait]
impl FileStoragePort for LocalFileStorage {
    async fn save_book_file(
        &self,
        book_id: Uuid,
        volume_id: Uuid,
        file_name: &str,
        data: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let dir = self
            .base_path
            .join(format!("book_{}", book_id))
            .join(format!("vol_{}", volume_id));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::IoError(e.to_string()))?;

        // 保留扩展名，提取器之外的工具也能识别文件类型
        let target = match file_name.rsplit_once('.') {
            Some((_, ext)) => dir.join(format!("source_file.{}", ext.to_ascii_lowercase())),
            None => dir.join("source_file"),
        };

        tokio::fs::write(&target, data)
            .await
            .map_err(|e| StorageError::IoError(e.to_string()))?;

        tracing::debug!(path = %target.display(), size = data.len(), "Book file saved");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_book_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path());

        let book_id = Uuid::new_v4();
        let volume_id = Uuid::new_v4();
        let path = storage
            .save_book_file(book_id, volume_id, "Moby.EPUB", b"zip bytes")
            .await
            .unwrap();

        assert!(path.ends_with("source_file.epub"));
        assert!(path
            .to_string_lossy()
            .contains(&format!("book_{}", book_id)));
        assert_eq!(std::fs::read(&path).unwrap(), b"zip bytes");
    }
}
