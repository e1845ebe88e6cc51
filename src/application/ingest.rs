//! Ingest Service - 上传入库与任务提交
//!
//! 应用边界: 校验上传文件、落盘、创建卷记录、向调度器提交处理任务、
//! 对外投影任务进度

use std::sync::Arc;
use uuid::Uuid;

use super::error::ApplicationError;
use super::pipeline::VolumePipeline;
use super::ports::{
    BookRepositoryPort, FileStoragePort, JobQueuePort, ProcessingJob, VolumeRecord,
    VolumeRepositoryPort,
};
use crate::domain::volume::FileFormat;
use serde::Serialize;

/// 任务进度投影
///
/// status 由进度推导: 100 -> completed, 负值 -> error, 其余 -> processing
#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub percent: i32,
    pub status: &'static str,
}

impl TaskProgress {
    pub fn from_percent(percent: i32) -> Self {
        let status = if percent >= 100 {
            "completed"
        } else if percent < 0 {
            "error"
        } else {
            "processing"
        };
        Self { percent, status }
    }
}

/// Ingest Service
pub struct IngestService {
    storage: Arc<dyn FileStoragePort>,
    volume_repo: Arc<dyn VolumeRepositoryPort>,
    book_repo: Arc<dyn BookRepositoryPort>,
    queue: Arc<dyn JobQueuePort>,
    pipeline: Arc<VolumePipeline>,
}

impl IngestService {
    pub fn new(
        storage: Arc<dyn FileStoragePort>,
        volume_repo: Arc<dyn VolumeRepositoryPort>,
        book_repo: Arc<dyn BookRepositoryPort>,
        queue: Arc<dyn JobQueuePort>,
        pipeline: Arc<VolumePipeline>,
    ) -> Self {
        Self {
            storage,
            volume_repo,
            book_repo,
            queue,
            pipeline,
        }
    }

    /// 接收上传稿件: 校验格式、落盘、创建卷记录
    ///
    /// 不支持的格式与空文件在这里同步拒绝，不会产生任务
    pub async fn upload_volume(
        &self,
        book_id: Uuid,
        file_name: &str,
        volume_no: usize,
        data: &[u8],
    ) -> Result<VolumeRecord, ApplicationError> {
        if data.is_empty() {
            return Err(ApplicationError::validation("uploaded file is empty"));
        }

        let format = FileFormat::from_file_name(file_name).ok_or_else(|| {
            ApplicationError::validation(format!("unsupported file format: {}", file_name))
        })?;

        if self.book_repo.find_by_id(book_id).await?.is_none() {
            return Err(ApplicationError::not_found("Book", book_id));
        }

        let volume_id = Uuid::new_v4();
        let path = self
            .storage
            .save_book_file(book_id, volume_id, file_name, data)
            .await?;

        let title = file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(file_name);

        let mut volume = VolumeRecord::new(book_id, title, volume_no, path, format);
        volume.id = volume_id;
        self.volume_repo.save(&volume).await?;

        tracing::info!(
            volume_id = %volume.id,
            book_id = %book_id,
            format = format.as_str(),
            size = data.len(),
            "Volume uploaded"
        );
        Ok(volume)
    }

    /// 提交完整处理任务，返回任务 ID（parse-vol-<volume_id>）
    ///
    /// 队列满时同步返回拒绝错误，调用方可稍后重试
    pub async fn start_processing(&self, volume_id: Uuid) -> Result<String, ApplicationError> {
        self.ensure_volume_exists(volume_id).await?;

        let job_id = format!("parse-vol-{}", volume_id);
        let pipeline = self.pipeline.clone();

        let job = ProcessingJob::new(job_id.clone(), move |reporter| async move {
            pipeline
                .process_volume(volume_id, &reporter)
                .await
                .map_err(anyhow::Error::from)
        });

        self.queue.enqueue(job)?;
        tracing::info!(job_id = %job_id, "Processing job enqueued");
        Ok(job_id)
    }

    /// 提交场景重新生成任务（scenes-vol-<volume_id>）
    pub async fn retry_scenes(&self, volume_id: Uuid) -> Result<String, ApplicationError> {
        self.ensure_volume_exists(volume_id).await?;

        let job_id = format!("scenes-vol-{}", volume_id);
        let pipeline = self.pipeline.clone();

        let job = ProcessingJob::new(job_id.clone(), move |reporter| async move {
            pipeline
                .retry_scene_generation(volume_id, &reporter)
                .await
                .map_err(anyhow::Error::from)
        });

        self.queue.enqueue(job)?;
        tracing::info!(job_id = %job_id, "Scene retry job enqueued");
        Ok(job_id)
    }

    /// 提交图像重新生成任务（images-vol-<volume_id>）
    pub async fn retry_images(&self, volume_id: Uuid) -> Result<String, ApplicationError> {
        self.ensure_volume_exists(volume_id).await?;

        let job_id = format!("images-vol-{}", volume_id);
        let pipeline = self.pipeline.clone();

        let job = ProcessingJob::new(job_id.clone(), move |reporter| async move {
            pipeline
                .retry_image_generation(volume_id, &reporter)
                .await
                .map_err(anyhow::Error::from)
        });

        self.queue.enqueue(job)?;
        tracing::info!(job_id = %job_id, "Image retry job enqueued");
        Ok(job_id)
    }

    /// 查询任务进度投影
    ///
    /// 未知任务（从未投递或已被拒绝）按 0/processing 返回
    pub fn task_progress(&self, job_id: &str) -> TaskProgress {
        let percent = self.queue.progress(job_id).unwrap_or(0);
        TaskProgress::from_percent(percent)
    }

    async fn ensure_volume_exists(&self, volume_id: Uuid) -> Result<(), ApplicationError> {
        if self.volume_repo.find_by_id(volume_id).await?.is_none() {
            return Err(ApplicationError::not_found("Volume", volume_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_progress_projection() {
        assert_eq!(TaskProgress::from_percent(0).status, "processing");
        assert_eq!(TaskProgress::from_percent(45).status, "processing");
        assert_eq!(TaskProgress::from_percent(100).status, "completed");
        assert_eq!(TaskProgress::from_percent(-1).status, "error");
    }
}
