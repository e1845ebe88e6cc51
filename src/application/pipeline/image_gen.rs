//! 图像生成阶段 (60-95%)

use uuid::Uuid;

use super::{PipelineError, VolumePipeline};
use crate::application::ports::{ImageError, ProgressReporter};

/// 图像阶段的进度区间
const IMAGE_PROGRESS_BASE: usize = 60;
const IMAGE_PROGRESS_RANGE: usize = 35;

impl VolumePipeline {
    /// 为卷内所有缺图的场景生成图像
    ///
    /// 单场景重试耗尽后留空继续; 本阶段失败从不把卷置为 error
    pub(super) async fn generate_images_for_volume(
        &self,
        volume_id: Uuid,
        reporter: &ProgressReporter,
    ) -> Result<(), PipelineError> {
        tracing::info!(volume_id = %volume_id, "Generating images");

        let scenes = self.volume_repo.find_scenes_without_image(volume_id).await?;
        if scenes.is_empty() {
            tracing::info!(volume_id = %volume_id, "No scenes requiring images");
            return Ok(());
        }

        let total = scenes.len();
        for (i, scene) in scenes.iter().enumerate() {
            let image = match self.generate_image_with_retry(&scene.image_prompt).await {
                Ok(image) => image,
                Err(e) => {
                    tracing::error!(
                        scene_id = %scene.id,
                        error = %e,
                        "Image generation exhausted retries, leaving scene without image"
                    );
                    continue;
                }
            };

            if let Err(e) = self.volume_repo.set_scene_image(scene.id, &image).await {
                tracing::error!(scene_id = %scene.id, error = %e, "Failed to save scene image");
                continue;
            }

            let progress = IMAGE_PROGRESS_BASE + (i + 1) * IMAGE_PROGRESS_RANGE / total;
            reporter.report(progress as i32);
        }

        Ok(())
    }

    /// 带指数退避的单场景图像生成
    pub async fn generate_image_with_retry(&self, prompt: &str) -> Result<String, ImageError> {
        let mut last_err: Option<ImageError> = None;

        for attempt in 1..=self.config.max_retries {
            match self.image.generate_image(prompt).await {
                Ok(image) => return Ok(image),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "Image generation attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < self.config.max_retries {
                        let delay = self.config.retry_delay * 2u32.pow(attempt.saturating_sub(1));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ImageError::InvalidResponse("no attempts made".into())))
    }
}
