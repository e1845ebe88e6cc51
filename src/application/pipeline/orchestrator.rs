//! 管线主流程 - 阶段编排与状态转换

use chrono::Utc;
use uuid::Uuid;

use super::{PipelineError, VolumePipeline};
use crate::application::ports::{
    ChapterRecord, ProgressReporter, SectionRecord, VolumeRecord,
};
use crate::domain::volume::{ChapterStatus, ParsedVolume, SectionStatus, VolumeStatus};

impl VolumePipeline {
    /// 完整处理一卷: 解析 -> 场景生成 -> 图像生成 -> 收尾
    ///
    /// 进度区间: 解析 0-30，场景 30-60，图像 60-95，收尾 100
    pub async fn process_volume(
        &self,
        volume_id: Uuid,
        reporter: &ProgressReporter,
    ) -> Result<(), PipelineError> {
        tracing::info!(volume_id = %volume_id, "Starting volume processing pipeline");

        // Phase 1: 结构解析 (0-30%)
        self.transition(volume_id, VolumeStatus::Parsing, 0).await?;
        reporter.report(5);

        let volume = self
            .volume_repo
            .find_by_id(volume_id)
            .await?
            .ok_or(PipelineError::VolumeNotFound(volume_id))?;

        let mut parsed = match self.extractor.extract(&volume.file_path, volume.file_format).await
        {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!(volume_id = %volume_id, error = %e, "Structural parse failed");
                self.volume_repo.mark_error(volume_id, &e.to_string()).await?;
                return Err(e.into());
            }
        };
        reporter.report(20);

        // 标题或作者缺失时用 LLM 推断补全（失败不致命）
        if parsed.detected_title.is_empty() || parsed.detected_author.is_empty() {
            self.infer_metadata(volume_id, &mut parsed).await;
        }
        reporter.report(25);

        if let Err(e) = self.persist_structure(&volume, &parsed).await {
            self.volume_repo.mark_error(volume_id, &e.to_string()).await?;
            return Err(e);
        }
        self.transition(volume_id, VolumeStatus::Parsed, 30).await?;
        self.propagate_metadata(&volume, &parsed).await?;
        reporter.report(30);

        // Phase 2: 场景生成 (30-60%)
        self.transition(volume_id, VolumeStatus::Enhancing, 30).await?;
        if let Err(e) = self.generate_scenes_for_volume(volume_id, reporter).await {
            tracing::error!(volume_id = %volume_id, error = %e, "Scene generation failed");
            self.volume_repo
                .mark_error(volume_id, &format!("Scene generation failed: {}", e))
                .await?;
            return Err(e);
        }
        reporter.report(60);

        // Phase 3: 图像生成 (60-95%)，整体失败不中止卷
        if let Err(e) = self.generate_images_for_volume(volume_id, reporter).await {
            tracing::warn!(
                volume_id = %volume_id,
                error = %e,
                "Image generation failed, continuing"
            );
        }
        reporter.report(95);

        // 收尾
        self.ensure_transition_allowed(volume_id, VolumeStatus::Completed).await?;
        self.volume_repo.mark_completed(volume_id, Utc::now()).await?;
        reporter.report(100);

        tracing::info!(volume_id = %volume_id, "Volume processing completed");
        Ok(())
    }

    /// 场景重新生成: 清空既有场景、重置章/节状态后重跑场景阶段
    ///
    /// 可独立于完整重处理使用（从 completed/error 重新进入 enhancing）
    pub async fn retry_scene_generation(
        &self,
        volume_id: Uuid,
        reporter: &ProgressReporter,
    ) -> Result<(), PipelineError> {
        tracing::info!(volume_id = %volume_id, "Retrying scene generation");

        self.transition(volume_id, VolumeStatus::Enhancing, 30).await?;

        let deleted = self.volume_repo.delete_scenes(volume_id).await?;
        self.volume_repo.reset_enhancement_status(volume_id).await?;
        tracing::debug!(volume_id = %volume_id, deleted = deleted, "Existing scenes cleared");

        if let Err(e) = self.generate_scenes_for_volume(volume_id, reporter).await {
            self.volume_repo
                .mark_error(volume_id, &format!("Scene generation failed: {}", e))
                .await?;
            return Err(e);
        }

        self.volume_repo.mark_completed(volume_id, Utc::now()).await?;
        reporter.report(100);
        Ok(())
    }

    /// 图像重新生成: 清空既有图像引用后重跑图像阶段
    ///
    /// 不改变卷状态（图像缺失从不把卷置为 error）
    pub async fn retry_image_generation(
        &self,
        volume_id: Uuid,
        reporter: &ProgressReporter,
    ) -> Result<(), PipelineError> {
        tracing::info!(volume_id = %volume_id, "Retrying image generation");

        let cleared = self.volume_repo.clear_scene_images(volume_id).await?;
        tracing::debug!(volume_id = %volume_id, cleared = cleared, "Scene images cleared");

        self.generate_images_for_volume(volume_id, reporter).await?;

        let volume = self
            .volume_repo
            .find_by_id(volume_id)
            .await?
            .ok_or(PipelineError::VolumeNotFound(volume_id))?;
        self.volume_repo
            .update_status(volume_id, volume.status, 100)
            .await?;
        reporter.report(100);
        Ok(())
    }

    /// 校验并执行状态转换
    ///
    /// 同状态调用只刷新进度; 不在允许边表内的转换一律拒绝
    pub(super) async fn transition(
        &self,
        volume_id: Uuid,
        next: VolumeStatus,
        progress: i32,
    ) -> Result<(), PipelineError> {
        let volume = self
            .volume_repo
            .find_by_id(volume_id)
            .await?
            .ok_or(PipelineError::VolumeNotFound(volume_id))?;

        if volume.status != next && !volume.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: volume.status,
                to: next,
            });
        }

        self.volume_repo.update_status(volume_id, next, progress).await?;
        tracing::debug!(
            volume_id = %volume_id,
            from = volume.status.as_str(),
            to = next.as_str(),
            progress = progress,
            "Volume status changed"
        );
        Ok(())
    }

    /// 只校验不写入（用于收尾前确认 completed 可达）
    async fn ensure_transition_allowed(
        &self,
        volume_id: Uuid,
        next: VolumeStatus,
    ) -> Result<(), PipelineError> {
        let volume = self
            .volume_repo
            .find_by_id(volume_id)
            .await?
            .ok_or(PipelineError::VolumeNotFound(volume_id))?;
        if volume.status != next && !volume.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: volume.status,
                to: next,
            });
        }
        Ok(())
    }

    /// 章/节结构入库并更新卷统计
    async fn persist_structure(
        &self,
        volume: &VolumeRecord,
        parsed: &ParsedVolume,
    ) -> Result<(), PipelineError> {
        tracing::info!(
            volume_id = %volume.id,
            chapters = parsed.chapters.len(),
            sections = parsed.section_count(),
            "Saving structured data"
        );

        for parsed_chapter in &parsed.chapters {
            let chapter = ChapterRecord {
                id: Uuid::new_v4(),
                volume_id: volume.id,
                chapter_no: parsed_chapter.chapter_number,
                title: parsed_chapter.detected_title.clone(),
                status: ChapterStatus::Parsed,
                detection_method: parsed_chapter.detection_method.clone(),
                detection_confidence: parsed_chapter.detection_confidence,
                word_count: parsed_chapter.word_count,
                created_at: Utc::now(),
            };
            self.volume_repo.save_chapter(&chapter).await?;

            let sections: Vec<SectionRecord> = parsed_chapter
                .sections
                .iter()
                .map(|s| SectionRecord {
                    id: Uuid::new_v4(),
                    chapter_id: chapter.id,
                    section_no: s.section_number,
                    raw_text: s.raw_text.clone(),
                    clean_text: s.clean_text.clone(),
                    word_count: s.word_count,
                    has_dialogue: s.has_dialogue,
                    has_action: s.has_action,
                    status: SectionStatus::Parsed,
                    created_at: Utc::now(),
                })
                .collect();
            self.volume_repo.save_sections(&sections).await?;
        }

        self.volume_repo
            .update_stats(
                volume.id,
                parsed.word_count,
                parsed.chapters.len(),
                parsed.section_count(),
                parsed.parse_method,
                &parsed.errors,
            )
            .await?;

        Ok(())
    }
}
