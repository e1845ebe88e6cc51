//! 场景生成阶段 (30-60%)

use uuid::Uuid;

use super::schema::{
    scene_schema, scene_user_prompt, GeneratedScene, SceneGenerationResponse, SCENE_SYSTEM_PROMPT,
};
use super::{PipelineError, VolumePipeline};
use crate::application::ports::{ChapterWithSections, LlmError, ProgressReporter, SceneRecord};
use crate::domain::volume::{ChapterStatus, SectionStatus};

/// 单章上下文的词数上限
const MAX_CHAPTER_CONTEXT_WORDS: usize = 8000;

/// 场景阶段的进度区间
const SCENE_PROGRESS_BASE: usize = 30;
const SCENE_PROGRESS_RANGE: usize = 30;

impl VolumePipeline {
    /// 按章生成场景并入库
    ///
    /// 单章重试耗尽后跳过，继续后续章; 没有任何章才算阶段失败
    pub(super) async fn generate_scenes_for_volume(
        &self,
        volume_id: Uuid,
        reporter: &ProgressReporter,
    ) -> Result<(), PipelineError> {
        tracing::info!(volume_id = %volume_id, "Generating scenes");

        let chapters = self.volume_repo.find_chapters_with_sections(volume_id).await?;
        if chapters.is_empty() {
            return Err(PipelineError::NoChapters(volume_id));
        }

        let total_sections: usize = chapters.iter().map(|c| c.sections.len()).sum();
        let mut processed_sections = 0usize;

        for entry in &chapters {
            if entry.sections.is_empty() {
                continue;
            }

            let scenes = match self.generate_scenes_for_chapter_with_retry(entry).await {
                Ok(scenes) => scenes,
                Err(e) => {
                    tracing::error!(
                        chapter_id = %entry.chapter.id,
                        chapter_no = entry.chapter.chapter_no,
                        error = %e,
                        "Scene generation exhausted retries, skipping chapter"
                    );
                    continue;
                }
            };

            self.persist_chapter_scenes(entry, scenes).await;

            processed_sections += entry.sections.len();
            let progress =
                SCENE_PROGRESS_BASE + processed_sections * SCENE_PROGRESS_RANGE / total_sections;
            reporter.report(progress as i32);
        }

        Ok(())
    }

    /// 带重试的单章场景生成
    ///
    /// 指数退避; 命中服务端限流时改用固定冷却
    async fn generate_scenes_for_chapter_with_retry(
        &self,
        entry: &ChapterWithSections,
    ) -> Result<Vec<GeneratedScene>, PipelineError> {
        let mut last_err: Option<PipelineError> = None;

        for attempt in 1..=self.config.max_retries {
            match self.generate_scenes_for_chapter(entry).await {
                Ok(scenes) => return Ok(scenes),
                Err(e) => {
                    let delay = if e.is_rate_limited() {
                        tracing::warn!(
                            chapter_no = entry.chapter.chapter_no,
                            cooldown_secs = self.config.rate_limit_cooldown.as_secs(),
                            "Rate limit hit, cooling down before retry"
                        );
                        self.config.rate_limit_cooldown
                    } else {
                        self.config.retry_delay * 2u32.pow(attempt.saturating_sub(1))
                    };

                    last_err = Some(e);
                    if attempt < self.config.max_retries {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| PipelineError::Llm(LlmError::InvalidResponse("no attempts made".into()))))
    }

    /// 单次场景生成调用
    async fn generate_scenes_for_chapter(
        &self,
        entry: &ChapterWithSections,
    ) -> Result<Vec<GeneratedScene>, PipelineError> {
        // 组装章上下文
        let mut context = format!(
            "Chapter {}: {}\n\n",
            entry.chapter.chapter_no, entry.chapter.title
        );
        for section in &entry.sections {
            context.push_str(&format!(
                "Section {}:\n{}\n\n",
                section.section_no, section.clean_text
            ));
        }

        // 截断到上下文词数上限
        let words: Vec<&str> = context.split_whitespace().collect();
        let context = if words.len() > MAX_CHAPTER_CONTEXT_WORDS {
            format!("{}...", words[..MAX_CHAPTER_CONTEXT_WORDS].join(" "))
        } else {
            context
        };

        let raw = self
            .generate_json_with_deadline(
                self.config.scene_timeout,
                SCENE_SYSTEM_PROMPT,
                &scene_user_prompt(&context),
                &scene_schema(),
            )
            .await?;

        let response: SceneGenerationResponse = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::Llm(LlmError::InvalidResponse(e.to_string())))?;

        if response.scenes.is_empty() {
            return Err(PipelineError::Llm(LlmError::EmptyResponse));
        }

        Ok(response.scenes)
    }

    /// 场景入库，按节号匹配节; 不匹配的场景丢弃
    async fn persist_chapter_scenes(
        &self,
        entry: &ChapterWithSections,
        scenes: Vec<GeneratedScene>,
    ) {
        for scene in scenes {
            let section = match entry
                .sections
                .iter()
                .find(|s| s.section_no == scene.section_number)
            {
                Some(section) => section,
                None => {
                    tracing::warn!(
                        chapter_no = entry.chapter.chapter_no,
                        section_no = scene.section_number,
                        "Section not found for generated scene"
                    );
                    continue;
                }
            };

            let record = SceneRecord {
                id: Uuid::new_v4(),
                section_id: section.id,
                summary: scene.summary,
                image_prompt: scene.image_prompt,
                importance_score: scene.importance_score,
                scene_type: scene.scene_type,
                characters: scene.characters.join(","),
                location: scene.location,
                mood: scene.mood,
                image_url: None,
                status: SectionStatus::Completed,
                created_at: chrono::Utc::now(),
            };

            if let Err(e) = self.volume_repo.save_scene(&record).await {
                tracing::error!(section_id = %section.id, error = %e, "Failed to save scene");
                continue;
            }

            if let Err(e) = self
                .volume_repo
                .update_section_status(section.id, SectionStatus::Completed)
                .await
            {
                tracing::error!(section_id = %section.id, error = %e, "Failed to update section status");
            }
        }

        if let Err(e) = self
            .volume_repo
            .update_chapter_status(entry.chapter.id, ChapterStatus::Completed)
            .await
        {
            tracing::error!(chapter_id = %entry.chapter.id, error = %e, "Failed to update chapter status");
        }
    }
}
