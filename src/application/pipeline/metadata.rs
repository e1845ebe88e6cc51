//! 元数据推断与回填

use uuid::Uuid;

use super::schema::{metadata_schema, metadata_user_prompt, InferredMetadata, METADATA_SYSTEM_PROMPT};
use super::{PipelineError, VolumePipeline};
use crate::domain::volume::{ParseMethod, ParsedVolume};
use crate::application::ports::VolumeRecord;

/// 元数据推断的样本词数上限
const METADATA_SAMPLE_WORDS: usize = 2000;

impl VolumePipeline {
    /// 用 LLM 从开篇样本推断标题/作者/简介，仅补全仍为空的字段
    ///
    /// 任何失败都只记录到 parsed.errors，不中止管线
    pub(super) async fn infer_metadata(&self, volume_id: Uuid, parsed: &mut ParsedVolume) {
        tracing::info!(volume_id = %volume_id, "Enhancing metadata with LLM");

        let sample = parsed.sample_text(METADATA_SAMPLE_WORDS);
        if sample.is_empty() {
            tracing::debug!(volume_id = %volume_id, "No content available for LLM enhancement");
            return;
        }

        let response = self
            .generate_json_with_deadline(
                self.config.metadata_timeout,
                METADATA_SYSTEM_PROMPT,
                &metadata_user_prompt(&sample),
                &metadata_schema(),
            )
            .await;

        let raw = match response {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(volume_id = %volume_id, error = %e, "LLM metadata generation failed");
                parsed.errors.push(format!("LLM enhancement failed: {}", e));
                return;
            }
        };

        let meta: InferredMetadata = match serde_json::from_str(&raw) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(volume_id = %volume_id, error = %e, "Failed to parse LLM response");
                parsed.errors.push(format!("Failed to parse LLM response: {}", e));
                return;
            }
        };

        if !meta.title.is_empty() && parsed.detected_title.is_empty() {
            parsed.detected_title = meta.title.clone();
            parsed.parse_method = ParseMethod::LlmInference;
        }
        if !meta.author.is_empty() && parsed.detected_author.is_empty() {
            parsed.detected_author = meta.author.clone();
        }
        if !meta.description.is_empty() && parsed.detected_description.is_empty() {
            parsed.detected_description = meta.description.clone();
        }

        tracing::info!(
            volume_id = %volume_id,
            title = %meta.title,
            author = %meta.author,
            "LLM metadata enhancement completed"
        );
    }

    /// 把检测到的元数据回填到卷与所属书籍
    ///
    /// 书籍字段仅在仍是占位值时覆盖（"Untitled"/"Unknown"/空简介）
    pub(super) async fn propagate_metadata(
        &self,
        volume: &VolumeRecord,
        parsed: &ParsedVolume,
    ) -> Result<(), PipelineError> {
        // 卷标题: 为空或仍是文件名衍生值时更新
        if !parsed.detected_title.is_empty() && title_is_placeholder(volume) {
            self.volume_repo
                .update_title(volume.id, &parsed.detected_title)
                .await?;
        }

        let mut book = match self.book_repo.find_by_id(volume.book_id).await? {
            Some(book) => book,
            None => return Ok(()),
        };

        let mut updated = false;

        if matches!(book.title.as_str(), "Untitled draft" | "Untitled" | "")
            && !parsed.detected_title.is_empty()
        {
            book.title = parsed.detected_title.clone();
            updated = true;
        }

        if matches!(book.author.as_str(), "Unknown" | "") && !parsed.detected_author.is_empty() {
            book.author = parsed.detected_author.clone();
            updated = true;
        }

        if matches!(book.description.as_str(), "" | "No description provided")
            && !parsed.detected_description.is_empty()
        {
            book.description = parsed.detected_description.clone();
            updated = true;
        }

        if updated {
            self.book_repo.save(&book).await?;
            tracing::info!(
                book_id = %book.id,
                volume_id = %volume.id,
                "Updated book metadata from volume"
            );
        }

        Ok(())
    }
}

/// 卷标题是否仍是占位值（为空，或带着上传文件的扩展名）
fn title_is_placeholder(volume: &VolumeRecord) -> bool {
    if volume.title.is_empty() {
        return true;
    }
    match volume.file_path.extension().and_then(|e| e.to_str()) {
        Some(ext) => volume.title.contains(&format!(".{}", ext)),
        None => false,
    }
}
