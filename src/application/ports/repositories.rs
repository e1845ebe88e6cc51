//! Repository Ports - 出站端口
//!
//! 定义数据持久化的抽象接口
//! 具体实现在 infrastructure 层（SQLite）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::volume::{
    ChapterStatus, FileFormat, ParseMethod, SectionStatus, VolumeStatus,
};

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// ============================================================================
// Book Repository
// ============================================================================

/// 书籍状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookStatus {
    /// 空书，尚无卷
    Draft,
    /// 至少一卷在处理中
    Processing,
    /// 全部卷处理完成
    Completed,
    /// 处理出现严重错误
    Error,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Draft => "draft",
            BookStatus::Processing => "processing",
            BookStatus::Completed => "completed",
            BookStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(BookStatus::Draft),
            "processing" => Some(BookStatus::Processing),
            "completed" => Some(BookStatus::Completed),
            "error" => Some(BookStatus::Error),
            _ => None,
        }
    }
}

/// 书籍实体（用于持久化）
#[derive(Debug, Clone)]
pub struct BookRecord {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub description: String,
    pub cover_image: String,
    pub status: BookStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookRecord {
    /// 创建占位元数据的新书（等待解析/LLM 回填）
    pub fn placeholder(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            author: "Unknown".to_string(),
            description: String::new(),
            cover_image: String::new(),
            status: BookStatus::Draft,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Book Repository Port
#[async_trait]
pub trait BookRepositoryPort: Send + Sync {
    /// 保存书籍（upsert）
    async fn save(&self, book: &BookRecord) -> Result<(), RepositoryError>;

    /// 根据 ID 查找书籍
    async fn find_by_id(&self, id: Uuid) -> Result<Option<BookRecord>, RepositoryError>;
}

// ============================================================================
// Volume Repository
// ============================================================================

/// 卷实体（用于持久化）
#[derive(Debug, Clone)]
pub struct VolumeRecord {
    pub id: Uuid,
    pub book_id: Uuid,
    pub title: String,
    pub volume_no: usize,
    pub file_path: PathBuf,
    pub file_format: FileFormat,
    pub status: VolumeStatus,
    /// 处理进度 0-100，-1 表示失败
    pub progress: i32,
    pub word_count: usize,
    pub chapter_count: usize,
    pub section_count: usize,
    pub parse_method: Option<ParseMethod>,
    /// 解析过程累积的错误信息
    pub parsing_errors: Vec<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VolumeRecord {
    pub fn new(
        book_id: Uuid,
        title: impl Into<String>,
        volume_no: usize,
        file_path: PathBuf,
        file_format: FileFormat,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            book_id,
            title: title.into(),
            volume_no,
            file_path,
            file_format,
            status: VolumeStatus::Uploaded,
            progress: 0,
            word_count: 0,
            chapter_count: 0,
            section_count: 0,
            parse_method: None,
            parsing_errors: Vec::new(),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 章实体
#[derive(Debug, Clone)]
pub struct ChapterRecord {
    pub id: Uuid,
    pub volume_id: Uuid,
    pub chapter_no: usize,
    pub title: String,
    pub status: ChapterStatus,
    pub detection_method: String,
    pub detection_confidence: f64,
    pub word_count: usize,
    pub created_at: DateTime<Utc>,
}

/// 节实体
#[derive(Debug, Clone)]
pub struct SectionRecord {
    pub id: Uuid,
    pub chapter_id: Uuid,
    pub section_no: usize,
    pub raw_text: String,
    pub clean_text: String,
    pub word_count: usize,
    pub has_dialogue: bool,
    pub has_action: bool,
    pub status: SectionStatus,
    pub created_at: DateTime<Utc>,
}

/// 场景实体（增强阶段由 LLM 生成，每节至多一个）
#[derive(Debug, Clone)]
pub struct SceneRecord {
    pub id: Uuid,
    pub section_id: Uuid,
    pub summary: String,
    pub image_prompt: String,
    /// 情节重要度 0.0-1.0
    pub importance_score: f64,
    pub scene_type: String,
    /// 出场角色，逗号连接
    pub characters: String,
    pub location: String,
    pub mood: String,
    /// 生成图像的引用（base64 或外部引用），未生成时为空
    pub image_url: Option<String>,
    pub status: SectionStatus,
    pub created_at: DateTime<Utc>,
}

/// 章及其有序的节
#[derive(Debug, Clone)]
pub struct ChapterWithSections {
    pub chapter: ChapterRecord,
    pub sections: Vec<SectionRecord>,
}

/// Volume Repository Port
///
/// 覆盖卷的结构数据（章/节/场景）与状态/进度的持久化
#[async_trait]
pub trait VolumeRepositoryPort: Send + Sync {
    /// 保存卷（upsert）
    async fn save(&self, volume: &VolumeRecord) -> Result<(), RepositoryError>;

    /// 根据 ID 查找卷
    async fn find_by_id(&self, id: Uuid) -> Result<Option<VolumeRecord>, RepositoryError>;

    /// 更新卷状态与进度
    async fn update_status(
        &self,
        id: Uuid,
        status: VolumeStatus,
        progress: i32,
    ) -> Result<(), RepositoryError>;

    /// 标记卷失败: status=error, progress=-1, 记录错误信息
    async fn mark_error(&self, id: Uuid, message: &str) -> Result<(), RepositoryError>;

    /// 更新解析统计（词数/章数/节数/解析方式/错误）
    async fn update_stats(
        &self,
        id: Uuid,
        word_count: usize,
        chapter_count: usize,
        section_count: usize,
        parse_method: ParseMethod,
        parsing_errors: &[String],
    ) -> Result<(), RepositoryError>;

    /// 更新卷标题
    async fn update_title(&self, id: Uuid, title: &str) -> Result<(), RepositoryError>;

    /// 标记处理完成: status=completed, progress=100, 记录完成时间
    async fn mark_completed(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// 保存章
    async fn save_chapter(&self, chapter: &ChapterRecord) -> Result<(), RepositoryError>;

    /// 批量保存节
    async fn save_sections(&self, sections: &[SectionRecord]) -> Result<(), RepositoryError>;

    /// 按章号升序取卷的全部章（节按节号升序）
    async fn find_chapters_with_sections(
        &self,
        volume_id: Uuid,
    ) -> Result<Vec<ChapterWithSections>, RepositoryError>;

    /// 更新章状态
    async fn update_chapter_status(
        &self,
        chapter_id: Uuid,
        status: ChapterStatus,
    ) -> Result<(), RepositoryError>;

    /// 更新节状态
    async fn update_section_status(
        &self,
        section_id: Uuid,
        status: SectionStatus,
    ) -> Result<(), RepositoryError>;

    /// 保存场景
    async fn save_scene(&self, scene: &SceneRecord) -> Result<(), RepositoryError>;

    /// 按章号/节号升序取卷中尚无图像的场景
    async fn find_scenes_without_image(
        &self,
        volume_id: Uuid,
    ) -> Result<Vec<SceneRecord>, RepositoryError>;

    /// 写入场景图像引用
    async fn set_scene_image(
        &self,
        scene_id: Uuid,
        image_ref: &str,
    ) -> Result<(), RepositoryError>;

    /// 删除卷的全部场景（场景重新生成前调用）
    async fn delete_scenes(&self, volume_id: Uuid) -> Result<usize, RepositoryError>;

    /// 将卷的章/节状态重置为 parsed
    async fn reset_enhancement_status(&self, volume_id: Uuid) -> Result<(), RepositoryError>;

    /// 清空卷所有场景的图像引用（图像重新生成前调用）
    async fn clear_scene_images(&self, volume_id: Uuid) -> Result<usize, RepositoryError>;
}
