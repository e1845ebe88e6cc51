//! SQLite Volume Repository
//!
//! 卷及其结构数据（章/节/场景）的持久化实现

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::path::PathBuf;
use uuid::Uuid;

use super::book_repo::{parse_timestamp, parse_uuid};
use super::DbPool;
use crate::application::ports::{
    ChapterRecord, ChapterWithSections, RepositoryError, SceneRecord, SectionRecord,
    VolumeRecord, VolumeRepositoryPort,
};
use crate::domain::volume::{
    ChapterStatus, FileFormat, ParseMethod, SectionStatus, VolumeStatus,
};

/// SQLite Volume Repository
pub struct SqliteVolumeRepository {
    pool: DbPool,
}

impl SqliteVolumeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn db_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(e.to_string())
}

#[derive(FromRow)]
struct VolumeRow {
    id: String,
    book_id: String,
    title: String,
    volume_no: i64,
    file_path: String,
    file_format: String,
    status: String,
    progress: i64,
    word_count: i64,
    chapter_count: i64,
    section_count: i64,
    parse_method: Option<String>,
    parsing_errors: String,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<VolumeRow> for VolumeRecord {
    type Error = RepositoryError;

    fn try_from(row: VolumeRow) -> Result<Self, Self::Error> {
        let status = VolumeStatus::from_str(&row.status).ok_or_else(|| {
            RepositoryError::SerializationError(format!("unknown volume status: {}", row.status))
        })?;
        let file_format = FileFormat::from_str(&row.file_format).ok_or_else(|| {
            RepositoryError::SerializationError(format!("unknown file format: {}", row.file_format))
        })?;

        Ok(VolumeRecord {
            id: parse_uuid(&row.id)?,
            book_id: parse_uuid(&row.book_id)?,
            title: row.title,
            volume_no: row.volume_no as usize,
            file_path: PathBuf::from(row.file_path),
            file_format,
            status,
            progress: row.progress as i32,
            word_count: row.word_count as usize,
            chapter_count: row.chapter_count as usize,
            section_count: row.section_count as usize,
            parse_method: row.parse_method.as_deref().and_then(ParseMethod::from_str),
            parsing_errors: serde_json::from_str(&row.parsing_errors).unwrap_or_default(),
            completed_at: row
                .completed_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[derive(FromRow)]
struct ChapterRow {
    id: String,
    volume_id: String,
    chapter_no: i64,
    title: String,
    status: String,
    detection_method: String,
    detection_confidence: f64,
    word_count: i64,
    created_at: String,
}

impl TryFrom<ChapterRow> for ChapterRecord {
    type Error = RepositoryError;

    fn try_from(row: ChapterRow) -> Result<Self, Self::Error> {
        Ok(ChapterRecord {
            id: parse_uuid(&row.id)?,
            volume_id: parse_uuid(&row.volume_id)?,
            chapter_no: row.chapter_no as usize,
            title: row.title,
            status: ChapterStatus::from_str(&row.status).unwrap_or(ChapterStatus::Parsed),
            detection_method: row.detection_method,
            detection_confidence: row.detection_confidence,
            word_count: row.word_count as usize,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct SectionRow {
    id: String,
    chapter_id: String,
    section_no: i64,
    raw_text: String,
    clean_text: String,
    word_count: i64,
    has_dialogue: i64,
    has_action: i64,
    status: String,
    created_at: String,
}

impl TryFrom<SectionRow> for SectionRecord {
    type Error = RepositoryError;

    fn try_from(row: SectionRow) -> Result<Self, Self::Error> {
        Ok(SectionRecord {
            id: parse_uuid(&row.id)?,
            chapter_id: parse_uuid(&row.chapter_id)?,
            section_no: row.section_no as usize,
            raw_text: row.raw_text,
            clean_text: row.clean_text,
            word_count: row.word_count as usize,
            has_dialogue: row.has_dialogue != 0,
            has_action: row.has_action != 0,
            status: SectionStatus::from_str(&row.status).unwrap_or(SectionStatus::Parsed),
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct SceneRow {
    id: String,
    section_id: String,
    summary: String,
    image_prompt: String,
    importance_score: f64,
    scene_type: String,
    characters: String,
    location: String,
    mood: String,
    image_url: Option<String>,
    status: String,
    created_at: String,
}

impl TryFrom<SceneRow> for SceneRecord {
    type Error = RepositoryError;

    fn try_from(row: SceneRow) -> Result<Self, Self::Error> {
        Ok(SceneRecord {
            id: parse_uuid(&row.id)?,
            section_id: parse_uuid(&row.section_id)?,
            summary: row.summary,
            image_prompt: row.image_prompt,
            importance_score: row.importance_score,
            scene_type: row.scene_type,
            characters: row.characters,
            location: row.location,
            mood: row.mood,
            image_url: row.image_url,
            status: SectionStatus::from_str(&row.status).unwrap_or(SectionStatus::Completed),
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

const VOLUME_COLUMNS: &str = "id, book_id, title, volume_no, file_path, file_format, status, progress, word_count, chapter_count, section_count, parse_method, parsing_errors, completed_at, created_at, updated_at";

#[async_trait]
impl VolumeRepositoryPort for SqliteVolumeRepository {
    async fn save(&self, volume: &VolumeRecord) -> Result<(), RepositoryError> {
        let errors_json = serde_json::to_string(&volume.parsing_errors)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO volumes (id, book_id, title, volume_no, file_path, file_format, status,
                                 progress, word_count, chapter_count, section_count, parse_method,
                                 parsing_errors, completed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                status = excluded.status,
                progress = excluded.progress,
                word_count = excluded.word_count,
                chapter_count = excluded.chapter_count,
                section_count = excluded.section_count,
                parse_method = excluded.parse_method,
                parsing_errors = excluded.parsing_errors,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(volume.id.to_string())
        .bind(volume.book_id.to_string())
        .bind(&volume.title)
        .bind(volume.volume_no as i64)
        .bind(volume.file_path.to_string_lossy().to_string())
        .bind(volume.file_format.as_str())
        .bind(volume.status.as_str())
        .bind(volume.progress)
        .bind(volume.word_count as i64)
        .bind(volume.chapter_count as i64)
        .bind(volume.section_count as i64)
        .bind(volume.parse_method.map(|m| m.as_str()))
        .bind(errors_json)
        .bind(volume.completed_at.map(|t| t.to_rfc3339()))
        .bind(volume.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<VolumeRecord>, RepositoryError> {
        let row: Option<VolumeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM volumes WHERE id = ?",
            VOLUME_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(VolumeRecord::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: VolumeStatus,
        progress: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE volumes SET status = ?, progress = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(progress)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn mark_error(&self, id: Uuid, message: &str) -> Result<(), RepositoryError> {
        let errors_json = serde_json::to_string(&vec![message.to_string()])
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        sqlx::query(
            "UPDATE volumes SET status = 'error', progress = -1, parsing_errors = ?, updated_at = ? WHERE id = ?",
        )
        .bind(errors_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_stats(
        &self,
        id: Uuid,
        word_count: usize,
        chapter_count: usize,
        section_count: usize,
        parse_method: ParseMethod,
        parsing_errors: &[String],
    ) -> Result<(), RepositoryError> {
        let errors_json = serde_json::to_string(parsing_errors)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE volumes
            SET word_count = ?, chapter_count = ?, section_count = ?,
                parse_method = ?, parsing_errors = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(word_count as i64)
        .bind(chapter_count as i64)
        .bind(section_count as i64)
        .bind(parse_method.as_str())
        .bind(errors_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_title(&self, id: Uuid, title: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE volumes SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE volumes SET status = 'completed', progress = 100, completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(completed_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn save_chapter(&self, chapter: &ChapterRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO chapters (id, volume_id, chapter_no, title, status, detection_method,
                                  detection_confidence, word_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chapter.id.to_string())
        .bind(chapter.volume_id.to_string())
        .bind(chapter.chapter_no as i64)
        .bind(&chapter.title)
        .bind(chapter.status.as_str())
        .bind(&chapter.detection_method)
        .bind(chapter.detection_confidence)
        .bind(chapter.word_count as i64)
        .bind(chapter.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn save_sections(&self, sections: &[SectionRecord]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for section in sections {
            sqlx::query(
                r#"
                INSERT INTO sections (id, chapter_id, section_no, raw_text, clean_text,
                                      word_count, has_dialogue, has_action, status, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(section.id.to_string())
            .bind(section.chapter_id.to_string())
            .bind(section.section_no as i64)
            .bind(&section.raw_text)
            .bind(&section.clean_text)
            .bind(section.word_count as i64)
            .bind(section.has_dialogue as i64)
            .bind(section.has_action as i64)
            .bind(section.status.as_str())
            .bind(section.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn find_chapters_with_sections(
        &self,
        volume_id: Uuid,
    ) -> Result<Vec<ChapterWithSections>, RepositoryError> {
        let chapter_rows: Vec<ChapterRow> = sqlx::query_as(
            "SELECT id, volume_id, chapter_no, title, status, detection_method, detection_confidence, word_count, created_at FROM chapters WHERE volume_id = ? ORDER BY chapter_no ASC",
        )
        .bind(volume_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut result = Vec::with_capacity(chapter_rows.len());
        for row in chapter_rows {
            let chapter = ChapterRecord::try_from(row)?;

            let section_rows: Vec<SectionRow> = sqlx::query_as(
                "SELECT id, chapter_id, section_no, raw_text, clean_text, word_count, has_dialogue, has_action, status, created_at FROM sections WHERE chapter_id = ? ORDER BY section_no ASC",
            )
            .bind(chapter.id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

            let sections = section_rows
                .into_iter()
                .map(SectionRecord::try_from)
                .collect::<Result<Vec<_>, _>>()?;

            result.push(ChapterWithSections { chapter, sections });
        }

        Ok(result)
    }

    async fn update_chapter_status(
        &self,
        chapter_id: Uuid,
        status: ChapterStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE chapters SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chapter_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_section_status(
        &self,
        section_id: Uuid,
        status: SectionStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE sections SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(section_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn save_scene(&self, scene: &SceneRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO scenes (id, section_id, summary, image_prompt, importance_score,
                                scene_type, characters, location, mood, image_url, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(scene.id.to_string())
        .bind(scene.section_id.to_string())
        .bind(&scene.summary)
        .bind(&scene.image_prompt)
        .bind(scene.importance_score)
        .bind(&scene.scene_type)
        .bind(&scene.characters)
        .bind(&scene.location)
        .bind(&scene.mood)
        .bind(scene.image_url.as_deref())
        .bind(scene.status.as_str())
        .bind(scene.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_scenes_without_image(
        &self,
        volume_id: Uuid,
    ) -> Result<Vec<SceneRecord>, RepositoryError> {
        let rows: Vec<SceneRow> = sqlx::query_as(
            r#"
            SELECT scenes.id, scenes.section_id, scenes.summary, scenes.image_prompt,
                   scenes.importance_score, scenes.scene_type, scenes.characters,
                   scenes.location, scenes.mood, scenes.image_url, scenes.status, scenes.created_at
            FROM scenes
            JOIN sections ON sections.id = scenes.section_id
            JOIN chapters ON chapters.id = sections.chapter_id
            WHERE chapters.volume_id = ? AND scenes.image_url IS NULL
            ORDER BY chapters.chapter_no ASC, sections.section_no ASC
            "#,
        )
        .bind(volume_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(SceneRecord::try_from).collect()
    }

    async fn set_scene_image(
        &self,
        scene_id: Uuid,
        image_ref: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE scenes SET image_url = ? WHERE id = ?")
            .bind(image_ref)
            .bind(scene_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_scenes(&self, volume_id: Uuid) -> Result<usize, RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM scenes
            WHERE section_id IN (
                SELECT sections.id FROM sections
                JOIN chapters ON chapters.id = sections.chapter_id
                WHERE chapters.volume_id = ?
            )
            "#,
        )
        .bind(volume_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() as usize)
    }

    async fn reset_enhancement_status(&self, volume_id: Uuid) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            UPDATE sections SET status = 'parsed'
            WHERE chapter_id IN (SELECT id FROM chapters WHERE volume_id = ?)
            "#,
        )
        .bind(volume_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("UPDATE chapters SET status = 'parsed' WHERE volume_id = ?")
            .bind(volume_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn clear_scene_images(&self, volume_id: Uuid) -> Result<usize, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE scenes SET image_url = NULL
            WHERE section_id IN (
                SELECT sections.id FROM sections
                JOIN chapters ON chapters.id = sections.chapter_id
                WHERE chapters.volume_id = ?
            )
            "#,
        )
        .bind(volume_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{create_pool, run_migrations, DatabaseConfig};
    use super::*;
    use crate::application::ports::{BookRecord, BookRepositoryPort};
    use crate::infrastructure::persistence::sqlite::SqliteBookRepository;
    use std::path::PathBuf;

    async fn setup() -> (SqliteVolumeRepository, SqliteBookRepository, Uuid) {
        let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let book_repo = SqliteBookRepository::new(pool.clone());
        let book = BookRecord::placeholder("Untitled");
        book_repo.save(&book).await.unwrap();

        (SqliteVolumeRepository::new(pool), book_repo, book.id)
    }

    fn new_volume(book_id: Uuid) -> VolumeRecord {
        VolumeRecord::new(
            book_id,
            "draft",
            1,
            PathBuf::from("/data/book/vol/source_file.txt"),
            FileFormat::Txt,
        )
    }

    fn chapter(volume_id: Uuid, chapter_no: usize) -> ChapterRecord {
        ChapterRecord {
            id: Uuid::new_v4(),
            volume_id,
            chapter_no,
            title: format!("Chapter {}", chapter_no),
            status: ChapterStatus::Parsed,
            detection_method: "regex_pattern".to_string(),
            detection_confidence: 0.8,
            word_count: 5,
            created_at: Utc::now(),
        }
    }

    fn section(chapter_id: Uuid, section_no: usize) -> SectionRecord {
        SectionRecord {
            id: Uuid::new_v4(),
            chapter_id,
            section_no,
            raw_text: "raw text here\n\n".to_string(),
            clean_text: "raw text here".to_string(),
            word_count: 3,
            has_dialogue: false,
            has_action: false,
            status: SectionStatus::Parsed,
            created_at: Utc::now(),
        }
    }

    fn scene(section_id: Uuid) -> SceneRecord {
        SceneRecord {
            id: Uuid::new_v4(),
            section_id,
            summary: "summary".to_string(),
            image_prompt: "a dramatic scene".to_string(),
            importance_score: 0.5,
            scene_type: "exposition".to_string(),
            characters: "Ishmael".to_string(),
            location: "deck".to_string(),
            mood: "calm".to_string(),
            image_url: None,
            status: SectionStatus::Completed,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_volume_round_trip() {
        let (repo, _, book_id) = setup().await;
        let volume = new_volume(book_id);
        repo.save(&volume).await.unwrap();

        let loaded = repo.find_by_id(volume.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, VolumeStatus::Uploaded);
        assert_eq!(loaded.file_format, FileFormat::Txt);
        assert_eq!(loaded.progress, 0);
        assert!(loaded.parse_method.is_none());
        assert!(loaded.parsing_errors.is_empty());
    }

    #[tokio::test]
    async fn test_status_and_error_updates() {
        let (repo, _, book_id) = setup().await;
        let volume = new_volume(book_id);
        repo.save(&volume).await.unwrap();

        repo.update_status(volume.id, VolumeStatus::Parsing, 5)
            .await
            .unwrap();
        let loaded = repo.find_by_id(volume.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, VolumeStatus::Parsing);
        assert_eq!(loaded.progress, 5);

        repo.mark_error(volume.id, "no content extracted").await.unwrap();
        let loaded = repo.find_by_id(volume.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, VolumeStatus::Error);
        assert_eq!(loaded.progress, -1);
        assert_eq!(loaded.parsing_errors, vec!["no content extracted"]);
    }

    #[tokio::test]
    async fn test_mark_completed_stamps_time() {
        let (repo, _, book_id) = setup().await;
        let volume = new_volume(book_id);
        repo.save(&volume).await.unwrap();

        repo.mark_completed(volume.id, Utc::now()).await.unwrap();
        let loaded = repo.find_by_id(volume.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, VolumeStatus::Completed);
        assert_eq!(loaded.progress, 100);
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_chapters_and_sections_ordered() {
        let (repo, _, book_id) = setup().await;
        let volume = new_volume(book_id);
        repo.save(&volume).await.unwrap();

        // 乱序写入，读取时按编号排序
        for no in [2usize, 1, 3] {
            let ch = chapter(volume.id, no);
            repo.save_chapter(&ch).await.unwrap();
            repo.save_sections(&[section(ch.id, 2), section(ch.id, 1)])
                .await
                .unwrap();
        }

        let chapters = repo.find_chapters_with_sections(volume.id).await.unwrap();
        assert_eq!(chapters.len(), 3);
        let numbers: Vec<usize> = chapters.iter().map(|c| c.chapter.chapter_no).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        for entry in &chapters {
            let section_numbers: Vec<usize> =
                entry.sections.iter().map(|s| s.section_no).collect();
            assert_eq!(section_numbers, vec![1, 2]);
        }
    }

    #[tokio::test]
    async fn test_scenes_without_image_filter_and_order() {
        let (repo, _, book_id) = setup().await;
        let volume = new_volume(book_id);
        repo.save(&volume).await.unwrap();

        let ch1 = chapter(volume.id, 1);
        let ch2 = chapter(volume.id, 2);
        repo.save_chapter(&ch1).await.unwrap();
        repo.save_chapter(&ch2).await.unwrap();
        let s11 = section(ch1.id, 1);
        let s21 = section(ch2.id, 1);
        repo.save_sections(&[s11.clone()]).await.unwrap();
        repo.save_sections(&[s21.clone()]).await.unwrap();

        let mut with_image = scene(s21.id);
        with_image.image_url = Some("aW1n".to_string());
        repo.save_scene(&scene(s11.id)).await.unwrap();
        repo.save_scene(&with_image).await.unwrap();

        let pending = repo.find_scenes_without_image(volume.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].section_id, s11.id);

        repo.set_scene_image(pending[0].id, "ZGF0YQ==").await.unwrap();
        assert!(repo
            .find_scenes_without_image(volume.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_scenes_and_reset_status() {
        let (repo, _, book_id) = setup().await;
        let volume = new_volume(book_id);
        repo.save(&volume).await.unwrap();

        let ch = chapter(volume.id, 1);
        repo.save_chapter(&ch).await.unwrap();
        let sec = section(ch.id, 1);
        repo.save_sections(&[sec.clone()]).await.unwrap();
        repo.save_scene(&scene(sec.id)).await.unwrap();
        repo.update_section_status(sec.id, SectionStatus::Completed)
            .await
            .unwrap();
        repo.update_chapter_status(ch.id, ChapterStatus::Completed)
            .await
            .unwrap();

        let deleted = repo.delete_scenes(volume.id).await.unwrap();
        assert_eq!(deleted, 1);

        repo.reset_enhancement_status(volume.id).await.unwrap();
        let chapters = repo.find_chapters_with_sections(volume.id).await.unwrap();
        assert_eq!(chapters[0].chapter.status, ChapterStatus::Parsed);
        assert_eq!(chapters[0].sections[0].status, SectionStatus::Parsed);
    }

    #[tokio::test]
    async fn test_clear_scene_images() {
        let (repo, _, book_id) = setup().await;
        let volume = new_volume(book_id);
        repo.save(&volume).await.unwrap();

        let ch = chapter(volume.id, 1);
        repo.save_chapter(&ch).await.unwrap();
        let sec = section(ch.id, 1);
        repo.save_sections(&[sec.clone()]).await.unwrap();
        let mut sc = scene(sec.id);
        sc.image_url = Some("b2xk".to_string());
        repo.save_scene(&sc).await.unwrap();

        let cleared = repo.clear_scene_images(volume.id).await.unwrap();
        assert_eq!(cleared, 1);
        assert_eq!(
            repo.find_scenes_without_image(volume.id).await.unwrap().len(),
            1
        );
    }
}
