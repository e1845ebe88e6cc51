//! 增强管线集成测试
//!
//! 用内存 SQLite + Fake LLM/图像客户端跑完整管线，
//! 覆盖端到端成功路径、解析失败、限流重试、跳章与图像缺失等场景

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bookforge::application::ports::{
    BookRecord, BookRepositoryPort, FileStoragePort, JobQueuePort, LlmError, ProgressReporter,
    VolumeRecord, VolumeRepositoryPort,
};
use bookforge::application::{IngestService, PipelineConfig, PipelineError, VolumePipeline};
use bookforge::domain::volume::{ChapterStatus, FileFormat, VolumeStatus};
use bookforge::infrastructure::adapters::{FakeImageClient, FakeLlmClient, LocalFileStorage};
use bookforge::infrastructure::extractor::FileExtractor;
use bookforge::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteBookRepository, SqliteVolumeRepository,
};
use bookforge::infrastructure::worker::{DispatcherConfig, JobDispatcher};

const METADATA_JSON: &str =
    r#"{"title":"Synthetic Tome","author":"Test Author","description":"A tale of three chapters.","genre":"fiction"}"#;

const SCENES_JSON: &str = r#"{"scenes":[{"section_number":1,"summary":"The hero sets out.","importance_score":0.9,"scene_type":"action","image_prompt":"A lone traveler on a windswept road","characters":["Hero"],"location":"the road","mood":"tense"}]}"#;

const THREE_CHAPTER_TEXT: &str = "Chapter 1: One\nalpha beta gamma.\n\nChapter 2: Two\ndelta epsilon.\n\nChapter 3: Three\nzeta eta theta.\n";

struct TestEnv {
    pipeline: Arc<VolumePipeline>,
    volume_repo: Arc<SqliteVolumeRepository>,
    book_repo: Arc<SqliteBookRepository>,
    llm: Arc<FakeLlmClient>,
    image: Arc<FakeImageClient>,
    book_id: uuid::Uuid,
}

fn fast_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        max_retries: 2,
        retry_delay: Duration::from_millis(10),
        rate_limit_cooldown: Duration::from_millis(20),
        metadata_timeout: Duration::from_secs(5),
        scene_timeout: Duration::from_secs(5),
    }
}

async fn setup(llm: FakeLlmClient, image: FakeImageClient, config: PipelineConfig) -> TestEnv {
    let pool = create_pool(&DatabaseConfig::in_memory()).await.unwrap();
    run_migrations(&pool).await.unwrap();

    let volume_repo = Arc::new(SqliteVolumeRepository::new(pool.clone()));
    let book_repo = Arc::new(SqliteBookRepository::new(pool));

    let book = BookRecord::placeholder("Untitled");
    book_repo.save(&book).await.unwrap();

    let llm = Arc::new(llm);
    let image = Arc::new(image);

    let pipeline = Arc::new(VolumePipeline::new(
        volume_repo.clone(),
        book_repo.clone(),
        Arc::new(FileExtractor::new()),
        llm.clone(),
        image.clone(),
        config,
    ));

    TestEnv {
        pipeline,
        volume_repo,
        book_repo,
        llm,
        image,
        book_id: book.id,
    }
}

/// 把文本写入临时文件并创建 uploaded 状态的卷
async fn create_text_volume(env: &TestEnv, text: &str) -> (VolumeRecord, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source_file.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(text.as_bytes()).unwrap();

    let volume = VolumeRecord::new(env.book_id, "draft", 1, path, FileFormat::Txt);
    env.volume_repo.save(&volume).await.unwrap();
    (volume, dir)
}

fn collecting_reporter() -> (ProgressReporter, Arc<Mutex<Vec<i32>>>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    let reporter = ProgressReporter::new(move |percent| {
        if let Ok(mut reports) = sink.lock() {
            reports.push(percent);
        }
    });
    (reporter, reports)
}

#[tokio::test]
async fn test_three_chapter_text_volume_completes() {
    let llm = FakeLlmClient::with_script(vec![Ok(METADATA_JSON.to_string())], SCENES_JSON);
    let env = setup(llm, FakeImageClient::with_fixed("aW1hZ2U="), fast_pipeline_config()).await;
    let (volume, _dir) = create_text_volume(&env, THREE_CHAPTER_TEXT).await;

    let (reporter, reports) = collecting_reporter();
    env.pipeline.process_volume(volume.id, &reporter).await.unwrap();

    let loaded = env.volume_repo.find_by_id(volume.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, VolumeStatus::Completed);
    assert_eq!(loaded.progress, 100);
    assert_eq!(loaded.chapter_count, 3);
    assert_eq!(loaded.section_count, 3);
    // 卷词数等于输入文本的分词数
    assert_eq!(
        loaded.word_count,
        THREE_CHAPTER_TEXT.split_whitespace().count()
    );
    assert!(loaded.completed_at.is_some());

    // 每章一个场景，全部拿到图像
    let chapters = env
        .volume_repo
        .find_chapters_with_sections(volume.id)
        .await
        .unwrap();
    assert_eq!(chapters.len(), 3);
    for entry in &chapters {
        assert_eq!(entry.chapter.status, ChapterStatus::Completed);
    }
    assert!(env
        .volume_repo
        .find_scenes_without_image(volume.id)
        .await
        .unwrap()
        .is_empty());

    // 1 次元数据推断 + 3 次场景生成
    assert_eq!(env.llm.calls(), 4);
    assert_eq!(env.image.calls(), 3);

    // 进度单调不减且收于 100
    let reports = reports.lock().unwrap().clone();
    assert!(reports.windows(2).all(|w| w[0] <= w[1]), "{:?}", reports);
    assert_eq!(*reports.last().unwrap(), 100);
    assert!(reports.contains(&5));
    assert!(reports.contains(&30));
    assert!(reports.contains(&60));
}

#[tokio::test]
async fn test_inferred_metadata_backfills_placeholder_book() {
    let llm = FakeLlmClient::with_script(vec![Ok(METADATA_JSON.to_string())], SCENES_JSON);
    let env = setup(llm, FakeImageClient::with_fixed("aW1hZ2U="), fast_pipeline_config()).await;
    let (volume, _dir) = create_text_volume(&env, THREE_CHAPTER_TEXT).await;

    env.pipeline
        .process_volume(volume.id, &ProgressReporter::noop())
        .await
        .unwrap();

    let book = env.book_repo.find_by_id(env.book_id).await.unwrap().unwrap();
    assert_eq!(book.title, "Synthetic Tome");
    assert_eq!(book.author, "Test Author");
    assert_eq!(book.description, "A tale of three chapters.");
}

#[tokio::test]
async fn test_pdf_volume_aborts_with_persisted_error() {
    let env = setup(
        FakeLlmClient::with_fixed(SCENES_JSON),
        FakeImageClient::with_fixed("aW1hZ2U="),
        fast_pipeline_config(),
    )
    .await;

    let volume = VolumeRecord::new(
        env.book_id,
        "scan",
        1,
        PathBuf::from("/nonexistent/scan.pdf"),
        FileFormat::Pdf,
    );
    env.volume_repo.save(&volume).await.unwrap();

    let result = env
        .pipeline
        .process_volume(volume.id, &ProgressReporter::noop())
        .await;
    assert!(matches!(result, Err(PipelineError::Extract(_))));

    let loaded = env.volume_repo.find_by_id(volume.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, VolumeStatus::Error);
    assert_eq!(loaded.progress, -1);
    assert!(!loaded.parsing_errors.is_empty());

    // 解析失败后不再调用任何生成服务
    assert_eq!(env.llm.calls(), 0);
    assert_eq!(env.image.calls(), 0);
}

#[tokio::test]
async fn test_rate_limited_chapter_retried_with_cooldown() {
    let text = "Chapter 1: Only\nalpha beta gamma.\n";
    let llm = FakeLlmClient::with_script(
        vec![
            Ok(METADATA_JSON.to_string()),
            Err(LlmError::RateLimited { retry_after: None }),
        ],
        SCENES_JSON,
    );
    let env = setup(llm, FakeImageClient::with_fixed("aW1hZ2U="), fast_pipeline_config()).await;
    let (volume, _dir) = create_text_volume(&env, text).await;

    env.pipeline
        .process_volume(volume.id, &ProgressReporter::noop())
        .await
        .unwrap();

    let loaded = env.volume_repo.find_by_id(volume.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, VolumeStatus::Completed);

    // 元数据 + 限流失败的第一次 + 冷却后成功的第二次
    assert_eq!(env.llm.calls(), 3);

    let chapters = env
        .volume_repo
        .find_chapters_with_sections(volume.id)
        .await
        .unwrap();
    assert_eq!(chapters[0].chapter.status, ChapterStatus::Completed);
}

#[tokio::test]
async fn test_exhausted_chapter_skipped_but_volume_completes() {
    let text = "Chapter 1: One\nalpha beta.\n\nChapter 2: Two\ngamma delta.\n";
    // 第一章两次尝试都被限流（max_retries = 2），第二章走 fallback 成功
    let llm = FakeLlmClient::with_script(
        vec![
            Ok(METADATA_JSON.to_string()),
            Err(LlmError::RateLimited { retry_after: None }),
            Err(LlmError::RateLimited { retry_after: None }),
        ],
        SCENES_JSON,
    );
    let env = setup(llm, FakeImageClient::with_fixed("aW1hZ2U="), fast_pipeline_config()).await;
    let (volume, _dir) = create_text_volume(&env, text).await;

    env.pipeline
        .process_volume(volume.id, &ProgressReporter::noop())
        .await
        .unwrap();

    let loaded = env.volume_repo.find_by_id(volume.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, VolumeStatus::Completed);

    let chapters = env
        .volume_repo
        .find_chapters_with_sections(volume.id)
        .await
        .unwrap();
    // 重试耗尽的章被跳过，状态保持 parsed; 后续章正常完成
    assert_eq!(chapters[0].chapter.status, ChapterStatus::Parsed);
    assert_eq!(chapters[1].chapter.status, ChapterStatus::Completed);
}

#[tokio::test]
async fn test_failing_image_engine_leaves_scenes_without_images() {
    let image = FakeImageClient::always_failing("image service down");
    let env = setup(
        FakeLlmClient::with_script(vec![Ok(METADATA_JSON.to_string())], SCENES_JSON),
        image,
        fast_pipeline_config(),
    )
    .await;
    let (volume, _dir) = create_text_volume(&env, THREE_CHAPTER_TEXT).await;

    env.pipeline
        .process_volume(volume.id, &ProgressReporter::noop())
        .await
        .unwrap();

    // 图像全部失败也不影响卷完成
    let loaded = env.volume_repo.find_by_id(volume.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, VolumeStatus::Completed);
    assert_eq!(loaded.progress, 100);

    // 三个场景全部留空，且每个场景恰好尝试 max_retries 次
    let pending = env
        .volume_repo
        .find_scenes_without_image(volume.id)
        .await
        .unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|s| s.image_url.is_none()));
    assert_eq!(env.image.calls(), 3 * 2);
}

#[tokio::test]
async fn test_invalid_transition_rejected() {
    let env = setup(
        FakeLlmClient::with_fixed(SCENES_JSON),
        FakeImageClient::with_fixed("aW1hZ2U="),
        fast_pipeline_config(),
    )
    .await;

    let mut volume = VolumeRecord::new(
        env.book_id,
        "draft",
        1,
        PathBuf::from("/tmp/none.txt"),
        FileFormat::Txt,
    );
    volume.status = VolumeStatus::Created;
    env.volume_repo.save(&volume).await.unwrap();

    // created 不允许直接进入 parsing
    let result = env
        .pipeline
        .process_volume(volume.id, &ProgressReporter::noop())
        .await;
    assert!(matches!(
        result,
        Err(PipelineError::InvalidTransition { .. })
    ));

    let loaded = env.volume_repo.find_by_id(volume.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, VolumeStatus::Created);
}

#[tokio::test]
async fn test_retry_scene_generation_replaces_scenes() {
    let llm = FakeLlmClient::with_script(vec![Ok(METADATA_JSON.to_string())], SCENES_JSON);
    let env = setup(llm, FakeImageClient::with_fixed("aW1hZ2U="), fast_pipeline_config()).await;
    let (volume, _dir) = create_text_volume(&env, "Chapter 1: Only\nalpha beta gamma.\n").await;

    env.pipeline
        .process_volume(volume.id, &ProgressReporter::noop())
        .await
        .unwrap();

    // 完整跑完后重新生成场景
    env.pipeline
        .retry_scene_generation(volume.id, &ProgressReporter::noop())
        .await
        .unwrap();

    let loaded = env.volume_repo.find_by_id(volume.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, VolumeStatus::Completed);
    assert_eq!(loaded.progress, 100);

    // 每节仍只有一个场景（旧场景已被清除）且等待新图像
    let pending = env
        .volume_repo
        .find_scenes_without_image(volume.id)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_retry_image_generation_refills_images() {
    // 第一轮图像全部失败
    let env = setup(
        FakeLlmClient::with_script(vec![Ok(METADATA_JSON.to_string())], SCENES_JSON),
        FakeImageClient::always_failing("down"),
        fast_pipeline_config(),
    )
    .await;
    let (volume, _dir) = create_text_volume(&env, "Chapter 1: Only\nalpha beta gamma.\n").await;

    env.pipeline
        .process_volume(volume.id, &ProgressReporter::noop())
        .await
        .unwrap();
    assert_eq!(
        env.volume_repo
            .find_scenes_without_image(volume.id)
            .await
            .unwrap()
            .len(),
        1
    );

    // 换一个可用的图像引擎再跑图像阶段
    let working = setup_with_shared_repos(&env, FakeImageClient::with_fixed("aW1hZ2U=")).await;
    working
        .retry_image_generation(volume.id, &ProgressReporter::noop())
        .await
        .unwrap();

    assert!(env
        .volume_repo
        .find_scenes_without_image(volume.id)
        .await
        .unwrap()
        .is_empty());
    let loaded = env.volume_repo.find_by_id(volume.id).await.unwrap().unwrap();
    assert_eq!(loaded.progress, 100);
}

/// 复用同一套仓储、替换图像引擎的管线
async fn setup_with_shared_repos(env: &TestEnv, image: FakeImageClient) -> Arc<VolumePipeline> {
    Arc::new(VolumePipeline::new(
        env.volume_repo.clone(),
        env.book_repo.clone(),
        Arc::new(FileExtractor::new()),
        env.llm.clone(),
        Arc::new(image),
        fast_pipeline_config(),
    ))
}

#[tokio::test]
async fn test_end_to_end_through_dispatcher() {
    let env = setup(
        FakeLlmClient::with_script(vec![Ok(METADATA_JSON.to_string())], SCENES_JSON),
        FakeImageClient::with_fixed("aW1hZ2U="),
        fast_pipeline_config(),
    )
    .await;

    let uploads = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalFileStorage::new(uploads.path()));
    let (queue, dispatcher) = JobDispatcher::spawn(DispatcherConfig::default());

    let ingest = IngestService::new(
        storage.clone(),
        env.volume_repo.clone(),
        env.book_repo.clone(),
        queue.clone(),
        env.pipeline.clone(),
    );

    let volume = ingest
        .upload_volume(env.book_id, "synthetic.txt", 1, THREE_CHAPTER_TEXT.as_bytes())
        .await
        .unwrap();
    assert_eq!(volume.file_format, FileFormat::Txt);

    let job_id = ingest.start_processing(volume.id).await.unwrap();
    assert_eq!(job_id, format!("parse-vol-{}", volume.id));

    // 轮询进度直到完成
    let mut completed = false;
    for _ in 0..300 {
        let progress = ingest.task_progress(&job_id);
        if progress.status == "completed" {
            completed = true;
            break;
        }
        assert_ne!(progress.status, "error");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(completed, "job never completed");

    let loaded = env.volume_repo.find_by_id(volume.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, VolumeStatus::Completed);
    assert_eq!(loaded.chapter_count, 3);

    dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_unsupported_upload_rejected_synchronously() {
    let env = setup(
        FakeLlmClient::with_fixed(SCENES_JSON),
        FakeImageClient::with_fixed("aW1hZ2U="),
        fast_pipeline_config(),
    )
    .await;

    let uploads = tempfile::tempdir().unwrap();
    let storage: Arc<dyn FileStoragePort> = Arc::new(LocalFileStorage::new(uploads.path()));
    let (queue, dispatcher) = JobDispatcher::spawn(DispatcherConfig::default());
    let queue: Arc<dyn JobQueuePort> = queue;

    let ingest = IngestService::new(
        storage,
        env.volume_repo.clone(),
        env.book_repo.clone(),
        queue,
        env.pipeline.clone(),
    );

    let result = ingest
        .upload_volume(env.book_id, "notes.docx", 1, b"bytes")
        .await;
    assert!(result.is_err());

    let result = ingest.upload_volume(env.book_id, "empty.txt", 1, b"").await;
    assert!(result.is_err());

    dispatcher.shutdown().await;
}
