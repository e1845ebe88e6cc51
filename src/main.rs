//! Bookforge - 稿件结构化与 AI 增强系统
//!
//! 组合根: 解析配置、把 provider 开关一次性解析成具体适配器、
//! 装配管线与调度器
//!
//! 用法:
//! - `bookforge <file>...` 直接处理给定稿件（上传 -> 入队 -> 轮询进度）
//! - 无参数时保持运行直到 ctrl-c（上层 API 在其上装配）

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bookforge::application::ports::{BookRecord, ImageEnginePort, LlmEnginePort};
use bookforge::application::{IngestService, PipelineConfig, VolumePipeline};
use bookforge::config::{load_config, print_config, ImageProvider, LlmProvider, StorageDriver};
use bookforge::infrastructure::adapters::{
    FakeImageClient, FakeLlmClient, GeminiClient, GeminiClientConfig, HuggingFaceImageClient,
    HuggingFaceImageConfig, LocalFileStorage, OllamaClient, OllamaClientConfig,
};
use bookforge::infrastructure::extractor::FileExtractor;
use bookforge::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteBookRepository, SqliteVolumeRepository,
};
use bookforge::infrastructure::worker::{DispatcherConfig, JobDispatcher};

/// Fake LLM 的固定响应: 每章给第一节一个占位场景
const FAKE_LLM_RESPONSE: &str = r#"{"title":"","author":"","description":"","scenes":[{"section_number":1,"summary":"Placeholder scene summary.","importance_score":0.5,"scene_type":"exposition","image_prompt":"An illustrative placeholder scene."}]}"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级: 环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!("{},bookforge={}", config.log.level, config.log.level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter)),
        )
        .init();

    tracing::info!("Bookforge - 稿件结构化与 AI 增强系统");
    print_config(&config);

    // 确保数据目录存在
    tokio::fs::create_dir_all(&config.storage.uploads_dir).await?;
    if let Some(parent) = Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // 初始化数据库
    let db_config = DatabaseConfig {
        database_url: config.database.database_url(),
        max_connections: config.database.max_connections,
    };
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;

    // 创建 Repository 适配器
    let volume_repo = Arc::new(SqliteVolumeRepository::new(pool.clone()));
    let book_repo = Arc::new(SqliteBookRepository::new(pool.clone()));

    // LLM 引擎: 封闭的 provider 集合，启动时解析一次
    let llm_engine: Arc<dyn LlmEnginePort> = match config.llm.provider {
        LlmProvider::Gemini => {
            let mut client_config = GeminiClientConfig {
                api_key: config.llm.api_key.clone(),
                model: config.llm.model.clone(),
                timeout_secs: config.llm.timeout_secs,
                max_attempts: config.llm.max_attempts,
                ..Default::default()
            };
            if let Some(url) = &config.llm.base_url {
                client_config.base_url = url.clone();
            }
            Arc::new(
                GeminiClient::new(client_config)
                    .map_err(|e| anyhow::anyhow!("Failed to init LLM engine: {}", e))?,
            )
        }
        LlmProvider::Ollama => {
            let mut client_config = OllamaClientConfig {
                model: config.llm.model.clone(),
                timeout_secs: config.llm.timeout_secs,
                max_attempts: config.llm.max_attempts,
                ..Default::default()
            };
            if let Some(url) = &config.llm.base_url {
                client_config.base_url = url.clone();
            }
            Arc::new(
                OllamaClient::new(client_config)
                    .map_err(|e| anyhow::anyhow!("Failed to init LLM engine: {}", e))?,
            )
        }
        LlmProvider::Fake => Arc::new(FakeLlmClient::with_fixed(FAKE_LLM_RESPONSE)),
    };

    // 图像引擎
    let image_engine: Arc<dyn ImageEnginePort> = match config.image.provider {
        ImageProvider::HuggingFace => Arc::new(
            HuggingFaceImageClient::new(HuggingFaceImageConfig {
                api_key: config.image.api_key.clone(),
                model: config.image.model.clone(),
                timeout_secs: config.image.timeout_secs,
                max_attempts: config.image.max_attempts,
                ..Default::default()
            })
            .map_err(|e| anyhow::anyhow!("Failed to init image engine: {}", e))?,
        ),
        ImageProvider::Fake => Arc::new(FakeImageClient::with_placeholder()),
    };

    // 文件存储
    let storage = match config.storage.driver {
        StorageDriver::Local => Arc::new(LocalFileStorage::new(&config.storage.uploads_dir)),
    };

    // 增强管线
    let pipeline_config = PipelineConfig {
        max_retries: config.pipeline.max_retries,
        retry_delay: Duration::from_secs(config.pipeline.retry_delay_secs),
        rate_limit_cooldown: Duration::from_secs(config.pipeline.rate_limit_cooldown_secs),
        ..PipelineConfig::default()
    };
    let pipeline = Arc::new(VolumePipeline::new(
        volume_repo.clone(),
        book_repo.clone(),
        Arc::new(FileExtractor::new()),
        llm_engine,
        image_engine,
        pipeline_config,
    ));

    // 任务调度器
    let (queue, dispatcher) = JobDispatcher::spawn(DispatcherConfig {
        worker_count: config.worker.count,
        queue_size: config.worker.queue_size,
    });

    let ingest = IngestService::new(
        storage,
        volume_repo.clone(),
        book_repo.clone(),
        queue,
        pipeline,
    );

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        tracing::info!("No input files given, running until ctrl-c");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received shutdown signal");
    } else {
        for arg in &args {
            if let Err(e) = process_file(&ingest, book_repo.as_ref(), arg, &config).await {
                tracing::error!(file = %arg, error = %e, "Processing failed");
            }
        }
    }

    tracing::info!("Shutting down...");
    dispatcher.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// 处理单个稿件文件: 上传 -> 入队 -> 轮询进度到终态
async fn process_file(
    ingest: &IngestService,
    book_repo: &SqliteBookRepository,
    path_arg: &str,
    config: &bookforge::AppConfig,
) -> anyhow::Result<()> {
    use bookforge::application::ports::BookRepositoryPort;

    let path = Path::new(path_arg);
    let data = tokio::fs::read(path).await?;
    if data.len() as u64 > config.storage.max_upload_size {
        anyhow::bail!(
            "file exceeds max upload size ({} > {})",
            data.len(),
            config.storage.max_upload_size
        );
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("manuscript.txt");

    let book = BookRecord::placeholder("Untitled");
    book_repo.save(&book).await?;

    let volume = ingest.upload_volume(book.id, file_name, 1, &data).await?;
    let job_id = ingest.start_processing(volume.id).await?;

    loop {
        let progress = ingest.task_progress(&job_id);
        tracing::info!(
            job_id = %job_id,
            percent = progress.percent,
            status = progress.status,
            "Job progress"
        );
        if progress.status != "processing" {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    Ok(())
}
