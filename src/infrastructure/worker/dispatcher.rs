//! Job Dispatcher - 后台任务调度器
//!
//! 固定大小的 worker 池从一条共享有界队列消费任务:
//! - enqueue 非阻塞，队列满时显式拒绝（不创建进度条目）
//! - 任务执行前进度置 0，正常返回强制 100，出错或 panic 记 -1
//! - panic 在任务边界捕获，worker 池保持存活
//! - shutdown 停止接收新任务并排空在途任务（不取消运行中的任务）
//!
//! 注意: 同一卷的两个任务可以并发执行，这里不做互斥

use dashmap::DashMap;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::application::ports::{DispatchError, JobQueuePort, ProcessingJob, ProgressReporter};

/// 失败哨兵值
pub const PROGRESS_ERROR: i32 = -1;

/// 调度器配置
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// 并发 worker 数
    pub worker_count: usize,
    /// 队列容量
    pub queue_size: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            queue_size: 32,
        }
    }
}

/// 任务投递句柄 + 进度注册表
///
/// 进度注册表是跨 worker 与查询方并发安全的 map
pub struct ProcessingQueue {
    sender: mpsc::Sender<ProcessingJob>,
    progress: Arc<DashMap<String, i32>>,
    accepting: Arc<AtomicBool>,
}

impl JobQueuePort for ProcessingQueue {
    fn enqueue(&self, job: ProcessingJob) -> Result<(), DispatchError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(DispatchError::ShuttingDown);
        }

        match self.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(job_id = %job.id, "Job queue full, rejecting job");
                Err(DispatchError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::ShuttingDown),
        }
    }

    fn progress(&self, id: &str) -> Option<i32> {
        self.progress.get(id).map(|entry| *entry)
    }
}

/// 关停句柄
pub struct DispatcherHandle {
    accepting: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl DispatcherHandle {
    /// 停止接收新任务，等待在途任务完成后返回
    ///
    /// 已入队但尚未启动的任务被丢弃; 运行中的任务不被取消
    pub async fn shutdown(self) {
        self.accepting.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            tracing::error!(error = %e, "Dispatcher task join failed");
        }
    }
}

/// 任务调度器
pub struct JobDispatcher {
    config: DispatcherConfig,
    receiver: mpsc::Receiver<ProcessingJob>,
    progress: Arc<DashMap<String, i32>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl JobDispatcher {
    /// 创建并启动调度器，返回投递句柄与关停句柄
    pub fn spawn(config: DispatcherConfig) -> (Arc<ProcessingQueue>, DispatcherHandle) {
        let (sender, receiver) = mpsc::channel(config.queue_size);
        let progress = Arc::new(DashMap::new());
        let accepting = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let queue = Arc::new(ProcessingQueue {
            sender,
            progress: progress.clone(),
            accepting: accepting.clone(),
        });

        let dispatcher = Self {
            config,
            receiver,
            progress,
            shutdown_rx,
        };
        let join = tokio::spawn(dispatcher.run());

        (
            queue,
            DispatcherHandle {
                accepting,
                shutdown_tx,
                join,
            },
        )
    }

    /// 消费循环: 先占 worker 槽位，再取任务
    async fn run(mut self) {
        tracing::info!(
            worker_count = self.config.worker_count,
            queue_size = self.config.queue_size,
            "JobDispatcher started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.worker_count));

        loop {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            tokio::select! {
                maybe_job = self.receiver.recv() => {
                    match maybe_job {
                        Some(job) => {
                            let progress = self.progress.clone();
                            tokio::spawn(Self::execute(job, progress, permit));
                        }
                        None => break,
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    tracing::info!("Shutdown signal received, draining in-flight jobs");
                    break;
                }
            }
        }

        // 不再接收新任务，等待全部在途任务释放槽位
        drop(self.receiver);
        let _ = semaphore
            .acquire_many(self.config.worker_count as u32)
            .await;

        tracing::info!("JobDispatcher stopped");
    }

    /// 执行单个任务
    ///
    /// panic 在这里捕获并转为失败哨兵，绝不杀死 worker 池
    async fn execute(
        job: ProcessingJob,
        progress: Arc<DashMap<String, i32>>,
        _permit: OwnedSemaphorePermit,
    ) {
        let job_id = job.id;
        progress.insert(job_id.clone(), 0);

        let reporter = {
            let progress = progress.clone();
            let id = job_id.clone();
            ProgressReporter::new(move |percent| {
                progress.insert(id.clone(), percent);
            })
        };

        let outcome = AssertUnwindSafe((job.run)(reporter)).catch_unwind().await;

        match outcome {
            Ok(Ok(())) => {
                progress.insert(job_id.clone(), 100);
                tracing::info!(job_id = %job_id, "Job completed");
            }
            Ok(Err(e)) => {
                progress.insert(job_id.clone(), PROGRESS_ERROR);
                tracing::error!(job_id = %job_id, error = %e, "Job failed");
            }
            Err(_) => {
                progress.insert(job_id.clone(), PROGRESS_ERROR);
                tracing::error!(job_id = %job_id, "Job panicked");
            }
        }
    }
}
