//! Job Queue Port - 异步任务队列抽象
//!
//! 任务是显式的工作单元 {id, run(reporter) -> Result}，经由有界队列投递，
//! 而不是不可见的闭包; 具体调度实现在 infrastructure/worker 层
//!
//! 投递语义: 非阻塞，队列满时显式拒绝; 不保证投递后一定执行
//! （进程重启丢弃全部任务，关停丢弃未启动任务）

use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// 任务投递错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// 队列已满，任务被拒绝（调用方可稍后重试）
    #[error("Job queue is full")]
    QueueFull,

    /// 调度器已关停，不再接收新任务
    #[error("Dispatcher is shutting down")]
    ShuttingDown,
}

/// 进度回调句柄
///
/// 任务通过它上报 0-100 的完成百分比; 可克隆，跨 await 点安全
#[derive(Clone)]
pub struct ProgressReporter {
    report_fn: Arc<dyn Fn(i32) + Send + Sync>,
}

impl ProgressReporter {
    pub fn new(report_fn: impl Fn(i32) + Send + Sync + 'static) -> Self {
        Self {
            report_fn: Arc::new(report_fn),
        }
    }

    /// 丢弃进度的空实现（重试入口与测试用）
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, percent: i32) {
        (self.report_fn)(percent);
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressReporter")
    }
}

/// 一个待执行的处理任务
pub struct ProcessingJob {
    /// 任务标识，如 parse-vol-<volume_id>; 同时用于进度查询
    pub id: String,
    /// 任务体: 接收进度回调，返回执行结果
    pub run: Box<dyn FnOnce(ProgressReporter) -> BoxFuture<'static, anyhow::Result<()>> + Send>,
}

impl ProcessingJob {
    pub fn new<F, Fut>(id: impl Into<String>, run: F) -> Self
    where
        F: FnOnce(ProgressReporter) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            run: Box::new(move |reporter| Box::pin(run(reporter))),
        }
    }
}

impl std::fmt::Debug for ProcessingJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingJob").field("id", &self.id).finish()
    }
}

/// Job Queue Port
pub trait JobQueuePort: Send + Sync {
    /// 非阻塞投递; 队列满或已关停时返回错误，且不创建进度条目
    fn enqueue(&self, job: ProcessingJob) -> Result<(), DispatchError>;

    /// 查询任务最近上报的进度
    ///
    /// None 表示未知任务（从未投递、被拒绝或尚未初始化）;
    /// -1 是失败哨兵值，100 表示正常完成
    fn progress(&self, id: &str) -> Option<i32>;
}
