//! Worker Layer - 后台任务调度
//!
//! 实现 JobDispatcher: 有界队列 + 固定 worker 池 + 进度注册表

mod dispatcher;

pub use dispatcher::{
    DispatcherConfig, DispatcherHandle, JobDispatcher, ProcessingQueue, PROGRESS_ERROR,
};
