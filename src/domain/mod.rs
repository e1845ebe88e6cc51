//! Domain Layer - 领域层
//!
//! 包含:
//! - Volume Context: 卷/章/节结构与状态机
//! - 章节检测器: 纯文本的结构推断

pub mod volume;

// 共享的章节检测器
mod chapter_detector;

pub use chapter_detector::{detect_chapters, split_into_sections};
