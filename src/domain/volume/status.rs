//! Volume Context - 状态机与枚举
//!
//! 定义卷/章/节的处理状态以及文件格式、解析方式
//! 卷状态转换必须走 `can_transition_to` 允许的边，其余一律拒绝

use serde::{Deserialize, Serialize};

/// 上传文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Epub,
    Pdf,
    Txt,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Epub => "epub",
            FileFormat::Pdf => "pdf",
            FileFormat::Txt => "txt",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "epub" => Some(FileFormat::Epub),
            "pdf" => Some(FileFormat::Pdf),
            "txt" => Some(FileFormat::Txt),
            _ => None,
        }
    }

    /// 从文件名扩展名推断格式（大小写不敏感）
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?;
        Self::from_str(&ext.to_ascii_lowercase())
    }
}

/// 卷处理状态
///
/// 生命周期: created -> uploaded -> parsing -> parsed -> enhancing -> completed
/// error 可从任意非终态进入; completed/error 允许重新进入 parsing/enhancing（重处理）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStatus {
    /// 卷记录已创建，文件未上传
    Created,
    /// 文件已写入存储
    Uploaded,
    /// 结构解析中
    Parsing,
    /// 章节结构已入库
    Parsed,
    /// LLM/图像增强中
    Enhancing,
    /// 全部处理完成
    Completed,
    /// 处理失败
    Error,
}

impl VolumeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeStatus::Created => "created",
            VolumeStatus::Uploaded => "uploaded",
            VolumeStatus::Parsing => "parsing",
            VolumeStatus::Parsed => "parsed",
            VolumeStatus::Enhancing => "enhancing",
            VolumeStatus::Completed => "completed",
            VolumeStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(VolumeStatus::Created),
            "uploaded" => Some(VolumeStatus::Uploaded),
            "parsing" => Some(VolumeStatus::Parsing),
            "parsed" => Some(VolumeStatus::Parsed),
            "enhancing" => Some(VolumeStatus::Enhancing),
            "completed" => Some(VolumeStatus::Completed),
            "error" => Some(VolumeStatus::Error),
            _ => None,
        }
    }

    /// 是否允许从当前状态转换到 next
    pub fn can_transition_to(&self, next: VolumeStatus) -> bool {
        use VolumeStatus::*;
        let allowed: &[VolumeStatus] = match self {
            Created => &[Uploaded, Error],
            Uploaded => &[Parsing, Error],
            Parsing => &[Parsed, Error],
            Parsed => &[Enhancing, Completed, Error],
            Enhancing => &[Completed, Error],
            // 允许重处理
            Completed => &[Parsing, Enhancing],
            Error => &[Parsing, Enhancing],
        };
        allowed.contains(&next)
    }
}

/// 章状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    Parsed,
    Enhancing,
    Completed,
    Error,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Parsed => "parsed",
            ChapterStatus::Enhancing => "enhancing",
            ChapterStatus::Completed => "completed",
            ChapterStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "parsed" => Some(ChapterStatus::Parsed),
            "enhancing" => Some(ChapterStatus::Enhancing),
            "completed" => Some(ChapterStatus::Completed),
            "error" => Some(ChapterStatus::Error),
            _ => None,
        }
    }
}

/// 节状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Parsed,
    Enhancing,
    Completed,
    Error,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::Parsed => "parsed",
            SectionStatus::Enhancing => "enhancing",
            SectionStatus::Completed => "completed",
            SectionStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "parsed" => Some(SectionStatus::Parsed),
            "enhancing" => Some(SectionStatus::Enhancing),
            "completed" => Some(SectionStatus::Completed),
            "error" => Some(SectionStatus::Error),
            _ => None,
        }
    }
}

/// 内容解析方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMethod {
    /// EPUB OPF 元数据
    EpubMetadata,
    /// EPUB HTML 内容结构
    EpubContent,
    /// 纯文本模式匹配
    TextPattern,
    /// LLM 推断
    LlmInference,
}

impl ParseMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMethod::EpubMetadata => "epub_metadata",
            ParseMethod::EpubContent => "epub_content",
            ParseMethod::TextPattern => "text_pattern",
            ParseMethod::LlmInference => "llm_inference",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "epub_metadata" => Some(ParseMethod::EpubMetadata),
            "epub_content" => Some(ParseMethod::EpubContent),
            "text_pattern" => Some(ParseMethod::TextPattern),
            "llm_inference" => Some(ParseMethod::LlmInference),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_format_from_file_name() {
        assert_eq!(FileFormat::from_file_name("moby.epub"), Some(FileFormat::Epub));
        assert_eq!(FileFormat::from_file_name("draft.TXT"), Some(FileFormat::Txt));
        assert_eq!(FileFormat::from_file_name("scan.pdf"), Some(FileFormat::Pdf));
        assert_eq!(FileFormat::from_file_name("notes.docx"), None);
        assert_eq!(FileFormat::from_file_name("noext"), None);
    }

    #[test]
    fn test_happy_path_transitions() {
        use VolumeStatus::*;
        assert!(Created.can_transition_to(Uploaded));
        assert!(Uploaded.can_transition_to(Parsing));
        assert!(Parsing.can_transition_to(Parsed));
        assert!(Parsed.can_transition_to(Enhancing));
        assert!(Parsed.can_transition_to(Completed));
        assert!(Enhancing.can_transition_to(Completed));
    }

    #[test]
    fn test_error_reachable_from_non_terminal_states() {
        use VolumeStatus::*;
        for from in [Created, Uploaded, Parsing, Parsed, Enhancing] {
            assert!(from.can_transition_to(Error), "{:?} -> error", from);
        }
    }

    #[test]
    fn test_reprocessing_edges() {
        use VolumeStatus::*;
        assert!(Completed.can_transition_to(Parsing));
        assert!(Completed.can_transition_to(Enhancing));
        assert!(VolumeStatus::Error.can_transition_to(Parsing));
        assert!(VolumeStatus::Error.can_transition_to(Enhancing));
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        use VolumeStatus::*;
        assert!(!Created.can_transition_to(Parsing));
        assert!(!Created.can_transition_to(Completed));
        assert!(!Uploaded.can_transition_to(Enhancing));
        assert!(!Parsing.can_transition_to(Enhancing));
        assert!(!Parsing.can_transition_to(Created));
        assert!(!Completed.can_transition_to(Uploaded));
        assert!(!Completed.can_transition_to(Error));
        assert!(!VolumeStatus::Error.can_transition_to(Completed));
        assert!(!VolumeStatus::Error.can_transition_to(Uploaded));
    }

    #[test]
    fn test_status_round_trip() {
        use VolumeStatus::*;
        for status in [Created, Uploaded, Parsing, Parsed, Enhancing, Completed, Error] {
            assert_eq!(VolumeStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(VolumeStatus::from_str("unknown"), None);
    }
}
