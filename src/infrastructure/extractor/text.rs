//! 纯文本结构提取
//!
//! 文件原文直接送入章节检测; 卷词数取全文的空白分词数

use crate::domain::detect_chapters;
use crate::domain::volume::{ParseMethod, ParsedVolume};

pub(super) fn parse(text: &str) -> ParsedVolume {
    let mut parsed = ParsedVolume::new(ParseMethod::TextPattern);
    parsed.chapters = detect_chapters(text);
    parsed.word_count = text.split_whitespace().count();

    tracing::info!(
        chapters = parsed.chapters.len(),
        words = parsed.word_count,
        "Text parsing completed"
    );
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_with_chapter_headings() {
        let text = "Chapter 1: Dawn\nThe sun rose over the hills.\n\nChapter 2: Dusk\nNight fell quickly.\n";
        let parsed = parse(text);

        assert_eq!(parsed.parse_method, ParseMethod::TextPattern);
        assert_eq!(parsed.chapters.len(), 2);
        // 卷词数为全文分词数（含标题行）
        assert_eq!(parsed.word_count, text.split_whitespace().count());
    }

    #[test]
    fn test_plain_text_without_headings() {
        let parsed = parse("no headings at all, just prose");
        assert_eq!(parsed.chapters.len(), 1);
        assert_eq!(parsed.chapters[0].detection_method, "default");
    }
}
