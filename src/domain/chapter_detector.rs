//! 章节检测器
//!
//! 从提取出的纯文本推断章/节结构（与文件格式无关）
//!
//! 检测策略:
//! 1. 文本含 "ACT I"/"ACT 1" 标记时走剧本结构检测（幕 -> 场）
//! 2. 否则按章标题模式逐行匹配（首个命中生效）
//! 3. 都未命中则整卷作为单章
//! 4. 章内文本按场景分隔线与段落再切分为节（单节不超过约 1000 词）
//!
//! 检测是确定性的: 相同输入得到相同的章节边界与词数

use once_cell::sync::Lazy;
use regex::Regex;

use super::volume::{ParsedChapter, ParsedSection};

/// 单节词数上限（段落不拆分，超限另起一节）
const MAX_SECTION_WORDS: usize = 1000;

static ACT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^ACT\s+([IVXLCDM]+|\d+)\s*$").unwrap());
static SCENE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^SCENE\s+([IVXLCDM]+|\d+)[:.]?\s*(.*)$").unwrap());

/// 章标题模式，按优先级排列，逐行测试取首个命中
static CHAPTER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(
            r"(?i)^chapter\s+(\d+|one|two|three|four|five|six|seven|eight|nine|ten|[ivxlcdm]+)[:\s]+(.*)$",
        )
        .unwrap(),
        Regex::new(r"(?i)^ch\.?\s+(\d+)[:\s]+(.*)$").unwrap(),
        Regex::new(r"(?i)^(\d+)\.\s+(.*)$").unwrap(),
        Regex::new(r"(?i)^part\s+(\d+|one|two|three)[:\s]+(.*)$").unwrap(),
        Regex::new(r"(?i)^prologue[:\s]*(.*)$").unwrap(),
        Regex::new(r"(?i)^epilogue[:\s]*(.*)$").unwrap(),
    ]
});

static SCENE_BREAK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*[*\-_]{3,}\s*\n").unwrap());
static ACTION_VERB_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(ran|jumped|fought|attacked|screamed)\b").unwrap());

/// 从纯文本检测章节结构
pub fn detect_chapters(text: &str) -> Vec<ParsedChapter> {
    let upper = text.to_uppercase();
    if upper.contains("ACT I") || upper.contains("ACT 1") {
        return detect_play_structure(text);
    }
    detect_regular_chapters(text)
}

/// 剧本结构检测: 每个 ACT 标题开启新章，SCENE 标题作为节边界
fn detect_play_structure(text: &str) -> Vec<ParsedChapter> {
    let mut chapters: Vec<ParsedChapter> = Vec::new();
    let mut current_act: Option<ParsedChapter> = None;
    let mut scene_text = String::new();

    for line in text.lines() {
        let line = line.trim();

        // 幕边界
        if ACT_PATTERN.is_match(line) {
            if let Some(mut act) = current_act.take() {
                flush_scene(&mut act, &mut scene_text);
                act.word_count = act.sections.iter().map(|s| s.word_count).sum();
                chapters.push(act);
            }
            scene_text.clear();

            current_act = Some(ParsedChapter {
                chapter_number: chapters.len() + 1,
                detected_title: line.to_string(),
                detection_method: "play_act_pattern".to_string(),
                detection_confidence: 0.9,
                sections: Vec::new(),
                word_count: 0,
            });
            continue;
        }

        // 场边界: 冲洗上一场，标题行并入新一场文本
        if SCENE_PATTERN.is_match(line) {
            if let Some(act) = current_act.as_mut() {
                flush_scene(act, &mut scene_text);
            }
            scene_text.push_str(line);
            scene_text.push_str("\n\n");
            continue;
        }

        // 常规内容（首个 ACT 之前的文本随新幕开始被丢弃）
        scene_text.push_str(line);
        scene_text.push('\n');
    }

    if let Some(mut act) = current_act.take() {
        flush_scene(&mut act, &mut scene_text);
        act.word_count = act.sections.iter().map(|s| s.word_count).sum();
        chapters.push(act);
    }

    chapters
}

fn flush_scene(act: &mut ParsedChapter, scene_text: &mut String) {
    if scene_text.trim().is_empty() {
        scene_text.clear();
        return;
    }
    let section_no = act.sections.len() + 1;
    act.sections.push(create_section(section_no, scene_text));
    scene_text.clear();
}

/// 常规章检测: 逐行测试标题模式，无命中则整卷单章
fn detect_regular_chapters(text: &str) -> Vec<ParsedChapter> {
    let mut chapters: Vec<ParsedChapter> = Vec::new();
    let mut current: Option<ParsedChapter> = None;
    let mut current_text = String::new();
    let mut chapter_no = 0usize;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            current_text.push('\n');
            continue;
        }

        let mut heading_title: Option<String> = None;
        for pattern in CHAPTER_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(line) {
                chapter_no += 1;
                heading_title = Some(match caps.get(2) {
                    Some(title) => title.as_str().trim().to_string(),
                    None => format!("Chapter {}", chapter_no),
                });
                break;
            }
        }

        match heading_title {
            Some(title) => {
                if let Some(chapter) = current.take() {
                    chapters.push(finish_chapter(chapter, &current_text));
                }
                current_text.clear();

                current = Some(ParsedChapter {
                    chapter_number: chapter_no,
                    detected_title: title,
                    detection_method: "regex_pattern".to_string(),
                    detection_confidence: 0.8,
                    sections: Vec::new(),
                    word_count: 0,
                });
            }
            None => {
                current_text.push_str(line);
                current_text.push('\n');
            }
        }
    }

    if let Some(chapter) = current.take() {
        chapters.push(finish_chapter(chapter, &current_text));
    }

    // 无任何标题命中: 整卷作为单章
    if chapters.is_empty() {
        let sections = split_into_sections(text);
        let word_count = sections.iter().map(|s| s.word_count).sum();
        chapters.push(ParsedChapter {
            chapter_number: 1,
            detected_title: "Full Text".to_string(),
            detection_method: "default".to_string(),
            detection_confidence: 0.5,
            sections,
            word_count,
        });
    }

    chapters
}

fn finish_chapter(mut chapter: ParsedChapter, text: &str) -> ParsedChapter {
    chapter.sections = split_into_sections(text);
    chapter.word_count = chapter.sections.iter().map(|s| s.word_count).sum();
    chapter
}

/// 章文本切分为节
///
/// 先按显式场景分隔线（3 个以上 */-/_）切块，再按空行分隔的段落
/// 重组，使单节不超过 MAX_SECTION_WORDS 词且不拆段
pub fn split_into_sections(text: &str) -> Vec<ParsedSection> {
    let mut sections: Vec<ParsedSection> = Vec::new();

    for part in SCENE_BREAK_PATTERN.split(text) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let mut current = String::new();
        let mut current_words = 0usize;
        let mut section_no = sections.len() + 1;

        for para in part.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }

            let words = para.split_whitespace().count();
            if current_words > 0 && current_words + words > MAX_SECTION_WORDS {
                sections.push(create_section(section_no, &current));
                current.clear();
                current_words = 0;
                section_no += 1;
            }

            current.push_str(para);
            current.push_str("\n\n");
            current_words += words;
        }

        if !current.is_empty() {
            sections.push(create_section(section_no, &current));
        }
    }

    // 至少产出一节
    if sections.is_empty() {
        sections.push(create_section(1, text));
    }

    sections
}

fn create_section(section_no: usize, text: &str) -> ParsedSection {
    let clean_text = text.trim().to_string();
    let word_count = clean_text.split_whitespace().count();

    let has_dialogue = clean_text.contains('"')
        || clean_text.contains('\u{201C}')
        || clean_text.contains('\u{201D}');
    let has_action = clean_text.contains('!') || ACTION_VERB_PATTERN.is_match(&clean_text);

    ParsedSection {
        section_number: section_no,
        raw_text: text.to_string(),
        clean_text,
        word_count,
        has_dialogue,
        has_action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_chapter_heading() {
        let text = "CHAPTER 1: Loomings\nCall me Ishmael. Some years ago, never mind how long.\n";
        let chapters = detect_chapters(text);

        assert_eq!(chapters.len(), 1);
        let ch = &chapters[0];
        assert_eq!(ch.chapter_number, 1);
        assert_eq!(ch.detected_title, "Loomings");
        assert_eq!(ch.detection_method, "regex_pattern");
        assert!((ch.detection_confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(ch.sections.len(), 1);
        assert_eq!(ch.word_count, 10);
    }

    #[test]
    fn test_multiple_chapters_numbered_gapless() {
        let text = "Chapter 1: Start\nfirst body\n\nChapter 2: Middle\nsecond body\n\nChapter 3: End\nthird body\n";
        let chapters = detect_chapters(text);

        assert_eq!(chapters.len(), 3);
        for (i, ch) in chapters.iter().enumerate() {
            assert_eq!(ch.chapter_number, i + 1);
            assert_eq!(ch.sections.len(), 1);
            assert_eq!(ch.sections[0].section_number, 1);
        }
        assert_eq!(chapters[1].detected_title, "Middle");
    }

    #[test]
    fn test_play_structure_detection() {
        let text = "ACT I\nSCENE I: The castle\n\"Who's there?\" Bernardo asked.\n\nACT II\nSCENE I: Another part\nMore dialogue here.\n";
        let chapters = detect_chapters(text);

        assert_eq!(chapters.len(), 2);
        let act = &chapters[0];
        assert_eq!(act.detected_title, "ACT I");
        assert_eq!(act.detection_method, "play_act_pattern");
        assert!((act.detection_confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(act.sections.len(), 1);
        assert!(act.sections[0].clean_text.starts_with("SCENE I: The castle"));
        // 每一幕的词数都等于其节词数之和
        for act in &chapters {
            let sum: usize = act.sections.iter().map(|s| s.word_count).sum();
            assert_eq!(act.word_count, sum);
        }
    }

    #[test]
    fn test_play_scene_boundaries_within_act() {
        let text = "ACT 1\nSCENE 1: Morning\nfirst scene text\nSCENE 2: Evening\nsecond scene text\n";
        let chapters = detect_chapters(text);

        assert_eq!(chapters.len(), 1);
        let sections = &chapters[0].sections;
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].section_number, 1);
        assert_eq!(sections[1].section_number, 2);
        assert!(sections[1].clean_text.starts_with("SCENE 2: Evening"));
    }

    #[test]
    fn test_no_heading_falls_back_to_single_chapter() {
        let text = "Just a plain manuscript without any heading lines.\nAnother line of prose.";
        let chapters = detect_chapters(text);

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].detected_title, "Full Text");
        assert_eq!(chapters[0].detection_method, "default");
        assert!((chapters[0].detection_confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let text = "Chapter 1: Alpha\nsome text here\n\n***\n\nafter the break\n\nChapter 2: Beta\nmore text\n";
        let first = detect_chapters(text);
        let second = detect_chapters(text);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.detected_title, b.detected_title);
            assert_eq!(a.word_count, b.word_count);
            assert_eq!(a.sections.len(), b.sections.len());
            for (sa, sb) in a.sections.iter().zip(b.sections.iter()) {
                assert_eq!(sa.clean_text, sb.clean_text);
                assert_eq!(sa.word_count, sb.word_count);
            }
        }
    }

    #[test]
    fn test_scene_break_splits_sections() {
        let text = "before the break line\n\n***\n\nafter the break line\n";
        let sections = split_into_sections(text);

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].clean_text, "before the break line");
        assert_eq!(sections[1].clean_text, "after the break line");
    }

    #[test]
    fn test_long_text_chunked_without_splitting_paragraphs() {
        // 三个 600 词的段落: 前两段合计超限，第三段另起一节
        let para = (0..600).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let text = format!("{}\n\n{}\n\n{}", para, para, para);
        let sections = split_into_sections(&text);

        assert_eq!(sections.len(), 3);
        for section in &sections {
            assert_eq!(section.word_count, 600);
        }
        assert_eq!(sections[2].section_number, 3);
    }

    #[test]
    fn test_section_splitting_preserves_content() {
        let text = "alpha beta\n\ngamma delta\n\n---\n\nepsilon zeta\n\neta theta\n";
        let sections = split_into_sections(text);

        let mut produced: Vec<&str> = Vec::new();
        for section in &sections {
            produced.extend(section.clean_text.split_whitespace());
        }
        let expected: Vec<&str> = [
            "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta",
        ]
        .to_vec();
        assert_eq!(produced, expected);
    }

    #[test]
    fn test_word_counts_sum_bottom_up() {
        let text = "Chapter 1: One\nalpha beta gamma\n\ndelta\n\nChapter 2: Two\nepsilon zeta\n";
        let chapters = detect_chapters(text);

        let mut volume_words = 0;
        for ch in &chapters {
            let section_sum: usize = ch.sections.iter().map(|s| s.word_count).sum();
            assert_eq!(ch.word_count, section_sum);
            volume_words += ch.word_count;
        }
        assert_eq!(volume_words, 6);
    }

    #[test]
    fn test_dialogue_and_action_flags() {
        let dialogue = create_section(1, "\"Hello there,\" she said quietly.");
        assert!(dialogue.has_dialogue);
        assert!(!dialogue.has_action);

        let action = create_section(1, "He ran across the courtyard.");
        assert!(action.has_action);
        assert!(!action.has_dialogue);

        let exclaim = create_section(1, "Look out below!");
        assert!(exclaim.has_action);

        let calm = create_section(1, "The morning was quiet and gray.");
        assert!(!calm.has_dialogue);
        assert!(!calm.has_action);
    }

    #[test]
    fn test_chapter_heading_requires_separator() {
        // "Chapter 7" 后无冒号或标题文本时不构成标题行
        let text = "He read Chapter 7 again.\nChapter 7: The Door\nbody text\n";
        let chapters = detect_chapters(text);

        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].detected_title, "The Door");
    }
}
