//! Volume Context - 结构化解析结果
//!
//! 结构提取器的输出树: 卷 -> 章 -> 节
//! 不变量:
//! - 章/节编号在父级内从 1 起单调递增且无空洞
//! - 父级词数等于子级词数之和

use serde::{Deserialize, Serialize};

use super::status::ParseMethod;

/// 一次结构解析的完整结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedVolume {
    /// 检测到的标题（可能为空，留待 LLM 推断补全）
    pub detected_title: String,
    pub detected_author: String,
    pub detected_description: String,
    pub parse_method: ParseMethod,
    pub chapters: Vec<ParsedChapter>,
    /// 全卷词数（按空白分词）
    pub word_count: usize,
    /// 非致命错误的累积记录
    pub errors: Vec<String>,
}

impl ParsedVolume {
    pub fn new(parse_method: ParseMethod) -> Self {
        Self {
            detected_title: String::new(),
            detected_author: String::new(),
            detected_description: String::new(),
            parse_method,
            chapters: Vec::new(),
            word_count: 0,
            errors: Vec::new(),
        }
    }

    /// 自底向上汇总词数
    pub fn recompute_word_count(&mut self) {
        self.word_count = self.chapters.iter().map(|c| c.word_count).sum();
    }

    pub fn section_count(&self) -> usize {
        self.chapters.iter().map(|c| c.sections.len()).sum()
    }

    /// 取卷开头约 max_words 个词的样本文本（用于 LLM 元数据推断）
    pub fn sample_text(&self, max_words: usize) -> String {
        let mut sample = String::new();
        let mut taken = 0;

        'outer: for chapter in &self.chapters {
            for section in &chapter.sections {
                let remaining = max_words.saturating_sub(taken);
                if remaining == 0 {
                    break 'outer;
                }

                let words: Vec<&str> = section.clean_text.split_whitespace().collect();
                if words.len() <= remaining {
                    sample.push_str(&section.clean_text);
                    sample.push_str("\n\n");
                    taken += words.len();
                } else {
                    sample.push_str(&words[..remaining].join(" "));
                    break 'outer;
                }
            }
        }

        sample
    }
}

/// 解析出的章
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedChapter {
    /// 章编号（卷内 1 起）
    pub chapter_number: usize,
    pub detected_title: String,
    /// 检测方式: play_act_pattern / regex_pattern / default
    pub detection_method: String,
    pub detection_confidence: f64,
    pub sections: Vec<ParsedSection>,
    pub word_count: usize,
}

/// 解析出的节
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSection {
    /// 节编号（章内 1 起）
    pub section_number: usize,
    pub raw_text: String,
    pub clean_text: String,
    pub word_count: usize,
    pub has_dialogue: bool,
    pub has_action: bool,
}
