//! EPUB 结构提取
//!
//! 流程:
//! 1. 打开 zip 包，按 .opf 后缀定位包描述文件
//! 2. 解析 OPF 取元数据（title/creator/description）、manifest 与 spine
//! 3. manifest href 相对 OPF 目录解析（百分号解码、分隔符归一化）
//! 4. 按 spine 声明顺序拼接各内容文件的清洗文本
//! 5. 清洗后的全文送入章节检测
//!
//! 元数据缺失不致命（降级为 epub_content 并记录错误）;
//! 内容阶段缺 OPF 或无任何可提取内容则整体失败

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::application::ports::ExtractError;
use crate::domain::detect_chapters;
use crate::domain::volume::{ParseMethod, ParsedVolume};

static BLOCK_CLOSE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</p>|</div>|</h[1-6]>|</section>|</article>").unwrap());
static LINE_BREAK_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static INTRA_LINE_WS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\S\n]+").unwrap());
static BLANK_RUN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// OPF 元数据（可重复元素取首个）
#[derive(Debug, Default)]
struct OpfMetadata {
    titles: Vec<String>,
    creators: Vec<String>,
    descriptions: Vec<String>,
}

/// OPF 包描述: 元数据 + manifest (id -> href) + spine (idref 有序)
#[derive(Debug, Default)]
struct OpfPackage {
    metadata: OpfMetadata,
    manifest: Vec<(String, String)>,
    spine: Vec<String>,
}

pub(super) fn parse(data: &[u8]) -> Result<ParsedVolume, ExtractError> {
    let mut parsed = ParsedVolume::new(ParseMethod::EpubContent);

    // Step 1: 元数据（非致命）
    match extract_metadata(data) {
        Ok(metadata) => {
            parsed.parse_method = ParseMethod::EpubMetadata;
            if let Some(title) = metadata.titles.first() {
                parsed.detected_title = title.clone();
            }
            if let Some(creator) = metadata.creators.first() {
                parsed.detected_author = creator.clone();
            }
            if let Some(description) = metadata.descriptions.first() {
                parsed.detected_description = description.clone();
            }
        }
        Err(e) => {
            parsed
                .errors
                .push(format!("Failed to extract EPUB metadata: {}", e));
        }
    }

    // Step 2: 内容提取（致命）
    let content = extract_content(data)?;

    // Step 3: 章节检测与统计
    parsed.chapters = detect_chapters(&content);
    parsed.recompute_word_count();

    tracing::info!(
        chapters = parsed.chapters.len(),
        words = parsed.word_count,
        "EPUB parsing completed"
    );
    Ok(parsed)
}

fn open_archive(data: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, ExtractError> {
    ZipArchive::new(Cursor::new(data)).map_err(|e| ExtractError::CorruptArchive(e.to_string()))
}

/// 按 .opf 后缀定位包描述文件（大小写不敏感）
fn find_opf_name(archive: &ZipArchive<Cursor<&[u8]>>) -> Option<String> {
    archive
        .file_names()
        .find(|name| name.to_lowercase().ends_with(".opf"))
        .map(|name| name.to_string())
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<String, ExtractError> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| ExtractError::CorruptArchive(e.to_string()))?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)
        .map_err(|e| ExtractError::IoError(e.to_string()))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn extract_metadata(data: &[u8]) -> Result<OpfMetadata, ExtractError> {
    let mut archive = open_archive(data)?;
    let opf_name = find_opf_name(&archive).ok_or(ExtractError::MissingPackageDocument)?;
    let xml = read_entry(&mut archive, &opf_name)?;
    Ok(parse_opf(&xml)?.metadata)
}

fn extract_content(data: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(data)?;

    // 名称查找表: 原始名与去掉前导斜杠的变体都指向实际条目名
    let mut entry_names: HashMap<String, String> = HashMap::new();
    for name in archive.file_names() {
        entry_names.insert(name.to_string(), name.to_string());
        entry_names.insert(name.trim_start_matches('/').to_string(), name.to_string());
    }

    let opf_name = find_opf_name(&archive).ok_or(ExtractError::MissingPackageDocument)?;
    let xml = read_entry(&mut archive, &opf_name)?;
    let package = parse_opf(&xml)?;

    // manifest href 相对 OPF 目录解析
    let opf_dir = match opf_name.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    };
    let mut manifest: HashMap<String, String> = HashMap::new();
    for (id, href) in &package.manifest {
        manifest.insert(id.clone(), resolve_href(&opf_dir, href));
    }

    // 按 spine 顺序拼接
    let mut text = String::new();
    for idref in &package.spine {
        let target = match manifest.get(idref) {
            Some(target) => target,
            None => {
                tracing::warn!(idref = %idref, "Spine item not found in manifest");
                continue;
            }
        };

        // 尝试多种路径变体定位 zip 条目
        let variations = [
            target.clone(),
            target.trim_start_matches('/').to_string(),
            format!("/{}", target),
            target.replace('\\', "/"),
        ];
        let entry = variations
            .iter()
            .find_map(|candidate| entry_names.get(candidate));

        let entry = match entry {
            Some(entry) => entry.clone(),
            None => {
                tracing::warn!(target = %target, "Content file not found in archive");
                continue;
            }
        };

        match read_entry(&mut archive, &entry) {
            Ok(raw) => {
                text.push_str(&clean_html(&raw));
                text.push_str("\n\n");
            }
            Err(e) => {
                tracing::warn!(entry = %entry, error = %e, "Failed to read content file");
                continue;
            }
        }
    }

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(ExtractError::NoContent);
    }
    Ok(text)
}

/// 解析 OPF 包描述文件
///
/// 按元素局部名匹配（对命名空间前缀不敏感）
fn parse_opf(xml: &str) -> Result<OpfPackage, ExtractError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut package = OpfPackage::default();
    let mut in_metadata = false;
    // 正在采集文本的元数据字段及缓冲
    let mut capture: Option<(MetaField, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"metadata" => in_metadata = true,
                b"title" if in_metadata => capture = Some((MetaField::Title, String::new())),
                b"creator" if in_metadata => capture = Some((MetaField::Creator, String::new())),
                b"description" if in_metadata => {
                    capture = Some((MetaField::Description, String::new()))
                }
                b"item" => push_manifest_item(&e, &mut package),
                b"itemref" => push_spine_item(&e, &mut package),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"item" => push_manifest_item(&e, &mut package),
                b"itemref" => push_spine_item(&e, &mut package),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some((_, buffer)) = capture.as_mut() {
                    if let Ok(text) = t.unescape() {
                        buffer.push_str(&text);
                    }
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"metadata" => in_metadata = false,
                b"title" | b"creator" | b"description" => {
                    if let Some((field, buffer)) = capture.take() {
                        match field {
                            MetaField::Title => package.metadata.titles.push(buffer),
                            MetaField::Creator => package.metadata.creators.push(buffer),
                            MetaField::Description => package.metadata.descriptions.push(buffer),
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::InvalidPackageDocument(e.to_string())),
            _ => {}
        }
    }

    Ok(package)
}

#[derive(Debug, Clone, Copy)]
enum MetaField {
    Title,
    Creator,
    Description,
}

fn push_manifest_item(e: &quick_xml::events::BytesStart<'_>, package: &mut OpfPackage) {
    let mut id = None;
    let mut href = None;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"id" => id = attr.unescape_value().ok().map(|v| v.into_owned()),
            b"href" => href = attr.unescape_value().ok().map(|v| v.into_owned()),
            _ => {}
        }
    }
    if let (Some(id), Some(href)) = (id, href) {
        package.manifest.push((id, href));
    }
}

fn push_spine_item(e: &quick_xml::events::BytesStart<'_>, package: &mut OpfPackage) {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"idref" {
            if let Ok(idref) = attr.unescape_value() {
                package.spine.push(idref.into_owned());
            }
        }
    }
}

/// manifest href 解析为 zip 内路径
///
/// 百分号解码; 绝对路径去前导斜杠; 相对路径拼 OPF 目录;
/// 反斜杠归一化为正斜杠并去掉 "./" 前缀
fn resolve_href(opf_dir: &str, href: &str) -> String {
    let href = percent_decode_str(href).decode_utf8_lossy().into_owned();
    let href = href.strip_prefix("./").unwrap_or(&href).to_string();

    let full = if let Some(stripped) = href.strip_prefix('/') {
        stripped.to_string()
    } else if !opf_dir.is_empty() && opf_dir != "." {
        format!("{}/{}", opf_dir, href)
    } else {
        href
    };

    let full = full.replace('\\', "/");
    full.strip_prefix("./").unwrap_or(&full).to_string()
}

/// HTML 清洗: 块级闭合标签转段落分隔，去标签，实体解码，
/// 行内空白折叠（保留换行），3 个以上连续空行压成一个
fn clean_html(raw: &str) -> String {
    let text = BLOCK_CLOSE_PATTERN.replace_all(raw, "\n\n");
    let text = LINE_BREAK_PATTERN.replace_all(&text, "\n");
    let text = TAG_PATTERN.replace_all(&text, "");
    let text = html_escape::decode_html_entities(&text).into_owned();

    let lines: Vec<String> = text
        .lines()
        .map(|line| {
            INTRA_LINE_WS_PATTERN
                .replace_all(line, " ")
                .trim()
                .to_string()
        })
        .collect();
    let text = lines.join("\n");

    BLANK_RUN_PATTERN
        .replace_all(&text, "\n\n")
        .trim()
        .to_string()
}
