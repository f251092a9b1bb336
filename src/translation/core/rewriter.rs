//! DOM 范围改写
//!
//! 把分段内的文本区间改写为“原文 + 译文”标注结构：
//!
//! ```text
//! <span class="wordweave-original" data-wordweave="original" data-wordweave-word-processed="true">quick</span>
//! <span class="wordweave-translation wordweave-glow" data-wordweave="translation">快速的</span>
//! ```
//!
//! 替换项按起点降序应用，先改动的位置不会影响后续替换项的偏移。单个替换项失败
//! 只会被记录并跳过；只有分段文本无法重建（节点脱离文档）时整个分段失败。

use std::sync::OnceLock;

use markup5ever_rcdom::Handle;
use regex::Regex;

use crate::parsers::html::dom::{
    append_child, create_element, create_text, get_parent_node, has_node_attr, insert_after,
    insert_before, is_attached, remove_class_recursive, set_node_attr, text_char_len, text_of,
};
use crate::parsers::html::utils::{char_find, char_slice};
use crate::parsers::html::TextRange;
use crate::translation::config::{constants, RewriteConfig, TranslationPosition};
use crate::translation::error::{helpers, TranslationError, TranslationResult};
use crate::translation::pipeline::Segment;
use crate::translation::replacer::{Position, Replacement};

/// 一个分段的改写结果
#[derive(Debug, Default)]
pub struct RewriteOutcome {
    /// 成功应用的替换数
    pub applied: usize,
    /// 被丢弃的替换数（漂移、重叠、范围校验失败、DOM 错误）
    pub dropped: usize,
    /// 新插入的译文元素，带高亮 class
    pub translation_elements: Vec<Handle>,
    /// 需要补充发音的译文元素及其文本
    pub pronunciation_targets: Vec<(Handle, String)>,
}

/// DOM 范围改写器
#[derive(Debug, Clone, Default)]
pub struct DomRangeRewriter {
    options: RewriteConfig,
    pronunciation_enabled: bool,
}

impl DomRangeRewriter {
    pub fn new(options: RewriteConfig) -> Self {
        Self {
            options,
            pronunciation_enabled: false,
        }
    }

    /// 启用发音标注：符合条件的译文元素会被打上标记并出现在结果里
    pub fn with_pronunciation(mut self, enabled: bool) -> Self {
        self.pronunciation_enabled = enabled;
        self
    }

    pub fn options(&self) -> &RewriteConfig {
        &self.options
    }

    /// 改写一个分段
    ///
    /// # 错误
    /// - `TranslationError::DomDetached`: 分段的文本节点已脱离文档，DOM 未被修改
    pub fn rewrite_segment(
        &self,
        segment: &Segment,
        replacements: Vec<Replacement>,
    ) -> TranslationResult<RewriteOutcome> {
        let text = reconstruct_text(segment)?;

        let (validated, mut dropped) = validate_replacements(&text, replacements);
        let (ordered, overlapping) = order_without_overlaps(validated);
        dropped += overlapping;

        let mut outcome = RewriteOutcome {
            dropped,
            ..RewriteOutcome::default()
        };

        for replacement in ordered {
            match self.apply_replacement(segment, &replacement) {
                Ok(translation_element) => {
                    outcome.applied += 1;
                    if self.pronunciation_enabled
                        && is_pronounceable(&replacement.translation)
                        && !has_node_attr(&translation_element, constants::PRONUNCIATION_ATTR)
                    {
                        set_node_attr(
                            &translation_element,
                            constants::PRONUNCIATION_ATTR,
                            Some("true".to_string()),
                        );
                        outcome
                            .pronunciation_targets
                            .push((translation_element.clone(), replacement.translation.clone()));
                    }
                    outcome.translation_elements.push(translation_element);
                }
                Err(e) => {
                    outcome.dropped += 1;
                    helpers::log_error(&e.with_context(&segment.id));
                }
            }
        }

        tracing::debug!(
            "分段 {} 改写完成: 应用 {}，丢弃 {}",
            segment.id,
            outcome.applied,
            outcome.dropped
        );
        Ok(outcome)
    }

    /// 应用单个替换项，返回插入的译文元素
    fn apply_replacement(
        &self,
        segment: &Segment,
        replacement: &Replacement,
    ) -> TranslationResult<Handle> {
        let range = locate_range(&segment.text_nodes, replacement.position)?;

        let actual = range.text()?;
        if actual != replacement.original {
            return Err(TranslationError::RangeMismatch {
                expected: replacement.original.clone(),
                actual,
            });
        }

        let wrapper = self.original_wrapper();
        range.surround_contents(&wrapper)?;
        // 跨元素的范围会浅克隆部分包含的容器，克隆体不应带走处理中标记
        remove_class_recursive(&wrapper, constants::PROCESSING_CLASS);

        let translation_element = self.translation_element(&replacement.translation);
        let inserted = match self.options.translation_position {
            TranslationPosition::Before => match get_parent_node(&wrapper) {
                Some(parent) => {
                    insert_before(&parent, translation_element.clone(), Some(&wrapper));
                    true
                }
                None => false,
            },
            TranslationPosition::After => insert_after(&wrapper, translation_element.clone()),
        };

        if !inserted {
            return Err(TranslationError::DomError(
                "原文包裹元素没有父节点，无法插入译文".to_string(),
            ));
        }

        tracing::debug!(
            "替换 '{}' -> '{}' @ {}..{}",
            replacement.original,
            replacement.translation,
            replacement.position.start,
            replacement.position.end
        );
        Ok(translation_element)
    }

    fn original_wrapper(&self) -> Handle {
        let class = match self.options.display_mode.css_class() {
            Some(mode_class) => format!("{} {}", constants::ORIGINAL_CLASS, mode_class),
            None => constants::ORIGINAL_CLASS.to_string(),
        };
        create_element(
            "span",
            &[
                ("class", class.as_str()),
                (constants::TOOL_MARKER_ATTR, "original"),
                (constants::WORD_PROCESSED_ATTR, "true"),
            ],
        )
    }

    fn translation_element(&self, translation: &str) -> Handle {
        let class = format!("{} {}", constants::TRANSLATION_CLASS, constants::GLOW_CLASS);
        let element = create_element(
            "span",
            &[
                ("class", class.as_str()),
                (constants::TOOL_MARKER_ATTR, "translation"),
            ],
        );
        let text = if self.options.show_parentheses {
            format!("({})", translation)
        } else {
            translation.to_string()
        };
        append_child(&element, create_text(&text));
        element
    }
}

/// 从当前文本节点重建分段文本
///
/// 任一节点脱离文档时返回 `DomDetached`。
pub fn reconstruct_text(segment: &Segment) -> TranslationResult<String> {
    let mut text = String::new();
    for node in &segment.text_nodes {
        if !is_attached(node) {
            return Err(TranslationError::DomDetached(format!(
                "分段 {} 的文本节点已脱离文档",
                segment.id
            )));
        }
        match text_of(node) {
            Some(content) => text.push_str(&content),
            None => {
                return Err(TranslationError::DomError(format!(
                    "分段 {} 包含非文本节点",
                    segment.id
                )))
            }
        }
    }
    Ok(text)
}

/// 校验替换项与文本一致，不一致时重新定位一次，仍失败则丢弃
///
/// 返回保留的替换项和丢弃数量。
pub fn validate_replacements(
    text: &str,
    replacements: Vec<Replacement>,
) -> (Vec<Replacement>, usize) {
    let mut kept = Vec::with_capacity(replacements.len());
    let mut dropped = 0;

    for mut replacement in replacements {
        if replacement.original.is_empty() {
            dropped += 1;
            continue;
        }

        let position = replacement.position;
        if char_slice(text, position.start, position.end) == Some(replacement.original.as_str()) {
            kept.push(replacement);
            continue;
        }

        match char_find(text, &replacement.original) {
            Some(start) => {
                let end = start + replacement.original.chars().count();
                tracing::debug!(
                    "替换项 '{}' 位置漂移 {}..{} -> {}..{}",
                    replacement.original,
                    position.start,
                    position.end,
                    start,
                    end
                );
                replacement.position = Position::new(start, end);
                kept.push(replacement);
            }
            None => {
                dropped += 1;
                helpers::log_error(&TranslationError::OffsetDrift {
                    original: replacement.original,
                });
            }
        }
    }

    (kept, dropped)
}

/// 按起点降序排列，丢弃与已接受（更靠后）替换项重叠的项
pub fn order_without_overlaps(mut replacements: Vec<Replacement>) -> (Vec<Replacement>, usize) {
    replacements.sort_by(|a, b| {
        b.position
            .start
            .cmp(&a.position.start)
            .then(b.position.end.cmp(&a.position.end))
    });

    let mut accepted: Vec<Replacement> = Vec::with_capacity(replacements.len());
    let mut dropped = 0;
    for replacement in replacements {
        if accepted
            .iter()
            .any(|existing| existing.position.overlaps(&replacement.position))
        {
            tracing::debug!("丢弃重叠的替换项 '{}'", replacement.original);
            dropped += 1;
        } else {
            accepted.push(replacement);
        }
    }

    (accepted, dropped)
}

/// 用累计字符数把区间映射到文本节点上的边界点
///
/// 起点取第一个满足 `start < 累计 + 长度` 的节点，终点取第一个满足
/// `end <= 累计 + 长度` 的节点。
pub fn locate_range(text_nodes: &[Handle], position: Position) -> TranslationResult<TextRange> {
    if position.is_empty() {
        return Err(TranslationError::InvalidInput(format!(
            "空区间 {}..{}",
            position.start, position.end
        )));
    }

    let mut start = None;
    let mut end = None;
    let mut counted = 0;

    for node in text_nodes {
        let len = text_char_len(node);
        if start.is_none() && position.start < counted + len {
            start = Some((node.clone(), position.start - counted));
        }
        if start.is_some() && position.end <= counted + len {
            end = Some((node.clone(), position.end - counted));
            break;
        }
        counted += len;
    }

    match (start, end) {
        (Some((start_node, start_offset)), Some((end_node, end_offset))) => Ok(TextRange::new(
            start_node,
            start_offset,
            end_node,
            end_offset,
        )),
        _ => Err(TranslationError::InvalidInput(format!(
            "区间 {}..{} 超出分段文本",
            position.start, position.end
        ))),
    }
}

/// 短的拉丁字母词或词组（最多 3 个词）才需要发音
pub fn is_pronounceable(text: &str) -> bool {
    static LATIN_PHRASE: OnceLock<Regex> = OnceLock::new();
    let regex = LATIN_PHRASE.get_or_init(|| {
        Regex::new(r"^[A-Za-z\x{00C0}-\x{024F}'’\-]+(?:\s+[A-Za-z\x{00C0}-\x{024F}'’\-]+)*$")
            .expect("latin phrase pattern is valid")
    });

    let trimmed = text.trim();
    regex.is_match(trimmed)
        && trimmed.split_whitespace().count() <= constants::MAX_PRONUNCIATION_WORDS
}
