//! 文本替换协作方
//!
//! 定义外部文本替换（翻译后端）和发音标注的接口，以及基于词汇表的本地替换器。
//! 所有偏移均按字符（Unicode 标量值）计算，区间为左闭右开。

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use markup5ever_rcdom::Handle;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parsers::html::utils::{char_find, char_slice};
use crate::translation::error::{TranslationError, TranslationResult};

/// 文本区间 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Position {
    pub start: usize,
    pub end: usize,
}

impl Position {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 两个区间是否相交
    pub fn overlaps(&self, other: &Position) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// 后端返回的原始替换项，位置可能缺失
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct RawReplacement {
    pub original: String,
    pub translation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, alias = "isNew", skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
}

impl RawReplacement {
    pub fn new(original: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            translation: translation.into(),
            position: None,
            is_new: None,
        }
    }

    pub fn at(mut self, start: usize, end: usize) -> Self {
        self.position = Some(Position::new(start, end));
        self
    }
}

/// 一次替换调用的结果
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct ReplacementSet {
    #[serde(default)]
    pub replacements: Vec<RawReplacement>,
}

impl ReplacementSet {
    pub fn new(replacements: Vec<RawReplacement>) -> Self {
        Self { replacements }
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }
}

/// 定位后的替换项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub original: String,
    pub translation: String,
    pub position: Position,
    pub is_new: bool,
}

impl Replacement {
    pub fn new(
        original: impl Into<String>,
        translation: impl Into<String>,
        start: usize,
        end: usize,
    ) -> Self {
        Self {
            original: original.into(),
            translation: translation.into(),
            position: Position::new(start, end),
            is_new: true,
        }
    }
}

/// 为缺少位置的替换项分配位置
///
/// 从左到右扫描文本，每次从上一个匹配之后开始查找，找不到时再从头查找一次；
/// 仍找不到或原文为空的项被丢弃。
pub fn assign_positions(text: &str, raw: Vec<RawReplacement>) -> Vec<Replacement> {
    let mut cursor = 0;
    let mut result = Vec::with_capacity(raw.len());

    for item in raw {
        if item.original.is_empty() {
            continue;
        }

        if let Some(position) = item.position {
            result.push(Replacement {
                is_new: item.is_new.unwrap_or(true),
                original: item.original,
                translation: item.translation,
                position,
            });
            continue;
        }

        let len = item.original.chars().count();
        let found = char_slice(text, cursor, text.chars().count())
            .and_then(|rest| char_find(rest, &item.original))
            .map(|offset| cursor + offset)
            .or_else(|| char_find(text, &item.original));

        match found {
            Some(start) => {
                cursor = start + len;
                result.push(Replacement {
                    original: item.original,
                    translation: item.translation,
                    position: Position::new(start, start + len),
                    is_new: true,
                });
            }
            None => tracing::debug!("替换项在文本中找不到: {}", item.original),
        }
    }

    result
}

/// 外部文本替换接口
#[async_trait(?Send)]
pub trait TextReplacer {
    /// 对一段文本给出替换项
    async fn replace_text(&self, text: &str) -> TranslationResult<ReplacementSet>;
}

/// 发音标注接口
#[async_trait(?Send)]
pub trait PronunciationAnnotator {
    /// 为译文元素添加发音，成功返回 `true`
    async fn add_pronunciation_to_element(&self, element: &Handle, word: &str) -> bool;
}

/// 基于词汇表的替换器
///
/// 整词、大小写不敏感匹配，较长的词条优先。
#[derive(Debug, Clone)]
pub struct GlossaryReplacer {
    entries: BTreeMap<String, String>,
    pattern: Option<Regex>,
}

impl GlossaryReplacer {
    /// 从词条创建替换器
    pub fn new<I, K, V>(entries: I) -> TranslationResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let entries: BTreeMap<String, String> = entries
            .into_iter()
            .filter_map(|(term, translation)| {
                let term = term.as_ref().trim().to_lowercase();
                (!term.is_empty()).then(|| (term, translation.into()))
            })
            .collect();

        let pattern = if entries.is_empty() {
            None
        } else {
            let mut terms: Vec<&String> = entries.keys().collect();
            terms.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
            let alternation = terms
                .iter()
                .map(|term| regex::escape(term))
                .collect::<Vec<_>>()
                .join("|");
            let regex = Regex::new(&format!(r"(?i)\b(?:{})\b", alternation))
                .map_err(|e| TranslationError::ConfigError(format!("词汇表正则构建失败: {}", e)))?;
            Some(regex)
        };

        Ok(Self { entries, pattern })
    }

    /// 从 TOML 或 JSON 文件加载词汇表（`原文 = "译文"` 的平铺表）
    pub fn from_file<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TranslationError::ConfigError(format!("读取词汇表失败 {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let entries: BTreeMap<String, String> = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };

        tracing::info!("已加载词汇表 {}: {} 个词条", path.display(), entries.len());
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 同步查找所有匹配，位置按字符计
    pub fn find_replacements(&self, text: &str) -> Vec<RawReplacement> {
        let Some(pattern) = &self.pattern else {
            return Vec::new();
        };

        let mut replacements = Vec::new();
        let mut char_offset = 0;
        let mut byte_cursor = 0;

        for found in pattern.find_iter(text) {
            char_offset += text[byte_cursor..found.start()].chars().count();
            let len = found.as_str().chars().count();
            byte_cursor = found.end();

            if let Some(translation) = self.entries.get(&found.as_str().to_lowercase()) {
                replacements.push(RawReplacement {
                    original: found.as_str().to_string(),
                    translation: translation.clone(),
                    position: Some(Position::new(char_offset, char_offset + len)),
                    is_new: Some(true),
                });
            }
            char_offset += len;
        }

        replacements
    }
}

#[async_trait(?Send)]
impl TextReplacer for GlossaryReplacer {
    async fn replace_text(&self, text: &str) -> TranslationResult<ReplacementSet> {
        Ok(ReplacementSet::new(self.find_replacements(text)))
    }
}
