//! 忽略策略
//!
//! 判断哪些元素及其子树不参与分段：非内容标签、隐藏元素、可编辑区域、
//! 已处理的元素以及本工具注入的元素。这里是这些判断的唯一实现。

use std::collections::HashSet;
use std::sync::OnceLock;

use markup5ever_rcdom::{Handle, NodeData};
use regex::Regex;

use crate::parsers::html::dom::{get_node_attr, get_node_name, get_parent_node, has_node_attr};
use crate::translation::config::constants;

/// 是否为本工具注入的元素
pub fn is_tool_generated(node: &Handle) -> bool {
    has_node_attr(node, constants::TOOL_MARKER_ATTR)
}

/// 是否已被标记为处理过
pub fn is_processed(node: &Handle) -> bool {
    has_node_attr(node, constants::PROCESSED_ATTR)
        || has_node_attr(node, constants::WORD_PROCESSED_ATTR)
}

/// 是否通过属性或内联样式隐藏
pub fn is_hidden(node: &Handle) -> bool {
    if has_node_attr(node, "hidden") {
        return true;
    }

    if get_node_attr(node, "aria-hidden").is_some_and(|value| value.eq_ignore_ascii_case("true")) {
        return true;
    }

    get_node_attr(node, "style").is_some_and(|style| hidden_style_regex().is_match(&style))
}

/// 是否为可编辑区域
pub fn is_editable(node: &Handle) -> bool {
    get_node_attr(node, "contenteditable").is_some_and(|value| {
        let value = value.trim();
        value.is_empty() || value.eq_ignore_ascii_case("true")
    })
}

/// 是否为纯空白文本
pub fn is_whitespace_only(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

fn hidden_style_regex() -> &'static Regex {
    static HIDDEN_STYLE: OnceLock<Regex> = OnceLock::new();
    HIDDEN_STYLE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|;)\s*(?:display\s*:\s*none|visibility\s*:\s*hidden)\s*(?:!important)?\s*(?:;|$)")
            .expect("hidden style pattern is valid")
    })
}

/// 忽略策略
#[derive(Debug, Clone)]
pub struct IgnorePolicy {
    ignored_tags: HashSet<String>,
}

impl Default for IgnorePolicy {
    fn default() -> Self {
        Self {
            ignored_tags: constants::IGNORED_TAGS
                .iter()
                .map(|tag| tag.to_string())
                .collect(),
        }
    }
}

impl IgnorePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加额外忽略的标签
    pub fn with_ignored_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored_tags
            .extend(tags.into_iter().map(|tag| tag.as_ref().to_ascii_lowercase()));
        self
    }

    /// 元素（连同子树）是否应被忽略；非元素节点不受影响
    pub fn should_ignore(&self, node: &Handle) -> bool {
        let Some(tag) = get_node_name(node) else {
            return false;
        };

        self.ignored_tags.contains(&tag.to_ascii_lowercase())
            || is_tool_generated(node)
            || is_processed(node)
            || is_hidden(node)
            || is_editable(node)
    }

    /// 节点或其祖先（到 `root` 为止，含 `root`）是否被忽略
    pub fn is_within_ignored(&self, node: &Handle, root: &Handle) -> bool {
        let mut current = Some(node.clone());
        while let Some(candidate) = current {
            if self.should_ignore(&candidate) {
                return true;
            }
            if std::rc::Rc::ptr_eq(&candidate, root) {
                return false;
            }
            current = get_parent_node(&candidate);
        }
        false
    }

    /// 容器内合格的文本节点（跳过被忽略的子树和纯空白文本），文档顺序
    pub fn qualifying_text_nodes(&self, container: &Handle) -> Vec<Handle> {
        let mut nodes = Vec::new();
        if !self.should_ignore(container) {
            self.push_text_nodes(container, &mut nodes);
        }
        nodes
    }

    fn push_text_nodes(&self, node: &Handle, nodes: &mut Vec<Handle>) {
        for child in node.children.borrow().iter() {
            match &child.data {
                NodeData::Text { contents } => {
                    if !is_whitespace_only(&contents.borrow()) {
                        nodes.push(child.clone());
                    }
                }
                NodeData::Element { .. } => {
                    if !self.should_ignore(child) {
                        self.push_text_nodes(child, nodes);
                    }
                }
                _ => {}
            }
        }
    }

    /// 容器内合格文本的拼接
    pub fn extract_text(&self, container: &Handle) -> String {
        let mut text = String::new();
        for node in self.qualifying_text_nodes(container) {
            if let NodeData::Text { contents } = &node.data {
                text.push_str(&contents.borrow());
            }
        }
        text
    }
}
