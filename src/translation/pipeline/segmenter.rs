//! 内容分段器
//!
//! 把任意 DOM 子树切分为可处理的文本单元（分段）：
//! 1. 深度优先查找叶子内容容器，被忽略的元素跳过整棵子树；
//! 2. 每个容器收集合格文本节点，过长时按节点累积切分；
//! 3. 相邻的短分段合并为一个请求。

use std::fmt;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use super::filters::IgnorePolicy;
use crate::parsers::html::dom::{get_node_name, is_element, text_char_len, text_of};
use crate::parsers::html::is_block_element;
use crate::translation::config::{constants, SegmenterConfig};
use crate::translation::storage::{generate_dom_path, ContentLedger};

/// 可处理的文本单元
#[derive(Clone)]
pub struct Segment {
    pub id: String,
    /// 所有文本节点内容按文档顺序的拼接
    pub text_content: String,
    pub primary_element: Handle,
    pub elements: Vec<Handle>,
    pub text_nodes: Vec<Handle>,
    pub fingerprint: String,
    pub dom_path: String,
}

impl Segment {
    /// 文本长度（字符数）
    pub fn char_len(&self) -> usize {
        self.text_content.chars().count()
    }

    /// 文本节点内容的当前拼接，用于校验
    pub fn current_text(&self) -> String {
        self.text_nodes.iter().filter_map(text_of).collect()
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("text_content", &self.text_content)
            .field("elements", &self.elements.len())
            .field("text_nodes", &self.text_nodes.len())
            .field("fingerprint", &self.fingerprint)
            .field("dom_path", &self.dom_path)
            .finish()
    }
}

/// 内容分段器
#[derive(Debug, Clone)]
pub struct ContentSegmenter {
    config: SegmenterConfig,
    policy: IgnorePolicy,
    ledger: ContentLedger,
}

impl ContentSegmenter {
    pub fn new(config: SegmenterConfig, ledger: ContentLedger) -> Self {
        Self {
            config,
            policy: IgnorePolicy::default(),
            ledger,
        }
    }

    pub fn with_policy(mut self, policy: IgnorePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    pub fn policy(&self) -> &IgnorePolicy {
        &self.policy
    }

    /// 对子树分段
    ///
    /// 空内容或隐藏内容返回空列表，不会报错。
    pub fn segment_content(&self, root: &Handle) -> Vec<Segment> {
        let containers = self.find_content_containers(root);

        let mut segments = Vec::new();
        for container in &containers {
            segments.extend(self.extract_segments(container));
        }

        if self.config.merge_small_segments && segments.len() > 1 {
            segments = self.merge_small_segments(segments);
        }

        tracing::debug!(
            "分段完成: {} 个容器，{} 个分段",
            containers.len(),
            segments.len()
        );
        segments
    }

    /// 查找叶子内容容器（文档顺序，互不重叠）
    pub fn find_content_containers(&self, root: &Handle) -> Vec<Handle> {
        let mut containers = Vec::new();
        self.visit(root, &mut containers);
        containers
    }

    fn visit(&self, node: &Handle, containers: &mut Vec<Handle>) {
        if is_element(node) {
            if self.policy.should_ignore(node) {
                return;
            }
            if self.is_leaf_container(node) {
                containers.push(node.clone());
                return;
            }
        } else if !matches!(node.data, NodeData::Document) {
            return;
        }

        for child in node.children.borrow().iter() {
            self.visit(child, containers);
        }
    }

    /// 文本足够长，且块级后代不超过 3 个、每个都不超过 100 字符
    fn is_leaf_container(&self, element: &Handle) -> bool {
        let text = self.policy.extract_text(element);
        if text.trim().chars().count() < self.config.min_segment_length {
            return false;
        }

        let mut blocks = Vec::new();
        self.collect_block_descendants(element, &mut blocks);
        if blocks.len() > constants::MAX_NESTED_BLOCKS {
            return false;
        }

        blocks.iter().all(|block| {
            self.policy.extract_text(block).trim().chars().count()
                <= constants::MAX_NESTED_BLOCK_TEXT
        })
    }

    fn collect_block_descendants(&self, node: &Handle, blocks: &mut Vec<Handle>) {
        for child in node.children.borrow().iter() {
            let Some(tag) = get_node_name(child) else {
                continue;
            };
            if self.policy.should_ignore(child) {
                continue;
            }
            if is_block_element(tag) {
                blocks.push(child.clone());
            }
            self.collect_block_descendants(child, blocks);
        }
    }

    /// 把单个容器转换为分段，过长时切分
    pub fn extract_segments(&self, container: &Handle) -> Vec<Segment> {
        let text_nodes = self.policy.qualifying_text_nodes(container);
        if text_nodes.is_empty() {
            return Vec::new();
        }

        let text_content: String = text_nodes.iter().filter_map(text_of).collect();
        if text_content.trim().is_empty() {
            return Vec::new();
        }

        let tag = get_node_name(container).unwrap_or("node").to_string();
        let dom_path = generate_dom_path(container);

        if text_content.chars().count() <= self.config.max_segment_length {
            let fingerprint = self
                .ledger
                .generate_content_fingerprint(&text_content, &dom_path);
            return vec![Segment {
                id: format!("{}-{}", tag, fingerprint),
                text_content,
                primary_element: container.clone(),
                elements: vec![container.clone()],
                text_nodes,
                fingerprint,
                dom_path,
            }];
        }

        self.split_long_text(container, &tag, &dom_path, text_nodes)
    }

    /// 按节点累积切分；单个超长节点自成一组，不拆分节点
    fn split_long_text(
        &self,
        container: &Handle,
        tag: &str,
        dom_path: &str,
        text_nodes: Vec<Handle>,
    ) -> Vec<Segment> {
        let mut groups: Vec<Vec<Handle>> = Vec::new();
        let mut current: Vec<Handle> = Vec::new();
        let mut current_len = 0;

        for node in text_nodes {
            let len = text_char_len(&node);
            if !current.is_empty() && current_len + len > self.config.max_segment_length {
                groups.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current_len += len;
            current.push(node);
        }
        if !current.is_empty() {
            groups.push(current);
        }

        groups
            .into_iter()
            .enumerate()
            .map(|(index, nodes)| {
                let text_content: String = nodes.iter().filter_map(text_of).collect();
                let group_path = format!("{}[{}]", dom_path, index);
                let fingerprint = self
                    .ledger
                    .generate_content_fingerprint(&text_content, &group_path);
                Segment {
                    id: format!("{}-{}-{}", tag, fingerprint, index),
                    text_content,
                    primary_element: container.clone(),
                    elements: vec![container.clone()],
                    text_nodes: nodes,
                    fingerprint,
                    dom_path: group_path,
                }
            })
            .collect()
    }

    /// 合并相邻的短分段
    ///
    /// 累积到总长度不小于最小长度的两倍（或到最后一个分段）为一组；
    /// 单成员组原样保留。
    pub fn merge_small_segments(&self, segments: Vec<Segment>) -> Vec<Segment> {
        let threshold = self.config.min_segment_length * 2;
        let total = segments.len();

        let mut result = Vec::with_capacity(total);
        let mut group: Vec<Segment> = Vec::new();
        let mut group_len = 0;

        for (index, segment) in segments.into_iter().enumerate() {
            group_len += segment.char_len();
            group.push(segment);

            if group_len >= threshold || index + 1 == total {
                result.push(self.merge_group(std::mem::take(&mut group)));
                group_len = 0;
            }
        }

        result
    }

    fn merge_group(&self, mut group: Vec<Segment>) -> Segment {
        if group.len() == 1 {
            if let Some(segment) = group.pop() {
                return segment;
            }
        }

        let primary_element = group[0].primary_element.clone();
        let mut text_content = String::new();
        let mut text_nodes = Vec::new();
        let mut elements: Vec<Handle> = Vec::new();
        let mut paths = Vec::with_capacity(group.len());

        for segment in group {
            text_content.push_str(&segment.text_content);
            text_nodes.extend(segment.text_nodes);
            for element in segment.elements {
                if !elements.iter().any(|existing| Rc::ptr_eq(existing, &element)) {
                    elements.push(element);
                }
            }
            paths.push(segment.dom_path);
        }

        let dom_path = paths.join("|");
        let fingerprint = self
            .ledger
            .generate_content_fingerprint(&text_content, &dom_path);

        Segment {
            id: format!("merged-{}", fingerprint),
            text_content,
            primary_element,
            elements,
            text_nodes,
            fingerprint,
            dom_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{find_body, find_nodes, html_to_dom};
    use crate::translation::config::LedgerConfig;
    use markup5ever_rcdom::RcDom;

    fn segmenter() -> ContentSegmenter {
        ContentSegmenter::new(
            SegmenterConfig::default(),
            ContentLedger::new(LedgerConfig::default()),
        )
    }

    fn parse(html: &str) -> (RcDom, Handle) {
        let dom = html_to_dom(html.as_bytes(), "utf-8");
        let body = find_body(&dom).unwrap();
        (dom, body)
    }

    #[test]
    fn test_single_paragraph_segment() {
        let (_dom, body) = parse("<div><p>The quick brown fox jumps over the lazy dog.</p></div>");
        let segments = segmenter().segment_content(&body);

        assert_eq!(segments.len(), 1);
        let segment = &segments[0];
        assert_eq!(segment.text_content, "The quick brown fox jumps over the lazy dog.");
        assert_eq!(segment.current_text(), segment.text_content);
        assert!(segment.id.ends_with(&segment.fingerprint));
    }

    #[test]
    fn test_large_wrapper_descends_to_leaves() {
        let long = "word ".repeat(30);
        let html = format!(
            "<article><p>{0}</p><p>{0}</p><p>{0}</p><p>{0}</p></article>",
            long
        );
        let (_dom, body) = parse(&html);
        let segmenter = segmenter();
        let containers = segmenter.find_content_containers(&body);

        assert_eq!(containers.len(), 4);
        assert!(containers
            .iter()
            .all(|c| get_node_name(c) == Some("p")));
    }

    #[test]
    fn test_ignored_and_empty_content_yields_nothing() {
        let (_dom, body) = parse(
            "<div hidden><p>This hidden paragraph is long enough.</p></div><script>var a = 'long enough script text';</script><p>   </p>",
        );
        assert!(segmenter().segment_content(&body).is_empty());
    }

    #[test]
    fn test_long_text_splits_on_node_boundaries() {
        let span = "a".repeat(99) + " ";
        let html = format!("<p>{}</p>", format!("<span>{}</span>", span).repeat(9));
        let (_dom, body) = parse(&html);
        let p = find_nodes(&body, &["body", "p"]).remove(0);

        let segments = segmenter().extract_segments(&p);
        let lengths: Vec<usize> = segments.iter().map(Segment::char_len).collect();
        assert_eq!(lengths, vec![400, 400, 100]);
        assert!(segments[2].id.ends_with("-2"));
        assert!(segments[0].dom_path.ends_with("[0]"));
    }

    #[test]
    fn test_single_oversized_node_is_own_group() {
        let html = format!("<p><b>short</b>{}</p>", "x".repeat(450));
        let (_dom, body) = parse(&html);
        let p = find_nodes(&body, &["body", "p"]).remove(0);

        let segments = segmenter().extract_segments(&p);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text_content, "short");
        assert_eq!(segments[1].char_len(), 450);
    }

    #[test]
    fn test_merge_small_segments() {
        let (_dom, body) =
            parse("<div><span>aaaaaaaaaa</span><span>bbbbbbbbbb</span><span>cccccccccc</span></div>");
        let segmenter = segmenter();
        let spans = find_nodes(&body, &["body", "div", "span"]);
        let segments: Vec<Segment> = spans
            .iter()
            .flat_map(|span| segmenter.extract_segments(span))
            .collect();
        assert_eq!(segments.len(), 3);

        let merged = segmenter.merge_small_segments(segments);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].elements.len(), 3);
        assert_eq!(merged[0].text_content, "aaaaaaaaaabbbbbbbbbbcccccccccc");
        assert!(merged[0].id.starts_with("merged-"));
        assert_eq!(merged[0].dom_path.matches('|').count(), 2);
    }
}
