//! 文本范围操作
//!
//! 在 rcdom 树上实现一个最小化的 DOM `Range`：边界点总是落在文本节点上，
//! 支持读取范围文本、拆分文本节点，以及把范围内容抽取出来包进一个新元素
//! （对部分包含的祖先元素按 `extractContents` 的语义做浅克隆）。
//!
//! 所有偏移量均以字符（Unicode 标量值）计。

use std::rc::Rc;

use markup5ever_rcdom::Handle;
use thiserror::Error;

use super::dom::{
    append_child, collect_text_nodes, create_text, detach, get_parent_node, insert_after,
    insert_before, is_attached, next_sibling, set_text, shallow_clone, text_of,
};
use super::utils::char_to_byte;

/// 范围操作错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    /// 节点已从文档上摘除
    #[error("节点已脱离文档")]
    Detached,

    /// 边界点不是文本节点
    #[error("边界点不是文本节点")]
    NotText,

    /// 偏移量超出文本长度
    #[error("偏移量 {offset} 超出文本长度 {length}")]
    OffsetOutOfBounds { offset: usize, length: usize },

    /// 范围为空或起点在终点之后
    #[error("范围为空或方向颠倒")]
    EmptyRange,

    /// 两个边界点没有共同祖先，或终点位于起点之前
    #[error("边界点不在同一棵树中或顺序错误")]
    Disconnected,
}

/// 文本范围：`[start@start_offset, end@end_offset)`
#[derive(Debug, Clone)]
pub struct TextRange {
    pub start: Handle,
    pub start_offset: usize,
    pub end: Handle,
    pub end_offset: usize,
}

impl TextRange {
    pub fn new(start: Handle, start_offset: usize, end: Handle, end_offset: usize) -> Self {
        Self {
            start,
            start_offset,
            end,
            end_offset,
        }
    }

    fn is_collapsed_node(&self) -> bool {
        Rc::ptr_eq(&self.start, &self.end)
    }

    /// 范围内的文本（相当于 `Range.toString()`）
    pub fn text(&self) -> Result<String, DomError> {
        let start_text = text_of(&self.start).ok_or(DomError::NotText)?;
        let end_text = text_of(&self.end).ok_or(DomError::NotText)?;
        check_offset(&start_text, self.start_offset)?;
        check_offset(&end_text, self.end_offset)?;

        if self.is_collapsed_node() {
            if self.start_offset > self.end_offset {
                return Err(DomError::EmptyRange);
            }
            return Ok(start_text
                .chars()
                .skip(self.start_offset)
                .take(self.end_offset - self.start_offset)
                .collect());
        }

        let common = common_ancestor(&self.start, &self.end).ok_or(DomError::Disconnected)?;
        let text_nodes = collect_text_nodes(&common);
        let start_index = position_of(&text_nodes, &self.start).ok_or(DomError::Disconnected)?;
        let end_index = position_of(&text_nodes, &self.end).ok_or(DomError::Disconnected)?;
        if end_index < start_index {
            return Err(DomError::Disconnected);
        }

        let mut buf: String = start_text.chars().skip(self.start_offset).collect();
        for node in &text_nodes[start_index + 1..end_index] {
            if let Some(text) = text_of(node) {
                buf.push_str(&text);
            }
        }
        buf.extend(end_text.chars().take(self.end_offset));
        Ok(buf)
    }

    /// 把范围内容抽取出来放进 `wrapper`，并把 `wrapper` 插回原位置
    ///
    /// 调用结束后 `wrapper` 恰好包含原范围的全部文本，范围外的文本保持原位。
    pub fn surround_contents(&self, wrapper: &Handle) -> Result<(), DomError> {
        if !is_attached(&self.start) || !is_attached(&self.end) {
            return Err(DomError::Detached);
        }
        let start_len = text_of(&self.start).ok_or(DomError::NotText)?.chars().count();
        let end_len = text_of(&self.end).ok_or(DomError::NotText)?.chars().count();
        if self.start_offset > start_len {
            return Err(DomError::OffsetOutOfBounds {
                offset: self.start_offset,
                length: start_len,
            });
        }
        if self.end_offset > end_len {
            return Err(DomError::OffsetOutOfBounds {
                offset: self.end_offset,
                length: end_len,
            });
        }

        if self.is_collapsed_node() {
            if self.start_offset >= self.end_offset {
                return Err(DomError::EmptyRange);
            }
            let middle = if self.start_offset > 0 {
                split_text(&self.start, self.start_offset)?
            } else {
                self.start.clone()
            };
            let middle_len = self.end_offset - self.start_offset;
            if middle_len < text_of(&middle).map_or(0, |t| t.chars().count()) {
                split_text(&middle, middle_len)?;
            }
            let parent = get_parent_node(&middle).ok_or(DomError::Detached)?;
            insert_before(&parent, wrapper.clone(), Some(&middle));
            append_child(wrapper, middle);
            return Ok(());
        }

        let common = common_ancestor(&self.start, &self.end).ok_or(DomError::Disconnected)?;
        {
            let text_nodes = collect_text_nodes(&common);
            let start_index =
                position_of(&text_nodes, &self.start).ok_or(DomError::Disconnected)?;
            let end_index = position_of(&text_nodes, &self.end).ok_or(DomError::Disconnected)?;
            if end_index < start_index {
                return Err(DomError::Disconnected);
            }
        }

        // 先拆分边界文本节点，使范围两端都完整覆盖各自的节点
        let first = if self.start_offset > 0 {
            split_text(&self.start, self.start_offset)?
        } else {
            self.start.clone()
        };
        let last = self.end.clone();
        if self.end_offset < end_len {
            split_text(&last, self.end_offset)?;
        }

        let top_start = child_of_ancestor(&first, &common).ok_or(DomError::Disconnected)?;
        let top_end = child_of_ancestor(&last, &common).ok_or(DomError::Disconnected)?;

        // 终点一侧若被部分包含，原节点会留在原位，插入点就在它前面；
        // 否则终点节点整体移走，插入点是它原来的下一个兄弟
        let end_moves_whole = Rc::ptr_eq(&top_end, &last);
        let reference = if end_moves_whole {
            next_sibling(&top_end)
        } else {
            Some(top_end.clone())
        };

        let middle: Vec<Handle> = {
            let children = common.children.borrow();
            let start_index = children.iter().position(|c| Rc::ptr_eq(c, &top_start));
            let end_index = children.iter().position(|c| Rc::ptr_eq(c, &top_end));
            match (start_index, end_index) {
                (Some(s), Some(e)) if s < e => children[s + 1..e].to_vec(),
                _ => return Err(DomError::Disconnected),
            }
        };

        let start_piece = take_start_side(&first, &common)?;
        let end_piece = take_end_side(&last, &common)?;

        append_child(wrapper, start_piece);
        for node in middle {
            append_child(wrapper, node);
        }
        append_child(wrapper, end_piece);

        insert_before(&common, wrapper.clone(), reference.as_ref());
        Ok(())
    }
}

fn check_offset(text: &str, offset: usize) -> Result<(), DomError> {
    let length = text.chars().count();
    if offset > length {
        return Err(DomError::OffsetOutOfBounds { offset, length });
    }
    Ok(())
}

fn position_of(nodes: &[Handle], node: &Handle) -> Option<usize> {
    nodes.iter().position(|candidate| Rc::ptr_eq(candidate, node))
}

/// 在字符偏移处拆分文本节点：原节点保留 `[0, offset)`，返回承载剩余部分的新节点
pub fn split_text(node: &Handle, offset: usize) -> Result<Handle, DomError> {
    let text = text_of(node).ok_or(DomError::NotText)?;
    let byte_offset = char_to_byte(&text, offset).ok_or(DomError::OffsetOutOfBounds {
        offset,
        length: text.chars().count(),
    })?;
    if get_parent_node(node).is_none() {
        return Err(DomError::Detached);
    }

    let tail = create_text(&text[byte_offset..]);
    set_text(node, &text[..byte_offset]);
    insert_after(node, tail.clone());
    Ok(tail)
}

/// 最近公共祖先（包含自身）
pub fn common_ancestor(a: &Handle, b: &Handle) -> Option<Handle> {
    let mut ancestors = Vec::new();
    let mut current = Some(a.clone());
    while let Some(node) = current {
        current = get_parent_node(&node);
        ancestors.push(node);
    }

    let mut current = Some(b.clone());
    while let Some(node) = current {
        if ancestors.iter().any(|ancestor| Rc::ptr_eq(ancestor, &node)) {
            return Some(node);
        }
        current = get_parent_node(&node);
    }
    None
}

/// `node` 的祖先链中作为 `ancestor` 直接子节点的那一个（可能是 `node` 自身）
fn child_of_ancestor(node: &Handle, ancestor: &Handle) -> Option<Handle> {
    let mut current = node.clone();
    loop {
        let parent = get_parent_node(&current)?;
        if Rc::ptr_eq(&parent, ancestor) {
            return Some(current);
        }
        current = parent;
    }
}

fn following_siblings(node: &Handle) -> Vec<Handle> {
    let Some(parent) = get_parent_node(node) else {
        return Vec::new();
    };
    let children = parent.children.borrow();
    match children.iter().position(|child| Rc::ptr_eq(child, node)) {
        Some(index) => children[index + 1..].to_vec(),
        None => Vec::new(),
    }
}

fn preceding_siblings(node: &Handle) -> Vec<Handle> {
    let Some(parent) = get_parent_node(node) else {
        return Vec::new();
    };
    let children = parent.children.borrow();
    match children.iter().position(|child| Rc::ptr_eq(child, node)) {
        Some(index) => children[..index].to_vec(),
        None => Vec::new(),
    }
}

/// 抽取起点一侧：从 `first` 一直到 `common` 的子节点层级，
/// 部分包含的祖先被浅克隆，克隆体接收 `first` 及其后的兄弟
fn take_start_side(first: &Handle, common: &Handle) -> Result<Handle, DomError> {
    let mut node = first.clone();
    let mut piece: Option<Handle> = None;
    loop {
        let parent = get_parent_node(&node).ok_or(DomError::Detached)?;
        if Rc::ptr_eq(&parent, common) {
            return Ok(match piece {
                Some(piece) => piece,
                None => {
                    detach(&node);
                    node
                }
            });
        }

        let followers = following_siblings(&node);
        let clone = shallow_clone(&parent);
        match piece.take() {
            Some(inner) => append_child(&clone, inner),
            None => append_child(&clone, node.clone()),
        }
        for follower in followers {
            append_child(&clone, follower);
        }
        piece = Some(clone);
        node = parent;
    }
}

/// 抽取终点一侧：与起点一侧对称，克隆体接收 `last` 之前的兄弟以及 `last` 本身
fn take_end_side(last: &Handle, common: &Handle) -> Result<Handle, DomError> {
    let mut node = last.clone();
    let mut piece: Option<Handle> = None;
    loop {
        let parent = get_parent_node(&node).ok_or(DomError::Detached)?;
        if Rc::ptr_eq(&parent, common) {
            return Ok(match piece {
                Some(piece) => piece,
                None => {
                    detach(&node);
                    node
                }
            });
        }

        let predecessors = preceding_siblings(&node);
        let clone = shallow_clone(&parent);
        for predecessor in predecessors {
            append_child(&clone, predecessor);
        }
        match piece.take() {
            Some(inner) => append_child(&clone, inner),
            None => append_child(&clone, node.clone()),
        }
        piece = Some(clone);
        node = parent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{create_element, descendant_text, find_body, html_to_dom};
    use crate::parsers::html::serializer::inner_html;

    fn body_of(html: &str) -> (markup5ever_rcdom::RcDom, Handle) {
        let dom = html_to_dom(html.as_bytes(), "utf-8");
        let body = find_body(&dom).expect("body should exist");
        (dom, body)
    }

    #[test]
    fn test_split_text_keeps_prefix_in_place() {
        let (_dom, body) = body_of("<p>The quick fox</p>");
        let p = body.children.borrow()[0].clone();
        let text = p.children.borrow()[0].clone();

        let tail = split_text(&text, 4).unwrap();

        assert_eq!(text_of(&text).unwrap(), "The ");
        assert_eq!(text_of(&tail).unwrap(), "quick fox");
        assert_eq!(p.children.borrow().len(), 2);
        assert_eq!(descendant_text(&p), "The quick fox");
    }

    #[test]
    fn test_surround_within_single_text_node() {
        let (_dom, body) = body_of("<p>The quick brown fox</p>");
        let p = body.children.borrow()[0].clone();
        let text = p.children.borrow()[0].clone();
        let range = TextRange::new(text.clone(), 4, text, 9);
        assert_eq!(range.text().unwrap(), "quick");

        let wrapper = create_element("span", &[]);
        range.surround_contents(&wrapper).unwrap();

        assert_eq!(inner_html(&p), "The <span>quick</span> brown fox");
    }

    #[test]
    fn test_surround_across_elements_clones_partial_ancestors() {
        let (_dom, body) = body_of("<p>alpha <b>beta gamma</b> delta</p>");
        let p = body.children.borrow()[0].clone();
        let first = p.children.borrow()[0].clone();
        let b = p.children.borrow()[1].clone();
        let inner = b.children.borrow()[0].clone();

        // "pha beta"
        let range = TextRange::new(first, 2, inner, 4);
        assert_eq!(range.text().unwrap(), "pha beta");

        let wrapper = create_element("span", &[]);
        range.surround_contents(&wrapper).unwrap();

        assert_eq!(
            inner_html(&p),
            "al<span>pha <b>beta</b></span><b> gamma</b> delta"
        );
        assert_eq!(descendant_text(&p), "alpha beta gamma delta");
    }

    #[test]
    fn test_surround_rejects_detached_nodes() {
        let (_dom, body) = body_of("<p>detached text</p>");
        let p = body.children.borrow()[0].clone();
        let text = p.children.borrow()[0].clone();
        detach(&p);

        let range = TextRange::new(text.clone(), 0, text, 8);
        let wrapper = create_element("span", &[]);
        assert_eq!(range.surround_contents(&wrapper), Err(DomError::Detached));
    }
}
