use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use super::utils::WHITESPACES;

/// 将 HTML 字节转换为 DOM
///
/// 编码标签无法识别时按 UTF-8（有损）解码。解析器本身对任何输入都能产出文档树，
/// 读取内存缓冲区不会失败。
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s: String = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => {
            let (string, _, _) = encoding.decode(data);
            string.into_owned()
        }
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default()).one(s)
}

/// 查找指定路径的DOM节点
pub fn find_nodes(node: &Handle, node_names: &[&str]) -> Vec<Handle> {
    let mut found_nodes = Vec::new();
    let Some((node_name, rest)) = node_names.split_first() else {
        return found_nodes;
    };

    let is_match = get_node_name(node).is_some_and(|name| name == *node_name);

    if is_match && rest.is_empty() {
        found_nodes.push(node.clone());
    }

    for child_node in node.children.borrow().iter() {
        if is_match && !rest.is_empty() {
            found_nodes.append(&mut find_nodes(child_node, rest));
        } else {
            found_nodes.append(&mut find_nodes(child_node, node_names));
        }
    }

    found_nodes
}

/// 获取文档的 `<body>` 元素
pub fn find_body(dom: &RcDom) -> Option<Handle> {
    find_nodes(&dom.document, &["html", "body"]).into_iter().next()
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 检查节点是否带有某个属性
pub fn has_node_attr(node: &Handle, attr_name: &str) -> bool {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .any(|attr| &*attr.name.local == attr_name),
        _ => false,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取父节点
///
/// `parent` 是 `Cell<Option<Weak>>`，只能通过 take/set 读取，读完必须放回。
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|node| node.upgrade());
    child.parent.set(weak);
    parent
}

/// 设置节点属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.as_deref() {
                    attrs_mut[i].value.clear();
                    attrs_mut[i].value.push_slice(attr_value);
                } else {
                    // Remove attr completely if attr_value is not defined
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(attr_value) = attr_value {
                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: format_tendril!("{}", attr_value),
                });
            }
        }
    };
}

/// 获取元素的 class 列表
pub fn get_classes(node: &Handle) -> Vec<String> {
    get_node_attr(node, "class")
        .map(|value| {
            value
                .split(WHITESPACES)
                .filter(|class| !class.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// 检查元素是否包含某个 class
pub fn has_class(node: &Handle, class_name: &str) -> bool {
    get_classes(node).iter().any(|class| class == class_name)
}

/// 添加 class（已存在时不重复添加）
pub fn add_class(node: &Handle, class_name: &str) {
    let mut classes = get_classes(node);
    if classes.iter().any(|class| class == class_name) {
        return;
    }
    classes.push(class_name.to_string());
    set_node_attr(node, "class", Some(classes.join(" ")));
}

/// 移除 class，移除后为空则删除整个属性
pub fn remove_class(node: &Handle, class_name: &str) {
    let classes = get_classes(node);
    if !classes.iter().any(|class| class == class_name) {
        return;
    }
    let remaining: Vec<String> = classes.into_iter().filter(|c| c != class_name).collect();
    if remaining.is_empty() {
        set_node_attr(node, "class", None);
    } else {
        set_node_attr(node, "class", Some(remaining.join(" ")));
    }
}

/// 从节点及其所有后代元素上移除 class
pub fn remove_class_recursive(node: &Handle, class_name: &str) {
    remove_class(node, class_name);
    for child in node.children.borrow().iter() {
        remove_class_recursive(child, class_name);
    }
}

/// 判断是否为元素节点
pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

/// 判断是否为文本节点
pub fn is_text(node: &Handle) -> bool {
    matches!(node.data, NodeData::Text { .. })
}

/// 读取文本节点内容，非文本节点返回 `None`
pub fn text_of(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 覆盖文本节点内容，非文本节点返回 `false`
pub fn set_text(node: &Handle, text: &str) -> bool {
    match &node.data {
        NodeData::Text { contents } => {
            let mut contents = contents.borrow_mut();
            contents.clear();
            contents.push_slice(text);
            true
        }
        _ => false,
    }
}

/// 文本节点内容的字符数（按 Unicode 标量值计）
pub fn text_char_len(node: &Handle) -> usize {
    match &node.data {
        NodeData::Text { contents } => contents.borrow().chars().count(),
        _ => 0,
    }
}

/// 子树内所有文本的拼接（文档顺序）
pub fn descendant_text(node: &Handle) -> String {
    let mut buf = String::new();
    push_descendant_text(node, &mut buf);
    buf
}

fn push_descendant_text(node: &Handle, buf: &mut String) {
    match &node.data {
        NodeData::Text { contents } => buf.push_str(&contents.borrow()),
        _ => {
            for child in node.children.borrow().iter() {
                push_descendant_text(child, buf);
            }
        }
    }
}

/// 节点是否仍挂在文档上（祖先链能到达 `Document`）
pub fn is_attached(node: &Handle) -> bool {
    let mut current = node.clone();
    loop {
        if matches!(current.data, NodeData::Document) {
            return true;
        }
        match get_parent_node(&current) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

/// 判断 `node` 是否为 `ancestor` 的后代（不含自身）
pub fn is_descendant_of(node: &Handle, ancestor: &Handle) -> bool {
    let mut current = get_parent_node(node);
    while let Some(parent) = current {
        if Rc::ptr_eq(&parent, ancestor) {
            return true;
        }
        current = get_parent_node(&parent);
    }
    false
}

/// 创建 HTML 元素节点
pub fn create_element(tag: &str, attributes: &[(&str, &str)]) -> Handle {
    let attrs = attributes
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: StrTendril::from_slice(value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 创建文本节点
pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 浅克隆元素（标签与属性，不含子节点）
pub fn shallow_clone(node: &Handle) -> Handle {
    match &node.data {
        NodeData::Element {
            name,
            attrs,
            mathml_annotation_xml_integration_point,
            ..
        } => Node::new(NodeData::Element {
            name: name.clone(),
            attrs: RefCell::new(attrs.borrow().clone()),
            template_contents: RefCell::new(None),
            mathml_annotation_xml_integration_point: *mathml_annotation_xml_integration_point,
        }),
        NodeData::Text { contents } => Node::new(NodeData::Text {
            contents: RefCell::new(contents.borrow().clone()),
        }),
        _ => create_element("span", &[]),
    }
}

/// 从父节点上摘除节点
pub fn detach(node: &Handle) {
    if let Some(parent) = get_parent_node(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

/// 追加子节点（若节点已挂在别处会先摘除）
pub fn append_child(parent: &Handle, child: Handle) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

/// 在 `reference` 之前插入子节点；`reference` 为 `None` 或不在 `parent` 下时追加到末尾
pub fn insert_before(parent: &Handle, child: Handle, reference: Option<&Handle>) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    let mut children = parent.children.borrow_mut();
    let position = reference.and_then(|reference| {
        children
            .iter()
            .position(|existing| Rc::ptr_eq(existing, reference))
    });
    match position {
        Some(index) => children.insert(index, child),
        None => children.push(child),
    }
}

/// 紧随其后的兄弟节点
pub fn next_sibling(node: &Handle) -> Option<Handle> {
    let parent = get_parent_node(node)?;
    let children = parent.children.borrow();
    let index = children.iter().position(|child| Rc::ptr_eq(child, node))?;
    children.get(index + 1).cloned()
}

/// 在同一父节点下把 `node` 插到 `anchor` 之后
pub fn insert_after(anchor: &Handle, node: Handle) -> bool {
    let Some(parent) = get_parent_node(anchor) else {
        return false;
    };
    let reference = next_sibling(anchor);
    insert_before(&parent, node, reference.as_ref());
    true
}

/// 子树中的文本节点（文档顺序）
pub fn collect_text_nodes(node: &Handle) -> Vec<Handle> {
    let mut nodes = Vec::new();
    push_text_nodes(node, &mut nodes);
    nodes
}

fn push_text_nodes(node: &Handle, nodes: &mut Vec<Handle>) {
    if is_text(node) {
        nodes.push(node.clone());
        return;
    }
    for child in node.children.borrow().iter() {
        push_text_nodes(child, nodes);
    }
}
