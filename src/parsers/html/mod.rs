//! HTML解析和处理模块
//!
//! - `utils`: 基础工具函数和常量
//! - `dom`: 基础DOM操作
//! - `range`: 文本范围的定位、拆分与包裹
//! - `serializer`: 序列化功能

pub mod dom;
pub mod range;
pub mod serializer;
pub mod utils;

pub use dom::{
    find_body, find_nodes, get_node_attr, get_node_name, get_parent_node,
    html_to_dom, set_node_attr,
};
pub use range::{DomError, TextRange};
pub use serializer::{inner_html, outer_html, serialize_document};
pub use utils::{is_block_element, normalize_whitespace, BLOCK_ELEMENTS, WHITESPACES};
