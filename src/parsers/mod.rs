//! # 解析器模块
//!
//! HTML 文档的解析、DOM 操作、文本范围处理与序列化。
//!
//! # 模块组织
//!
//! - `html` - HTML文档解析、DOM操作、文本范围、序列化

pub mod html;

// Re-export commonly used items for convenience
pub use html::{find_body, html_to_dom, inner_html, outer_html, serialize_document, TextRange};
