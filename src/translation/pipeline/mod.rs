//! 内容处理管道模块
//!
//! 提供忽略策略与内容分段

pub mod filters;
pub mod segmenter;

// 重新导出主要类型
pub use filters::{is_hidden, is_processed, is_tool_generated, IgnorePolicy};
pub use segmenter::{ContentSegmenter, Segment};
