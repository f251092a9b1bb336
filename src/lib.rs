//! # Wordweave Library
//!
//! 面向语言学习的 HTML 内容改写库：选取页面文本，替换为“原文 + 译文”标注，
//! 可选附加发音，并保证在持续变化的 DOM 上同一段内容不会被处理两次。
//!
//! ## 模块组织
//!
//! - `env` - 类型安全的环境变量
//! - `parsers` - HTML 解析、DOM 操作、文本范围与序列化
//! - `translation` - 分段、处理协调、DOM 改写、内容账本与变更观察

pub mod env;
pub mod parsers;
pub mod translation;

// Re-export commonly used items for convenience
pub use parsers::*;
pub use translation::{
    ContentLedger, ContentSegmenter, PipelineConfig, ProcessingCoordinator, ProcessingResult,
    Segment, TranslationError, TranslationResult,
};
