//! 内容处理核心模块
//!
//! 本模块负责把分段真正落到 DOM 上：协调器管理认领、批次并发与账本记录，
//! 改写器把文本区间替换为“原文 + 译文”的标注结构。
//!
//! ## 模块依赖关系
//!
//! ```text
//! ProcessingCoordinator (coordinator.rs)
//!     ├── ContentLedger (storage/ledger.rs)
//!     ├── TextReplacer / PronunciationAnnotator (replacer.rs)
//!     └── DomRangeRewriter (rewriter.rs)
//!             └── TextRange (parsers/html/range.rs)
//! ```

pub mod coordinator;
pub mod rewriter;

pub use coordinator::{CoordinatorStats, Effect, ProcessingCoordinator, ProcessingResult};
pub use rewriter::{DomRangeRewriter, RewriteOutcome};
