//! 内容处理模块
//!
//! 把页面文本切分为分段，交给外部替换器，再把结果以“原文 + 译文”的形式写回 DOM，
//! 并保证同一段内容在持续变化的页面上至多处理一次：
//! - **config**: 配置管理
//! - **error**: 错误处理
//! - **storage**: 内容账本（指纹、处理状态、过期清理）
//! - **pipeline**: 忽略策略与内容分段
//! - **core**: 处理协调与 DOM 范围改写
//! - **replacer**: 替换器与发音标注接口、词汇表替换器
//! - **observer**: 变更观察驱动
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use wordweave::parsers::{find_body, html_to_dom};
//! use wordweave::translation::{
//!     ContentLedger, ContentSegmenter, GlossaryReplacer, PipelineConfig, ProcessingCoordinator,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default();
//! let dom = html_to_dom(b"<p>The quick brown fox jumps.</p>", "utf-8");
//! let body = find_body(&dom).ok_or("no body")?;
//!
//! let ledger = ContentLedger::new(config.ledger.clone());
//! let segmenter = ContentSegmenter::new(config.segmenter.clone(), ledger.clone());
//! let coordinator = ProcessingCoordinator::new(ledger, config.coordinator.clone());
//! let glossary = GlossaryReplacer::new([("quick", "快速的")])?;
//!
//! let segments = segmenter.segment_content(&body);
//! let result = coordinator
//!     .process_segments(
//!         &segments,
//!         &glossary,
//!         config.rewrite.display_mode,
//!         config.rewrite.translation_position,
//!         config.rewrite.show_parentheses,
//!     )
//!     .await;
//! assert!(result.success);
//!
//! // 高亮在配置的时长后移除
//! coordinator.run_effects().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 配置管理模块 - 分段、处理、账本、观察与呈现配置
pub mod config;

/// 处理核心模块 - 协调器与 DOM 范围改写
pub mod core;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 变更观察模块 - 防抖与增量处理
pub mod observer;

/// 内容处理管道模块 - 忽略策略与分段
pub mod pipeline;

/// 替换器接口模块
pub mod replacer;

/// 存储模块 - 内容账本
pub mod storage;

// ============================================================================
// 核心API导出
// ============================================================================

pub use config::{
    constants, ConfigManager, CoordinatorConfig, DisplayMode, LedgerConfig, ObserverConfig,
    PipelineConfig, RewriteConfig, SegmenterConfig, TranslationPosition,
};
pub use self::core::{
    CoordinatorStats, DomRangeRewriter, Effect, ProcessingCoordinator, ProcessingResult,
    RewriteOutcome,
};
pub use error::{ErrorCategory, ErrorSeverity, ErrorStats, TranslationError, TranslationResult};
pub use observer::{
    MutationObserver, MutationObserverDriver, MutationRecord, ObserverState, ObserverStats,
};
pub use pipeline::{ContentSegmenter, IgnorePolicy, Segment};
pub use replacer::{
    assign_positions, GlossaryReplacer, Position, PronunciationAnnotator, RawReplacement,
    Replacement, ReplacementSet, TextReplacer,
};
pub use storage::{Clock, ContentLedger, LedgerEntry, LedgerStats, ManualClock, SystemClock};

/// 处理一棵 DOM 子树：分段后交给协调器
///
/// 呈现选项取自 `rewrite`。高亮移除和发音标注留在协调器的待执行队列中，
/// 由调用方通过 `run_effects` 或 `take_effects` 驱动。
pub async fn process_subtree(
    root: &markup5ever_rcdom::Handle,
    segmenter: &ContentSegmenter,
    coordinator: &ProcessingCoordinator,
    replacer: &dyn TextReplacer,
    rewrite: &RewriteConfig,
) -> ProcessingResult {
    let segments = segmenter.segment_content(root);
    tracing::debug!("子树分段: {} 个", segments.len());
    coordinator
        .process_segments(
            &segments,
            replacer,
            rewrite.display_mode,
            rewrite.translation_position,
            rewrite.show_parentheses,
        )
        .await
}
