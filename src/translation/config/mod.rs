//! 管道配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{
    ConfigManager, CoordinatorConfig, DisplayMode, LedgerConfig, ObserverConfig, PipelineConfig,
    RewriteConfig, SegmenterConfig, TranslationPosition,
};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 分段相关
    pub const DEFAULT_MAX_SEGMENT_LENGTH: usize = 400;
    pub const DEFAULT_MIN_SEGMENT_LENGTH: usize = 20;
    /// 叶子容器内允许的块级后代数量上限
    pub const MAX_NESTED_BLOCKS: usize = 3;
    /// 叶子容器内单个块级后代的文本上限
    pub const MAX_NESTED_BLOCK_TEXT: usize = 100;

    // 处理相关
    pub const DEFAULT_BATCH_SIZE: usize = 8;
    pub const DEFAULT_GLOW_DURATION_MS: u64 = 2000;

    // 账本相关
    pub const DEFAULT_CONTENT_TTL: Duration = Duration::from_secs(4 * 60 * 60); // 4小时
    pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(2 * 60 * 60); // 2小时
    pub const DEFAULT_DYNAMIC_BUCKET: Duration = Duration::from_secs(30);
    pub const DEFAULT_DYNAMIC_TEXT_THRESHOLD: usize = 100;
    pub const FINGERPRINT_HEX_LEN: usize = 16;

    // 变更观察相关
    pub const DEFAULT_DEBOUNCE_MS: u64 = 150;
    pub const DEFAULT_OBSERVER_MIN_TEXT: usize = 15;

    // 发音标注：最多几个词
    pub const MAX_PRONUNCIATION_WORDS: usize = 3;

    // DOM 标记：所有注入元素都带 TOOL_MARKER_ATTR
    pub const TOOL_MARKER_ATTR: &str = "data-wordweave";
    pub const PROCESSED_ATTR: &str = "data-wordweave-processed";
    pub const PROCESSED_AT_ATTR: &str = "data-wordweave-processed-at";
    pub const WORD_PROCESSED_ATTR: &str = "data-wordweave-word-processed";
    pub const PRONUNCIATION_ATTR: &str = "data-wordweave-pronunciation";
    pub const ORIGINAL_CLASS: &str = "wordweave-original";
    pub const TRANSLATION_CLASS: &str = "wordweave-translation";
    pub const GLOW_CLASS: &str = "wordweave-glow";
    pub const PROCESSING_CLASS: &str = "wordweave-processing";
    pub const TOOL_CLASS_PREFIX: &str = "wordweave-";

    // 忽略的元素（整棵子树跳过）
    pub const IGNORED_TAGS: &[&str] = &[
        "script", "style", "noscript", "template", "textarea", "input", "select", "option",
        "button", "form", "code", "pre", "kbd", "samp", "svg", "math", "canvas", "video",
        "audio", "iframe", "object", "embed", "img", "picture", "head", "title", "meta", "link",
    ];

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "wordweave.toml",
        ".wordweave.toml",
        "~/.config/wordweave/config.toml",
    ];
}
