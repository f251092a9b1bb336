//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。管道的公共入口（分段、处理）从不向调用方
//! 抛出错误，这里的类型用于各层内部的 `Result` 边界以及结果汇总。

use std::fmt;

use thiserror::Error;

use crate::parsers::html::DomError;

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 外部替换器（翻译后端）调用失败
    #[error("替换器错误: {0}")]
    ReplacerError(String),

    /// 替换位置与当前文本不符且无法重新定位
    #[error("偏移漂移: 找不到原文 '{original}'")]
    OffsetDrift { original: String },

    /// 范围文本与预期原文不一致
    #[error("范围校验失败: 期望 '{expected}'，实际 '{actual}'")]
    RangeMismatch { expected: String, actual: String },

    /// 分段的文本节点已脱离文档
    #[error("节点已脱离文档: {0}")]
    DomDetached(String),

    /// DOM 操作错误
    #[error("DOM 操作错误: {0}")]
    DomError(String),

    /// 批次处理错误（系统性错误）
    #[error("批次处理错误: {0}")]
    BatchProcessingError(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    ///
    /// 可重试的错误不会让分段被永久标记为已处理。
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::ReplacerError(_) => true,
            TranslationError::DomDetached(_) => true,
            TranslationError::BatchProcessingError(_) => true,
            TranslationError::OffsetDrift { .. } => false,
            TranslationError::RangeMismatch { .. } => false,
            TranslationError::DomError(_) => false,
            TranslationError::ConfigError(_) => false,
            TranslationError::InvalidInput(_) => false,
            TranslationError::ParseError(_) => false,
            TranslationError::SerializationError(_) => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::ReplacerError(_) => ErrorSeverity::Warning,
            TranslationError::OffsetDrift { .. } => ErrorSeverity::Info,
            TranslationError::RangeMismatch { .. } => ErrorSeverity::Info,
            TranslationError::DomDetached(_) => ErrorSeverity::Warning,
            TranslationError::DomError(_) => ErrorSeverity::Warning,
            TranslationError::BatchProcessingError(_) => ErrorSeverity::Error,
            TranslationError::ParseError(_) => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::ReplacerError(_) => ErrorCategory::Service,
            TranslationError::OffsetDrift { .. } => ErrorCategory::Drift,
            TranslationError::RangeMismatch { .. } => ErrorCategory::Drift,
            TranslationError::DomDetached(_) => ErrorCategory::Dom,
            TranslationError::DomError(_) => ErrorCategory::Dom,
            TranslationError::BatchProcessingError(_) => ErrorCategory::Processing,
            TranslationError::ParseError(_) => ErrorCategory::Parsing,
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let suffix = format!(" (上下文: {})", context);

        match &mut self {
            TranslationError::ConfigError(ref mut msg)
            | TranslationError::InvalidInput(ref mut msg)
            | TranslationError::ReplacerError(ref mut msg)
            | TranslationError::DomDetached(ref mut msg)
            | TranslationError::DomError(ref mut msg)
            | TranslationError::BatchProcessingError(ref mut msg)
            | TranslationError::ParseError(ref mut msg)
            | TranslationError::SerializationError(ref mut msg)
            | TranslationError::InternalError(ref mut msg) => msg.push_str(&suffix),
            TranslationError::OffsetDrift { .. } | TranslationError::RangeMismatch { .. } => {}
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Service,
    Drift,
    Dom,
    Processing,
    Parsing,
    Serialization,
    Internal,
}

impl From<DomError> for TranslationError {
    fn from(error: DomError) -> Self {
        match error {
            DomError::Detached => TranslationError::DomDetached(error.to_string()),
            other => TranslationError::DomError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::InvalidInput(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ParseError(format!("TOML解析错误: {}", error))
    }
}

impl From<crate::env::EnvError> for TranslationError {
    fn from(error: crate::env::EnvError) -> Self {
        TranslationError::ConfigError(error.to_string())
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误统计信息
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: std::collections::HashMap<ErrorCategory, usize>,
    pub by_severity: std::collections::HashMap<ErrorSeverity, usize>,
    pub retryable_errors: usize,
}

impl ErrorStats {
    /// 记录错误
    pub fn record_error(&mut self, error: &TranslationError) {
        self.total_errors += 1;
        *self.by_category.entry(error.category()).or_insert(0) += 1;
        *self.by_severity.entry(error.severity()).or_insert(0) += 1;

        if error.is_retryable() {
            self.retryable_errors += 1;
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Default::default();
    }
}

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::debug!("处理信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("处理警告: {}", error),
            ErrorSeverity::Error => tracing::error!("处理错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("处理严重错误: {}", error),
        }
    }

    /// 创建替换器错误
    pub fn replacer_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::ReplacerError(msg.to_string())
    }
}
