//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问。配置文件中的值只会被*显式设置*的环境变量
//! 覆盖，未设置的变量不会用默认值冲掉文件配置。

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    /// 读取变量；未设置时回退到 `DEFAULT`
    fn get() -> EnvResult<T> {
        match Self::lookup() {
            Some(result) => result,
            None => Self::DEFAULT.ok_or_else(|| EnvError {
                variable: Self::NAME.to_string(),
                message: "Required environment variable not set".to_string(),
            }),
        }
    }

    /// 仅在变量被显式设置时返回解析结果
    fn lookup() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "WORDWEAVE_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }

    /// 启用颜色输出
    pub struct NoColor;
    impl EnvVar<bool> for NoColor {
        const NAME: &'static str = "NO_COLOR";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Disable colored output when set to any value";

        fn parse(value: &str) -> EnvResult<bool> {
            // NO_COLOR 遵循标准：任何值都表示禁用颜色
            Ok(!value.is_empty())
        }
    }
}

/// 分段器相关环境变量
pub mod segmenter {
    use super::*;

    /// 分段最大长度
    pub struct MaxSegmentLength;
    impl EnvVar<usize> for MaxSegmentLength {
        const NAME: &'static str = "WORDWEAVE_MAX_SEGMENT_LENGTH";
        const DEFAULT: Option<usize> = Some(400);
        const DESCRIPTION: &'static str = "Maximum characters per segment before splitting";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 20, 20_000)
        }
    }

    /// 分段最小长度
    pub struct MinSegmentLength;
    impl EnvVar<usize> for MinSegmentLength {
        const NAME: &'static str = "WORDWEAVE_MIN_SEGMENT_LENGTH";
        const DEFAULT: Option<usize> = Some(20);
        const DESCRIPTION: &'static str = "Minimum characters for a leaf content container";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 10_000)
        }
    }

    /// 是否合并过短分段
    pub struct MergeSmallSegments;
    impl EnvVar<bool> for MergeSmallSegments {
        const NAME: &'static str = "WORDWEAVE_MERGE_SMALL_SEGMENTS";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Merge adjacent short segments into one request";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 处理协调器与账本相关环境变量
pub mod processing {
    use super::*;

    /// 单批并发的分段数
    pub struct BatchSize;
    impl EnvVar<usize> for BatchSize {
        const NAME: &'static str = "WORDWEAVE_BATCH_SIZE";
        const DEFAULT: Option<usize> = Some(8);
        const DESCRIPTION: &'static str = "Segments translated concurrently per batch";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 64)
        }
    }

    /// 账本条目存活时间
    pub struct ContentTtl;
    impl EnvVar<Duration> for ContentTtl {
        const NAME: &'static str = "WORDWEAVE_CONTENT_TTL";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(4 * 60 * 60));
        const DESCRIPTION: &'static str = "Ledger entry lifetime in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            let seconds = parse_positive_usize(value, Self::NAME, 1, 7 * 24 * 60 * 60)?;
            Ok(Duration::from_secs(seconds as u64))
        }
    }

    /// 防抖窗口
    pub struct DebounceMs;
    impl EnvVar<Duration> for DebounceMs {
        const NAME: &'static str = "WORDWEAVE_DEBOUNCE_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(150));
        const DESCRIPTION: &'static str = "Mutation debounce window in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            let millis = parse_positive_usize(value, Self::NAME, 1, 60_000)?;
            Ok(Duration::from_millis(millis as u64))
        }
    }
}

/// 改写呈现相关环境变量
pub mod rewrite {
    use super::*;
    use crate::translation::config::{DisplayMode, TranslationPosition};

    /// 原文显示模式
    pub struct Display;
    impl EnvVar<DisplayMode> for Display {
        const NAME: &'static str = "WORDWEAVE_DISPLAY_MODE";
        const DEFAULT: Option<DisplayMode> = Some(DisplayMode::Visible);
        const DESCRIPTION: &'static str = "Original word display: visible, learning-blur, hidden";

        fn parse(value: &str) -> EnvResult<DisplayMode> {
            parse_from_str(value, Self::NAME)
        }
    }

    /// 译文插入位置
    pub struct Position;
    impl EnvVar<TranslationPosition> for Position {
        const NAME: &'static str = "WORDWEAVE_TRANSLATION_POSITION";
        const DEFAULT: Option<TranslationPosition> = Some(TranslationPosition::After);
        const DESCRIPTION: &'static str = "Translation placement: before, after";

        fn parse(value: &str) -> EnvResult<TranslationPosition> {
            parse_from_str(value, Self::NAME)
        }
    }

    /// 译文是否加括号
    pub struct ShowParentheses;
    impl EnvVar<bool> for ShowParentheses {
        const NAME: &'static str = "WORDWEAVE_SHOW_PARENTHESES";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Wrap translations in parentheses";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 辅助函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_from_str<T>(value: &str, var_name: &str) -> EnvResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| EnvError {
        variable: var_name.to_string(),
        message: e.to_string(),
    })
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables Documentation\n\n");

    docs.push_str("## Core Configuration\n\n");
    docs.push_str(&format!(
        "- `{}`: {}\n",
        core::LogLevel::NAME,
        core::LogLevel::DESCRIPTION
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        core::NoColor::NAME,
        core::NoColor::DESCRIPTION,
        core::NoColor::DEFAULT
    ));

    docs.push_str("\n## Segmenter Configuration\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        segmenter::MaxSegmentLength::NAME,
        segmenter::MaxSegmentLength::DESCRIPTION,
        segmenter::MaxSegmentLength::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        segmenter::MinSegmentLength::NAME,
        segmenter::MinSegmentLength::DESCRIPTION,
        segmenter::MinSegmentLength::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        segmenter::MergeSmallSegments::NAME,
        segmenter::MergeSmallSegments::DESCRIPTION,
        segmenter::MergeSmallSegments::DEFAULT
    ));

    docs.push_str("\n## Processing Configuration\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        processing::BatchSize::NAME,
        processing::BatchSize::DESCRIPTION,
        processing::BatchSize::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        processing::ContentTtl::NAME,
        processing::ContentTtl::DESCRIPTION,
        processing::ContentTtl::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        processing::DebounceMs::NAME,
        processing::DebounceMs::DESCRIPTION,
        processing::DebounceMs::DEFAULT
    ));

    docs.push_str("\n## Rewrite Configuration\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        rewrite::Display::NAME,
        rewrite::Display::DESCRIPTION,
        rewrite::Display::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        rewrite::Position::NAME,
        rewrite::Position::DESCRIPTION,
        rewrite::Position::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        rewrite::ShowParentheses::NAME,
        rewrite::ShowParentheses::DESCRIPTION,
        rewrite::ShowParentheses::DEFAULT
    ));

    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::config::{DisplayMode, TranslationPosition};

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(super::core::LogLevel::parse("DEBUG").unwrap(), "debug");
        assert!(super::core::LogLevel::parse("verbose").is_err());
    }

    #[test]
    fn test_boolean_parsing() {
        assert!(segmenter::MergeSmallSegments::parse("true").unwrap());
        assert!(segmenter::MergeSmallSegments::parse("1").unwrap());
        assert!(segmenter::MergeSmallSegments::parse("YES").unwrap());
        assert!(!segmenter::MergeSmallSegments::parse("off").unwrap());
        assert!(segmenter::MergeSmallSegments::parse("maybe").is_err());
    }

    #[test]
    fn test_numeric_validation() {
        assert_eq!(segmenter::MaxSegmentLength::parse("400").unwrap(), 400);
        assert!(segmenter::MaxSegmentLength::parse("5").is_err());
        assert!(processing::BatchSize::parse("0").is_err());
        assert!(processing::BatchSize::parse("eight").is_err());
        assert_eq!(
            processing::DebounceMs::parse("150").unwrap(),
            Duration::from_millis(150)
        );
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!(
            rewrite::Display::parse("learning-blur").unwrap(),
            DisplayMode::LearningBlur
        );
        assert_eq!(
            rewrite::Position::parse("before").unwrap(),
            TranslationPosition::Before
        );
        assert!(rewrite::Position::parse("sideways").is_err());
    }

    #[test]
    fn test_docs_mention_every_group() {
        let docs = generate_env_docs();
        assert!(docs.contains("WORDWEAVE_MAX_SEGMENT_LENGTH"));
        assert!(docs.contains("WORDWEAVE_DEBOUNCE_MS"));
        assert!(docs.contains("WORDWEAVE_DISPLAY_MODE"));
    }
}
