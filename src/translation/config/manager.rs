//! 简化的配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::error::{TranslationError, TranslationResult};

/// 原文显示模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    #[default]
    Visible,
    LearningBlur,
    Hidden,
}

impl DisplayMode {
    /// 原文包裹元素额外附加的类名
    pub fn css_class(&self) -> Option<&'static str> {
        match self {
            DisplayMode::Visible => None,
            DisplayMode::LearningBlur => Some("wordweave-original--blur"),
            DisplayMode::Hidden => Some("wordweave-original--hidden"),
        }
    }
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "visible" => Ok(DisplayMode::Visible),
            "learning-blur" | "learning_blur" | "blur" => Ok(DisplayMode::LearningBlur),
            "hidden" => Ok(DisplayMode::Hidden),
            other => Err(format!(
                "Invalid display mode '{}'. Use: visible, learning-blur, hidden",
                other
            )),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisplayMode::Visible => "visible",
            DisplayMode::LearningBlur => "learning-blur",
            DisplayMode::Hidden => "hidden",
        };
        f.write_str(name)
    }
}

/// 译文相对原文的插入位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslationPosition {
    Before,
    #[default]
    After,
}

impl FromStr for TranslationPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "before" => Ok(TranslationPosition::Before),
            "after" => Ok(TranslationPosition::After),
            other => Err(format!(
                "Invalid translation position '{}'. Use: before, after",
                other
            )),
        }
    }
}

impl fmt::Display for TranslationPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationPosition::Before => f.write_str("before"),
            TranslationPosition::After => f.write_str("after"),
        }
    }
}

/// 分段器配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub max_segment_length: usize,
    pub min_segment_length: usize,
    /// 保留字段，目前不影响分段行为
    pub enable_smart_boundary: bool,
    pub merge_small_segments: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_segment_length: constants::DEFAULT_MAX_SEGMENT_LENGTH,
            min_segment_length: constants::DEFAULT_MIN_SEGMENT_LENGTH,
            enable_smart_boundary: true,
            merge_small_segments: true,
        }
    }
}

/// 处理协调器配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub batch_size: usize,
    pub glow_duration_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            batch_size: constants::DEFAULT_BATCH_SIZE,
            glow_duration_ms: constants::DEFAULT_GLOW_DURATION_MS,
        }
    }
}

impl CoordinatorConfig {
    pub fn glow_duration(&self) -> Duration {
        Duration::from_millis(self.glow_duration_ms)
    }
}

/// 内容账本配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub content_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    pub dynamic_bucket_secs: u64,
    pub dynamic_text_threshold: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            content_ttl_secs: constants::DEFAULT_CONTENT_TTL.as_secs(),
            cleanup_interval_secs: constants::DEFAULT_CLEANUP_INTERVAL.as_secs(),
            dynamic_bucket_secs: constants::DEFAULT_DYNAMIC_BUCKET.as_secs(),
            dynamic_text_threshold: constants::DEFAULT_DYNAMIC_TEXT_THRESHOLD,
        }
    }
}

impl LedgerConfig {
    pub fn content_ttl(&self) -> Duration {
        Duration::from_secs(self.content_ttl_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// 变更观察驱动配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub debounce_ms: u64,
    pub min_text_length: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            debounce_ms: constants::DEFAULT_DEBOUNCE_MS,
            min_text_length: constants::DEFAULT_OBSERVER_MIN_TEXT,
        }
    }
}

impl ObserverConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// 改写呈现配置
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub display_mode: DisplayMode,
    pub translation_position: TranslationPosition,
    pub show_parentheses: bool,
}

/// 管道完整配置
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub segmenter: SegmenterConfig,
    pub coordinator: CoordinatorConfig,
    pub ledger: LedgerConfig,
    pub observer: ObserverConfig,
    pub rewrite: RewriteConfig,
}

impl PipelineConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.segmenter.min_segment_length == 0 {
            return Err(TranslationError::ConfigError("最小分段长度不能为0".to_string()));
        }

        if self.segmenter.max_segment_length < self.segmenter.min_segment_length {
            return Err(TranslationError::ConfigError(format!(
                "最大分段长度 {} 小于最小分段长度 {}",
                self.segmenter.max_segment_length, self.segmenter.min_segment_length
            )));
        }

        if self.coordinator.batch_size == 0 {
            return Err(TranslationError::ConfigError("批次大小不能为0".to_string()));
        }

        if self.ledger.content_ttl_secs == 0 {
            return Err(TranslationError::ConfigError("内容存活时间不能为0".to_string()));
        }

        if self.ledger.cleanup_interval_secs == 0 {
            return Err(TranslationError::ConfigError("清理间隔不能为0".to_string()));
        }

        if self.ledger.dynamic_bucket_secs == 0 {
            return Err(TranslationError::ConfigError("动态内容时间桶不能为0".to_string()));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    ///
    /// 只处理显式设置的变量；设置了但无法解析的变量视为配置错误。
    pub fn apply_env_overrides(&mut self) -> TranslationResult<()> {
        use crate::env::{processing, rewrite, segmenter, EnvVar};

        if let Some(value) = segmenter::MaxSegmentLength::lookup() {
            self.segmenter.max_segment_length = value?;
        }

        if let Some(value) = segmenter::MinSegmentLength::lookup() {
            self.segmenter.min_segment_length = value?;
        }

        if let Some(value) = segmenter::MergeSmallSegments::lookup() {
            self.segmenter.merge_small_segments = value?;
        }

        if let Some(value) = processing::BatchSize::lookup() {
            self.coordinator.batch_size = value?;
        }

        if let Some(value) = processing::ContentTtl::lookup() {
            self.ledger.content_ttl_secs = value?.as_secs();
        }

        if let Some(value) = processing::DebounceMs::lookup() {
            self.observer.debounce_ms = value?.as_millis() as u64;
        }

        if let Some(value) = rewrite::Display::lookup() {
            self.rewrite.display_mode = value?;
            tracing::info!("环境变量覆盖显示模式: {}", self.rewrite.display_mode);
        }

        if let Some(value) = rewrite::Position::lookup() {
            self.rewrite.translation_position = value?;
        }

        if let Some(value) = rewrite::ShowParentheses::lookup() {
            self.rewrite.show_parentheses = value?;
        }

        Ok(())
    }
}

/// 简化的配置管理器
pub struct ConfigManager {
    config: PipelineConfig,
}

impl ConfigManager {
    /// 按搜索路径加载配置、应用环境变量并验证
    pub fn new() -> TranslationResult<Self> {
        Self::load_dotenv();
        let config = Self::load_config()?;
        Self::finish(config)
    }

    /// 从指定文件创建配置管理器，仍然应用环境变量覆盖
    pub fn from_path<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        Self::load_dotenv();
        let config = Self::load_from_file(path.as_ref())?;
        Self::finish(config)
    }

    fn finish(mut config: PipelineConfig) -> TranslationResult<Self> {
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn into_config(self) -> PipelineConfig {
        self.config
    }

    /// 从搜索路径加载配置
    fn load_config() -> TranslationResult<PipelineConfig> {
        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            let candidate = Path::new(expanded_path.as_ref());
            if candidate.exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(candidate);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(PipelineConfig::default())
    }

    /// 从指定文件加载配置（`.json` 按 JSON 解析，其余按 TOML）
    pub fn load_from_file(path: &Path) -> TranslationResult<PipelineConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析JSON配置失败: {}", e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析TOML配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config<P: AsRef<Path>>(path: P) -> TranslationResult<()> {
        let config = PipelineConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
