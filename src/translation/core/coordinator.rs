//! 处理协调器
//!
//! 负责把分段送去替换并改写 DOM，同时保证：
//!
//! - **全局串行**: 每次 `process_segments` 调用都持有一个 FIFO 互斥锁，
//!   并发调用按到达顺序依次执行
//! - **至多一次**: 在任何等待之前同步认领所有分段，已处理或处理中的分段被跳过；
//!   文本节点已带处理标记的分段同样跳过
//! - **批次并发**: 认领到的分段按批次（默认 8 个）并发调用替换器
//! - **故障隔离**: 单个分段失败只影响自身；批次级别的系统性错误会把所有
//!   尚未完成的分段标记为失败并立即返回
//!
//! 协调器持有 `Rc` DOM 句柄，只能在单线程运行时中使用。高亮移除和发音标注
//! 在分段标记完成后进入待执行队列，由宿主通过 [`ProcessingCoordinator::take_effects`]
//! 或 [`ProcessingCoordinator::run_effects`] 驱动；协调器本身不派生任务。

use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::time::{Duration, Instant};

use futures::future::{join_all, LocalBoxFuture};
use futures::FutureExt;
use markup5ever_rcdom::Handle;
use tokio::sync::Mutex;

use super::rewriter::{DomRangeRewriter, RewriteOutcome};
use crate::parsers::html::dom::{add_class, get_parent_node, remove_class, set_node_attr};
use crate::translation::config::{
    constants, CoordinatorConfig, DisplayMode, RewriteConfig, TranslationPosition,
};
use crate::translation::error::{helpers, ErrorStats, TranslationError, TranslationResult};
use crate::translation::pipeline::{is_processed, Segment};
use crate::translation::replacer::{assign_positions, PronunciationAnnotator, TextReplacer};
use crate::translation::storage::ContentLedger;

/// 一次 `process_segments` 调用的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingResult {
    /// 没有任何分段出错
    pub success: bool,
    /// 成功分段中实际应用的替换数
    pub replacement_count: usize,
    /// 成功完成的分段数
    pub processed_count: usize,
    /// 因已处理、处理中或认领失败而跳过的分段数
    pub skipped_count: usize,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// 协调器累计统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinatorStats {
    pub total_processed: usize,
    pub total_skipped: usize,
    pub total_errors: usize,
    pub total_replacements: usize,
    pub average_duration_ms: f64,
    pub invocations: usize,
}

impl CoordinatorStats {
    fn record(&mut self, result: &ProcessingResult, errors: usize) {
        self.total_processed += result.processed_count;
        self.total_skipped += result.skipped_count;
        self.total_errors += errors;
        self.total_replacements += result.replacement_count;

        let duration = result.duration_ms as f64;
        self.average_duration_ms = if self.invocations == 0 {
            duration
        } else {
            (self.average_duration_ms + duration) / 2.0
        };
        self.invocations += 1;
    }
}

/// 单个分段的处理结果
type SegmentOutcome = TranslationResult<usize>;

/// 分段完成后的后台效果（高亮移除、发音标注）
pub type Effect = LocalBoxFuture<'static, ()>;

/// 处理协调器
pub struct ProcessingCoordinator {
    ledger: ContentLedger,
    config: CoordinatorConfig,
    queue: Mutex<()>,
    stats: RefCell<CoordinatorStats>,
    errors: RefCell<ErrorStats>,
    annotator: Option<Rc<dyn PronunciationAnnotator>>,
    effects: RefCell<Vec<Effect>>,
}

impl ProcessingCoordinator {
    pub fn new(ledger: ContentLedger, config: CoordinatorConfig) -> Self {
        Self {
            ledger,
            config,
            queue: Mutex::new(()),
            stats: RefCell::new(CoordinatorStats::default()),
            errors: RefCell::new(ErrorStats::default()),
            annotator: None,
            effects: RefCell::new(Vec::new()),
        }
    }

    /// 配置发音标注器
    pub fn with_pronunciation(mut self, annotator: Rc<dyn PronunciationAnnotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn ledger(&self) -> &ContentLedger {
        &self.ledger
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats.borrow().clone()
    }

    /// 按类别和严重程度汇总的错误统计
    pub fn error_stats(&self) -> ErrorStats {
        self.errors.borrow().clone()
    }

    /// 等待当前及已排队的处理全部结束
    pub async fn wait_for_completion(&self) {
        drop(self.queue.lock().await);
    }

    /// 待执行的后台效果数量
    pub fn pending_effects(&self) -> usize {
        self.effects.borrow().len()
    }

    /// 取出待执行的后台效果，交给宿主驱动（例如逐个 `spawn_local`）
    pub fn take_effects(&self) -> Vec<Effect> {
        std::mem::take(&mut *self.effects.borrow_mut())
    }

    /// 就地驱动所有待执行的后台效果直到完成
    pub async fn run_effects(&self) {
        join_all(self.take_effects()).await;
    }

    /// 处理一组分段
    ///
    /// # 参数
    /// - `segments`: 分段器产出的分段
    /// - `text_replacer`: 外部替换器
    /// - `display_mode` / `translation_position` / `show_parentheses`: 呈现选项
    ///
    /// # 返回值
    /// 总是返回结果，不会 panic 也不会返回错误；失败信息在 `error` 字段中。
    pub async fn process_segments(
        &self,
        segments: &[Segment],
        text_replacer: &dyn TextReplacer,
        display_mode: DisplayMode,
        translation_position: TranslationPosition,
        show_parentheses: bool,
    ) -> ProcessingResult {
        let _queue = self.queue.lock().await;
        let start_time = Instant::now();

        // 1-2. 同步认领，期间没有任何等待
        let mut skipped_count = 0;
        let mut claimed: Vec<&Segment> = Vec::with_capacity(segments.len());
        for segment in segments {
            if already_marked(segment)
                || self.ledger.is_content_processed(&segment.fingerprint)
                || self.ledger.is_content_processing(&segment.fingerprint)
                || !self.ledger.mark_processing_start(&segment.fingerprint)
            {
                tracing::debug!("跳过分段 {}", segment.id);
                skipped_count += 1;
                continue;
            }
            claimed.push(segment);
        }

        let rewriter = DomRangeRewriter::new(RewriteConfig {
            display_mode,
            translation_position,
            show_parentheses,
        })
        .with_pronunciation(self.annotator.is_some());

        let batch_size = self.config.batch_size.max(1);
        let mut resolved = 0;
        let mut result = ProcessingResult {
            skipped_count,
            ..ProcessingResult::default()
        };
        let mut errors: Vec<String> = Vec::new();

        // 3-4. 分批处理
        for batch in claimed.chunks(batch_size) {
            let outcomes = self.run_batch(batch, text_replacer, &rewriter).await;

            let outcomes = match outcomes {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    // 5. 系统性错误：清理所有尚未完成的认领
                    helpers::log_error(&e);
                    self.errors.borrow_mut().record_error(&e);
                    for segment in &claimed[resolved..] {
                        self.ledger
                            .mark_processing_failed(&segment.fingerprint, &segment.dom_path);
                        for element in &segment.elements {
                            remove_class(element, constants::PROCESSING_CLASS);
                        }
                    }
                    let unresolved = claimed.len() - resolved;
                    result.success = false;
                    result.error = Some(e.to_string());
                    result.duration_ms = start_time.elapsed().as_millis() as u64;
                    self.stats.borrow_mut().record(&result, unresolved);
                    return result;
                }
            };

            for (segment, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(applied) => {
                        self.ledger.mark_processing_complete(
                            &segment.fingerprint,
                            &segment.dom_path,
                            applied,
                            true,
                        );
                        result.processed_count += 1;
                        result.replacement_count += applied;
                    }
                    Err(e) => {
                        self.errors.borrow_mut().record_error(&e);
                        self.ledger
                            .mark_processing_failed(&segment.fingerprint, &segment.dom_path);
                        tracing::warn!("分段 {} 处理失败: {}", segment.id, e);
                        errors.push(format!("{}: {}", segment.id, e));
                    }
                }
                resolved += 1;
            }
        }

        // 6. 汇总
        result.success = errors.is_empty();
        if !errors.is_empty() {
            result.error = Some(errors.join("; "));
        }
        result.duration_ms = start_time.elapsed().as_millis() as u64;
        self.stats.borrow_mut().record(&result, errors.len());

        tracing::info!(
            "处理完成: {} 个分段成功，{} 个跳过，{} 个失败，{} 处替换，耗时 {}ms",
            result.processed_count,
            result.skipped_count,
            errors.len(),
            result.replacement_count,
            result.duration_ms
        );

        result
    }

    /// 并发处理一个批次；批次内部的 panic 转换为系统性错误
    async fn run_batch(
        &self,
        batch: &[&Segment],
        text_replacer: &dyn TextReplacer,
        rewriter: &DomRangeRewriter,
    ) -> TranslationResult<Vec<SegmentOutcome>> {
        for segment in batch {
            for element in &segment.elements {
                add_class(element, constants::PROCESSING_CLASS);
            }
        }

        let futures = batch
            .iter()
            .map(|segment| self.process_segment(segment, text_replacer, rewriter));

        let outcomes = AssertUnwindSafe(join_all(futures))
            .catch_unwind()
            .await
            .map_err(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "未知 panic".to_string());
                TranslationError::BatchProcessingError(message)
            })?;

        if outcomes.len() != batch.len() {
            return Err(TranslationError::InternalError(format!(
                "批次结果数量 {} 与分段数量 {} 不一致",
                outcomes.len(),
                batch.len()
            )));
        }

        Ok(outcomes)
    }

    async fn process_segment(
        &self,
        segment: &Segment,
        text_replacer: &dyn TextReplacer,
        rewriter: &DomRangeRewriter,
    ) -> SegmentOutcome {
        // 改写会移动文本节点，先记下原来的父元素
        let parents = text_node_parents(segment);

        let outcome = match text_replacer.replace_text(&segment.text_content).await {
            Ok(set) if set.is_empty() => {
                tracing::debug!("分段 {} 没有替换项", segment.id);
                mark_processed(&parents);
                Ok(0)
            }
            Ok(set) => {
                let replacements = assign_positions(&segment.text_content, set.replacements);
                match rewriter.rewrite_segment(segment, replacements) {
                    Ok(rewrite) => {
                        let applied = rewrite.applied;
                        mark_processed(&parents);
                        self.queue_effects(rewrite);
                        Ok(applied)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e.with_context(&segment.id)),
        };

        for element in &segment.elements {
            remove_class(element, constants::PROCESSING_CLASS);
        }

        outcome
    }

    /// 高亮时长为 0 时立即移除高亮，否则与发音标注一起进入待执行队列
    fn queue_effects(&self, rewrite: RewriteOutcome) {
        let glow = self.config.glow_duration();
        let mut effects = self.effects.borrow_mut();
        for element in rewrite.translation_elements {
            if glow.is_zero() {
                remove_class(&element, constants::GLOW_CLASS);
            } else {
                effects.push(isolated(remove_glow_later(element, glow)));
            }
        }

        let Some(annotator) = &self.annotator else {
            return;
        };
        for (element, word) in rewrite.pronunciation_targets {
            let annotator = Rc::clone(annotator);
            effects.push(isolated(async move {
                if !annotator.add_pronunciation_to_element(&element, &word).await {
                    tracing::debug!("发音标注失败: {}", word);
                }
            }));
        }
    }
}

/// 效果内部的 panic 只记录日志，不影响其他效果
fn isolated<F>(effect: F) -> Effect
where
    F: std::future::Future<Output = ()> + 'static,
{
    AssertUnwindSafe(effect)
        .catch_unwind()
        .map(|outcome| {
            if outcome.is_err() {
                tracing::warn!("后台效果发生 panic，已忽略");
            }
        })
        .boxed_local()
}

/// 元素可能已被移出文档，移除 class 对脱离的节点同样安全
async fn remove_glow_later(element: Handle, after: Duration) {
    tokio::time::sleep(after).await;
    remove_class(&element, constants::GLOW_CLASS);
}

/// 分段的文本已被其他路径改写或标记（例如排队期间被另一次调用处理）
fn already_marked(segment: &Segment) -> bool {
    segment
        .text_nodes
        .iter()
        .any(|node| get_parent_node(node).is_some_and(|parent| is_processed(&parent)))
}

fn text_node_parents(segment: &Segment) -> Vec<Handle> {
    let mut parents: Vec<Handle> = Vec::new();
    for node in &segment.text_nodes {
        if let Some(parent) = get_parent_node(node) {
            if !parents.iter().any(|existing| Rc::ptr_eq(existing, &parent)) {
                parents.push(parent);
            }
        }
    }
    parents
}

fn mark_processed(parents: &[Handle]) {
    let now = chrono::Utc::now().timestamp_millis().to_string();
    for parent in parents {
        set_node_attr(parent, constants::PROCESSED_ATTR, Some("true".to_string()));
        set_node_attr(parent, constants::PROCESSED_AT_ATTR, Some(now.clone()));
    }
}
