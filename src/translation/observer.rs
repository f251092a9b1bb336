//! 变更观察驱动
//!
//! 宿主把 DOM 变更记录交给 [`MutationObserver`]，记录被过滤成候选元素后进入
//! 单消费者队列。[`MutationObserverDriver::run`] 负责防抖、把候选归约为互不包含的
//! 根元素，然后逐个分段并处理。
//!
//! 状态流转：`Idle` → `Observing` → `Debouncing` → `Processing` → `Observing`，
//! 所有生产者释放后（处理完剩余候选）回到 `Idle`。处理期间观察者断开，收到的记录
//! 直接丢弃；正确性由内容账本保证，而不是防抖时序。
//!
//! 协调器产生的后台效果（高亮移除、发音标注）由驱动在等待变更的同时推进，
//! 驱动结束前全部完成。

use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use markup5ever_rcdom::Handle;
use tokio::sync::mpsc;

use crate::parsers::html::dom::{
    descendant_text, get_parent_node, is_attached, is_descendant_of, is_element, is_text,
};
use crate::translation::config::{ObserverConfig, RewriteConfig};
use crate::translation::core::{Effect, ProcessingCoordinator};
use crate::translation::pipeline::{is_processed, is_tool_generated, ContentSegmenter};
use crate::translation::replacer::TextReplacer;

/// DOM 变更记录
#[derive(Debug, Clone)]
pub enum MutationRecord {
    /// 子节点变化
    ChildList { target: Handle, added: Vec<Handle> },
    /// 文本内容变化
    CharacterData { target: Handle },
}

/// 驱动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObserverState {
    #[default]
    Idle,
    Observing,
    Debouncing,
    Processing,
}

/// 驱动统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObserverStats {
    pub candidates: usize,
    pub flushes: usize,
    pub roots_processed: usize,
    pub segments_submitted: usize,
    pub failures: usize,
}

/// 变更记录的生产者句柄
#[derive(Clone)]
pub struct MutationObserver {
    sender: mpsc::UnboundedSender<Handle>,
    state: Rc<Cell<ObserverState>>,
    min_text_length: usize,
}

impl MutationObserver {
    pub fn state(&self) -> ObserverState {
        self.state.get()
    }

    /// 提交变更记录，返回入队的候选数
    ///
    /// 驱动处于 `Processing` 时记录被丢弃。
    pub fn observe(&self, records: Vec<MutationRecord>) -> usize {
        if self.state.get() == ObserverState::Processing {
            tracing::debug!("处理中，丢弃 {} 条变更记录", records.len());
            return 0;
        }

        let mut queued = 0;
        for record in records {
            match record {
                MutationRecord::ChildList { added, .. } => {
                    for node in added {
                        if let Some(candidate) = self.candidate_for(&node) {
                            queued += self.enqueue(candidate);
                        }
                    }
                }
                MutationRecord::CharacterData { target } => {
                    if let Some(candidate) = self.candidate_for(&target) {
                        queued += self.enqueue(candidate);
                    }
                }
            }
        }
        queued
    }

    fn enqueue(&self, candidate: Handle) -> usize {
        match self.sender.send(candidate) {
            Ok(()) => 1,
            Err(_) => {
                tracing::debug!("变更驱动已停止，候选被丢弃");
                0
            }
        }
    }

    /// 文本节点冒泡到父元素；本工具生成或已处理的内容、过短的内容都不是候选
    fn candidate_for(&self, node: &Handle) -> Option<Handle> {
        let element = if is_text(node) {
            get_parent_node(node)?
        } else if is_element(node) {
            node.clone()
        } else {
            return None;
        };

        if is_processed(&element) || within_tool_generated(&element) {
            return None;
        }

        let length = descendant_text(&element).trim().chars().count();
        (length >= self.min_text_length).then_some(element)
    }
}

fn within_tool_generated(element: &Handle) -> bool {
    let mut current = Some(element.clone());
    while let Some(node) = current {
        if is_tool_generated(&node) {
            return true;
        }
        current = get_parent_node(&node);
    }
    false
}

/// 去重、丢弃已脱离文档的候选，并去掉被其他候选包含的元素
pub fn reduce_to_roots(candidates: Vec<Handle>) -> Vec<Handle> {
    let mut unique: Vec<Handle> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if is_attached(&candidate) && !unique.iter().any(|c| Rc::ptr_eq(c, &candidate)) {
            unique.push(candidate);
        }
    }

    unique
        .iter()
        .filter(|candidate| {
            !unique
                .iter()
                .any(|other| !Rc::ptr_eq(other, candidate) && is_descendant_of(candidate, other))
        })
        .cloned()
        .collect()
}

/// 变更观察驱动（单消费者）
pub struct MutationObserverDriver {
    receiver: mpsc::UnboundedReceiver<Handle>,
    state: Rc<Cell<ObserverState>>,
    segmenter: ContentSegmenter,
    coordinator: Rc<ProcessingCoordinator>,
    replacer: Rc<dyn TextReplacer>,
    rewrite: RewriteConfig,
    config: ObserverConfig,
    stats: ObserverStats,
    effects: FuturesUnordered<Effect>,
}

impl MutationObserverDriver {
    /// 创建驱动及其生产者句柄，创建后即处于 `Observing`
    pub fn new(
        segmenter: ContentSegmenter,
        coordinator: Rc<ProcessingCoordinator>,
        replacer: Rc<dyn TextReplacer>,
        rewrite: RewriteConfig,
        config: ObserverConfig,
    ) -> (MutationObserver, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = Rc::new(Cell::new(ObserverState::Observing));

        let observer = MutationObserver {
            sender,
            state: Rc::clone(&state),
            min_text_length: config.min_text_length,
        };

        let driver = Self {
            receiver,
            state,
            segmenter,
            coordinator,
            replacer,
            rewrite,
            config,
            stats: ObserverStats::default(),
            effects: FuturesUnordered::new(),
        };

        (observer, driver)
    }

    pub fn state(&self) -> ObserverState {
        self.state.get()
    }

    /// 运行直到所有生产者释放，返回统计
    pub async fn run(mut self) -> ObserverStats {
        self.state.set(ObserverState::Observing);
        let debounce = self.config.debounce();

        while let Some(first) = next_candidate(&mut self.receiver, &mut self.effects).await {
            let mut pending = vec![first];
            self.state.set(ObserverState::Debouncing);

            // 每个新候选都会重新开始计时
            let mut closed = false;
            loop {
                let next = next_candidate(&mut self.receiver, &mut self.effects);
                match tokio::time::timeout(debounce, next).await {
                    Ok(Some(candidate)) => pending.push(candidate),
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            self.flush(pending).await;

            if closed {
                break;
            }
            self.state.set(ObserverState::Observing);
        }

        while self.effects.next().await.is_some() {}

        self.state.set(ObserverState::Idle);
        tracing::debug!("变更驱动结束: {:?}", self.stats);
        self.stats
    }

    async fn flush(&mut self, pending: Vec<Handle>) {
        self.state.set(ObserverState::Processing);
        self.stats.candidates += pending.len();
        self.stats.flushes += 1;

        let roots = reduce_to_roots(pending);
        tracing::debug!("防抖结束，处理 {} 个根元素", roots.len());

        for root in roots {
            let segments = self.segmenter.segment_content(&root);
            self.stats.roots_processed += 1;
            if segments.is_empty() {
                continue;
            }
            self.stats.segments_submitted += segments.len();

            let processing = self.coordinator.process_segments(
                &segments,
                self.replacer.as_ref(),
                self.rewrite.display_mode,
                self.rewrite.translation_position,
                self.rewrite.show_parentheses,
            );

            match AssertUnwindSafe(processing).catch_unwind().await {
                Ok(result) if result.success => {}
                Ok(result) => {
                    self.stats.failures += 1;
                    tracing::warn!(
                        "变更内容处理失败: {}",
                        result.error.unwrap_or_default()
                    );
                }
                Err(_) => {
                    self.stats.failures += 1;
                    tracing::error!("变更内容处理发生 panic，已忽略");
                }
            }
            self.effects.extend(self.coordinator.take_effects());
        }
    }
}

/// 等待下一个候选，期间推进已排队的后台效果
async fn next_candidate(
    receiver: &mut mpsc::UnboundedReceiver<Handle>,
    effects: &mut FuturesUnordered<Effect>,
) -> Option<Handle> {
    loop {
        tokio::select! {
            candidate = receiver.recv() => return candidate,
            Some(()) = effects.next(), if !effects.is_empty() => {}
        }
    }
}
