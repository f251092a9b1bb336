//! 内容账本
//!
//! 记录哪些内容已经处理、哪些正在处理，保证同一段文本在持续变化的 DOM 上
//! 至多被处理一次。条目在存活时间（默认 4 小时）后过期，由周期清理任务或
//! 读取时惰性删除。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use markup5ever_rcdom::Handle;
use tokio::task::JoinHandle;

use crate::parsers::html::dom::{get_classes, get_node_name, get_parent_node};
use crate::parsers::html::normalize_whitespace;
use crate::translation::config::{constants, LedgerConfig};

// ============================================================================
// 时钟
// ============================================================================

/// 毫秒级时间来源
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_millis(&self) -> i64;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// 手动推进的时钟，用于测试过期逻辑
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ============================================================================
// 核心类型
// ============================================================================

/// 一次处理的结果摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryOutcome {
    pub replacement_count: usize,
    pub success: bool,
}

/// 账本条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub fingerprint: String,
    /// 完成时间（epoch 毫秒）
    pub timestamp: i64,
    pub dom_path: String,
    pub processing_result: EntryOutcome,
}

impl LedgerEntry {
    /// 检查条目是否过期
    pub fn is_expired(&self, now_millis: i64, ttl_millis: i64) -> bool {
        now_millis - self.timestamp > ttl_millis
    }
}

/// 账本统计信息
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerStats {
    pub processed_count: usize,
    pub processing_count: usize,
    pub evictions: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    entries: HashMap<String, LedgerEntry>,
    active: HashSet<String>,
    evictions: u64,
    successes: u64,
    failures: u64,
}

struct LedgerInner {
    state: Mutex<LedgerState>,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl LedgerInner {
    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ttl_millis(&self) -> i64 {
        self.config.content_ttl().as_millis() as i64
    }

    fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let ttl = self.ttl_millis();
        let mut state = self.state();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        let removed = before - state.entries.len();
        state.evictions += removed as u64;
        removed
    }
}

/// 内容账本
///
/// 可克隆的共享服务，克隆体指向同一份状态。页面上下文结束时调用 [`destroy`](Self::destroy)。
#[derive(Clone)]
pub struct ContentLedger {
    inner: Arc<LedgerInner>,
}

impl fmt::Debug for ContentLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentLedger")
            .field("stats", &self.stats())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Default for ContentLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

// ============================================================================
// 实现
// ============================================================================

impl ContentLedger {
    /// 使用系统时钟创建账本
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// 使用指定时钟创建账本
    pub fn with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(LedgerInner {
                state: Mutex::new(LedgerState::default()),
                config,
                clock,
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.inner.config
    }

    pub fn now_millis(&self) -> i64 {
        self.inner.clock.now_millis()
    }

    /// 生成内容指纹
    ///
    /// 文本先规范化空白。动态内容（路径带 `:nth-child(` 或 `[n]` 下标，或文本较短）
    /// 额外混入 30 秒时间桶，同一时间桶内结果确定。
    pub fn generate_content_fingerprint(&self, text: &str, dom_path: &str) -> String {
        let normalized = normalize_whitespace(text);
        let is_dynamic = dom_path.contains(":nth-child(")
            || dom_path.contains('[')
            || normalized.chars().count() < self.inner.config.dynamic_text_threshold;

        let mut hasher = blake3::Hasher::new();
        hasher.update(normalized.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(dom_path.as_bytes());

        if is_dynamic {
            let bucket_millis = (self.inner.config.dynamic_bucket_secs.max(1) * 1000) as i64;
            let bucket = self.now_millis().div_euclid(bucket_millis);
            hasher.update(b"\x1f");
            hasher.update(bucket.to_string().as_bytes());
        }

        let hex = hasher.finalize().to_hex();
        hex.as_str()[..constants::FINGERPRINT_HEX_LEN].to_string()
    }

    /// 内容已处理且未过期；过期条目在读取时删除
    pub fn is_content_processed(&self, fingerprint: &str) -> bool {
        let now = self.now_millis();
        let ttl = self.inner.ttl_millis();
        let mut state = self.inner.state();

        let expired = match state.entries.get(fingerprint) {
            Some(entry) => entry.is_expired(now, ttl),
            None => return false,
        };

        if expired {
            state.entries.remove(fingerprint);
            state.evictions += 1;
            tracing::debug!("账本条目已过期: {}", fingerprint);
            return false;
        }

        true
    }

    pub fn is_content_processing(&self, fingerprint: &str) -> bool {
        self.inner.state().active.contains(fingerprint)
    }

    /// 原子地认领一个指纹
    ///
    /// 已处理或正在处理时返回 `false`。检查与插入在同一次加锁内完成。
    pub fn mark_processing_start(&self, fingerprint: &str) -> bool {
        let now = self.now_millis();
        let ttl = self.inner.ttl_millis();
        let mut state = self.inner.state();

        if state.active.contains(fingerprint) {
            return false;
        }

        if let Some(entry) = state.entries.get(fingerprint) {
            if !entry.is_expired(now, ttl) {
                return false;
            }
            state.entries.remove(fingerprint);
            state.evictions += 1;
        }

        state.active.insert(fingerprint.to_string());
        true
    }

    /// 记录处理完成（成功或失败）并释放认领
    pub fn mark_processing_complete(
        &self,
        fingerprint: &str,
        dom_path: &str,
        replacement_count: usize,
        success: bool,
    ) {
        let timestamp = self.now_millis();
        let mut state = self.inner.state();
        state.active.remove(fingerprint);
        state.entries.insert(
            fingerprint.to_string(),
            LedgerEntry {
                fingerprint: fingerprint.to_string(),
                timestamp,
                dom_path: dom_path.to_string(),
                processing_result: EntryOutcome {
                    replacement_count,
                    success,
                },
            },
        );

        if success {
            state.successes += 1;
        } else {
            state.failures += 1;
        }
    }

    pub fn mark_processing_failed(&self, fingerprint: &str, dom_path: &str) {
        self.mark_processing_complete(fingerprint, dom_path, 0, false);
    }

    /// 查询条目（不做过期检查）
    pub fn entry(&self, fingerprint: &str) -> Option<LedgerEntry> {
        self.inner.state().entries.get(fingerprint).cloned()
    }

    /// 清理过期条目，返回删除数量
    pub fn cleanup_expired(&self) -> usize {
        let removed = self.inner.cleanup_expired();
        if removed > 0 {
            tracing::debug!("清理了 {} 个过期账本条目", removed);
        }
        removed
    }

    /// 启动周期清理任务
    ///
    /// 需要在 tokio 运行时内调用；任务只持有弱引用，账本释放后自动退出。
    pub fn start_sweeper(&self) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("没有可用的 tokio 运行时，账本周期清理未启动");
                return;
            }
        };

        let mut sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let period = self.inner.config.cleanup_interval();
        let weak: Weak<LedgerInner> = Arc::downgrade(&self.inner);

        *sweeper = Some(runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let removed = inner.cleanup_expired();
                tracing::debug!("周期清理完成，删除 {} 个条目", removed);
            }
        }));
    }

    pub fn stats(&self) -> LedgerStats {
        let state = self.inner.state();
        LedgerStats {
            processed_count: state.entries.len(),
            processing_count: state.active.len(),
            evictions: state.evictions,
            successes: state.successes,
            failures: state.failures,
        }
    }

    /// 清空全部状态
    pub fn reset(&self) {
        *self.inner.state() = LedgerState::default();
    }

    /// 停止清理任务并清空状态
    pub fn destroy(&self) {
        if let Some(handle) = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.reset();
    }
}

/// 生成元素的结构路径
///
/// 从元素向上到 `<body>`（不含）为止，每层为 `tag[.class...][:nth-child(i)]`，
/// 以 ` > ` 连接。只有存在同名兄弟元素时才附加 `:nth-child`。
pub fn generate_dom_path(element: &Handle) -> String {
    let mut parts = Vec::new();
    let mut current = Some(element.clone());

    while let Some(node) = current {
        let Some(tag) = get_node_name(&node) else {
            break;
        };
        if tag == "body" || tag == "html" {
            break;
        }

        let mut part = tag.to_string();
        for class in get_classes(&node) {
            if !class.starts_with(constants::TOOL_CLASS_PREFIX) {
                part.push('.');
                part.push_str(&class);
            }
        }

        let parent = get_parent_node(&node);
        if let Some(parent) = &parent {
            if let Some(index) = nth_child_if_ambiguous(parent, &node, tag) {
                part.push_str(&format!(":nth-child({})", index));
            }
        }

        parts.push(part);
        current = parent;
    }

    parts.reverse();
    parts.join(" > ")
}

/// 元素在元素兄弟中的 1 起始序号；没有同名兄弟时返回 `None`
fn nth_child_if_ambiguous(parent: &Handle, node: &Handle, tag: &str) -> Option<usize> {
    let children = parent.children.borrow();
    let mut index = None;
    let mut element_count = 0;
    let mut same_tag = 0;

    for child in children.iter() {
        let Some(name) = get_node_name(child) else {
            continue;
        };
        element_count += 1;
        if name == tag {
            same_tag += 1;
        }
        if Rc::ptr_eq(child, node) {
            index = Some(element_count);
        }
    }

    if same_tag > 1 {
        index
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{find_nodes, html_to_dom};

    fn ledger_with_clock(start: i64) -> (ContentLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        let ledger = ContentLedger::with_clock(LedgerConfig::default(), clock.clone());
        (ledger, clock)
    }

    #[test]
    fn test_fingerprint_is_stable_within_bucket() {
        let (ledger, clock) = ledger_with_clock(1_000);
        let a = ledger.generate_content_fingerprint("  Hello   world ", "div > p");
        clock.advance(5_000);
        let b = ledger.generate_content_fingerprint("Hello world", "div > p");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        // 短文本属于动态内容，跨时间桶后指纹变化
        clock.advance(30_000);
        let c = ledger.generate_content_fingerprint("Hello world", "div > p");
        assert_ne!(a, c);
    }

    #[test]
    fn test_long_static_text_ignores_time() {
        let (ledger, clock) = ledger_with_clock(0);
        let text = "word ".repeat(40);
        let a = ledger.generate_content_fingerprint(&text, "article > p.lead");
        clock.advance(10 * 60 * 1000);
        let b = ledger.generate_content_fingerprint(&text, "article > p.lead");
        assert_eq!(a, b);

        let indexed = ledger.generate_content_fingerprint(&text, "article > p.lead[0]");
        clock.advance(60 * 1000);
        let indexed_later = ledger.generate_content_fingerprint(&text, "article > p.lead[0]");
        assert_ne!(indexed, indexed_later);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let (ledger, _) = ledger_with_clock(0);
        assert!(ledger.mark_processing_start("fp"));
        assert!(!ledger.mark_processing_start("fp"));
        assert!(ledger.is_content_processing("fp"));

        ledger.mark_processing_complete("fp", "p", 2, true);
        assert!(!ledger.is_content_processing("fp"));
        assert!(ledger.is_content_processed("fp"));
        assert!(!ledger.mark_processing_start("fp"));

        let entry = ledger.entry("fp").unwrap();
        assert_eq!(entry.processing_result.replacement_count, 2);
        assert!(entry.processing_result.success);
    }

    #[test]
    fn test_failed_processing_is_recorded() {
        let (ledger, _) = ledger_with_clock(0);
        assert!(ledger.mark_processing_start("fp"));
        ledger.mark_processing_failed("fp", "p");

        let stats = ledger.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.processing_count, 0);
        assert!(!ledger.entry("fp").unwrap().processing_result.success);
    }

    #[test]
    fn test_ttl_expiry_with_manual_clock() {
        let (ledger, clock) = ledger_with_clock(0);
        assert!(ledger.mark_processing_start("a"));
        ledger.mark_processing_complete("a", "p", 1, true);
        assert!(ledger.mark_processing_start("b"));
        ledger.mark_processing_complete("b", "p", 1, true);

        clock.advance(4 * 60 * 60 * 1000 + 1);
        assert!(!ledger.is_content_processed("a"));
        assert_eq!(ledger.cleanup_expired(), 1);

        let stats = ledger.stats();
        assert_eq!(stats.processed_count, 0);
        assert_eq!(stats.evictions, 2);
    }

    #[test]
    fn test_reset_and_destroy_clear_state() {
        let (ledger, _) = ledger_with_clock(0);
        ledger.mark_processing_start("a");
        ledger.mark_processing_complete("b", "p", 0, true);
        ledger.reset();
        assert_eq!(ledger.stats(), LedgerStats::default());

        ledger.mark_processing_start("c");
        ledger.destroy();
        assert!(!ledger.is_content_processing("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_expired_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let config = LedgerConfig {
            content_ttl_secs: 10,
            cleanup_interval_secs: 20,
            ..LedgerConfig::default()
        };
        let ledger = ContentLedger::with_clock(config, clock.clone());
        ledger.mark_processing_complete("a", "p", 1, true);
        ledger.start_sweeper();

        clock.advance(11_000);
        tokio::time::sleep(std::time::Duration::from_secs(21)).await;
        tokio::task::yield_now().await;

        assert_eq!(ledger.stats().processed_count, 0);
        ledger.destroy();
    }

    #[test]
    fn test_dom_path_uses_classes_and_nth_child() {
        let dom = html_to_dom(
            br#"<html><body><div class="content wordweave-processing"><p>a</p><p class="x">b</p><span>c</span></div></body></html>"#,
            "utf-8",
        );
        let paragraphs = find_nodes(&dom.document, &["html", "body", "div", "p"]);
        assert_eq!(
            generate_dom_path(&paragraphs[1]),
            "div.content > p.x:nth-child(2)"
        );

        let spans = find_nodes(&dom.document, &["html", "body", "div", "span"]);
        assert_eq!(generate_dom_path(&spans[0]), "div.content > span");
    }
}
