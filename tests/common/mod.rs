// 集成测试公共模块
//
// 提供 HTML 构造、桩替换器和 LocalSet 运行辅助

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use markup5ever_rcdom::{Handle, RcDom};

use wordweave::parsers::{find_body, html_to_dom, inner_html};
use wordweave::translation::{
    ContentLedger, ContentSegmenter, CoordinatorConfig, LedgerConfig, ProcessingCoordinator,
    RawReplacement, ReplacementSet, SegmenterConfig, TextReplacer, TranslationError,
    TranslationResult,
};

/// HTML 测试辅助
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    /// 解析片段并返回文档与 body；文档必须在测试期间保持存活
    pub fn parse(html: &str) -> (RcDom, Handle) {
        let dom = html_to_dom(html.as_bytes(), "utf-8");
        let body = find_body(&dom).expect("parsed document should have a body");
        (dom, body)
    }

    pub fn body_html(body: &Handle) -> String {
        inner_html(body)
    }

    /// 简单的英文文章页面
    pub fn create_article_page() -> String {
        r#"<header><nav>Home | About | Contact us today</nav></header>
<article>
  <h1>Learning with quick examples every day</h1>
  <p>The quick brown fox jumps over the lazy dog near the river.</p>
  <p>Every morning the fox runs quick laps around the old farm.</p>
  <script>var quick = "should never be touched by the pipeline";</script>
  <pre>quick code blocks stay exactly as they are written</pre>
</article>"#
            .to_string()
    }
}

/// 按词表返回替换项的桩替换器，记录调用次数
pub struct StubReplacer {
    pairs: Vec<(String, String)>,
    calls: Cell<usize>,
    seen: RefCell<Vec<String>>,
    delay: Option<Duration>,
}

impl StubReplacer {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            pairs: pairs
                .iter()
                .map(|(o, t)| (o.to_string(), t.to_string()))
                .collect(),
            calls: Cell::new(0),
            seen: RefCell::new(Vec::new()),
            delay: None,
        }
    }

    /// 每次调用前等待一段时间，模拟远程服务
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.borrow().clone()
    }
}

#[async_trait(?Send)]
impl TextReplacer for StubReplacer {
    async fn replace_text(&self, text: &str) -> TranslationResult<ReplacementSet> {
        self.calls.set(self.calls.get() + 1);
        self.seen.borrow_mut().push(text.to_string());

        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let replacements = self
            .pairs
            .iter()
            .filter(|(original, _)| text.contains(original.as_str()))
            .map(|(original, translation)| RawReplacement::new(original.clone(), translation.clone()))
            .collect();
        Ok(ReplacementSet::new(replacements))
    }
}

/// 总是失败的替换器
pub struct FailingReplacer;

#[async_trait(?Send)]
impl TextReplacer for FailingReplacer {
    async fn replace_text(&self, _text: &str) -> TranslationResult<ReplacementSet> {
        Err(TranslationError::ReplacerError("service unavailable".to_string()))
    }
}

/// 共享同一账本的分段器与协调器
pub struct TestEnvironment {
    pub ledger: ContentLedger,
    pub segmenter: ContentSegmenter,
    pub coordinator: ProcessingCoordinator,
}

impl TestEnvironment {
    pub fn new(segmenter_config: SegmenterConfig) -> Self {
        let ledger = ContentLedger::new(LedgerConfig::default());
        Self::with_ledger(segmenter_config, ledger)
    }

    pub fn with_ledger(segmenter_config: SegmenterConfig, ledger: ContentLedger) -> Self {
        let segmenter = ContentSegmenter::new(segmenter_config, ledger.clone());
        let coordinator = ProcessingCoordinator::new(ledger.clone(), no_glow());
        Self {
            ledger,
            segmenter,
            coordinator,
        }
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new(SegmenterConfig::default())
    }
}

/// 关闭高亮定时器的协调器配置
pub fn no_glow() -> CoordinatorConfig {
    CoordinatorConfig {
        glow_duration_ms: 0,
        ..CoordinatorConfig::default()
    }
}

/// 在 LocalSet 中运行测试主体
pub async fn run_local<F: Future>(future: F) -> F::Output {
    tokio::task::LocalSet::new().run_until(future).await
}
