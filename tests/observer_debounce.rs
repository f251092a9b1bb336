//! 变更观察驱动集成测试
//!
//! 验证防抖合并、根元素归约，以及与初始处理并发时的至多一次保证

use std::rc::Rc;
use std::time::Duration;

use wordweave::parsers::html::dom::{append_child, create_element, create_text};
use wordweave::translation::{
    CoordinatorConfig, DisplayMode, MutationObserverDriver, MutationRecord, ObserverConfig, ObserverState,
    ProcessingCoordinator, RewriteConfig, TextReplacer, TranslationPosition,
};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{no_glow, run_local, HtmlTestHelper, StubReplacer, TestEnvironment};

/// 连续变更在防抖窗口内合并为一次处理
#[tokio::test(start_paused = true)]
async fn test_burst_of_mutations_flushes_once() {
    run_local(async {
        let env = TestEnvironment::default();
        let (_dom, body) = HtmlTestHelper::parse("<div id=feed></div>");
        let feed = body.children.borrow()[0].clone();

        let replacer = Rc::new(StubReplacer::new(&[("quick", "快速的")]));
        let coordinator = Rc::new(ProcessingCoordinator::new(env.ledger.clone(), no_glow()));
        let (observer, driver) = MutationObserverDriver::new(
            env.segmenter,
            coordinator,
            replacer.clone() as Rc<dyn TextReplacer>,
            RewriteConfig::default(),
            ObserverConfig::default(),
        );
        let handle = tokio::task::spawn_local(driver.run());

        // 每 100ms 追加一条，间隔小于防抖时间
        for i in 0..3 {
            let item = create_element("p", &[]);
            append_child(&item, create_text(&format!("Feed item {} with a quick update.", i)));
            append_child(&feed, item.clone());
            observer.observe(vec![MutationRecord::ChildList {
                target: feed.clone(),
                added: vec![item],
            }]);
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(observer.state(), ObserverState::Debouncing);
        }
        assert_eq!(replacer.calls(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(observer.state(), ObserverState::Observing);

        drop(observer);
        let stats = handle.await.expect("driver task should not panic");
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.candidates, 3);
        assert_eq!(stats.roots_processed, 3);
        assert_eq!(stats.failures, 0);
        assert_eq!(HtmlTestHelper::body_html(&body).matches("快速的").count(), 3);

        println!("✅ Debounce coalescing test passed");
    })
    .await;
}

/// 父子候选只处理外层元素，已处理内容的变更不会触发处理
#[tokio::test(start_paused = true)]
async fn test_nested_candidates_reduce_to_outer_root() {
    run_local(async {
        let env = TestEnvironment::default();
        let (_dom, body) = HtmlTestHelper::parse("<div></div>");

        let replacer = Rc::new(StubReplacer::new(&[("quick", "快速的")]));
        let coordinator = Rc::new(ProcessingCoordinator::new(env.ledger.clone(), no_glow()));
        let (observer, driver) = MutationObserverDriver::new(
            env.segmenter,
            coordinator,
            replacer.clone() as Rc<dyn TextReplacer>,
            RewriteConfig::default(),
            ObserverConfig::default(),
        );
        let handle = tokio::task::spawn_local(driver.run());

        let card = create_element("section", &[]);
        let inner = create_element("p", &[]);
        append_child(&inner, create_text("A quick card body that was just inserted."));
        append_child(&card, inner.clone());
        append_child(&body, card.clone());

        let text = inner.children.borrow()[0].clone();
        observer.observe(vec![
            MutationRecord::ChildList {
                target: body.clone(),
                added: vec![card.clone()],
            },
            MutationRecord::CharacterData { target: text },
        ]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(replacer.calls(), 1);

        // 处理后的节点再次变化：不是候选
        let text = inner.children.borrow()[0].clone();
        let queued = observer.observe(vec![MutationRecord::CharacterData { target: text }]);
        assert_eq!(queued, 0);

        drop(observer);
        let stats = handle.await.expect("driver task should not panic");
        assert_eq!(stats.candidates, 2);
        assert_eq!(stats.roots_processed, 1);
        assert_eq!(stats.segments_submitted, 1);

        println!("✅ Root reduction test passed");
    })
    .await;
}

/// 初始处理与观察驱动同时提交同一内容，只处理一次
#[tokio::test(start_paused = true)]
async fn test_observer_and_initial_pass_do_not_double_process() {
    run_local(async {
        let env = TestEnvironment::default();
        let (_dom, body) = HtmlTestHelper::parse(
            "<article><p>The quick brown fox was here before the observer started.</p></article>",
        );
        let article = body.children.borrow()[0].clone();

        let replacer =
            Rc::new(StubReplacer::new(&[("quick", "快速的")]).with_delay(Duration::from_millis(500)));
        let coordinator = Rc::new(ProcessingCoordinator::new(env.ledger.clone(), no_glow()));
        let segments = env.segmenter.segment_content(&body);
        assert_eq!(segments.len(), 1);

        let (observer, driver) = MutationObserverDriver::new(
            env.segmenter,
            Rc::clone(&coordinator),
            replacer.clone() as Rc<dyn TextReplacer>,
            RewriteConfig::default(),
            ObserverConfig {
                debounce_ms: 10,
                ..ObserverConfig::default()
            },
        );
        let handle = tokio::task::spawn_local(driver.run());

        observer.observe(vec![MutationRecord::ChildList {
            target: body.clone(),
            added: vec![article],
        }]);

        let initial = coordinator
            .process_segments(
                &segments,
                replacer.as_ref(),
                DisplayMode::Visible,
                TranslationPosition::After,
                false,
            )
            .await;
        assert!(initial.success);
        coordinator.wait_for_completion().await;

        drop(observer);
        let stats = handle.await.expect("driver task should not panic");

        assert_eq!(replacer.calls(), 1);
        assert_eq!(HtmlTestHelper::body_html(&body).matches("快速的").count(), 1);
        assert_eq!(stats.failures, 0);

        println!("✅ Observer race test passed");
    })
    .await;
}

/// 驱动在等待变更期间推进高亮移除
#[tokio::test(start_paused = true)]
async fn test_driver_removes_glow_while_observing() {
    run_local(async {
        let env = TestEnvironment::default();
        let (_dom, body) = HtmlTestHelper::parse("<div></div>");
        let container = body.children.borrow()[0].clone();

        let coordinator = Rc::new(ProcessingCoordinator::new(
            env.ledger.clone(),
            CoordinatorConfig::default(),
        ));
        let (observer, driver) = MutationObserverDriver::new(
            env.segmenter,
            coordinator.clone(),
            Rc::new(StubReplacer::new(&[("quick", "快速的")])) as Rc<dyn TextReplacer>,
            RewriteConfig::default(),
            ObserverConfig::default(),
        );
        let handle = tokio::task::spawn_local(driver.run());

        let item = create_element("p", &[]);
        append_child(&item, create_text("A quick note appended by a script."));
        append_child(&container, item.clone());
        observer.observe(vec![MutationRecord::ChildList {
            target: container.clone(),
            added: vec![item],
        }]);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(observer.state(), ObserverState::Observing);
        assert!(HtmlTestHelper::body_html(&body).contains("wordweave-glow"));
        assert_eq!(coordinator.pending_effects(), 0);

        tokio::time::sleep(CoordinatorConfig::default().glow_duration()).await;
        assert_eq!(observer.state(), ObserverState::Observing);
        let html = HtmlTestHelper::body_html(&body);
        assert!(html.contains("快速的"));
        assert!(!html.contains("wordweave-glow"));

        drop(observer);
        let stats = handle.await.expect("driver task should not panic");
        assert_eq!(stats.flushes, 1);

        println!("✅ Observer glow test passed");
    })
    .await;
}
