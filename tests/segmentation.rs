//! 分段集成测试
//!
//! 验证分段文本完整性、长文本切分与短分段合并

use wordweave::parsers::html::dom::{find_nodes, text_of};
use wordweave::translation::{ContentLedger, ContentSegmenter, IgnorePolicy, Segment, SegmenterConfig};

#[allow(dead_code)]
mod common {
    include!("common/mod.rs");
}

use common::{HtmlTestHelper, TestEnvironment};

fn assert_text_integrity(segments: &[Segment]) {
    for segment in segments {
        let joined: String = segment.text_nodes.iter().filter_map(text_of).collect();
        assert_eq!(joined, segment.text_content, "segment {} lost text", segment.id);
        assert_eq!(segment.current_text(), segment.text_content);
    }
}

/// 900 字符的容器按 400 上限切分为三段
#[test]
fn test_long_container_splits_into_indexed_segments() {
    let env = TestEnvironment::default();
    let span = format!("{} ", "b".repeat(99));
    let html = format!("<p>{}</p>", format!("<span>{}</span>", span).repeat(9));
    let (_dom, body) = HtmlTestHelper::parse(&html);

    let segments = env.segmenter.segment_content(&body);

    assert_eq!(segments.len(), 3);
    let total: usize = segments.iter().map(Segment::char_len).sum();
    assert_eq!(total, 900);
    assert!(segments.iter().all(|s| s.char_len() <= 400));
    for (index, segment) in segments.iter().enumerate() {
        assert!(segment.id.starts_with("p-"));
        assert!(segment.id.ends_with(&format!("-{}", index)));
        assert!(segment.dom_path.ends_with(&format!("[{}]", index)));
    }

    // 切分出的分段指纹互不相同
    assert_ne!(segments[0].fingerprint, segments[1].fingerprint);
    assert_ne!(segments[1].fingerprint, segments[2].fingerprint);
    assert_text_integrity(&segments);

    println!("✅ Long text split test passed");
}

/// 三个 10 字符的短分段合并为一个，包含三个元素
#[test]
fn test_three_short_segments_merge() {
    let env = TestEnvironment::default();
    let (_dom, body) = HtmlTestHelper::parse(
        "<div><span>0123456789</span><span>abcdefghij</span><span>klmnopqrst</span></div>",
    );
    let spans = find_nodes(&body, &["body", "div", "span"]);
    assert_eq!(spans.len(), 3);

    let pieces: Vec<Segment> = spans
        .iter()
        .flat_map(|span| env.segmenter.extract_segments(span))
        .collect();
    assert_eq!(pieces.len(), 3);

    let merged = env.segmenter.merge_small_segments(pieces);

    assert_eq!(merged.len(), 1);
    let segment = &merged[0];
    assert_eq!(segment.elements.len(), 3);
    assert_eq!(segment.text_content, "0123456789abcdefghijklmnopqrst");
    assert_eq!(segment.char_len(), 30);
    assert!(segment.id.starts_with("merged-"));
    assert!(segment.id.ends_with(&segment.fingerprint));
    assert_text_integrity(&merged);

    println!("✅ Merge test passed");
}

/// 关闭合并后保留原始分段
#[test]
fn test_merging_can_be_disabled() {
    let env = TestEnvironment::new(SegmenterConfig {
        min_segment_length: 5,
        merge_small_segments: false,
        ..SegmenterConfig::default()
    });
    let html = (0..4)
        .map(|i| format!("<p>Line number {}</p>", i))
        .collect::<String>();
    let (_dom, body) = HtmlTestHelper::parse(&html);

    let segments = env.segmenter.segment_content(&body);
    assert_eq!(segments.len(), 4);
    assert!(segments.iter().all(|s| s.id.starts_with("p-")));
    assert_text_integrity(&segments);

    println!("✅ Merge disabled test passed");
}

/// 混合内联标记的页面：分段文本与文本节点严格对应，忽略区域不出现
#[test]
fn test_text_integrity_on_mixed_markup() {
    let env = TestEnvironment::default();
    let (_dom, body) = HtmlTestHelper::parse(
        r#"<main>
  <section><h2>Grammar notes for the week</h2>
    <p>Verbs like <em>run</em> and <strong>jump</strong> change form in the past tense.</p>
    <p>Use <a href="/x">this link</a> to review <code>irregular()</code> verbs later.</p>
  </section>
  <aside aria-hidden="true">Advertisement that nobody should ever read at all</aside>
  <div contenteditable="true">Draft text the user is currently editing here</div>
</main>"#,
    );

    let segments = env.segmenter.segment_content(&body);
    assert!(!segments.is_empty());
    assert_text_integrity(&segments);

    let all_text: String = segments.iter().map(|s| s.text_content.clone()).collect();
    assert!(all_text.contains("Verbs like run and jump change form"));
    assert!(all_text.contains("to review  verbs later."));
    assert!(!all_text.contains("irregular()"));
    assert!(!all_text.contains("Advertisement"));
    assert!(!all_text.contains("Draft text"));

    println!("✅ Mixed markup integrity test passed");
}

/// 自定义忽略标签
#[test]
fn test_custom_ignore_policy() {
    let segmenter = ContentSegmenter::new(SegmenterConfig::default(), ContentLedger::default())
        .with_policy(IgnorePolicy::new().with_ignored_tags(["nav", "FOOTER"]));
    let (_dom, body) = HtmlTestHelper::parse(
        "<nav>Navigation links that are long enough to count</nav><p>Body paragraph that should be segmented normally.</p><footer>Footer text that is also long enough to count</footer>",
    );

    let segments = segmenter.segment_content(&body);
    assert_eq!(segments.len(), 1);
    assert_eq!(
        segments[0].text_content,
        "Body paragraph that should be segmented normally."
    );

    println!("✅ Custom ignore policy test passed");
}

/// 默认配置下，略长于最小长度的相邻段落在分段时两两合并
#[test]
fn test_segment_content_merges_short_paragraphs() {
    let env = TestEnvironment::default();
    let (_dom, body) = HtmlTestHelper::parse(
        "<p>Short line number one.</p><p>Short line number two.</p><p>Short line number six.</p><p>Short line number ten.</p>",
    );

    let segments = env.segmenter.segment_content(&body);

    assert_eq!(segments.len(), 2);
    for segment in &segments {
        assert!(segment.id.starts_with("merged-"));
        assert_eq!(segment.elements.len(), 2);
        assert_eq!(segment.char_len(), 44);
        assert!(segment.dom_path.contains('|'));
    }
    assert_eq!(
        segments[0].text_content,
        "Short line number one.Short line number two."
    );
    assert_eq!(
        segments[1].text_content,
        "Short line number six.Short line number ten."
    );
    assert_text_integrity(&segments);

    println!("✅ Pipeline merge test passed");
}
