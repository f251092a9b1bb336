//! 内容账本生命周期测试
//!
//! 使用可控时钟验证过期、清理与周期任务

use std::sync::Arc;
use std::time::Duration;

use wordweave::translation::{ContentLedger, LedgerConfig, ManualClock};

const START: i64 = 1_700_000_000_000;

fn ledger_with_clock(config: LedgerConfig) -> (ContentLedger, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    let ledger = ContentLedger::with_clock(config, clock.clone());
    (ledger, clock)
}

fn short_ttl() -> LedgerConfig {
    LedgerConfig {
        content_ttl_secs: 60,
        cleanup_interval_secs: 30,
        ..LedgerConfig::default()
    }
}

/// 模拟时钟超过存活时间后条目被清理
#[test]
fn test_ttl_expiry_purges_entries() {
    let (ledger, clock) = ledger_with_clock(short_ttl());

    for i in 0..5 {
        let fp = format!("fp-{}", i);
        assert!(ledger.mark_processing_start(&fp));
        ledger.mark_processing_complete(&fp, "article > p", i, true);
    }
    assert_eq!(ledger.stats().processed_count, 5);

    clock.advance(30_000);
    // 中途写入的条目更晚过期
    assert!(ledger.mark_processing_start("late"));
    ledger.mark_processing_complete("late", "p", 0, true);

    clock.advance(30_001);
    assert_eq!(ledger.cleanup_expired(), 5);

    let stats = ledger.stats();
    assert_eq!(stats.processed_count, 1);
    assert_eq!(stats.evictions, 5);
    assert!(ledger.is_content_processed("late"));
    assert!(!ledger.is_content_processed("fp-0"));

    clock.advance(60_000);
    assert!(!ledger.is_content_processed("late"));
    assert_eq!(ledger.stats().processed_count, 0);

    println!("✅ TTL expiry test passed");
}

/// 过期条目可以被重新认领
#[test]
fn test_expired_entry_can_be_reclaimed() {
    let (ledger, clock) = ledger_with_clock(short_ttl());

    assert!(ledger.mark_processing_start("fp"));
    assert!(!ledger.mark_processing_start("fp"));
    ledger.mark_processing_failed("fp", "p");
    assert!(!ledger.mark_processing_start("fp"));

    clock.advance(60_001);
    assert!(ledger.mark_processing_start("fp"));
    assert!(ledger.is_content_processing("fp"));

    println!("✅ Reclaim after expiry test passed");
}

/// 短文本指纹随时间桶变化，长文本在静态路径下保持不变
#[test]
fn test_fingerprint_time_buckets() {
    let (ledger, clock) = ledger_with_clock(LedgerConfig::default());
    let short = "Short dynamic text";
    let long = "Long static text ".repeat(10);

    let short_before = ledger.generate_content_fingerprint(short, "main > p");
    let long_before = ledger.generate_content_fingerprint(&long, "main > p");
    let indexed_before = ledger.generate_content_fingerprint(&long, "main > p:nth-child(2)");
    assert_eq!(short_before.len(), 16);

    clock.advance(30_000);

    assert_ne!(ledger.generate_content_fingerprint(short, "main > p"), short_before);
    assert_eq!(ledger.generate_content_fingerprint(&long, "main > p"), long_before);
    assert_ne!(
        ledger.generate_content_fingerprint(&long, "main > p:nth-child(2)"),
        indexed_before
    );

    // 空白规范化后相同
    let spaced = long.replace(' ', "  ");
    assert_eq!(ledger.generate_content_fingerprint(&spaced, "main > p"), long_before);

    println!("✅ Fingerprint bucket test passed");
}

/// 周期清理任务按间隔删除过期条目，销毁后停止
#[tokio::test(start_paused = true)]
async fn test_sweeper_purges_on_interval() {
    let (ledger, clock) = ledger_with_clock(short_ttl());
    assert!(ledger.mark_processing_start("fp"));
    ledger.mark_processing_complete("fp", "p", 1, true);

    ledger.start_sweeper();
    clock.advance(61_000);

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(ledger.stats().processed_count, 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(ledger.stats().processed_count, 0);
    assert_eq!(ledger.stats().evictions, 1);

    ledger.destroy();
    assert_eq!(ledger.stats(), Default::default());

    println!("✅ Sweeper test passed");
}
