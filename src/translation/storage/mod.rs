//! 存储模块
//!
//! 提供内容账本：处理状态、内容指纹与过期清理。

pub mod ledger;

pub use ledger::{
    generate_dom_path, Clock, ContentLedger, EntryOutcome, LedgerEntry, LedgerStats, ManualClock,
    SystemClock,
};
