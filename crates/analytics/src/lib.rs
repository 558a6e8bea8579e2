pub mod aggregator;
pub mod event_sink;

pub use aggregator::{AdPerformance, AnalyticsAggregator, PerformanceSummary};
pub use event_sink::ClickHouseEventLog;
