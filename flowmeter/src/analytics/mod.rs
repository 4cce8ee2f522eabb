/// Operator supplied analysis window length & window arithmetic.
pub mod interval;

/// [`AnalysisSnapshot`](snapshot::AnalysisSnapshot) record, deltas & flow differential.
pub mod snapshot;

/// Windowed aggregation over the [`TradeStore`](crate::store::TradeStore).
pub mod engine;

pub use engine::AnalyticsEngine;
pub use interval::Interval;
pub use snapshot::AnalysisSnapshot;
