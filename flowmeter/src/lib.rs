#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unused_self,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity)]

//! # Flowmeter
//! Trade ingestion, gap backfill and windowed buy/sell flow analytics.
//!
//! Flowmeter captures every aggregated trade for a market into an idempotent
//! [`TradeStore`](store::TradeStore), fills any downtime gap from the venue's
//! historical query, and periodically computes paired "current" / "last" window
//! statistics that drive a live buy-vs-sell dominance signal.
//!
//! The pipeline is made of small units that only share the store:
//! * [`LiveIngestor`](ingest::LiveIngestor): normalises and stores live feed events.
//! * [`GapReport`](gap::GapReport): decides how much history is missing at startup.
//! * [`BackfillCoordinator`](backfill::BackfillCoordinator): replays historical trades.
//! * [`AnalyticsEngine`](analytics::engine::AnalyticsEngine): windowed aggregates & deltas.
//! * [`AnalysisScheduler`](scheduler::AnalysisScheduler): persists an
//!   [`AnalysisSnapshot`](analytics::snapshot::AnalysisSnapshot) every loop interval.
//!
//! [`Pipeline`](pipeline::Pipeline) wires them together for one market.

/// All errors generated in `flowmeter`.
pub mod error;

/// Supported exchanges and their feed adapters.
pub mod exchange;

/// Canonical [`Trade`](trade::Trade) & [`Market`](trade::Market) models.
pub mod trade;

/// Pure conversion of raw venue records into [`Trade`](trade::Trade)s.
pub mod normalizer;

/// Idempotent trade & snapshot persistence.
pub mod store;

/// Live and historical feed contracts consumed by the pipeline.
pub mod feed;

/// Stream utilities (idle timeout detection).
pub mod streams;

/// Startup gap detection & backfill planning.
pub mod gap;

/// Historical trade replay into the [`TradeStore`](store::TradeStore).
pub mod backfill;

/// Live feed ingestion.
pub mod ingest;

/// Windowed buy/sell/all flow analytics.
pub mod analytics;

/// Periodic analytics driver.
pub mod scheduler;

/// Per-market liveness & readiness signal.
pub mod readiness;

/// Retry with exponential backoff & jitter.
pub mod backoff;

/// Pipeline configuration.
pub mod config;

/// Startup ordering, task supervision & shutdown for one market.
pub mod pipeline;
