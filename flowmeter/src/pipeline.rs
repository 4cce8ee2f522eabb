use crate::{
    analytics::Interval,
    backfill::{BackfillCoordinator, BackfillOutcome, BackfillSummary, cancelled},
    backoff::retry,
    config::PipelineConfig,
    error::PipelineError,
    feed::{HistoricalFeed, LiveFeed},
    gap::{BackfillState, PlanOptions, detect_gap},
    ingest::{IngestExit, IngestStats, LiveIngestor},
    readiness::{BackfillStatus, Readiness},
    scheduler::{AnalysisScheduler, SchedulerStats},
    store::TradeStore,
    trade::Market,
};
use chrono::Utc;
use std::{str::FromStr, sync::Arc};
use tokio::{sync::watch, task::JoinError};
use tracing::{error, info, warn};

/// Result of a [`Pipeline`] run that ended without a fatal error.
#[derive(Clone, PartialEq, Debug)]
pub struct PipelineSummary {
    pub market: Market,
    /// Startup backfill decision.
    pub plan: BackfillState,
    pub backfill: BackfillSummary,
    pub ingest_exit: IngestExit,
    pub ingest: IngestStats,
    /// `None` if the pipeline stopped before the backfill completed.
    pub scheduler: Option<SchedulerStats>,
}

/// Owns the startup ordering and task supervision of one market.
///
/// Startup order:
/// 1. Validate the analysis interval.
/// 2. Optionally clear the market's stored data.
/// 3. Detect the downtime gap and plan the backfill.
/// 4. Subscribe to the live feed and start ingesting.
/// 5. Run the backfill to completion.
/// 6. Start the analysis scheduler.
///
/// Live ingestion starts before the backfill so no trade falls between the two. The
/// pipeline runs until `shutdown` is signalled or the live feed ends.
#[derive(Debug)]
pub struct Pipeline<Store, Live, Historical> {
    config: PipelineConfig,
    store: Arc<Store>,
    live: Arc<Live>,
    historical: Arc<Historical>,
    readiness: Arc<Readiness>,
}

impl<Store, Live, Historical> Pipeline<Store, Live, Historical>
where
    Store: TradeStore + 'static,
    Live: LiveFeed + 'static,
    Historical: HistoricalFeed + 'static,
{
    pub fn new(
        config: PipelineConfig,
        store: Arc<Store>,
        live: Arc<Live>,
        historical: Arc<Historical>,
    ) -> Self {
        Self {
            config,
            store,
            live,
            historical,
            readiness: Arc::new(Readiness::new()),
        }
    }

    /// Readiness signal of the market, observable while the pipeline runs.
    pub fn readiness(&self) -> Arc<Readiness> {
        Arc::clone(&self.readiness)
    }

    pub async fn run(
        self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<PipelineSummary, PipelineError> {
        let Self {
            config,
            store,
            live,
            historical,
            readiness,
        } = self;
        let market = config.market.clone();

        let interval = Interval::from_str(&config.interval)?;

        if config.clear_existing {
            let deleted = retry(&config.store_retry, "clear market", || {
                store.clear_market(&market)
            })
            .await?;
            info!(%market, deleted, "cleared existing market data");
        }

        let now_ms = Utc::now().timestamp_millis();
        let report = retry(&config.store_retry, "detect gap", || {
            detect_gap(store.as_ref(), &market, now_ms)
        })
        .await?;

        let plan = report.plan(
            now_ms,
            &interval,
            PlanOptions {
                continuation: config.continuation,
                seed_history: config.seed_history,
            },
        );
        if !plan.populate_missing {
            readiness.set_backfill(BackfillStatus::NotNeeded);
        }

        info!(
            %market,
            %interval,
            populate_missing = plan.populate_missing,
            strategy = ?plan.strategy,
            "pipeline starting"
        );

        // Units observe an internal stop signal so the pipeline can stop them on failure
        let (stop_tx, stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);
        let forwarder = tokio::spawn({
            let stop_tx = Arc::clone(&stop_tx);
            let mut shutdown = shutdown;
            async move {
                cancelled(&mut shutdown).await;
                info!("shutdown signalled");
                stop_tx.send_replace(true);
            }
        });

        let events = live.subscribe(&market);
        let ingestor = LiveIngestor::new(
            market.clone(),
            Arc::clone(&store),
            Arc::clone(&readiness),
            config.store_retry,
        );
        let ingest_handle = tokio::spawn(ingestor.run(events, stop_rx.clone()));

        let coordinator = BackfillCoordinator::new(Arc::clone(&store), historical, config.backfill);
        let backfill_handle = tokio::spawn({
            let market = market.clone();
            let stop_rx = stop_rx.clone();
            async move { coordinator.run(&market, &plan, stop_rx).await }
        });

        let backfill = match backfill_handle.await {
            Ok(Ok(summary)) => summary,
            Ok(Err(source)) => {
                readiness.set_backfill(BackfillStatus::Failed);
                stop_tx.send_replace(true);
                if let Err(error) = ingest_handle.await {
                    warn!(%market, %error, "live ingestion task failed during stop");
                }
                forwarder.abort();
                error!(%market, error = %source, "stopping pipeline after failed backfill");
                return Err(PipelineError::Backfill { market, source });
            }
            Err(join_error) => {
                readiness.set_backfill(BackfillStatus::Failed);
                stop_tx.send_replace(true);
                let _ = ingest_handle.await;
                forwarder.abort();
                return Err(task_error(&market, "backfill", join_error));
            }
        };

        let scheduler_handle = match backfill.outcome {
            BackfillOutcome::Interrupted => None,
            outcome => {
                readiness.set_backfill(if outcome == BackfillOutcome::NotNeeded {
                    BackfillStatus::NotNeeded
                } else {
                    BackfillStatus::Complete
                });

                let scheduler = AnalysisScheduler::new(
                    market.clone(),
                    interval,
                    config.loop_interval,
                    Arc::clone(&store),
                    config.store_retry,
                );
                Some(tokio::spawn(scheduler.run(stop_rx.clone())))
            }
        };

        // Ingestion ends on shutdown or when the live feed closes, either way stop the rest
        let ingest_result = ingest_handle.await;
        stop_tx.send_replace(true);
        forwarder.abort();

        let (ingest_exit, ingest) =
            ingest_result.map_err(|error| task_error(&market, "live ingestion", error))?;
        if ingest_exit == IngestExit::FeedClosed {
            warn!(%market, "live feed ended, stopping pipeline");
        }

        let scheduler = match scheduler_handle {
            Some(handle) => Some(
                handle
                    .await
                    .map_err(|error| task_error(&market, "analysis scheduler", error))?,
            ),
            None => None,
        };

        info!(
            %market,
            ?ingest_exit,
            backfill = %backfill.outcome,
            live_inserted = ingest.inserted,
            backfilled = backfill.inserted,
            "pipeline stopped"
        );

        Ok(PipelineSummary {
            market,
            plan,
            backfill,
            ingest_exit,
            ingest,
            scheduler,
        })
    }
}

fn task_error(market: &Market, task: &str, error: JoinError) -> PipelineError {
    PipelineError::Task {
        market: market.clone(),
        reason: format!("{task}: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backoff::RetryPolicy,
        config::BackfillConfig,
        error::{BackfillError, FeedError, IntervalError},
        exchange::ExchangeId,
        feed::{FeedEvent, HistoricalCursor, HistoricalPage},
        store::SqliteStore,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn market() -> Market {
        Market::new(ExchangeId::Binance, "XLMBTC")
    }

    /// Hands out a prepared receiver once, then closed receivers.
    struct ChannelFeed {
        events: Mutex<Option<mpsc::Receiver<FeedEvent>>>,
    }

    impl LiveFeed for ChannelFeed {
        fn subscribe(&self, _: &Market) -> mpsc::Receiver<FeedEvent> {
            self.events
                .lock()
                .take()
                .unwrap_or_else(|| mpsc::channel(1).1)
        }
    }

    /// Historical feed serving only malformed records.
    struct BrokenHistory;

    #[async_trait]
    impl HistoricalFeed for BrokenHistory {
        async fn fetch_page(
            &self,
            _: &Market,
            cursor: HistoricalCursor,
        ) -> Result<HistoricalPage, FeedError> {
            let records = (0..10).map(|_| json!({"a": 1})).collect();
            Ok(HistoricalPage::new(records, Some(cursor)))
        }
    }

    fn pipeline(
        config: PipelineConfig,
        store: Arc<SqliteStore>,
        events: mpsc::Receiver<FeedEvent>,
    ) -> Pipeline<SqliteStore, ChannelFeed, BrokenHistory> {
        Pipeline::new(
            config,
            store,
            Arc::new(ChannelFeed {
                events: Mutex::new(Some(events)),
            }),
            Arc::new(BrokenHistory),
        )
    }

    #[tokio::test]
    async fn test_invalid_interval_fails_fast() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (_event_tx, event_rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let result = pipeline(PipelineConfig::new(market(), "3 months"), store, event_rx)
            .run(shutdown_rx)
            .await;

        assert_eq!(
            result,
            Err(PipelineError::Interval(IntervalError::UnknownUnit {
                input: "3 months".to_string()
            }))
        );
    }

    #[tokio::test]
    async fn test_integrity_failure_stops_pipeline() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (_event_tx, event_rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let config = PipelineConfig::new(market(), "10m")
            .with_seed_history(true)
            .with_backfill(
                BackfillConfig::default()
                    .with_min_skip_sample(10)
                    .with_retry(RetryPolicy::no_retry()),
            );

        let pipeline = pipeline(config, store, event_rx);
        let readiness = pipeline.readiness();

        let result = pipeline.run(shutdown_rx).await;

        assert!(matches!(
            result,
            Err(PipelineError::Backfill {
                source: BackfillError::IntegrityExceeded { .. },
                ..
            })
        ));
        assert_eq!(readiness.state().backfill, BackfillStatus::Failed);
        assert!(!readiness.is_ready());
    }

    #[tokio::test]
    async fn test_cold_start_without_seed_stops_on_shutdown() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let (_event_tx, event_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let pipeline = pipeline(PipelineConfig::new(market(), "10m"), store, event_rx);
        let readiness = pipeline.readiness();
        let handle = tokio::spawn(pipeline.run(shutdown_rx));

        let mut ready_rx = readiness.subscribe();
        ready_rx
            .wait_for(|state| state.backfill == BackfillStatus::NotNeeded)
            .await
            .unwrap();
        shutdown_tx.send(true).unwrap();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.backfill.outcome, BackfillOutcome::NotNeeded);
        assert_eq!(summary.ingest_exit, IngestExit::Shutdown);
        assert!(summary.scheduler.is_some());
        assert!(!summary.plan.populate_missing);
    }
}
