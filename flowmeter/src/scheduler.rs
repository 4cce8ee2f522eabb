use crate::{
    analytics::{AnalysisSnapshot, AnalyticsEngine, Interval},
    backfill::cancelled,
    backoff::{RetryPolicy, retry},
    error::AnalyticsError,
    store::TradeStore,
    trade::Market,
};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{error, info};

/// Counters of one [`AnalysisScheduler`] run.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub persisted: u64,
    pub failed: u64,
}

/// Runs the [`AnalyticsEngine`] every loop interval and persists each
/// [`AnalysisSnapshot`].
///
/// Ticks run inline, so at most one computation per market is ever in flight. A tick
/// still running when the next one is due causes that next tick to be skipped.
#[derive(Debug)]
pub struct AnalysisScheduler<Store> {
    market: Market,
    interval: Interval,
    loop_interval: Duration,
    engine: AnalyticsEngine<Store>,
    store: Arc<Store>,
    retry: RetryPolicy,
}

impl<Store> AnalysisScheduler<Store>
where
    Store: TradeStore,
{
    pub fn new(
        market: Market,
        interval: Interval,
        loop_interval: Duration,
        store: Arc<Store>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            market,
            interval,
            loop_interval,
            engine: AnalyticsEngine::new(Arc::clone(&store)),
            store,
            retry,
        }
    }

    /// Tick every loop interval until `shutdown` is signalled, starting one loop interval
    /// from now. A tick in progress at shutdown is abandoned.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        let mut ticker = interval_at(Instant::now() + self.loop_interval, self.loop_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            market = %self.market,
            interval = %self.interval,
            loop_interval = ?self.loop_interval,
            "analysis scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            stats.ticks += 1;

            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break,
                result = self.tick(Utc::now()) => match result {
                    Ok(_) => stats.persisted += 1,
                    Err(error) => {
                        stats.failed += 1;
                        error!(market = %self.market, %error, "analysis tick failed");
                    }
                },
            }
        }

        info!(
            market = %self.market,
            ticks = stats.ticks,
            persisted = stats.persisted,
            failed = stats.failed,
            "analysis scheduler stopped"
        );

        stats
    }

    /// Compute and persist the [`AnalysisSnapshot`] as of `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<AnalysisSnapshot, AnalyticsError> {
        let snapshot = self.engine.analyze(&self.market, &self.interval, now).await?;

        retry(&self.retry, "persist snapshot", || {
            self.store.insert_snapshot(&snapshot)
        })
        .await?;

        info!(
            market = %self.market,
            interval = %self.interval,
            volume = ?snapshot.current.volume.all,
            count = ?snapshot.current.count.all,
            flow_differential = ?snapshot.flow_differential,
            bias = ?snapshot.flow_bias(),
            "analysis snapshot"
        );

        Ok(snapshot)
    }
}
