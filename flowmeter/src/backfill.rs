use crate::{
    backoff::retry,
    config::BackfillConfig,
    error::BackfillError,
    feed::{HistoricalCursor, HistoricalFeed},
    gap::{BackfillState, BackfillStrategy},
    normalizer::normalize_historical,
    store::{BackfillCheckpoint, TradeStore},
    trade::{InsertOutcome, Market},
};
use chrono::Utc;
use derive_more::Display;
use fnv::FnvHashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// How a backfill run ended.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum BackfillOutcome {
    /// The [`BackfillState`] required no backfill.
    #[display("not_needed")]
    NotNeeded,
    /// Replay reached a trade that was already stored by live ingestion.
    #[display("caught_up")]
    CaughtUp,
    /// The historical feed has no further records.
    #[display("exhausted")]
    Exhausted,
    /// Shutdown was signalled, progress was checkpointed.
    #[display("interrupted")]
    Interrupted,
}

impl BackfillOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, BackfillOutcome::CaughtUp | BackfillOutcome::Exhausted)
    }
}

/// Counters of one backfill run.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct BackfillSummary {
    pub outcome: BackfillOutcome,
    /// Historical records received.
    pub seen: u64,
    pub inserted: u64,
    /// Duplicates at or below the last id known before the run, passed over.
    pub already_present: u64,
    /// Malformed records, by [`NormalizeError::reason`](crate::error::NormalizeError::reason).
    pub skipped: FnvHashMap<&'static str, u64>,
    /// Id of the last historical trade processed.
    pub last_id: Option<u64>,
}

impl BackfillSummary {
    fn new(outcome: BackfillOutcome) -> Self {
        Self {
            outcome,
            seen: 0,
            inserted: 0,
            already_present: 0,
            skipped: FnvHashMap::default(),
            last_id: None,
        }
    }

    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }

    /// Ratio of malformed to seen records.
    pub fn skip_rate(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.skipped_total() as f64 / self.seen as f64
        }
    }
}

/// Streaming estimate of how many records a run will replay.
///
/// No count query is issued up front: once `calibration_records` trades have been seen,
/// the observed trade rate is extrapolated over the remaining trade time up to the moment
/// the run started.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct BackfillProgress {
    target_ms: i64,
    calibration_records: u64,
    processed: u64,
    first_time_ms: Option<i64>,
    last_time_ms: Option<i64>,
}

impl BackfillProgress {
    pub fn new(target_ms: i64, calibration_records: u64) -> Self {
        Self {
            target_ms,
            calibration_records,
            processed: 0,
            first_time_ms: None,
            last_time_ms: None,
        }
    }

    pub fn record(&mut self, trade_time: i64) {
        self.processed += 1;
        self.first_time_ms.get_or_insert(trade_time);
        self.last_time_ms = Some(trade_time);
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Estimated total records, `None` until the calibration window has been observed.
    pub fn estimated_total(&self) -> Option<u64> {
        if self.processed < self.calibration_records.max(1) {
            return None;
        }

        let first = self.first_time_ms?;
        let elapsed = self.last_time_ms? - first;
        if elapsed <= 0 {
            return None;
        }

        let span = (self.target_ms - first).max(elapsed);
        let estimate = self.processed as f64 * span as f64 / elapsed as f64;
        Some((estimate.ceil() as u64).max(self.processed))
    }

    /// Percentage complete in `[0, 100]`, `None` until an estimate exists.
    pub fn percent(&self) -> Option<f64> {
        self.estimated_total()
            .map(|total| (self.processed as f64 / total as f64 * 100.0).min(100.0))
    }
}

/// Replays historical trades into the [`TradeStore`] from the point chosen by gap
/// detection.
///
/// Replay stops at the first duplicate newer than the last id known before the run:
/// that is where live ingestion has already taken over.
#[derive(Debug)]
pub struct BackfillCoordinator<Store, Feed> {
    store: Arc<Store>,
    feed: Arc<Feed>,
    config: BackfillConfig,
}

impl<Store, Feed> BackfillCoordinator<Store, Feed>
where
    Store: TradeStore,
    Feed: HistoricalFeed,
{
    pub fn new(store: Arc<Store>, feed: Arc<Feed>, config: BackfillConfig) -> Self {
        Self {
            store,
            feed,
            config,
        }
    }

    /// Run the backfill described by `state` until it catches up, the feed is exhausted,
    /// or `shutdown` is signalled.
    ///
    /// A duplicate with an id at or below `state.last_trade_id_seen` was stored before
    /// the run began, so it is counted as already present and replay continues. The
    /// first duplicate above that id was written by live ingestion and ends the run with
    /// [`BackfillOutcome::CaughtUp`]. Without a known head every duplicate ends the run.
    pub async fn run(
        &self,
        market: &Market,
        state: &BackfillState,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<BackfillSummary, BackfillError> {
        let Some(strategy) = state.strategy else {
            return Ok(BackfillSummary::new(BackfillOutcome::NotNeeded));
        };

        let cursor = match strategy {
            BackfillStrategy::Continuation { after_id } => HistoricalCursor::AfterId(after_id),
            BackfillStrategy::RollingWindow { since_ms } => HistoricalCursor::Since(since_ms),
        };

        info!(
            %market,
            ?strategy,
            last_trade_id_seen = ?state.last_trade_id_seen,
            "starting backfill"
        );

        let mut summary = BackfillSummary::new(BackfillOutcome::Exhausted);
        let result = self
            .replay(
                market,
                cursor,
                state.last_trade_id_seen,
                &mut summary,
                &mut shutdown,
            )
            .await;

        match result {
            Ok(outcome) if outcome.is_complete() => {
                retry(&self.config.retry, "clear checkpoint", || {
                    self.store.clear_checkpoint(market)
                })
                .await?;

                summary.outcome = outcome;
                info!(
                    %market,
                    %outcome,
                    inserted = summary.inserted,
                    already_present = summary.already_present,
                    skipped = summary.skipped_total(),
                    "backfill complete"
                );
                Ok(summary)
            }
            Ok(outcome) => {
                self.save_checkpoint(market, summary.last_id).await?;

                summary.outcome = outcome;
                info!(
                    %market,
                    inserted = summary.inserted,
                    last_id = ?summary.last_id,
                    "backfill interrupted, progress checkpointed"
                );
                Ok(summary)
            }
            Err(error) => {
                if let Err(checkpoint_error) = self.save_checkpoint(market, summary.last_id).await
                {
                    warn!(%market, %checkpoint_error, "failed to checkpoint failed backfill");
                }
                error!(%market, %error, inserted = summary.inserted, "backfill failed");
                Err(error)
            }
        }
    }

    async fn replay(
        &self,
        market: &Market,
        mut cursor: HistoricalCursor,
        known_head: Option<u64>,
        summary: &mut BackfillSummary,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<BackfillOutcome, BackfillError> {
        let mut progress =
            BackfillProgress::new(Utc::now().timestamp_millis(), self.config.calibration_records);

        loop {
            if *shutdown.borrow() {
                return Ok(BackfillOutcome::Interrupted);
            }

            let page = tokio::select! {
                biased;
                _ = cancelled(shutdown) => return Ok(BackfillOutcome::Interrupted),
                page = retry(&self.config.retry, "fetch historical page", || {
                    self.feed.fetch_page(market, cursor)
                }) => page?,
            };

            if page.is_empty() {
                return Ok(BackfillOutcome::Exhausted);
            }

            for record in &page.records {
                summary.seen += 1;

                let trade = match normalize_historical(record, market) {
                    Ok(trade) => trade,
                    Err(error) => {
                        warn!(%market, %error, "skipping malformed historical record");
                        *summary.skipped.entry(error.reason()).or_default() += 1;
                        self.check_integrity(summary)?;
                        continue;
                    }
                };

                progress.record(trade.trade_time);

                let outcome = retry(&self.config.retry, "backfill insert", || {
                    self.store.insert_if_absent(&trade)
                })
                .await?;

                summary.last_id = Some(trade.id);

                match outcome {
                    InsertOutcome::Inserted => {
                        summary.inserted += 1;
                        debug!(%market, id = trade.id, time = trade.trade_time, "backfilled trade");
                    }
                    InsertOutcome::Duplicate if known_head.is_some_and(|head| trade.id <= head) => {
                        summary.already_present += 1;
                    }
                    InsertOutcome::Duplicate => {
                        debug!(%market, id = trade.id, "reached stored trade, backfill caught up");
                        return Ok(BackfillOutcome::CaughtUp);
                    }
                }
            }

            self.save_checkpoint(market, summary.last_id).await?;

            info!(
                %market,
                processed = progress.processed(),
                estimated_total = ?progress.estimated_total(),
                percent = ?progress.percent().map(|percent| (percent * 100.0).round() / 100.0),
                inserted = summary.inserted,
                "backfill progress"
            );

            match page.next {
                Some(next) => cursor = next,
                None => return Ok(BackfillOutcome::Exhausted),
            }
        }
    }

    fn check_integrity(&self, summary: &BackfillSummary) -> Result<(), BackfillError> {
        if summary.seen < self.config.min_skip_sample
            || summary.skip_rate() <= self.config.max_skip_rate
        {
            return Ok(());
        }

        Err(BackfillError::IntegrityExceeded {
            skipped: summary.skipped_total(),
            seen: summary.seen,
            max_skip_rate: self.config.max_skip_rate,
        })
    }

    async fn save_checkpoint(
        &self,
        market: &Market,
        last_id: Option<u64>,
    ) -> Result<(), BackfillError> {
        let Some(last_id) = last_id else {
            return Ok(());
        };

        let checkpoint = BackfillCheckpoint::new(market.clone(), last_id, Utc::now());
        retry(&self.config.retry, "save checkpoint", || {
            self.store.save_checkpoint(&checkpoint)
        })
        .await?;

        Ok(())
    }
}

/// Resolves once shutdown is signalled, never if the signal sender is dropped first.
pub(crate) async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
