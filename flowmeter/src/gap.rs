use crate::{
    analytics::Interval,
    error::StoreError,
    store::{BackfillCheckpoint, TradeStore},
    trade::{Market, Trade},
};
use std::{fmt, time::Duration};
use tracing::info;

/// Extra history seeded before the two analysis windows by a rolling window backfill.
pub const ROLLING_WINDOW_MARGIN: Duration = Duration::from_secs(60 * 60);

/// Gaps shorter than this need no backfill.
pub const NEGLIGIBLE_GAP: Duration = Duration::from_secs(1);

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;
const SECS_PER_WEEK: u64 = 7 * SECS_PER_DAY;
const SECS_PER_MONTH: u64 = 30 * SECS_PER_DAY;
const SECS_PER_YEAR: u64 = 365 * SECS_PER_DAY;

/// Greedy calendar-ish decomposition of a [`Duration`], for presentation only.
///
/// Years are 365 days and months are 30 days.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct DurationBreakdown {
    pub years: u64,
    pub months: u64,
    pub weeks: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
}

impl DurationBreakdown {
    pub fn from_secs(mut secs: u64) -> Self {
        let mut take = |unit: u64| {
            let amount = secs / unit;
            secs %= unit;
            amount
        };

        let years = take(SECS_PER_YEAR);
        let months = take(SECS_PER_MONTH);
        let weeks = take(SECS_PER_WEEK);
        let days = take(SECS_PER_DAY);
        let hours = take(SECS_PER_HOUR);
        let minutes = take(SECS_PER_MINUTE);

        Self {
            years,
            months,
            weeks,
            days,
            hours,
            minutes,
            seconds: secs,
        }
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self::from_secs(duration.as_secs())
    }
}

impl fmt::Display for DurationBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            (self.years, "year"),
            (self.months, "month"),
            (self.weeks, "week"),
            (self.days, "day"),
            (self.hours, "hour"),
            (self.minutes, "minute"),
            (self.seconds, "second"),
        ]
        .into_iter()
        .filter(|(amount, _)| *amount > 0)
        .map(|(amount, unit)| {
            if amount == 1 {
                format!("{amount} {unit}")
            } else {
                format!("{amount} {unit}s")
            }
        })
        .collect::<Vec<_>>();

        match parts.as_slice() {
            [] => f.write_str("0 seconds"),
            [only] => f.write_str(only),
            [init @ .., last] => write!(f, "{} and {}", init.join(", "), last),
        }
    }
}

/// How the [`BackfillCoordinator`](crate::backfill::BackfillCoordinator) enumerates
/// history.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BackfillStrategy {
    /// Strictly after a known trade id.
    Continuation { after_id: u64 },
    /// From a start time, used when continuation is unavailable or declined.
    RollingWindow { since_ms: i64 },
}

/// Operator choices that shape a backfill plan.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct PlanOptions {
    /// Prefer [`BackfillStrategy::Continuation`] when a last trade id is known.
    pub continuation: bool,
    /// Seed a rolling window of history on a cold start.
    pub seed_history: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            continuation: true,
            seed_history: false,
        }
    }
}

/// Transient startup decision handed from gap detection to the backfill run.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct BackfillState {
    /// Highest trade id already stored for the market.
    pub last_trade_id_seen: Option<u64>,
    /// Time elapsed since the most recent stored trade.
    pub missing_duration: Option<Duration>,
    pub populate_missing: bool,
    /// `Some` exactly when `populate_missing` is set.
    pub strategy: Option<BackfillStrategy>,
}

impl BackfillState {
    pub fn not_needed(last_trade_id_seen: Option<u64>, missing_duration: Option<Duration>) -> Self {
        Self {
            last_trade_id_seen,
            missing_duration,
            populate_missing: false,
            strategy: None,
        }
    }

    fn populate(
        last_trade_id_seen: Option<u64>,
        missing_duration: Option<Duration>,
        strategy: BackfillStrategy,
    ) -> Self {
        Self {
            last_trade_id_seen,
            missing_duration,
            populate_missing: true,
            strategy: Some(strategy),
        }
    }
}

/// Result of startup gap detection for one [`Market`].
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct GapReport {
    pub market: Market,
    /// Most recent stored trade, `None` on a cold start.
    pub last_trade: Option<Trade>,
    /// Progress marker of an interrupted backfill run.
    pub checkpoint: Option<BackfillCheckpoint>,
    /// `now - last_trade.trade_time`, clamped at zero.
    pub missing: Option<Duration>,
}

impl GapReport {
    /// Build a [`GapReport`] from the store's current state.
    pub fn new(
        market: Market,
        last_trade: Option<Trade>,
        checkpoint: Option<BackfillCheckpoint>,
        now_ms: i64,
    ) -> Self {
        let missing = last_trade.as_ref().map(|trade| {
            let elapsed = now_ms.saturating_sub(trade.trade_time).max(0);
            Duration::from_millis(u64::try_from(elapsed).unwrap_or_default())
        });

        Self {
            market,
            last_trade,
            checkpoint,
            missing,
        }
    }

    pub fn is_cold_start(&self) -> bool {
        self.last_trade.is_none()
    }

    /// Human readable gap summary, eg/ "1 day and 1 hour".
    pub fn summary(&self) -> String {
        match self.missing {
            None => "no prior data, cold start".to_string(),
            Some(missing) => DurationBreakdown::from_duration(missing).to_string(),
        }
    }

    /// Decide whether and how to backfill.
    ///
    /// An interrupted run's checkpoint is resumed first. A cold start only backfills when
    /// `seed_history` is set. A negligible gap needs no backfill. Otherwise continuation
    /// from the last stored id is preferred unless declined, with a rolling window of
    /// `now - 2 * window - ROLLING_WINDOW_MARGIN` as the fallback.
    pub fn plan(&self, now_ms: i64, window: &Interval, options: PlanOptions) -> BackfillState {
        let last_trade_id_seen = self.last_trade.as_ref().map(|trade| trade.id);
        let rolling = BackfillStrategy::RollingWindow {
            since_ms: rolling_window_start(now_ms, window),
        };

        if options.continuation {
            if let Some(checkpoint) = &self.checkpoint {
                return BackfillState::populate(
                    last_trade_id_seen,
                    self.missing,
                    BackfillStrategy::Continuation {
                        after_id: checkpoint.last_id,
                    },
                );
            }
        }

        let (Some(last_trade_id), Some(missing)) = (last_trade_id_seen, self.missing) else {
            return if options.seed_history {
                BackfillState::populate(None, None, rolling)
            } else {
                BackfillState::not_needed(None, None)
            };
        };

        if missing < NEGLIGIBLE_GAP {
            return BackfillState::not_needed(Some(last_trade_id), Some(missing));
        }

        let strategy = if options.continuation {
            BackfillStrategy::Continuation {
                after_id: last_trade_id,
            }
        } else {
            rolling
        };

        BackfillState::populate(Some(last_trade_id), Some(missing), strategy)
    }
}

/// Start of a rolling window backfill: `now - 2 * window - ROLLING_WINDOW_MARGIN`.
pub fn rolling_window_start(now_ms: i64, window: &Interval) -> i64 {
    let margin_ms = i64::try_from(ROLLING_WINDOW_MARGIN.as_millis()).unwrap_or(i64::MAX);
    now_ms
        .saturating_sub(window.as_millis().saturating_mul(2))
        .saturating_sub(margin_ms)
}

/// Inspect the store and report the gap left by downtime for `market`.
pub async fn detect_gap<Store>(
    store: &Store,
    market: &Market,
    now_ms: i64,
) -> Result<GapReport, StoreError>
where
    Store: TradeStore + ?Sized,
{
    let last_trade = store.most_recent(market).await?;
    let checkpoint = store.load_checkpoint(market).await?;

    let report = GapReport::new(market.clone(), last_trade, checkpoint, now_ms);

    info!(
        %market,
        last_trade_id = ?report.last_trade.as_ref().map(|trade| trade.id),
        checkpoint_id = ?report.checkpoint.as_ref().map(|checkpoint| checkpoint.last_id),
        missing = %report.summary(),
        "detected gap since last stored trade"
    );

    Ok(report)
}
