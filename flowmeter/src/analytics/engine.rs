use crate::{
    analytics::{
        interval::Interval,
        snapshot::{
            AnalysisSnapshot, Delta, Metrics, PRICE_DP, SideValues, flow_differential,
        },
    },
    error::AnalyticsError,
    store::{Aggregate, SideFilter, TimeRange, TradeStore},
    trade::Market,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

/// Computes paired current / last window [`AnalysisSnapshot`]s from the [`TradeStore`].
///
/// Stateless apart from the store handle. A store failure aborts the computation with
/// [`AnalyticsError::Unavailable`] and is not retried here.
#[derive(Debug)]
pub struct AnalyticsEngine<Store> {
    store: Arc<Store>,
}

impl<Store> Clone for AnalyticsEngine<Store> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<Store> AnalyticsEngine<Store>
where
    Store: TradeStore,
{
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn analyze(
        &self,
        market: &Market,
        interval: &Interval,
        now: DateTime<Utc>,
    ) -> Result<AnalysisSnapshot, AnalyticsError> {
        let windows = interval.windows(now.timestamp_millis());

        let current = self.aggregate_sides(market, windows.current).await?;
        let last = self.aggregate_sides(market, windows.last).await?;

        let seconds = Decimal::from(interval.as_secs());
        let current_metrics = WindowMetrics::from_aggregates(&current, seconds);
        let last_metrics = WindowMetrics::from_aggregates(&last, seconds);

        let available =
            SideValues::from_fn(|side| !current.get(side).is_empty() || !last.get(side).is_empty());

        // Both sides share the window length, so the volume ratio is the volume rate ratio
        let flow_differential = flow_differential(current.buy.volume, current.sell.volume);

        debug!(
            %market,
            %interval,
            current_count = current.all.count,
            last_count = last.all.count,
            ?flow_differential,
            "computed analysis windows"
        );

        Ok(AnalysisSnapshot {
            exchange: market.exchange,
            market: market.symbol.clone(),
            interval: interval.label().to_string(),
            time: now,
            current: current_metrics.values(&available),
            last: last_metrics.values(&available),
            difference: current_metrics.deltas(&last_metrics, &available),
            flow_differential,
        })
    }

    async fn aggregate_sides(
        &self,
        market: &Market,
        range: TimeRange,
    ) -> Result<SideValues<Aggregate>, AnalyticsError> {
        Ok(self.store.range_by_time_sides(market, range).await?)
    }
}

/// Rounded metrics of one side in one window.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
struct SideMetrics {
    volume: Decimal,
    price: Decimal,
    amount: Decimal,
    count: Decimal,
    rate_volume: Decimal,
    rate_amount: Decimal,
    rate_count: Decimal,
}

impl SideMetrics {
    fn from_aggregate(aggregate: &Aggregate, seconds: Decimal) -> Self {
        let count = Decimal::from(aggregate.count);
        let rate = |value: Decimal| {
            value
                .checked_div(seconds)
                .map(|rate| rate.round_dp(PRICE_DP))
                .unwrap_or_default()
        };

        Self {
            volume: aggregate.volume,
            price: aggregate.price.round_dp(PRICE_DP),
            amount: aggregate.amount.round_dp(PRICE_DP),
            count,
            rate_volume: rate(aggregate.volume),
            rate_amount: rate(aggregate.amount),
            rate_count: rate(count),
        }
    }

    fn fields(&self) -> [Decimal; 7] {
        [
            self.volume,
            self.price,
            self.amount,
            self.count,
            self.rate_volume,
            self.rate_amount,
            self.rate_count,
        ]
    }
}

struct WindowMetrics(SideValues<SideMetrics>);

impl WindowMetrics {
    fn from_aggregates(aggregates: &SideValues<Aggregate>, seconds: Decimal) -> Self {
        Self(SideValues::from_fn(|side| {
            SideMetrics::from_aggregate(aggregates.get(side), seconds)
        }))
    }

    fn get(&self, side: SideFilter) -> &SideMetrics {
        self.0.get(side)
    }

    fn values(&self, available: &SideValues<bool>) -> Metrics<Option<Decimal>> {
        self.collect(available, |metrics, _| metrics.fields().map(Some))
    }

    fn deltas(&self, last: &Self, available: &SideValues<bool>) -> Metrics<Option<Delta>> {
        self.collect(available, |current, side| {
            let current = current.fields();
            let last = last.get(side).fields();
            std::array::from_fn(|index| Some(Delta::between(current[index], last[index])))
        })
    }

    /// Transpose per side metric arrays into a [`Metrics`], with `None` for unavailable
    /// sides.
    fn collect<T, F>(&self, available: &SideValues<bool>, mut f: F) -> Metrics<Option<T>>
    where
        T: Copy,
        F: FnMut(&SideMetrics, SideFilter) -> [Option<T>; 7],
    {
        let per_side = SideValues::from_fn(|side| {
            if *available.get(side) {
                f(self.get(side), side)
            } else {
                [None; 7]
            }
        });

        let field = |index: usize| SideValues {
            all: per_side.all[index],
            buy: per_side.buy[index],
            sell: per_side.sell[index],
        };

        Metrics {
            volume: field(0),
            price: field(1),
            amount: field(2),
            count: field(3),
            rate_volume: field(4),
            rate_amount: field(5),
            rate_count: field(6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analytics::snapshot::FlowBias,
        error::StoreError,
        exchange::ExchangeId,
        store::{BackfillCheckpoint, SnapshotFilter, SqliteStore},
        trade::{InsertOutcome, Origin, Side, Trade},
    };
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn market() -> Market {
        Market::new(ExchangeId::Binance, "XLMBTC")
    }

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    async fn store_with(trades: &[(u64, Side, Decimal, Decimal, i64)]) -> Arc<SqliteStore> {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, side, price, quantity, time) in trades {
            store
                .insert_if_absent(&Trade::new(
                    *id,
                    market(),
                    *price,
                    *quantity,
                    *side,
                    *time,
                    Origin::Live,
                ))
                .await
                .unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_analyze_two_trades() {
        let store = store_with(&[
            (1, Side::Buy, dec!(1.0), dec!(10), 0),
            (2, Side::Sell, dec!(1.2), dec!(5), 500_000),
        ])
        .await;
        let engine = AnalyticsEngine::new(store);
        let interval = Interval::from_str("10m").unwrap();

        let snapshot = engine
            .analyze(&market(), &interval, at(600_000))
            .await
            .unwrap();

        assert_eq!(snapshot.interval, "10m");
        assert_eq!(snapshot.market(), market());
        assert_eq!(
            snapshot.current.volume,
            SideValues::new(Some(dec!(15)), Some(dec!(10)), Some(dec!(5)))
        );
        assert_eq!(
            snapshot.current.count,
            SideValues::new(Some(dec!(2)), Some(dec!(1)), Some(dec!(1)))
        );
        assert_eq!(
            snapshot.current.price,
            SideValues::new(Some(dec!(1.1)), Some(dec!(1.0)), Some(dec!(1.2)))
        );
        assert_eq!(snapshot.current.amount.all, Some(dec!(8)));
        assert_eq!(snapshot.current.rate_volume.all, Some(dec!(0.025)));
        assert_eq!(snapshot.current.rate_count.buy, Some(dec!(0.00166667)));

        // Empty last window: deltas equal current, percent not computable
        assert_eq!(snapshot.last.volume.all, Some(dec!(0)));
        assert_eq!(
            snapshot.difference.volume.all,
            Some(Delta::new(dec!(15), None))
        );

        // 10 / (10 + 5) * 100
        assert_eq!(snapshot.flow_differential, Some(dec!(66.6667)));
        assert_eq!(snapshot.flow_bias(), Some(FlowBias::BuyDominant));
    }

    #[tokio::test]
    async fn test_analyze_window_deltas() {
        // last window [0, 60s), current window [60s, 120s)
        let store = store_with(&[
            (1, Side::Buy, dec!(2), dec!(4), 10_000),
            (2, Side::Sell, dec!(2), dec!(4), 20_000),
            (3, Side::Buy, dec!(3), dec!(6), 70_000),
            (4, Side::Sell, dec!(1), dec!(2), 119_999),
            (5, Side::Sell, dec!(1), dec!(100), 120_000),
        ])
        .await;
        let engine = AnalyticsEngine::new(store);
        let interval = Interval::from_str("1m").unwrap();

        let snapshot = engine
            .analyze(&market(), &interval, at(120_000))
            .await
            .unwrap();

        assert_eq!(
            snapshot.current.volume,
            SideValues::new(Some(dec!(8)), Some(dec!(6)), Some(dec!(2)))
        );
        assert_eq!(
            snapshot.last.volume,
            SideValues::new(Some(dec!(8)), Some(dec!(4)), Some(dec!(4)))
        );
        assert_eq!(
            snapshot.difference.volume,
            SideValues::new(
                Some(Delta::new(dec!(0), Some(dec!(0)))),
                Some(Delta::new(dec!(2), Some(dec!(0.5)))),
                Some(Delta::new(dec!(-2), Some(dec!(-0.5)))),
            )
        );
        assert_eq!(
            snapshot.difference.price.buy,
            Some(Delta::new(dec!(1), Some(dec!(0.5))))
        );
        assert_eq!(snapshot.flow_differential, Some(dec!(75)));
    }

    #[tokio::test]
    async fn test_analyze_empty_side_is_unavailable() {
        let store = store_with(&[(1, Side::Buy, dec!(1), dec!(1), 30_000)]).await;
        let engine = AnalyticsEngine::new(store);
        let interval = Interval::from_str("1m").unwrap();

        let snapshot = engine
            .analyze(&market(), &interval, at(60_000))
            .await
            .unwrap();

        assert!(snapshot.is_available(SideFilter::All));
        assert!(snapshot.is_available(SideFilter::Buy));
        assert!(!snapshot.is_available(SideFilter::Sell));
        assert_eq!(snapshot.current.volume.sell, None);
        assert_eq!(snapshot.difference.rate_volume.sell, None);
        assert_eq!(snapshot.flow_differential, Some(dec!(100)));
    }

    #[tokio::test]
    async fn test_analyze_no_trades() {
        let engine = AnalyticsEngine::new(store_with(&[]).await);
        let interval = Interval::from_str("1h").unwrap();

        let snapshot = engine
            .analyze(&market(), &interval, at(7_200_000))
            .await
            .unwrap();

        assert_eq!(snapshot.current, Metrics::default());
        assert_eq!(snapshot.difference, Metrics::default());
        assert_eq!(snapshot.flow_differential, None);
    }

    struct UnavailableStore;

    #[async_trait]
    impl TradeStore for UnavailableStore {
        async fn insert_if_absent(&self, _: &Trade) -> Result<InsertOutcome, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn most_recent(&self, _: &Market) -> Result<Option<Trade>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn range_by_time(
            &self,
            _: &Market,
            _: SideFilter,
            _: TimeRange,
        ) -> Result<Aggregate, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn clear_market(&self, _: &Market) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn insert_snapshot(&self, _: &AnalysisSnapshot) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn snapshots(
            &self,
            _: &SnapshotFilter,
            _: usize,
        ) -> Result<Vec<AnalysisSnapshot>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn save_checkpoint(&self, _: &BackfillCheckpoint) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn load_checkpoint(
            &self,
            _: &Market,
        ) -> Result<Option<BackfillCheckpoint>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn clear_checkpoint(&self, _: &Market) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_analyze_store_unavailable() {
        let engine = AnalyticsEngine::new(Arc::new(UnavailableStore));
        let interval = Interval::from_str("1m").unwrap();

        let actual = engine.analyze(&market(), &interval, at(60_000)).await;

        assert_eq!(
            actual,
            Err(AnalyticsError::Unavailable(StoreError::Unavailable(
                "down".to_string()
            )))
        );
    }
}
