use crate::{
    analytics::snapshot::{AnalysisSnapshot, SideValues},
    error::StoreError,
    exchange::ExchangeId,
    trade::{InsertOutcome, Market, Side, Trade},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// SQLite [`TradeStore`] implementation.
pub mod sqlite;

pub use sqlite::SqliteStore;

/// Durable, idempotent persistence of [`Trade`]s, [`AnalysisSnapshot`]s and
/// [`BackfillCheckpoint`]s.
///
/// Uniqueness of a [`Trade`] is its `id` scoped to its [`Market`], which makes concurrent
/// inserts of the same trade from the live and backfill paths race free.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Insert the [`Trade`] unless a trade with the same id already exists for its market.
    async fn insert_if_absent(&self, trade: &Trade) -> Result<InsertOutcome, StoreError>;

    /// Stored [`Trade`] with the highest id for the market.
    async fn most_recent(&self, market: &Market) -> Result<Option<Trade>, StoreError>;

    /// Summarise the trades of one side in the half-open `[start, end)` time range.
    ///
    /// An empty match yields [`Aggregate::default`].
    async fn range_by_time(
        &self,
        market: &Market,
        side: SideFilter,
        range: TimeRange,
    ) -> Result<Aggregate, StoreError>;

    /// Summarise the trades in the half-open `[start, end)` time range for every
    /// [`SideFilter`] at once.
    async fn range_by_time_sides(
        &self,
        market: &Market,
        range: TimeRange,
    ) -> Result<SideValues<Aggregate>, StoreError> {
        Ok(SideValues {
            all: self.range_by_time(market, SideFilter::All, range).await?,
            buy: self.range_by_time(market, SideFilter::Buy, range).await?,
            sell: self.range_by_time(market, SideFilter::Sell, range).await?,
        })
    }

    /// Delete every stored trade & checkpoint of the market, returning the number of
    /// trades deleted.
    async fn clear_market(&self, market: &Market) -> Result<u64, StoreError>;

    /// Append an immutable [`AnalysisSnapshot`].
    async fn insert_snapshot(&self, snapshot: &AnalysisSnapshot) -> Result<(), StoreError>;

    /// Stored [`AnalysisSnapshot`]s matching the filter, most recent first.
    async fn snapshots(
        &self,
        filter: &SnapshotFilter,
        limit: usize,
    ) -> Result<Vec<AnalysisSnapshot>, StoreError>;

    async fn save_checkpoint(&self, checkpoint: &BackfillCheckpoint) -> Result<(), StoreError>;

    async fn load_checkpoint(
        &self,
        market: &Market,
    ) -> Result<Option<BackfillCheckpoint>, StoreError>;

    async fn clear_checkpoint(&self, market: &Market) -> Result<(), StoreError>;
}

/// Side selection of a [`TradeStore::range_by_time`] query.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SideFilter {
    #[display("all")]
    All,
    #[display("buy")]
    Buy,
    #[display("sell")]
    Sell,
}

impl SideFilter {
    /// [`Side`] matched by this filter, `None` matches both.
    pub fn side(&self) -> Option<Side> {
        match self {
            SideFilter::All => None,
            SideFilter::Buy => Some(Side::Buy),
            SideFilter::Sell => Some(Side::Sell),
        }
    }
}

/// Half-open `[start, end)` range of milliseconds since epoch.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Constructor, Deserialize, Serialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

/// Summary of the trades matched by a [`TradeStore::range_by_time`] query.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
pub struct Aggregate {
    /// Sum of quantities.
    pub volume: Decimal,
    /// Mean price.
    pub price: Decimal,
    /// Mean notional (`price * quantity`).
    pub amount: Decimal,
    pub count: u64,
}

impl Aggregate {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Running sums an [`Aggregate`] is derived from.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub(crate) struct AggregateSums {
    volume: Decimal,
    price_sum: Decimal,
    amount_sum: Decimal,
    count: u64,
}

impl AggregateSums {
    pub(crate) fn push(self, price: Decimal, quantity: Decimal) -> Result<Self, StoreError> {
        let amount = price.checked_mul(quantity).ok_or_else(overflow)?;
        self.merge(Self {
            volume: quantity,
            price_sum: price,
            amount_sum: amount,
            count: 1,
        })
    }

    pub(crate) fn merge(self, other: Self) -> Result<Self, StoreError> {
        Ok(Self {
            volume: self.volume.checked_add(other.volume).ok_or_else(overflow)?,
            price_sum: self.price_sum.checked_add(other.price_sum).ok_or_else(overflow)?,
            amount_sum: self.amount_sum.checked_add(other.amount_sum).ok_or_else(overflow)?,
            count: self.count + other.count,
        })
    }

    /// Means over the summed trades. No trades yields all zeros.
    pub(crate) fn finish(self) -> Result<Aggregate, StoreError> {
        if self.count == 0 {
            return Ok(Aggregate::default());
        }

        let divisor = Decimal::from(self.count);
        Ok(Aggregate {
            volume: self.volume,
            price: self.price_sum.checked_div(divisor).ok_or_else(overflow)?,
            amount: self.amount_sum.checked_div(divisor).ok_or_else(overflow)?,
            count: self.count,
        })
    }
}

fn overflow() -> StoreError {
    StoreError::Corrupt("aggregate overflows decimal range".to_string())
}

/// Selection of a [`TradeStore::snapshots`] query. `None` fields match everything.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct SnapshotFilter {
    pub exchange: Option<ExchangeId>,
    pub symbol: Option<SmolStr>,
    pub interval: Option<String>,
}

impl SnapshotFilter {
    pub fn market(market: &Market) -> Self {
        Self {
            exchange: Some(market.exchange),
            symbol: Some(market.symbol.clone()),
            interval: None,
        }
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }
}

/// Persisted progress of an interrupted backfill run.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Constructor, Deserialize, Serialize)]
pub struct BackfillCheckpoint {
    pub market: Market,
    /// Id of the last historical trade the run processed.
    pub last_id: u64,
    pub updated_at: DateTime<Utc>,
}
