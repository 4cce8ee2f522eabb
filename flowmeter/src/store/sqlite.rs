//! SQLite backed [`TradeStore`].
//!
//! Decimals are persisted as text so no precision is lost to binary floats. The single
//! [`Connection`] lives behind a [`Mutex`] and every call runs on the blocking thread pool,
//! so the lock is never held across an `.await`.

use crate::{
    analytics::snapshot::{AnalysisSnapshot, SideValues},
    error::StoreError,
    exchange::ExchangeId,
    store::{
        Aggregate, AggregateSums, BackfillCheckpoint, SideFilter, SnapshotFilter, TimeRange,
        TradeStore,
    },
    trade::{InsertOutcome, Market, Origin, Side, Trade},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use std::{path::Path, str::FromStr, sync::Arc};
use tracing::{debug, info};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS trades (
    exchange TEXT NOT NULL,
    market TEXT NOT NULL,
    id INTEGER NOT NULL,
    price TEXT NOT NULL,
    quantity TEXT NOT NULL,
    side TEXT NOT NULL,
    trade_time INTEGER NOT NULL,
    origin TEXT NOT NULL,
    PRIMARY KEY (exchange, market, id)
) WITHOUT ROWID;

-- Window queries
CREATE INDEX IF NOT EXISTS idx_trades_time
    ON trades(exchange, market, trade_time);

CREATE TABLE IF NOT EXISTS analysis_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange TEXT NOT NULL,
    market TEXT NOT NULL,
    interval TEXT NOT NULL,
    snapshot_time INTEGER NOT NULL,
    body TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_time
    ON analysis_snapshots(exchange, market, interval, snapshot_time);

CREATE TABLE IF NOT EXISTS backfill_checkpoints (
    exchange TEXT NOT NULL,
    market TEXT NOT NULL,
    last_id INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (exchange, market)
) WITHOUT ROWID;
"#;

/// [`TradeStore`] over a single SQLite database file.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`, creating missing parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|error| {
                    StoreError::Unavailable(format!(
                        "failed to create {}: {error}",
                        parent.display()
                    ))
                })?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(path, flags)?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "trade store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            operation(&conn)
        })
        .await?
    }
}

#[async_trait]
impl TradeStore for SqliteStore {
    async fn insert_if_absent(&self, trade: &Trade) -> Result<InsertOutcome, StoreError> {
        let trade = trade.clone();
        let id = id_to_sql(trade.id)?;

        self.with_conn(move |conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO trades \
                 (exchange, market, id, price, quantity, side, trade_time, origin) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    trade.market.exchange.as_str(),
                    trade.market.symbol.as_str(),
                    id,
                    trade.price.to_string(),
                    trade.quantity.to_string(),
                    trade.side.as_str(),
                    trade.trade_time,
                    trade.origin.as_str(),
                ],
            )?;

            Ok(if changed == 0 {
                InsertOutcome::Duplicate
            } else {
                InsertOutcome::Inserted
            })
        })
        .await
    }

    async fn most_recent(&self, market: &Market) -> Result<Option<Trade>, StoreError> {
        let market = market.clone();

        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT exchange, market, id, price, quantity, side, trade_time, origin \
                     FROM trades WHERE exchange = ?1 AND market = ?2 \
                     ORDER BY id DESC LIMIT 1",
                    params![market.exchange.as_str(), market.symbol.as_str()],
                    TradeRow::from_row,
                )
                .optional()?;

            row.map(Trade::try_from).transpose()
        })
        .await
    }

    async fn range_by_time(
        &self,
        market: &Market,
        side: SideFilter,
        range: TimeRange,
    ) -> Result<Aggregate, StoreError> {
        let market = market.clone();

        self.with_conn(move |conn| {
            let mut statement = conn.prepare_cached(
                "SELECT price, quantity FROM trades \
                 WHERE exchange = ?1 AND market = ?2 \
                 AND trade_time >= ?3 AND trade_time < ?4 \
                 AND (?5 IS NULL OR side = ?5)",
            )?;

            let rows = statement.query_map(
                params![
                    market.exchange.as_str(),
                    market.symbol.as_str(),
                    range.start,
                    range.end,
                    side.side().map(|side| side.as_str()),
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )?;

            let mut sums = AggregateSums::default();
            for row in rows {
                let (price, quantity) = row?;
                sums = sums.push(
                    decimal_from_sql("price", &price)?,
                    decimal_from_sql("quantity", &quantity)?,
                )?;
            }

            sums.finish()
        })
        .await
    }

    async fn range_by_time_sides(
        &self,
        market: &Market,
        range: TimeRange,
    ) -> Result<SideValues<Aggregate>, StoreError> {
        let market = market.clone();

        self.with_conn(move |conn| {
            let mut statement = conn.prepare_cached(
                "SELECT side, price, quantity FROM trades \
                 WHERE exchange = ?1 AND market = ?2 \
                 AND trade_time >= ?3 AND trade_time < ?4",
            )?;

            let rows = statement.query_map(
                params![
                    market.exchange.as_str(),
                    market.symbol.as_str(),
                    range.start,
                    range.end,
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )?;

            let mut buy = AggregateSums::default();
            let mut sell = AggregateSums::default();
            for row in rows {
                let (side, price, quantity) = row?;
                let price = decimal_from_sql("price", &price)?;
                let quantity = decimal_from_sql("quantity", &quantity)?;
                match side_from_sql(&side)? {
                    Side::Buy => buy = buy.push(price, quantity)?,
                    Side::Sell => sell = sell.push(price, quantity)?,
                }
            }

            Ok(SideValues {
                all: buy.merge(sell)?.finish()?,
                buy: buy.finish()?,
                sell: sell.finish()?,
            })
        })
        .await
    }

    async fn clear_market(&self, market: &Market) -> Result<u64, StoreError> {
        let market = market.clone();

        self.with_conn(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM trades WHERE exchange = ?1 AND market = ?2",
                params![market.exchange.as_str(), market.symbol.as_str()],
            )?;
            conn.execute(
                "DELETE FROM backfill_checkpoints WHERE exchange = ?1 AND market = ?2",
                params![market.exchange.as_str(), market.symbol.as_str()],
            )?;

            info!(%market, deleted, "cleared stored trades");
            Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
        })
        .await
    }

    async fn insert_snapshot(&self, snapshot: &AnalysisSnapshot) -> Result<(), StoreError> {
        let body = serde_json::to_string(snapshot)
            .map_err(|error| StoreError::Corrupt(format!("unserialisable snapshot: {error}")))?;
        let exchange = snapshot.exchange.as_str();
        let market = snapshot.market.to_string();
        let interval = snapshot.interval.clone();
        let time = snapshot.time.timestamp_millis();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO analysis_snapshots (exchange, market, interval, snapshot_time, body) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![exchange, market, interval, time, body],
            )?;
            Ok(())
        })
        .await
    }

    async fn snapshots(
        &self,
        filter: &SnapshotFilter,
        limit: usize,
    ) -> Result<Vec<AnalysisSnapshot>, StoreError> {
        let exchange = filter.exchange.map(|exchange| exchange.as_str());
        let symbol = filter.symbol.as_ref().map(|symbol| symbol.to_string());
        let interval = filter.interval.clone();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.with_conn(move |conn| {
            let mut statement = conn.prepare_cached(
                "SELECT body FROM analysis_snapshots \
                 WHERE (?1 IS NULL OR exchange = ?1) \
                 AND (?2 IS NULL OR market = ?2) \
                 AND (?3 IS NULL OR interval = ?3) \
                 ORDER BY snapshot_time DESC, id DESC LIMIT ?4",
            )?;

            let rows = statement.query_map(params![exchange, symbol, interval, limit], |row| {
                row.get::<_, String>(0)
            })?;

            rows.map(|body| {
                let body = body?;
                serde_json::from_str::<AnalysisSnapshot>(&body)
                    .map_err(|error| StoreError::Corrupt(format!("snapshot body: {error}")))
            })
            .collect()
        })
        .await
    }

    async fn save_checkpoint(&self, checkpoint: &BackfillCheckpoint) -> Result<(), StoreError> {
        let checkpoint = checkpoint.clone();
        let last_id = id_to_sql(checkpoint.last_id)?;

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO backfill_checkpoints (exchange, market, last_id, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(exchange, market) DO UPDATE SET \
                 last_id = excluded.last_id, updated_at = excluded.updated_at",
                params![
                    checkpoint.market.exchange.as_str(),
                    checkpoint.market.symbol.as_str(),
                    last_id,
                    checkpoint.updated_at.timestamp_millis(),
                ],
            )?;
            debug!(market = %checkpoint.market, last_id, "saved backfill checkpoint");
            Ok(())
        })
        .await
    }

    async fn load_checkpoint(
        &self,
        market: &Market,
    ) -> Result<Option<BackfillCheckpoint>, StoreError> {
        let market = market.clone();

        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT last_id, updated_at FROM backfill_checkpoints \
                     WHERE exchange = ?1 AND market = ?2",
                    params![market.exchange.as_str(), market.symbol.as_str()],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;

            row.map(|(last_id, updated_at)| {
                Ok(BackfillCheckpoint {
                    market: market.clone(),
                    last_id: id_from_sql(last_id)?,
                    updated_at: time_from_sql(updated_at)?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn clear_checkpoint(&self, market: &Market) -> Result<(), StoreError> {
        let market = market.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM backfill_checkpoints WHERE exchange = ?1 AND market = ?2",
                params![market.exchange.as_str(), market.symbol.as_str()],
            )?;
            Ok(())
        })
        .await
    }
}

/// Raw `trades` row prior to validation.
struct TradeRow {
    exchange: String,
    market: String,
    id: i64,
    price: String,
    quantity: String,
    side: String,
    trade_time: i64,
    origin: String,
}

impl TradeRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            exchange: row.get(0)?,
            market: row.get(1)?,
            id: row.get(2)?,
            price: row.get(3)?,
            quantity: row.get(4)?,
            side: row.get(5)?,
            trade_time: row.get(6)?,
            origin: row.get(7)?,
        })
    }
}

impl TryFrom<TradeRow> for Trade {
    type Error = StoreError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        let exchange = ExchangeId::from_str(&row.exchange)
            .map_err(|error| StoreError::Corrupt(error.to_string()))?;

        let side = side_from_sql(&row.side)?;

        let origin = match row.origin.as_str() {
            "live" => Origin::Live,
            "backfill" => Origin::Backfill,
            other => return Err(StoreError::Corrupt(format!("unknown origin: {other}"))),
        };

        Ok(Trade {
            id: id_from_sql(row.id)?,
            market: Market::new(exchange, row.market),
            price: decimal_from_sql("price", &row.price)?,
            quantity: decimal_from_sql("quantity", &row.quantity)?,
            side,
            trade_time: row.trade_time,
            origin,
        })
    }
}

fn id_to_sql(id: u64) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::Corrupt(format!("trade id out of range: {id}")))
}

fn id_from_sql(id: i64) -> Result<u64, StoreError> {
    u64::try_from(id).map_err(|_| StoreError::Corrupt(format!("negative trade id: {id}")))
}

fn time_from_sql(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

fn side_from_sql(side: &str) -> Result<Side, StoreError> {
    match side {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        other => Err(StoreError::Corrupt(format!("unknown side: {other}"))),
    }
}

fn decimal_from_sql(field: &str, value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value)
        .map_err(|error| StoreError::Corrupt(format!("{field} {value}: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::Side;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market::new(ExchangeId::Binance, "XLMBTC")
    }

    fn trade(id: u64, side: Side, price: Decimal, quantity: Decimal, trade_time: i64) -> Trade {
        Trade::new(id, market(), price, quantity, side, trade_time, Origin::Live)
    }

    #[tokio::test]
    async fn test_insert_if_absent_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let trade = trade(1, Side::Buy, dec!(1.0), dec!(10), 0);

        assert_eq!(
            store.insert_if_absent(&trade).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_if_absent(&trade).await.unwrap(),
            InsertOutcome::Duplicate
        );

        // Same id from the backfill path is still a duplicate
        let backfilled = Trade {
            origin: Origin::Backfill,
            ..trade.clone()
        };
        assert_eq!(
            store.insert_if_absent(&backfilled).await.unwrap(),
            InsertOutcome::Duplicate
        );

        // Same id on another market is not
        let other = Trade {
            market: Market::new(ExchangeId::Binance, "ETHBTC"),
            ..trade
        };
        assert_eq!(
            store.insert_if_absent(&other).await.unwrap(),
            InsertOutcome::Inserted
        );

        let aggregate = store
            .range_by_time(&market(), SideFilter::All, TimeRange::new(0, 1))
            .await
            .unwrap();
        assert_eq!(aggregate.count, 1);
    }

    #[tokio::test]
    async fn test_most_recent_is_highest_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.most_recent(&market()).await.unwrap(), None);

        for id in [3, 7, 5] {
            let trade = trade(id, Side::Sell, dec!(0.00002345), dec!(100.5), id as i64 * 1000);
            store.insert_if_absent(&trade).await.unwrap();
        }

        let actual = store.most_recent(&market()).await.unwrap().unwrap();
        assert_eq!(actual, trade(7, Side::Sell, dec!(0.00002345), dec!(100.5), 7000));
    }

    #[tokio::test]
    async fn test_range_by_time() {
        let store = SqliteStore::open_in_memory().unwrap();
        let trades = vec![
            trade(1, Side::Buy, dec!(1.0), dec!(10), 0),
            trade(2, Side::Sell, dec!(1.2), dec!(5), 500_000),
            trade(3, Side::Buy, dec!(2.0), dec!(1), 600_000),
        ];
        for trade in &trades {
            store.insert_if_absent(trade).await.unwrap();
        }

        struct TestCase {
            side: SideFilter,
            range: TimeRange,
            expected: Aggregate,
        }

        let tests = vec![
            TestCase {
                // TC0: all sides, end is exclusive
                side: SideFilter::All,
                range: TimeRange::new(0, 600_000),
                expected: Aggregate {
                    volume: dec!(15),
                    price: dec!(1.1),
                    amount: dec!(8),
                    count: 2,
                },
            },
            TestCase {
                // TC1: buy side only
                side: SideFilter::Buy,
                range: TimeRange::new(0, 600_000),
                expected: Aggregate {
                    volume: dec!(10),
                    price: dec!(1.0),
                    amount: dec!(10),
                    count: 1,
                },
            },
            TestCase {
                // TC2: start is inclusive
                side: SideFilter::Buy,
                range: TimeRange::new(600_000, 1_200_000),
                expected: Aggregate {
                    volume: dec!(1),
                    price: dec!(2.0),
                    amount: dec!(2),
                    count: 1,
                },
            },
            TestCase {
                // TC3: empty match is all zeros
                side: SideFilter::Sell,
                range: TimeRange::new(600_000, 1_200_000),
                expected: Aggregate::default(),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = store
                .range_by_time(&market(), test.side, test.range)
                .await
                .unwrap();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[tokio::test]
    async fn test_range_by_time_sides_matches_per_side_queries() {
        let store = SqliteStore::open_in_memory().unwrap();
        for trade in [
            trade(1, Side::Buy, dec!(1.0), dec!(10), 0),
            trade(2, Side::Sell, dec!(1.2), dec!(5), 500_000),
            trade(3, Side::Buy, dec!(2.0), dec!(1), 599_999),
            trade(4, Side::Sell, dec!(9.9), dec!(9), 600_000),
        ] {
            store.insert_if_absent(&trade).await.unwrap();
        }
        let range = TimeRange::new(0, 600_000);

        let actual = store.range_by_time_sides(&market(), range).await.unwrap();

        for side in [SideFilter::All, SideFilter::Buy, SideFilter::Sell] {
            let expected = store.range_by_time(&market(), side, range).await.unwrap();
            assert_eq!(actual.get(side), &expected, "{side} failed");
        }
        assert_eq!(
            actual.all,
            Aggregate {
                volume: dec!(16),
                price: dec!(1.4),
                amount: dec!(6),
                count: 3,
            }
        );

        let empty = store
            .range_by_time_sides(&market(), TimeRange::new(700_000, 800_000))
            .await
            .unwrap();
        assert_eq!(empty, SideValues::default());
    }

    fn snapshot(market: &Market, interval: &str, time: i64, volume: Decimal) -> AnalysisSnapshot {
        let mut current = crate::analytics::snapshot::Metrics::default();
        current.volume.all = Some(volume);

        AnalysisSnapshot {
            exchange: market.exchange,
            market: market.symbol.clone(),
            interval: interval.to_string(),
            time: DateTime::from_timestamp_millis(time).unwrap(),
            current,
            last: Default::default(),
            difference: Default::default(),
            flow_differential: None,
        }
    }

    #[tokio::test]
    async fn test_snapshots_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        let other = Market::new(ExchangeId::Binance, "ETHBTC");

        // Inserted out of time order
        let first = snapshot(&market(), "10m", 1_000, dec!(1));
        let third = snapshot(&market(), "10m", 3_000, dec!(3));
        let second = snapshot(&market(), "10m", 2_000, dec!(2));
        let hourly = snapshot(&market(), "1h", 4_000, dec!(4));
        let foreign = snapshot(&other, "10m", 5_000, dec!(5));
        for snapshot in [&first, &third, &second, &hourly, &foreign] {
            store.insert_snapshot(snapshot).await.unwrap();
        }

        struct TestCase {
            filter: SnapshotFilter,
            limit: usize,
            expected: Vec<AnalysisSnapshot>,
        }

        let tests = vec![
            TestCase {
                // TC0: market filter spans intervals, newest first
                filter: SnapshotFilter::market(&market()),
                limit: 10,
                expected: vec![hourly.clone(), third.clone(), second.clone(), first.clone()],
            },
            TestCase {
                // TC1: interval filter
                filter: SnapshotFilter::market(&market()).with_interval("10m"),
                limit: 10,
                expected: vec![third.clone(), second.clone(), first.clone()],
            },
            TestCase {
                // TC2: limit keeps the newest
                filter: SnapshotFilter::market(&market()).with_interval("10m"),
                limit: 2,
                expected: vec![third.clone(), second.clone()],
            },
            TestCase {
                // TC3: empty filter matches every market
                filter: SnapshotFilter::default(),
                limit: 1,
                expected: vec![foreign.clone()],
            },
            TestCase {
                // TC4: unknown interval matches nothing
                filter: SnapshotFilter::market(&market()).with_interval("1d"),
                limit: 10,
                expected: vec![],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = store.snapshots(&test.filter, test.limit).await.unwrap();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[tokio::test]
    async fn test_checkpoint_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.load_checkpoint(&market()).await.unwrap(), None);

        let updated_at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let first = BackfillCheckpoint::new(market(), 10, updated_at);
        let second = BackfillCheckpoint::new(market(), 20, updated_at);

        store.save_checkpoint(&first).await.unwrap();
        store.save_checkpoint(&second).await.unwrap();
        assert_eq!(
            store.load_checkpoint(&market()).await.unwrap(),
            Some(second)
        );

        store.clear_checkpoint(&market()).await.unwrap();
        assert_eq!(store.load_checkpoint(&market()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_market() {
        let store = SqliteStore::open_in_memory().unwrap();
        let other = Market::new(ExchangeId::Binance, "ETHBTC");

        store
            .insert_if_absent(&trade(1, Side::Buy, dec!(1), dec!(1), 0))
            .await
            .unwrap();
        store
            .insert_if_absent(&trade(2, Side::Buy, dec!(1), dec!(1), 1))
            .await
            .unwrap();
        store
            .insert_if_absent(&Trade {
                market: other.clone(),
                ..trade(1, Side::Buy, dec!(1), dec!(1), 0)
            })
            .await
            .unwrap();
        store
            .save_checkpoint(&BackfillCheckpoint::new(market(), 2, Utc::now()))
            .await
            .unwrap();

        assert_eq!(store.clear_market(&market()).await.unwrap(), 2);
        assert_eq!(store.most_recent(&market()).await.unwrap(), None);
        assert_eq!(store.load_checkpoint(&market()).await.unwrap(), None);
        assert!(store.most_recent(&other).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_creates_parent_directory() {
        let dir = std::env::temp_dir().join(format!(
            "flowmeter-store-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let path = dir.join("nested").join("flowmeter.db");

        let store = SqliteStore::open(&path).unwrap();
        store
            .insert_if_absent(&trade(1, Side::Buy, dec!(1), dec!(1), 0))
            .await
            .unwrap();
        drop(store);

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.most_recent(&market()).await.unwrap().map(|t| t.id), Some(1));
        drop(reopened);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
