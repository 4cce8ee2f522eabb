use crate::{
    backfill::cancelled,
    backoff::{RetryPolicy, retry},
    error::NormalizeError,
    feed::FeedEvent,
    normalizer::normalize_live,
    readiness::Readiness,
    store::TradeStore,
    trade::{InsertOutcome, Market},
};
use fnv::FnvHashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Skip reason of a live trade tagged with another market.
pub const SKIP_MARKET_MISMATCH: &str = "market_mismatch";

/// Why a [`LiveIngestor`] stopped.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum IngestExit {
    Shutdown,
    FeedClosed,
}

/// Counters of one [`LiveIngestor`] run.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct IngestStats {
    pub received: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub reconnects: u64,
    /// Trades dropped after the store stayed unavailable for every retry.
    pub store_failures: u64,
    /// Skipped messages by reason.
    pub skipped: FnvHashMap<&'static str, u64>,
}

impl IngestStats {
    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }

    fn skip(&mut self, reason: &'static str) {
        *self.skipped.entry(reason).or_default() += 1;
    }
}

/// Normalises and stores every live feed event for one [`Market`].
///
/// Readiness is signalled once the first live trade is in the store.
#[derive(Debug)]
pub struct LiveIngestor<Store> {
    market: Market,
    store: Arc<Store>,
    readiness: Arc<Readiness>,
    retry: RetryPolicy,
}

impl<Store> LiveIngestor<Store>
where
    Store: TradeStore,
{
    pub fn new(
        market: Market,
        store: Arc<Store>,
        readiness: Arc<Readiness>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            market,
            store,
            readiness,
            retry,
        }
    }

    /// Consume `events` until shutdown is signalled or the feed closes.
    ///
    /// An in-flight write always completes before shutdown is observed. The subscription
    /// is dropped on return.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<FeedEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> (IngestExit, IngestStats) {
        let mut stats = IngestStats::default();
        info!(market = %self.market, "live ingestion started");

        let exit = loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => break IngestExit::Shutdown,
                event = events.recv() => match event {
                    Some(FeedEvent::Message(raw)) => self.handle(&raw, &mut stats).await,
                    Some(FeedEvent::Reconnecting) => {
                        stats.reconnects += 1;
                        warn!(market = %self.market, "live feed reconnecting");
                    }
                    None => break IngestExit::FeedClosed,
                },
            }
        };

        drop(events);
        info!(
            market = %self.market,
            ?exit,
            received = stats.received,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            skipped = stats.skipped_total(),
            "live ingestion stopped"
        );

        (exit, stats)
    }

    async fn handle(&self, raw: &str, stats: &mut IngestStats) {
        stats.received += 1;

        let trade = match normalize_live(self.market.exchange, raw) {
            Ok(trade) => trade,
            Err(error @ NormalizeError::VenueError(_)) => {
                error!(market = %self.market, %error, "venue reported an error");
                stats.skip(error.reason());
                return;
            }
            Err(error) => {
                warn!(market = %self.market, %error, raw, "skipping malformed live message");
                stats.skip(error.reason());
                return;
            }
        };

        if trade.market != self.market {
            warn!(
                market = %self.market,
                received = %trade.market,
                "skipping live trade for another market"
            );
            stats.skip(SKIP_MARKET_MISMATCH);
            return;
        }

        let outcome = retry(&self.retry, "live insert", || {
            self.store.insert_if_absent(&trade)
        })
        .await;

        match outcome {
            Ok(InsertOutcome::Inserted) => {
                stats.inserted += 1;
                info!(
                    market = %trade.market,
                    id = trade.id,
                    side = %trade.side,
                    price = %trade.price,
                    quantity = %trade.quantity,
                    "live trade"
                );
            }
            Ok(InsertOutcome::Duplicate) => {
                stats.duplicates += 1;
                debug!(market = %trade.market, id = trade.id, "live trade already stored");
            }
            Err(error) => {
                stats.store_failures += 1;
                error!(market = %trade.market, id = trade.id, %error, "failed to store live trade");
                return;
            }
        }

        if self.readiness.mark_first_live_trade() {
            info!(market = %self.market, "first live trade stored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exchange::ExchangeId, store::SqliteStore};

    fn market() -> Market {
        Market::new(ExchangeId::Binance, "XLMBTC")
    }

    fn agg_trade(symbol: &str, id: u64, buyer_is_maker: bool) -> FeedEvent {
        FeedEvent::Message(format!(
            r#"{{"e":"aggTrade","E":1,"s":"{symbol}","a":{id},"p":"0.00002345","q":"10","f":1,"l":1,"T":{},"m":{buyer_is_maker},"M":true}}"#,
            1000 + id
        ))
    }

    #[tokio::test]
    async fn test_live_ingestor() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let readiness = Arc::new(Readiness::new());
        let ingestor = LiveIngestor::new(
            market(),
            Arc::clone(&store),
            Arc::clone(&readiness),
            RetryPolicy::no_retry(),
        );

        let (event_tx, event_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        for event in [
            agg_trade("XLMBTC", 1, false),
            FeedEvent::Reconnecting,
            agg_trade("XLMBTC", 1, false),
            FeedEvent::Message(r#"{"e":"trade","s":"XLMBTC"}"#.to_string()),
            FeedEvent::Message(r#"{"e":"error","m":"Invalid request"}"#.to_string()),
            FeedEvent::Message("garbage".to_string()),
            agg_trade("ETHBTC", 2, true),
            agg_trade("xlmbtc", 3, true),
        ] {
            event_tx.send(event).await.unwrap();
        }
        drop(event_tx);

        let (exit, stats) = ingestor.run(event_rx, shutdown_rx).await;

        assert_eq!(exit, IngestExit::FeedClosed);
        assert_eq!(stats.received, 7);
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.skipped_total(), 4);
        assert_eq!(stats.skipped.get("unknown_event_type"), Some(&1));
        assert_eq!(stats.skipped.get("venue_error"), Some(&1));
        assert_eq!(stats.skipped.get("deserialise"), Some(&1));
        assert_eq!(stats.skipped.get(SKIP_MARKET_MISMATCH), Some(&1));
        assert!(readiness.state().first_live_trade);

        let stored = store.most_recent(&market()).await.unwrap().unwrap();
        assert_eq!(stored.id, 3);
    }

    #[tokio::test]
    async fn test_live_ingestor_stops_on_shutdown() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let readiness = Arc::new(Readiness::new());
        let ingestor =
            LiveIngestor::new(market(), store, Arc::clone(&readiness), RetryPolicy::no_retry());

        let (event_tx, event_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(ingestor.run(event_rx, shutdown_rx));
        shutdown_tx.send(true).unwrap();

        let (exit, stats) = handle.await.unwrap();
        assert_eq!(exit, IngestExit::Shutdown);
        assert_eq!(stats.received, 0);
        assert!(!readiness.state().first_live_trade);

        // Subscription is dropped once the ingestor stops
        assert!(event_tx.is_closed());
    }
}
