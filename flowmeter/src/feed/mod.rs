use crate::{error::FeedError, trade::Market};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Event pushed by a [`LiveFeed`] subscription.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum FeedEvent {
    /// Raw venue text frame, to be normalised by the consumer.
    Message(String),
    /// Transport dropped and the subscription is re-establishing itself. Trades executed
    /// while disconnected are not replayed by the live feed.
    Reconnecting,
}

/// Push source of trade events for one [`Market`].
///
/// Implementations own their reconnect loop: the consumer never re-specifies position.
/// The subscription ends when the returned receiver is dropped.
pub trait LiveFeed: Send + Sync {
    fn subscribe(&self, market: &Market) -> mpsc::Receiver<FeedEvent>;
}

/// Resume position of a [`HistoricalFeed`] enumeration.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum HistoricalCursor {
    /// Trades with `trade_time >= ms`.
    Since(i64),
    /// Trades with `id > id` (exclusive after).
    AfterId(u64),
}

/// One ordered page of raw historical records.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct HistoricalPage {
    pub records: Vec<Value>,
    /// Cursor that resumes directly after this page, `None` once the head of history
    /// has been reached.
    pub next: Option<HistoricalCursor>,
}

impl HistoricalPage {
    pub fn new(records: Vec<Value>, next: Option<HistoricalCursor>) -> Self {
        Self { records, next }
    }

    /// Page signalling that no further history exists after the requested cursor.
    pub fn exhausted() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Pull source of historical trades for one [`Market`], resumable from either a start
/// time or a start id.
#[async_trait]
pub trait HistoricalFeed: Send + Sync {
    async fn fetch_page(
        &self,
        market: &Market,
        cursor: HistoricalCursor,
    ) -> Result<HistoricalPage, FeedError>;
}
