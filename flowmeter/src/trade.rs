use crate::exchange::ExchangeId;
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, StrExt};

/// Composite `(exchange, symbol)` key used to group trades, never stored on its own.
///
/// Symbols are normalised to upper case, eg/ `xlmbtc` becomes `XLMBTC`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize)]
#[display("{exchange}-{symbol}")]
pub struct Market {
    pub exchange: ExchangeId,
    pub symbol: SmolStr,
}

impl Market {
    pub fn new<S>(exchange: ExchangeId, symbol: S) -> Self
    where
        S: AsRef<str>,
    {
        Self {
            exchange,
            symbol: symbol.as_ref().trim().to_uppercase_smolstr(),
        }
    }
}

/// Aggressor side of a [`Trade`].
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[display("buy")]
    Buy,
    #[display("sell")]
    Sell,
}

impl Side {
    /// Derive the aggressor side from the venue's "buyer is the maker" flag.
    ///
    /// A resting buyer means the taker sold into the bid.
    pub fn from_buyer_is_maker(buyer_is_maker: bool) -> Self {
        if buyer_is_maker { Side::Sell } else { Side::Buy }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// Provenance of a stored [`Trade`]. Metadata only, never an analytics key.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[display("live")]
    Live,
    #[display("backfill")]
    Backfill,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Live => "live",
            Origin::Backfill => "backfill",
        }
    }
}

/// Normalised executed trade on one [`Market`].
///
/// `id` is exchange assigned and unique per market, and is non-decreasing with
/// `trade_time`. A [`Trade`] is never mutated once created.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Constructor, Deserialize, Serialize)]
pub struct Trade {
    pub id: u64,
    pub market: Market,
    pub price: Decimal,
    pub quantity: Decimal,
    pub side: Side,
    /// Exchange execution time in milliseconds since epoch.
    pub trade_time: i64,
    pub origin: Origin,
}

impl Trade {
    /// Notional value of the trade in quote currency.
    pub fn amount(&self) -> Decimal {
        self.price * self.quantity
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.trade_time)
    }
}

/// Result of an idempotent [`Trade`] insert.
///
/// `Duplicate` is the expected steady state where backfill meets live ingestion.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
pub enum InsertOutcome {
    #[display("inserted")]
    Inserted,
    #[display("duplicate")]
    Duplicate,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}
