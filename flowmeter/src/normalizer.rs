//! Pure conversion of raw venue records into canonical [`Trade`]s.
//!
//! Live events carry their own market tag, historical records do not and are attributed
//! to the [`Market`] being replayed.

use crate::{
    error::NormalizeError,
    exchange::{
        ExchangeId,
        binance::{EVENT_TYPE_AGG_TRADE, EVENT_TYPE_ERROR, trade::BinanceAggTrade},
    },
    trade::{Market, Origin, Side, Trade},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;

/// Normalise one raw live feed frame from `exchange` into a [`Trade`] with
/// [`Origin::Live`].
pub fn normalize_live(exchange: ExchangeId, raw: &str) -> Result<Trade, NormalizeError> {
    match exchange {
        ExchangeId::Binance => {
            let event = serde_json::from_str::<BinanceAggTrade>(raw)
                .map_err(|error| NormalizeError::Deserialise(error.to_string()))?;

            match event.event_type.as_deref() {
                Some(EVENT_TYPE_AGG_TRADE) => {}
                Some(EVENT_TYPE_ERROR) => return Err(venue_error(&event)),
                Some(other) => return Err(NormalizeError::UnknownEventType(other.to_string())),
                None => return Err(NormalizeError::MissingField("e")),
            }

            let symbol = event
                .symbol
                .as_deref()
                .ok_or(NormalizeError::MissingField("s"))?;

            binance_trade(&event, Market::new(exchange, symbol), Origin::Live)
        }
    }
}

/// Normalise one raw historical record of `market` into a [`Trade`] with
/// [`Origin::Backfill`].
pub fn normalize_historical(raw: &Value, market: &Market) -> Result<Trade, NormalizeError> {
    match market.exchange {
        ExchangeId::Binance => {
            let record = BinanceAggTrade::deserialize(raw)
                .map_err(|error| NormalizeError::Deserialise(error.to_string()))?;

            match record.event_type.as_deref() {
                None | Some(EVENT_TYPE_AGG_TRADE) => {}
                Some(EVENT_TYPE_ERROR) => return Err(venue_error(&record)),
                Some(other) => return Err(NormalizeError::UnknownEventType(other.to_string())),
            }

            binance_trade(&record, market.clone(), Origin::Backfill)
        }
    }
}

fn venue_error(event: &BinanceAggTrade) -> NormalizeError {
    let message = match &event.buyer_is_maker {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    NormalizeError::VenueError(message)
}

fn binance_trade(
    record: &BinanceAggTrade,
    market: Market,
    origin: Origin,
) -> Result<Trade, NormalizeError> {
    let id = record.id.ok_or(NormalizeError::MissingField("a"))?;
    let price = decimal("p", record.price.as_deref())?;
    let quantity = decimal("q", record.quantity.as_deref())?;
    let trade_time = record.trade_time.ok_or(NormalizeError::MissingField("T"))?;
    let side = match &record.buyer_is_maker {
        Some(Value::Bool(buyer_is_maker)) => Side::from_buyer_is_maker(*buyer_is_maker),
        Some(other) => return Err(NormalizeError::InvalidSide(other.to_string())),
        None => return Err(NormalizeError::MissingField("m")),
    };

    Ok(Trade {
        id,
        market,
        price,
        quantity,
        side,
        trade_time,
        origin,
    })
}

fn decimal(field: &'static str, value: Option<&str>) -> Result<Decimal, NormalizeError> {
    let value = value.ok_or(NormalizeError::MissingField(field))?;

    Decimal::from_str(value)
        .ok()
        .filter(|decimal| !decimal.is_sign_negative())
        .ok_or_else(|| NormalizeError::InvalidDecimal {
            field,
            value: value.to_string(),
        })
}
