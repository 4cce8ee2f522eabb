use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Binance spot feed adapters & wire models.
pub mod binance;

/// Unique identifier for a supported exchange.
///
/// ### Notes
/// Serialises as its lower case name, eg/ `"binance"`, which is also the value persisted
/// in the `exchange` column of every stored record.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    #[display("binance")]
    Binance,
}

impl ExchangeId {
    /// Return the &str representation of this [`ExchangeId`].
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
        }
    }
}

/// Operator input named an exchange with no feed adapter.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unsupported exchange: {0}")]
pub struct UnsupportedExchange(pub String);

impl FromStr for ExchangeId {
    type Err = UnsupportedExchange;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(ExchangeId::Binance),
            other => Err(UnsupportedExchange(other.to_string())),
        }
    }
}
