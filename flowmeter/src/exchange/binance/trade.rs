use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Binance aggregated trade, as received on the `<symbol>@aggTrade` stream or returned by
/// the `/api/v3/aggTrades` endpoint.
///
/// Every field is optional so that a structurally incomplete record still deserialises
/// and the [`normalizer`](crate::normalizer) can name exactly what is missing. The maker
/// flag is kept as a raw [`Value`] because error frames reuse the `m` key for a message.
///
/// ### Raw Payload Examples
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams#aggregate-trade-streams>
/// #### Live
/// ```json
/// {
///     "e": "aggTrade",
///     "E": 1672515782136,
///     "s": "XLMBTC",
///     "a": 12345,
///     "p": "0.00000234",
///     "q": "1500.00000000",
///     "f": 100,
///     "l": 105,
///     "T": 1672515782136,
///     "m": true,
///     "M": true
/// }
/// ```
///
/// #### Historical
/// ```json
/// {
///     "a": 26129,
///     "p": "0.01633102",
///     "q": "4.70443515",
///     "f": 27781,
///     "l": 27781,
///     "T": 1498793709153,
///     "m": true,
///     "M": true
/// }
/// ```
///
/// #### Error frame
/// ```json
/// { "e": "error", "m": "Invalid request" }
/// ```
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct BinanceAggTrade {
    #[serde(rename = "e", default)]
    pub event_type: Option<String>,

    #[serde(rename = "s", default)]
    pub symbol: Option<String>,

    #[serde(rename = "a", default)]
    pub id: Option<u64>,

    #[serde(rename = "p", default)]
    pub price: Option<String>,

    #[serde(rename = "q", default)]
    pub quantity: Option<String>,

    #[serde(rename = "T", default)]
    pub trade_time: Option<i64>,

    #[serde(rename = "m", default)]
    pub buyer_is_maker: Option<Value>,
}
