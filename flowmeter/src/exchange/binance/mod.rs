use std::time::Duration;

/// Aggregated trade wire model shared by the live and historical endpoints.
pub mod trade;

/// Reconnecting `<symbol>@aggTrade` WebSocket subscription.
pub mod live;

/// `/api/v3/aggTrades` REST pagination.
pub mod historical;

/// [`Binance`](super::ExchangeId::Binance) spot WebSocket base url.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/web-socket-streams>
pub const BASE_URL_BINANCE_WS: &str = "wss://stream.binance.com:9443/ws";

/// [`Binance`](super::ExchangeId::Binance) spot REST base url.
pub const BASE_URL_BINANCE_REST: &str = "https://api.binance.com";

/// Compressed/aggregate trades list endpoint.
///
/// See docs: <https://developers.binance.com/docs/binance-spot-api-docs/rest-api/market-data-endpoints#compressedaggregate-trades-list>
pub const PATH_AGG_TRADES: &str = "/api/v3/aggTrades";

/// Largest page the aggregate trades endpoint returns.
pub const MAX_AGG_TRADES_LIMIT: u16 = 1000;

/// Widest `[startTime, endTime]` range the aggregate trades endpoint accepts.
pub const MAX_AGG_TRADES_TIME_RANGE: Duration = Duration::from_secs(60 * 60);

/// Event type tag of an aggregated trade.
pub const EVENT_TYPE_AGG_TRADE: &str = "aggTrade";

/// Event type tag of a venue error frame.
pub const EVENT_TYPE_ERROR: &str = "error";
