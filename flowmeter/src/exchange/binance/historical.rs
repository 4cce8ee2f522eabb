use crate::{
    config::BinanceConfig,
    error::FeedError,
    exchange::binance::{MAX_AGG_TRADES_LIMIT, MAX_AGG_TRADES_TIME_RANGE, PATH_AGG_TRADES},
    feed::{HistoricalCursor, HistoricalFeed, HistoricalPage},
    trade::Market,
};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Binance `/api/v3/aggTrades` historical query client.
///
/// A [`HistoricalCursor::Since`] cursor walks forward in one hour `[t, t + 1h)` windows,
/// the widest range the venue accepts, until a non-empty window is found. Every following
/// page continues by id with [`HistoricalCursor::AfterId`].
#[derive(Clone, Debug)]
pub struct BinanceHistoricalFeed {
    client: Client,
    base_url: Url,
}

impl BinanceHistoricalFeed {
    pub fn new(config: &BinanceConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(&config.rest_base_url)?,
        })
    }

    async fn query(&self, params: &[(&'static str, String)]) -> Result<Vec<Value>, FeedError> {
        let url = self.base_url.join(PATH_AGG_TRADES)?;

        let response = self.client.get(url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Vec<Value>>().await?)
    }
}

#[async_trait]
impl HistoricalFeed for BinanceHistoricalFeed {
    async fn fetch_page(
        &self,
        market: &Market,
        cursor: HistoricalCursor,
    ) -> Result<HistoricalPage, FeedError> {
        match cursor {
            HistoricalCursor::AfterId(last_id) => {
                let records = self.query(&id_params(market, last_id)).await?;
                debug!(%market, last_id, records = records.len(), "fetched aggTrades page by id");
                page(records)
            }
            HistoricalCursor::Since(start_ms) => {
                let now_ms = Utc::now().timestamp_millis();
                let mut window_start = start_ms;

                while window_start < now_ms {
                    let records = self.query(&time_params(market, window_start)).await?;
                    debug!(
                        %market,
                        window_start,
                        records = records.len(),
                        "fetched aggTrades page by time"
                    );

                    if !records.is_empty() {
                        return page(records);
                    }
                    window_start += time_range_ms();
                }

                Ok(HistoricalPage::exhausted())
            }
        }
    }
}

fn time_range_ms() -> i64 {
    i64::try_from(MAX_AGG_TRADES_TIME_RANGE.as_millis()).unwrap_or(i64::MAX)
}

/// Query parameters continuing exclusively after `last_id`. The venue's `fromId` is
/// inclusive.
pub fn id_params(market: &Market, last_id: u64) -> Vec<(&'static str, String)> {
    vec![
        ("symbol", market.symbol.to_string()),
        ("fromId", last_id.saturating_add(1).to_string()),
        ("limit", MAX_AGG_TRADES_LIMIT.to_string()),
    ]
}

/// Query parameters for the `[window_start, window_start + 1h)` window. The venue's
/// `endTime` is inclusive.
pub fn time_params(market: &Market, window_start: i64) -> Vec<(&'static str, String)> {
    vec![
        ("symbol", market.symbol.to_string()),
        ("startTime", window_start.to_string()),
        ("endTime", (window_start + time_range_ms() - 1).to_string()),
        ("limit", MAX_AGG_TRADES_LIMIT.to_string()),
    ]
}

/// Build a [`HistoricalPage`] resuming after the last record's aggregate trade id, or
/// after its trade time when the id is unreadable.
pub fn page(records: Vec<Value>) -> Result<HistoricalPage, FeedError> {
    let Some(last) = records.last() else {
        return Ok(HistoricalPage::exhausted());
    };

    let next = if let Some(id) = last.get("a").and_then(Value::as_u64) {
        HistoricalCursor::AfterId(id)
    } else if let Some(time) = last.get("T").and_then(Value::as_i64) {
        HistoricalCursor::Since(time + 1)
    } else {
        return Err(FeedError::Decode(format!(
            "aggTrades record has neither id nor time: {last}"
        )));
    };

    Ok(HistoricalPage::new(records, Some(next)))
}
