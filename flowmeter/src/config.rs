use crate::{
    backoff::RetryPolicy,
    exchange::binance::{BASE_URL_BINANCE_REST, BASE_URL_BINANCE_WS},
    streams::timeout::DEFAULT_READ_TIMEOUT,
    trade::Market,
};
use std::time::Duration;

/// Default period between two analysis ticks.
pub const DEFAULT_LOOP_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration of one market's [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Clone, PartialEq, Debug)]
pub struct PipelineConfig {
    pub market: Market,
    /// Analysis window length as entered by the operator, eg/ "1 hour" or "15m".
    pub interval: String,
    /// Period between two analysis ticks.
    pub loop_interval: Duration,
    /// Delete every stored trade of the market before starting.
    pub clear_existing: bool,
    /// Continue a downtime backfill from the last stored trade id. When disabled a
    /// rolling window backfill is used instead.
    pub continuation: bool,
    /// Seed a rolling window of history when the market has no stored trades.
    pub seed_history: bool,
    pub backfill: BackfillConfig,
    /// Retry policy for live trade inserts & snapshot persistence.
    pub store_retry: RetryPolicy,
}

impl PipelineConfig {
    pub fn new(market: Market, interval: impl Into<String>) -> Self {
        Self {
            market,
            interval: interval.into(),
            loop_interval: DEFAULT_LOOP_INTERVAL,
            clear_existing: false,
            continuation: true,
            seed_history: false,
            backfill: BackfillConfig::default(),
            store_retry: RetryPolicy::default(),
        }
    }

    pub fn with_loop_interval(mut self, loop_interval: Duration) -> Self {
        self.loop_interval = loop_interval;
        self
    }

    pub fn with_clear_existing(mut self, clear_existing: bool) -> Self {
        self.clear_existing = clear_existing;
        self
    }

    pub fn with_continuation(mut self, continuation: bool) -> Self {
        self.continuation = continuation;
        self
    }

    pub fn with_seed_history(mut self, seed_history: bool) -> Self {
        self.seed_history = seed_history;
        self
    }

    pub fn with_backfill(mut self, backfill: BackfillConfig) -> Self {
        self.backfill = backfill;
        self
    }

    pub fn with_store_retry(mut self, store_retry: RetryPolicy) -> Self {
        self.store_retry = store_retry;
        self
    }
}

/// Configuration of the [`BackfillCoordinator`](crate::backfill::BackfillCoordinator).
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct BackfillConfig {
    /// Largest tolerated ratio of malformed to seen historical records.
    pub max_skip_rate: f64,
    /// Records that must be seen before `max_skip_rate` is enforced.
    pub min_skip_sample: u64,
    /// Records observed before the total record count is extrapolated for progress
    /// reporting.
    pub calibration_records: u64,
    /// Retry policy for page fetches and inserts.
    pub retry: RetryPolicy,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            max_skip_rate: 0.05,
            min_skip_sample: 100,
            calibration_records: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

impl BackfillConfig {
    pub fn with_max_skip_rate(mut self, max_skip_rate: f64) -> Self {
        self.max_skip_rate = max_skip_rate;
        self
    }

    pub fn with_min_skip_sample(mut self, min_skip_sample: u64) -> Self {
        self.min_skip_sample = min_skip_sample;
        self
    }

    pub fn with_calibration_records(mut self, calibration_records: u64) -> Self {
        self.calibration_records = calibration_records;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Binance feed adapter configuration.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BinanceConfig {
    /// WebSocket base url, the stream name is appended as a path segment.
    pub ws_base_url: String,
    /// REST base url for historical queries.
    pub rest_base_url: String,
    /// Delay before a dropped live connection is re-established.
    pub reconnect_delay: Duration,
    /// Idle period after which a silent live connection is considered dead.
    pub read_timeout: Duration,
    /// Timeout of one historical REST request.
    pub request_timeout: Duration,
    /// Buffer of the live feed event channel.
    pub channel_buffer_size: usize,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            ws_base_url: BASE_URL_BINANCE_WS.to_string(),
            rest_base_url: BASE_URL_BINANCE_REST.to_string(),
            reconnect_delay: Duration::from_secs(2),
            read_timeout: DEFAULT_READ_TIMEOUT,
            request_timeout: Duration::from_secs(10),
            channel_buffer_size: 1000,
        }
    }
}

impl BinanceConfig {
    pub fn with_ws_base_url(mut self, url: impl Into<String>) -> Self {
        self.ws_base_url = url.into();
        self
    }

    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = url.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeId;

    #[test]
    fn test_pipeline_config_builder() {
        let config = PipelineConfig::new(Market::new(ExchangeId::Binance, "xlmbtc"), "1 hour")
            .with_loop_interval(Duration::from_secs(30))
            .with_clear_existing(true)
            .with_continuation(false)
            .with_seed_history(true)
            .with_backfill(BackfillConfig::default().with_max_skip_rate(0.1));

        assert_eq!(config.market.symbol, "XLMBTC");
        assert_eq!(config.interval, "1 hour");
        assert_eq!(config.loop_interval, Duration::from_secs(30));
        assert!(config.clear_existing);
        assert!(!config.continuation);
        assert!(config.seed_history);
        assert_eq!(config.backfill.max_skip_rate, 0.1);
        assert_eq!(config.backfill.min_skip_sample, 100);
    }

    #[test]
    fn test_default_binance_config() {
        let config = BinanceConfig::default();
        assert_eq!(config.ws_base_url, "wss://stream.binance.com:9443/ws");
        assert_eq!(config.rest_base_url, "https://api.binance.com");
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(120));
        assert_eq!(config.channel_buffer_size, 1000);
    }
}
