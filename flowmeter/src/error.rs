use crate::trade::Market;
use thiserror::Error;

/// Raw feed input that could not be converted into a [`Trade`](crate::trade::Trade).
///
/// Every variant is a `MalformedEvent`: skipped and counted by the caller, never fatal.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Error)]
pub enum NormalizeError {
    #[error("MalformedEvent: failed to deserialise raw event: {0}")]
    Deserialise(String),

    #[error("MalformedEvent: missing required field: {0}")]
    MissingField(&'static str),

    #[error("MalformedEvent: unrecognised event type: {0}")]
    UnknownEventType(String),

    #[error("MalformedEvent: venue error frame: {0}")]
    VenueError(String),

    #[error("MalformedEvent: maker flag is neither true nor false: {0}")]
    InvalidSide(String),

    #[error("MalformedEvent: invalid decimal for field {field}: {value}")]
    InvalidDecimal { field: &'static str, value: String },
}

impl NormalizeError {
    /// Short, stable label used as the skipped-message metric key.
    pub fn reason(&self) -> &'static str {
        match self {
            NormalizeError::Deserialise(_) => "deserialise",
            NormalizeError::MissingField(_) => "missing_field",
            NormalizeError::UnknownEventType(_) => "unknown_event_type",
            NormalizeError::VenueError(_) => "venue_error",
            NormalizeError::InvalidSide(_) => "invalid_side",
            NormalizeError::InvalidDecimal { .. } => "invalid_decimal",
        }
    }
}

/// Operator supplied analysis interval could not be parsed.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Error)]
pub enum IntervalError {
    #[error("InvalidInterval: empty interval")]
    Empty,

    #[error("InvalidInterval: {0} does not start with an integer")]
    MissingAmount(String),

    #[error("InvalidInterval: {0} has a zero length")]
    Zero(String),

    #[error("InvalidInterval: unrecognised unit in {input} (expected one of s, m, h, d, w)")]
    UnknownUnit { input: String },

    #[error("InvalidInterval: {0} overflows the supported range")]
    Overflow(String),
}

/// Failures of the [`TradeStore`](crate::store::TradeStore).
#[derive(Debug, Clone, Eq, PartialEq, Hash, Error)]
pub enum StoreError {
    #[error("StoreUnavailable: {0}")]
    Unavailable(String),

    #[error("corrupt stored record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Determine if the failure is transient infrastructure trouble that a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => Self::Corrupt(value.to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Unavailable(format!("store task failed: {value}"))
    }
}

/// Failures of the live or historical feed.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Error)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode feed response: {0}")]
    Decode(String),

    #[error("SocketError: {0}")]
    Socket(String),

    #[error("invalid feed url: {0}")]
    Url(String),
}

impl FeedError {
    /// Determine if the failure is worth retrying with backoff.
    ///
    /// Venue rate limits (429, 418) and server errors are transient, other client errors
    /// indicate a bad request that will not succeed on retry.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Http(_) | FeedError::Socket(_) => true,
            FeedError::Status { status, .. } => *status == 429 || *status == 418 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Http(value.to_string())
        }
    }
}

impl From<url::ParseError> for FeedError {
    fn from(value: url::ParseError) -> Self {
        Self::Url(value.to_string())
    }
}

/// One analytics tick could not be computed.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Error)]
pub enum AnalyticsError {
    #[error("AnalyticsUnavailable: {0}")]
    Unavailable(#[from] StoreError),
}

/// Failures that end a [`BackfillCoordinator`](crate::backfill::BackfillCoordinator) run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackfillError {
    #[error(
        "BackfillIntegrityExceeded: skipped {skipped} of {seen} historical records \
         (max skip rate {max_skip_rate})"
    )]
    IntegrityExceeded {
        skipped: u64,
        seen: u64,
        max_skip_rate: f64,
    },

    #[error("backfill store failure: {0}")]
    Store(#[from] StoreError),

    #[error("backfill feed failure: {0}")]
    Feed(#[from] FeedError),
}

/// Failures that stop the [`Pipeline`](crate::pipeline::Pipeline) for a market.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Interval(#[from] IntervalError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("backfill failed for {market}: {source}")]
    Backfill {
        market: Market,
        #[source]
        source: BackfillError,
    },

    #[error("pipeline task for {market} terminated unexpectedly: {reason}")]
    Task { market: Market, reason: String },
}
