//! Idle timeout wrapper for feed streams.
//!
//! A venue WebSocket can go silent without sending a close frame. [`IdleTimeout`] ends
//! the wrapped stream when nothing arrives for the configured period, which hands
//! control back to the reconnect loop in [`BinanceLiveFeed`](crate::exchange::binance::live::BinanceLiveFeed).

use futures::Stream;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::Instant;

/// Default idle period before a feed stream is considered dead (2 minutes).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Stream wrapper that terminates once the inner stream has been idle for
/// `timeout_duration`.
#[derive(Debug)]
pub struct IdleTimeout<S> {
    inner: S,
    timeout_duration: Duration,
    deadline: Pin<Box<tokio::time::Sleep>>,
    timed_out: bool,
}

impl<S> IdleTimeout<S> {
    pub fn new(inner: S, timeout_duration: Duration) -> Self {
        Self {
            inner,
            timeout_duration,
            deadline: Box::pin(tokio::time::sleep(timeout_duration)),
            timed_out: false,
        }
    }

    /// Whether the stream ended because the idle period elapsed rather than the
    /// inner stream finishing.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}

impl<S> Stream for IdleTimeout<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.timed_out {
            return Poll::Ready(None);
        }

        let timeout_duration = self.timeout_duration;

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                self.deadline
                    .as_mut()
                    .reset(Instant::now() + timeout_duration);
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => match self.deadline.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    tracing::warn!(
                        timeout_secs = timeout_duration.as_secs(),
                        "feed read timeout - no data received, ending stream"
                    );
                    self.timed_out = true;
                    Poll::Ready(None)
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
