use derive_more::Display;
use tokio::sync::watch;

/// Outcome of the startup backfill as far as readiness is concerned.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display)]
pub enum BackfillStatus {
    #[default]
    #[display("pending")]
    Pending,
    #[display("complete")]
    Complete,
    #[display("not_needed")]
    NotNeeded,
    #[display("failed")]
    Failed,
}

impl BackfillStatus {
    /// Backfill has been determined, either run to completion or deemed unnecessary.
    pub fn is_determined(&self) -> bool {
        matches!(self, BackfillStatus::Complete | BackfillStatus::NotNeeded)
    }
}

/// Per-market liveness & readiness state.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct ReadinessState {
    pub backfill: BackfillStatus,
    pub first_live_trade: bool,
}

impl ReadinessState {
    /// Ready once the first live trade is stored and backfill-or-no-backfill is determined.
    pub fn is_ready(&self) -> bool {
        self.first_live_trade && self.backfill.is_determined()
    }
}

/// Publisher half of a market's readiness signal.
///
/// Observers obtain a [`watch::Receiver`] via [`Readiness::subscribe`] and await the
/// transition with [`Readiness::wait_ready`].
#[derive(Debug)]
pub struct Readiness {
    tx: watch::Sender<ReadinessState>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ReadinessState::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> ReadinessState {
        *self.tx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn set_backfill(&self, status: BackfillStatus) {
        self.tx.send_if_modified(|state| {
            let modified = state.backfill != status;
            state.backfill = status;
            modified
        });
    }

    /// Record that the first live trade has been stored. Returns `true` on the first call.
    pub fn mark_first_live_trade(&self) -> bool {
        self.tx.send_if_modified(|state| {
            let first = !state.first_live_trade;
            state.first_live_trade = true;
            first
        })
    }

    /// Wait until the market is ready. Returns `false` if the publisher is dropped first.
    pub async fn wait_ready(rx: &mut watch::Receiver<ReadinessState>) -> bool {
        rx.wait_for(ReadinessState::is_ready).await.is_ok()
    }
}
