//! Two-phase barrier for one page render.
//!
//! Renderers that run a local query before they know which users, posts or
//! comments they need take a `Ticket` when they are prepared and give it
//! back once that query is done. Resolver batches wait in `start` until no
//! ticket is outstanding, so a batch sees every id declared by those
//! renderers.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

/// Countdown latch with fungible tickets.
#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    outstanding: Arc<watch::Sender<usize>>,
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchCoordinator {
    /// Creates a coordinator with no outstanding participants.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            outstanding: Arc::new(sender),
        }
    }

    /// Registers one participant.
    #[must_use = "dropping the ticket signals it immediately"]
    pub fn wait(&self) -> Ticket {
        self.outstanding.send_modify(|count| *count += 1);
        Ticket {
            outstanding: Some(self.outstanding.clone()),
        }
    }

    /// Signals that one participant finished its local work.
    pub fn ready(&self, mut ticket: Ticket) {
        ticket.signal();
    }

    /// Number of participants that have not signalled yet.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Yields once so participants registered in the same scheduling step
    /// can land, then waits until every ticket has been signalled.
    pub async fn start(&self) {
        tokio::task::yield_now().await;
        let mut receiver = self.outstanding.subscribe();
        if receiver.wait_for(|count| *count == 0).await.is_err() {
            warn!("batch coordinator closed while waiting");
        }
    }
}

/// One registration with a `BatchCoordinator`. Signalled exactly once,
/// either through `BatchCoordinator::ready` or when dropped.
#[derive(Debug)]
pub struct Ticket {
    outstanding: Option<Arc<watch::Sender<usize>>>,
}

impl Ticket {
    fn signal(&mut self) {
        if let Some(outstanding) = self.outstanding.take() {
            outstanding.send_modify(|count| *count = count.saturating_sub(1));
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.signal();
    }
}
