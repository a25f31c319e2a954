//! Realtime fan-out of store mutations to registered observers. One
//! subscription abstraction covers both delivery strategies: a push channel
//! from the backend when it has one, and a polling fallback otherwise. Both
//! paths funnel into the same diff-reconcile routines keyed by last-seen
//! state, so events fire at most once per logical change regardless of which
//! strategy noticed it first.

pub mod scoped;
pub mod session;

pub use scoped::Subscription;
pub use session::{SessionListener, SyncLayer, DEFAULT_POLL_INTERVAL};

use citadel_store::StoreChange;
use tokio::sync::broadcast;
use tokio::time::Interval;
use tracing::warn;

/// What woke a reconcile loop up.
pub(crate) enum Signal {
    /// Push delivery: a specific key was mutated.
    Changed(String),
    /// Poll tick, a lagged watch channel, or no watch channel at all; the
    /// observer must reconcile everything it tracks.
    Sweep,
}

/// Wait for the next wake-up. Degrades to pure polling if the watch channel
/// closes mid-session.
pub(crate) async fn next_signal(
    watch: &mut Option<broadcast::Receiver<StoreChange>>,
    poll: &mut Interval,
) -> Signal {
    if let Some(rx) = watch.as_mut() {
        tokio::select! {
            change = rx.recv() => match change {
                Ok(change) => Signal::Changed(change.key),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("store watch lagged by {n} changes, sweeping");
                    Signal::Sweep
                }
                Err(broadcast::error::RecvError::Closed) => {
                    *watch = None;
                    Signal::Sweep
                }
            },
            _ = poll.tick() => Signal::Sweep,
        }
    } else {
        poll.tick().await;
        Signal::Sweep
    }
}
