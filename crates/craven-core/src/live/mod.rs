//! ============================================================================
//! Live Module - Realtime-backed widgets
//! ============================================================================
//! Each watcher owns its own subscription (no sharing between mounted
//! instances) and a cancellation token derived from the client's shutdown
//! token. Dropping the watcher or tearing down the client stops it; events
//! that arrive afterwards are never applied.
//! ============================================================================

mod flags;
mod points;

pub use flags::FlagWatcher;
pub use points::{PointsDisplay, PointsWatcher};

use tokio_util::sync::CancellationToken;

/// Cancels its token when dropped
struct WatchGuard {
    token: CancellationToken,
}

impl WatchGuard {
    fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
