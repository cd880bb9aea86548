//! Process-wide graceful shutdown broadcast (SPEC_FULL.md §5 "Graceful
//! shutdown"). One `ShutdownSignal` is created at daemon startup and
//! cloned into the HTTP server and every background loop; triggering it
//! fans out to every subscriber at once.

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 16;

#[derive(Clone)]
pub struct ShutdownSignal {
    tx: broadcast::Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Fan the shutdown signal out to every current subscriber.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn guard(&self, component: &'static str) -> ShutdownGuard {
        ShutdownGuard { component }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Dropped (or explicitly confirmed) once a background loop has finished
/// draining, so the daemon's exit path has a record every component
/// actually stopped rather than just that the signal fired.
pub struct ShutdownGuard {
    component: &'static str,
}

impl ShutdownGuard {
    pub fn confirm(self) {
        tracing::debug!(component = self.component, "component drained");
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        tracing::debug!(component = self.component, "shutdown guard released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_every_subscriber() {
        let signal = ShutdownSignal::new();
        let mut a = signal.subscribe();
        let mut b = signal.subscribe();
        signal.trigger();
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[tokio::test]
    async fn late_subscriber_does_not_see_a_past_trigger() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        let mut late = signal.subscribe();
        assert!(matches!(late.try_recv(), Err(tokio::sync::broadcast::error::TryRecvError::Empty)));
    }

    #[test]
    fn guard_confirm_does_not_panic() {
        let signal = ShutdownSignal::new();
        signal.guard("test-component").confirm();
    }
}
