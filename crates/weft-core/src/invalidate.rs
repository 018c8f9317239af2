use tokio::sync::broadcast;

/// Signal that the cached/rendered view at a logical path is stale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidatedPath {
    pub path: String,
}

/// Fire-and-forget invalidation seam consumed by the external web layer.
/// Implementations must never block or fail the caller's success path.
pub trait PathInvalidator: Send + Sync {
    fn invalidate(&self, path: &str);
}

/// Fans invalidation signals out over a broadcast channel. Dropped signals
/// (no subscribers, lagging subscribers) are fine; the contract is
/// best-effort.
pub struct BroadcastInvalidator {
    tx: broadcast::Sender<InvalidatedPath>,
}

impl BroadcastInvalidator {
    pub fn new(tx: broadcast::Sender<InvalidatedPath>) -> Self {
        Self { tx }
    }
}

impl PathInvalidator for BroadcastInvalidator {
    fn invalidate(&self, path: &str) {
        let event = InvalidatedPath {
            path: path.to_string(),
        };
        if self.tx.send(event).is_err() {
            tracing::debug!(path, "no invalidation subscribers");
        }
    }
}

/// Discards invalidation signals. For tests and library embedding.
pub struct NoopInvalidator;

impl PathInvalidator for NoopInvalidator {
    fn invalidate(&self, _path: &str) {}
}
