//! Backend-initiated restart requests.
//!
//! A backend that finds its own state unusable fires its `RestartNotifier`
//! instead of failing whichever call happened to notice. The owning manager
//! consumes the requests in a supervisory loop, tears the pindex down and
//! rebuilds it from `New`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Request to rebuild one pindex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartRequest {
    pub pindex_name: String,
    pub reason: String,
}

/// Capability handed to a backend at construction.
///
/// Clones share one "fired" flag, so a pindex asks for at most one restart
/// no matter how many of its code paths notice the failure.
#[derive(Debug, Clone)]
pub struct RestartNotifier {
    pindex_name: String,
    tx: Option<mpsc::UnboundedSender<RestartRequest>>,
    fired: Arc<AtomicBool>,
}

impl RestartNotifier {
    /// Create a notifier and the receiver its requests arrive on.
    pub fn channel(pindex_name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<RestartRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::from_sender(pindex_name, tx), rx)
    }

    /// Notifier bound to an existing supervisor channel.
    pub fn from_sender(
        pindex_name: impl Into<String>,
        tx: mpsc::UnboundedSender<RestartRequest>,
    ) -> Self {
        Self {
            pindex_name: pindex_name.into(),
            tx: Some(tx),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Notifier with nobody listening; requests are logged and dropped.
    pub fn detached(pindex_name: impl Into<String>) -> Self {
        Self {
            pindex_name: pindex_name.into(),
            tx: None,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pindex_name(&self) -> &str {
        &self.pindex_name
    }

    /// Ask the owner to rebuild this pindex. Only the first call sends.
    pub fn notify(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!(pindex = %self.pindex_name, %reason, "Restart already requested");
            return;
        }

        warn!(pindex = %self.pindex_name, %reason, "Backend requested restart");

        let Some(tx) = &self.tx else {
            return;
        };
        let request = RestartRequest {
            pindex_name: self.pindex_name.clone(),
            reason,
        };
        if tx.send(request).is_err() {
            warn!(pindex = %self.pindex_name, "Restart supervisor is gone");
        }
    }

    /// True once `notify` has been called on this notifier or a clone.
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_sends_once() {
        let (notifier, mut rx) = RestartNotifier::channel("p1");
        let clone = notifier.clone();

        notifier.notify("commit failed");
        clone.notify("second failure");

        let req = rx.try_recv().unwrap();
        assert_eq!(req.pindex_name, "p1");
        assert_eq!(req.reason, "commit failed");
        assert!(rx.try_recv().is_err());
        assert!(clone.has_fired());
    }

    #[test]
    fn test_detached_notify_is_harmless() {
        let notifier = RestartNotifier::detached("p2");
        assert!(!notifier.has_fired());
        notifier.notify("whatever");
        assert!(notifier.has_fired());
        assert_eq!(notifier.pindex_name(), "p2");
    }

    #[test]
    fn test_notify_after_receiver_dropped() {
        let (notifier, rx) = RestartNotifier::channel("p3");
        drop(rx);
        notifier.notify("late");
        assert!(notifier.has_fired());
    }
}
