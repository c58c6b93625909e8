//! Result mailbox: single value, single writer, single reader.

use failfast_core::Payload;
use tokio::sync::oneshot;

/// Create a connected result mailbox.
pub fn mailbox() -> (ResultSender, ResultReceiver) {
    let (tx, rx) = oneshot::channel();
    (ResultSender(tx), ResultReceiver(rx))
}

/// Write half, owned by the worker running the work item.
#[derive(Debug)]
pub struct ResultSender(oneshot::Sender<Payload>);

impl ResultSender {
    /// Deliver the payload. Returns false if the reader is already gone.
    pub fn deliver(self, payload: Payload) -> bool {
        self.0.send(payload).is_ok()
    }
}

/// Read half, owned by the supervisor.
#[derive(Debug)]
pub struct ResultReceiver(oneshot::Receiver<Payload>);

impl ResultReceiver {
    /// Take the payload if it has been delivered. Never blocks.
    pub fn try_take(&mut self) -> Option<Payload> {
        self.0.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deliver_then_take() {
        let (tx, mut rx) = mailbox();
        assert!(rx.try_take().is_none());
        assert!(tx.deliver(json!({ "users": 2 })));
        assert_eq!(rx.try_take(), Some(json!({ "users": 2 })));
    }

    #[test]
    fn test_take_drains_once() {
        let (tx, mut rx) = mailbox();
        tx.deliver(json!(1));
        assert!(rx.try_take().is_some());
        assert!(rx.try_take().is_none());
    }

    #[test]
    fn test_deliver_without_reader() {
        let (tx, rx) = mailbox();
        drop(rx);
        assert!(!tx.deliver(json!(null)));
    }

    #[test]
    fn test_sender_dropped_without_value() {
        let (tx, mut rx) = mailbox();
        drop(tx);
        assert!(rx.try_take().is_none());
    }
}
