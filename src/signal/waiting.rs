use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::registry::ClientId;
use super::room::RoomDescription;
use crate::error::{RelayError, Result};

/// How a join request ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum JoinOutcome {
    Admitted { description: RoomDescription },
    Full,
    NoProvider,
    /// A later join from the same client replaced this request
    Superseded,
}

/// Invoked once with the outcome of a join request
pub type JoinCallback = Box<dyn FnOnce(JoinOutcome) + Send + Sync + 'static>;

pub struct PendingRequest {
    room: String,
    seq: u64,
    callback: JoinCallback,
}

impl PendingRequest {
    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn complete(self, outcome: JoinOutcome) {
        (self.callback)(outcome)
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("room", &self.room)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

/// Patients offered to providers and waiting for one of them to accept
#[derive(Debug, Default)]
pub struct WaitingQueue {
    pending: HashMap<ClientId, PendingRequest>,
    next_seq: u64,
}

impl WaitingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, client_id: &str, room: &str, callback: JoinCallback) -> Result<()> {
        if self.pending.contains_key(client_id) {
            return Err(RelayError::AlreadyPending(client_id.to_string()));
        }

        self.next_seq += 1;
        self.pending.insert(
            client_id.to_string(),
            PendingRequest {
                room: room.to_string(),
                seq: self.next_seq,
                callback,
            },
        );
        Ok(())
    }

    /// Remove the entry without completing it, handing it to the caller
    pub fn take(&mut self, client_id: &str) -> Option<PendingRequest> {
        self.pending.remove(client_id)
    }

    /// Complete and remove the entry. Resolving a missing entry is a no-op.
    pub fn resolve(&mut self, client_id: &str, outcome: JoinOutcome) -> bool {
        match self.take(client_id) {
            Some(request) => {
                request.complete(outcome);
                true
            }
            None => false,
        }
    }

    /// Drop the entry without invoking its callback
    pub fn cancel(&mut self, client_id: &str) -> bool {
        self.pending.remove(client_id).is_some()
    }

    pub fn is_pending(&self, client_id: &str) -> bool {
        self.pending.contains_key(client_id)
    }

    /// Patients waiting for `room`, oldest request first
    pub fn waiting_for(&self, room: &str) -> Vec<ClientId> {
        let mut waiting: Vec<(&ClientId, u64)> = self
            .pending
            .iter()
            .filter(|(_, request)| request.room == room)
            .map(|(id, request)| (id, request.seq))
            .collect();
        waiting.sort_by_key(|(_, seq)| *seq);
        waiting.into_iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn recorder() -> (JoinCallback, mpsc::UnboundedReceiver<JoinOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: JoinCallback = Box::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        (callback, rx)
    }

    #[test]
    fn test_enqueue_and_resolve_once() {
        let mut queue = WaitingQueue::new();
        let (callback, mut rx) = recorder();

        queue.enqueue("pat", "clinic", callback).unwrap();
        assert!(queue.is_pending("pat"));
        assert_eq!(queue.waiting_for("clinic"), vec!["pat"]);

        assert!(queue.resolve("pat", JoinOutcome::Full));
        assert_eq!(rx.try_recv().unwrap(), JoinOutcome::Full);

        assert!(!queue.resolve("pat", JoinOutcome::Full));
        assert!(rx.try_recv().is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_duplicate_enqueue_rejected() {
        let mut queue = WaitingQueue::new();
        let (first, _rx1) = recorder();
        let (second, _rx2) = recorder();

        queue.enqueue("pat", "clinic", first).unwrap();
        let err = queue.enqueue("pat", "other", second).unwrap_err();
        assert!(matches!(err, RelayError::AlreadyPending(_)));
        assert_eq!(queue.waiting_for("clinic"), vec!["pat"]);
        assert!(queue.waiting_for("other").is_empty());
    }

    #[test]
    fn test_cancel_does_not_invoke_callback() {
        let mut queue = WaitingQueue::new();
        let (callback, mut rx) = recorder();
        queue.enqueue("pat", "clinic", callback).unwrap();

        assert!(queue.cancel("pat"));
        assert!(!queue.cancel("pat"));
        // Sender dropped with the entry, nothing was delivered
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_resolve_missing_is_noop() {
        let mut queue = WaitingQueue::new();
        assert!(!queue.resolve("ghost", JoinOutcome::Superseded));
    }

    #[test]
    fn test_waiting_for_is_oldest_first() {
        let mut queue = WaitingQueue::new();
        let mut receivers = Vec::new();
        for (id, room) in [("p3", "a"), ("p1", "a"), ("p9", "b"), ("p2", "a")] {
            let (callback, rx) = recorder();
            receivers.push(rx);
            queue.enqueue(id, room, callback).unwrap();
        }

        assert_eq!(queue.waiting_for("a"), vec!["p3", "p1", "p2"]);
        assert_eq!(queue.waiting_for("b"), vec!["p9"]);
        assert!(queue.waiting_for("c").is_empty());
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_take_hands_over_entry() {
        let mut queue = WaitingQueue::new();
        let (callback, mut rx) = recorder();
        queue.enqueue("pat", "clinic", callback).unwrap();

        let request = queue.take("pat").unwrap();
        assert!(!queue.is_pending("pat"));
        assert_eq!(request.room(), "clinic");

        request.complete(JoinOutcome::NoProvider);
        assert_eq!(rx.try_recv().unwrap(), JoinOutcome::NoProvider);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(JoinOutcome::NoProvider).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "noProvider" }));

        let json = serde_json::to_value(JoinOutcome::Admitted {
            description: RoomDescription::default(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "status": "admitted", "description": { "clients": {} } })
        );
    }
}
