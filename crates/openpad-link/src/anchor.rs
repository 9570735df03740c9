//! In-flight transfer tracking.
//!
//! A transfer is anchored just before it is handed to the transport and
//! released by its completion handler. Teardown uses the anchor to wait for
//! outstanding work and, if the transport never answers, to synthesize the
//! missing completions so buffer ownership is settled either way.

use openpad_usb_common::TransferId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Notify;

/// Which channel a transfer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    Inbound,
    Outbound,
}

#[derive(Debug, Default)]
pub struct Anchor {
    in_flight: Mutex<HashMap<TransferId, TransferKind>>,
    emptied: Notify,
}

impl Anchor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchor(&self, id: TransferId, kind: TransferKind) {
        self.in_flight.lock().insert(id, kind);
    }

    /// Remove `id`, returning `false` if it was not anchored.
    ///
    /// A `false` return from a completion handler means teardown already
    /// synthesized this completion and the caller must not reuse the buffer.
    pub fn release(&self, id: TransferId) -> bool {
        let mut in_flight = self.in_flight.lock();
        let removed = in_flight.remove(&id).is_some();
        if removed && in_flight.is_empty() {
            self.emptied.notify_waiters();
        }
        removed
    }

    pub fn contains(&self, id: TransferId) -> bool {
        self.in_flight.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.lock().is_empty()
    }

    /// Snapshot of everything in flight, sorted by id.
    pub fn in_flight(&self) -> Vec<(TransferId, TransferKind)> {
        let mut entries: Vec<_> = self
            .in_flight
            .lock()
            .iter()
            .map(|(id, kind)| (*id, *kind))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    /// Wait until nothing is anchored. Returns `false` on timeout.
    pub async fn wait_empty(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                // Registered before the check so a release in between is not missed.
                let notified = self.emptied.notified();
                if self.is_empty() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }

    /// Drop every entry and return what was dropped.
    pub fn force_release_all(&self) -> Vec<(TransferId, TransferKind)> {
        let mut in_flight = self.in_flight.lock();
        let mut drained: Vec<_> = in_flight.drain().collect();
        drained.sort_by_key(|(id, _)| *id);
        if !drained.is_empty() {
            self.emptied.notify_waiters();
        }
        drained
    }
}
