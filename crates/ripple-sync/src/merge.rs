//! Two-layer merge of a conversation's message view.
//!
//! The confirmed layer mirrors the server feed. The pending layer holds
//! optimistic sends that have not been confirmed yet; it is mutated only
//! through the sync task's commands and through reconciliation, never by
//! the send orchestrator directly. The merged output is the full list,
//! sorted by timestamp with insertion order breaking ties.

use chrono::Duration;

use ripple_shared::constants::RECONCILE_WINDOW_SECS;
use ripple_shared::{DeliveryState, Message, MessageId};

struct Entry {
    message: Message,
    /// Insertion sequence, used as the sort tie-breaker.
    seq: u64,
}

pub struct MergeState {
    confirmed: Vec<Entry>,
    pending: Vec<Entry>,
    next_seq: u64,
}

impl MergeState {
    pub fn new() -> Self {
        Self {
            confirmed: Vec::new(),
            pending: Vec::new(),
            next_seq: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Load the initial bulk read into the confirmed layer.
    pub fn seed(&mut self, initial: Vec<Message>) {
        for message in initial {
            let seq = self.next_seq();
            self.confirmed.push(Entry { message, seq });
        }
    }

    /// Apply a newly confirmed message from the server feed.
    ///
    /// A redelivered document (same id) only refreshes the stored copy.
    /// Otherwise any pending entry matching the confirmed one by content,
    /// author and timestamp window is reconciled away; the confirmed
    /// copy's identity wins.
    pub fn apply_added(&mut self, message: Message) {
        if let Some(existing) = self.confirmed.iter_mut().find(|e| e.message.id == message.id) {
            let advanced = existing.message.delivery_state.advance(message.delivery_state);
            existing.message = message;
            existing.message.delivery_state = advanced;
            return;
        }
        self.reconcile(&message);
        let seq = self.next_seq();
        self.confirmed.push(Entry { message, seq });
    }

    /// Apply a delivery-receipt change to a confirmed message.
    ///
    /// Delivery state only advances along the ladder, never backwards.
    pub fn apply_modified(&mut self, message: Message) {
        if let Some(existing) = self.confirmed.iter_mut().find(|e| e.message.id == message.id) {
            existing.message.delivery_state = existing
                .message
                .delivery_state
                .advance(message.delivery_state);
        }
    }

    /// Overlay an optimistic send.
    pub fn insert_pending(&mut self, message: Message) {
        let seq = self.next_seq();
        self.pending.push(Entry { message, seq });
    }

    /// Mark a pending entry as failed. It stays visible until the caller
    /// explicitly retries or discards it.
    pub fn mark_failed(&mut self, id: &MessageId) -> bool {
        match self.pending.iter_mut().find(|e| &e.message.id == id) {
            Some(entry) => {
                entry.message.delivery_state = DeliveryState::Failed;
                true
            }
            None => false,
        }
    }

    /// Reset a failed entry to pending for a retry, returning a copy of
    /// the message so the persistence write can be re-issued.
    pub fn restore_pending(&mut self, id: &MessageId) -> Option<Message> {
        self.pending.iter_mut().find(|e| &e.message.id == id).map(|entry| {
            entry.message.delivery_state = DeliveryState::Pending;
            entry.message.clone()
        })
    }

    /// Drop a pending entry (explicit discard of a failed send).
    pub fn discard_pending(&mut self, id: &MessageId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|e| &e.message.id != id);
        self.pending.len() != before
    }

    /// Remove the pending entry the confirmed message corresponds to, if
    /// any. Optimistic entries carry no server id, so the match is by
    /// author + content within the reconciliation window.
    fn reconcile(&mut self, confirmed: &Message) {
        let window = Duration::seconds(RECONCILE_WINDOW_SECS);
        let matched = self.pending.iter().position(|e| {
            let p = &e.message;
            p.sender_id == confirmed.sender_id
                && p.text == confirmed.text
                && p.attachment == confirmed.attachment
                && (p.timestamp - confirmed.timestamp).abs() <= window
        });
        if let Some(index) = matched {
            self.pending.remove(index);
        }
    }

    /// The full merged view: confirmed plus remaining pending, sorted by
    /// timestamp, insertion order breaking ties.
    pub fn snapshot(&self) -> Vec<Message> {
        let mut entries: Vec<(&Message, u64)> = self
            .confirmed
            .iter()
            .chain(self.pending.iter())
            .map(|e| (&e.message, e.seq))
            .collect();
        entries.sort_by_key(|(m, seq)| (m.timestamp, *seq));
        entries.into_iter().map(|(m, _)| m.clone()).collect()
    }
}

impl Default for MergeState {
    fn default() -> Self {
        Self::new()
    }
}
