use std::collections::VecDeque;
use std::time::Duration;

use sockline_frame::Value;

use crate::config::OfflineQueuePolicy;
use crate::event::AckCallback;

/// An emission waiting for its namespace to become ready.
pub struct OfflineEntry {
    pub namespace: String,
    pub event: String,
    pub args: Vec<Value>,
    /// Acknowledgement callback and its timeout; the countdown starts when
    /// the entry is finally sent.
    pub ack: Option<(AckCallback, Duration)>,
}

impl std::fmt::Debug for OfflineEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineEntry")
            .field("namespace", &self.namespace)
            .field("event", &self.event)
            .field("args", &self.args)
            .field("ack", &self.ack.is_some())
            .finish()
    }
}

/// What happened to a pushed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after dropping the oldest entry.
    Evicted,
    /// The queue is disabled; the entry was dropped.
    Dropped,
}

/// Bounded FIFO of emissions. Never blocks: a full queue drops its oldest
/// entry without invoking that entry's callback.
pub struct OfflineQueue {
    policy: OfflineQueuePolicy,
    entries: VecDeque<OfflineEntry>,
}

impl OfflineQueue {
    pub fn new(policy: OfflineQueuePolicy) -> Self {
        Self {
            entries: VecDeque::with_capacity(policy.max_items.min(64)),
            policy,
        }
    }

    pub fn push(&mut self, entry: OfflineEntry) -> PushOutcome {
        if !self.policy.enabled || self.policy.max_items == 0 {
            return PushOutcome::Dropped;
        }
        let mut outcome = PushOutcome::Queued;
        while self.entries.len() >= self.policy.max_items {
            self.entries.pop_front();
            outcome = PushOutcome::Evicted;
        }
        self.entries.push_back(entry);
        outcome
    }

    /// Remove and return every entry for `namespace`, oldest first.
    pub fn drain_namespace(&mut self, namespace: &str) -> Vec<OfflineEntry> {
        let (matching, rest): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.namespace == namespace);
        self.entries = rest;
        matching.into()
    }

    /// Remove and return every entry, oldest first.
    pub fn flush(&mut self) -> Vec<OfflineEntry> {
        std::mem::take(&mut self.entries).into()
    }

    /// Re-address entries queued for `from` to `to`.
    pub fn retarget(&mut self, from: &str, to: &str) {
        for entry in self.entries.iter_mut().filter(|e| e.namespace == from) {
            entry.namespace = to.to_string();
        }
    }

    /// Abandon every entry without invoking callbacks.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn entry(namespace: &str, n: i64) -> OfflineEntry {
        OfflineEntry {
            namespace: namespace.to_string(),
            event: "msg".to_string(),
            args: vec![Value::from(n)],
            ack: None,
        }
    }

    fn numbers(entries: &[OfflineEntry]) -> Vec<i64> {
        entries
            .iter()
            .filter_map(|e| e.args[0].as_i64())
            .collect()
    }

    fn queue(max_items: usize) -> OfflineQueue {
        OfflineQueue::new(OfflineQueuePolicy {
            enabled: true,
            max_items,
        })
    }

    #[test]
    fn overflow_keeps_most_recent_in_order() {
        let mut q = queue(3);
        for n in 1..=3 {
            assert_eq!(q.push(entry("/", n)), PushOutcome::Queued);
        }
        assert_eq!(q.push(entry("/", 4)), PushOutcome::Evicted);
        assert_eq!(numbers(&q.flush()), vec![2, 3, 4]);
        assert!(q.is_empty());
    }

    #[test]
    fn evicted_callbacks_are_not_invoked() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut q = queue(1);
        let counter = calls.clone();
        let mut first = entry("/", 1);
        first.ack = Some((
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_secs(1),
        ));
        q.push(first);
        q.push(entry("/", 2));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn drain_namespace_preserves_relative_order() {
        let mut q = queue(10);
        q.push(entry("/a", 1));
        q.push(entry("/b", 2));
        q.push(entry("/a", 3));
        q.push(entry("/b", 4));

        assert_eq!(numbers(&q.drain_namespace("/a")), vec![1, 3]);
        assert_eq!(numbers(&q.flush()), vec![2, 4]);
    }

    #[test]
    fn disabled_queue_drops() {
        let mut q = OfflineQueue::new(OfflineQueuePolicy {
            enabled: false,
            max_items: 10,
        });
        assert_eq!(q.push(entry("/", 1)), PushOutcome::Dropped);
        assert!(q.is_empty());
    }

    #[test]
    fn retarget_moves_entries() {
        let mut q = queue(10);
        q.push(entry("/v2", 1));
        q.push(entry("/other", 2));
        q.retarget("/v2", "/v1");
        assert_eq!(numbers(&q.drain_namespace("/v1")), vec![1]);
        assert_eq!(q.clear(), 1);
    }
}
