use std::collections::BTreeMap;
use std::time::Duration;

use sockline_frame::Value;
use tokio::time::Instant;

use crate::event::{AckCallback, AckReply};

/// Cadence of the expiry sweep.
pub const ACK_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Stand-in for deadlines too far out to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + delay`, saturating at a point that never arrives in practice.
pub(crate) fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

struct AckEntry {
    deadline: Instant,
    callback: AckCallback,
}

/// Pending acknowledgement callbacks keyed by correlation id.
///
/// Ids start at 1 and are never reused for the lifetime of the correlator.
/// Every entry is removed before its callback runs, so each callback fires
/// exactly once: on reply, on expiry, or on [`AckCorrelator::cancel_all`].
pub struct AckCorrelator {
    next_id: u64,
    entries: BTreeMap<u64, AckEntry>,
}

impl Default for AckCorrelator {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }
}

impl AckCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `callback` and return its id.
    pub fn allocate(&mut self, callback: AckCallback, timeout: Duration, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            AckEntry {
                deadline: deadline_after(now, timeout),
                callback,
            },
        );
        id
    }

    /// Deliver a reply. Unknown ids (late or duplicate replies) are ignored.
    pub fn resolve(&mut self, id: u64, args: Vec<Value>) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                (entry.callback)(AckReply::Acked(args));
                true
            }
            None => false,
        }
    }

    /// Fire the timeout sentinel for every entry past its deadline.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(entry) = self.entries.remove(id) {
                (entry.callback)(AckReply::TimedOut);
            }
        }
        expired.len()
    }

    /// Resolve every pending entry with `reply`.
    pub fn cancel_all(&mut self, reply: AckReply) -> usize {
        let entries = std::mem::take(&mut self.entries);
        let count = entries.len();
        for entry in entries.into_values() {
            (entry.callback)(reply.clone());
        }
        count
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
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
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<AckReply>>>, impl Fn() -> AckCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let make = move || {
            let sink = sink.clone();
            Box::new(move |reply: AckReply| sink.lock().unwrap().push(reply)) as AckCallback
        };
        (seen, make)
    }

    #[test]
    fn ids_are_positive_and_increasing() {
        let (_, make) = recorder();
        let mut acks = AckCorrelator::new();
        let now = Instant::now();
        let a = acks.allocate(make(), Duration::from_secs(1), now);
        let b = acks.allocate(make(), Duration::from_secs(1), now);
        assert_eq!((a, b), (1, 2));
        acks.resolve(a, vec![]);
        assert_eq!(acks.allocate(make(), Duration::from_secs(1), now), 3);
    }

    #[test]
    fn resolve_before_deadline_fires_once() {
        let (seen, make) = recorder();
        let mut acks = AckCorrelator::new();
        let now = Instant::now();
        let id = acks.allocate(make(), Duration::from_secs(2), now);

        assert!(acks.resolve(id, vec![Value::from("ok")]));
        assert!(!acks.resolve(id, vec![Value::from("dup")]));
        assert_eq!(acks.sweep(now + Duration::from_secs(5)), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![AckReply::Acked(vec![Value::from("ok")])]
        );
    }

    #[test]
    fn sweep_expires_only_past_deadline() {
        let (seen, make) = recorder();
        let mut acks = AckCorrelator::new();
        let now = Instant::now();
        let short = acks.allocate(make(), Duration::from_secs(2), now);
        let long = acks.allocate(make(), Duration::from_secs(8), now);

        assert_eq!(acks.sweep(now + Duration::from_secs(1)), 0);
        assert_eq!(acks.sweep(now + Duration::from_secs(2)), 1);
        assert!(!acks.is_pending(short));
        assert!(acks.is_pending(long));
        assert!(!acks.resolve(short, vec![]));
        assert_eq!(*seen.lock().unwrap(), vec![AckReply::TimedOut]);
    }

    #[test]
    fn unbounded_timeout_never_expires() {
        let (seen, make) = recorder();
        let mut acks = AckCorrelator::new();
        let now = Instant::now();
        let id = acks.allocate(make(), Duration::MAX, now);

        assert_eq!(acks.sweep(now + Duration::from_secs(86400 * 365)), 0);
        assert!(acks.resolve(id, vec![Value::from("late")]));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![AckReply::Acked(vec![Value::from("late")])]
        );
    }

    #[test]
    fn cancel_all_drains_with_sentinel() {
        let (seen, make) = recorder();
        let mut acks = AckCorrelator::new();
        let now = Instant::now();
        acks.allocate(make(), Duration::from_secs(2), now);
        acks.allocate(make(), Duration::from_secs(2), now);

        assert_eq!(acks.cancel_all(AckReply::Disconnected), 2);
        assert!(acks.is_empty());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![AckReply::Disconnected, AckReply::Disconnected]
        );
    }
}
