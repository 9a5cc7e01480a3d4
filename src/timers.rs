use std::time::Duration;

use tokio::time::Instant;

/// Single-threaded queue of delayed callbacks, at most one per kind.
///
/// Posting a kind that is already pending replaces the earlier entry, which
/// mirrors "remove callbacks, then post delayed" on a UI message loop.
#[derive(Debug)]
pub struct DelayedCallbacks<K> {
    pending: Vec<Pending<K>>,
    next_seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct Pending<K> {
    kind: K,
    deadline: Instant,
    seq: u64,
}

impl<K: Copy + PartialEq> DelayedCallbacks<K> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn post(&mut self, kind: K, delay: Duration, now: Instant) {
        self.cancel(kind);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(Pending {
            kind,
            deadline: now + delay,
            seq,
        });
    }

    /// Returns `true` when a pending callback was removed.
    pub fn cancel(&mut self, kind: K) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.kind != kind);
        before != self.pending.len()
    }

    pub fn deadline(&self, kind: K) -> Option<Instant> {
        self.pending
            .iter()
            .find(|p| p.kind == kind)
            .map(|p| p.deadline)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.deadline).min()
    }

    /// Removes and returns the earliest callback due at `now`. Ties run in
    /// posting order.
    pub fn pop_due(&mut self, now: Instant) -> Option<K> {
        let idx = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.deadline <= now)
            .min_by_key(|(_, p)| (p.deadline, p.seq))
            .map(|(idx, _)| idx)?;
        Some(self.pending.remove(idx).kind)
    }

    pub fn count(&self, kind: K) -> usize {
        self.pending.iter().filter(|p| p.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<K: Copy + PartialEq> Default for DelayedCallbacks<K> {
    fn default() -> Self {
        Self::new()
    }
}
