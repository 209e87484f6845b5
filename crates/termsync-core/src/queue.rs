//! Thread-safe event intake shared between the transport callback and the
//! supervisor loop.
//!
//! The transport may re-deliver the same entries many times (it snapshots a
//! whole index->value map on every change), so admission is keyed on a
//! strictly increasing index: anything at or below the last seen index is
//! dropped silently. The callback side only enqueues and the supervisor side
//! only drains; neither ever blocks on the other.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Deduplicating, index-ordered queue for external input events.
#[derive(Debug, Default)]
pub struct SequencedEventQueue {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// `None` is the unseen state; restarts reset back to it.
    last_seen: Option<u64>,
    values: VecDeque<String>,
}

impl SequencedEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a single notification. Returns false if the index was already
    /// seen (the event is dropped).
    pub fn admit(&self, index: u64, value: String) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.last_seen.is_some_and(|seen| index <= seen) {
            return false;
        }
        inner.last_seen = Some(index);
        inner.values.push_back(value);
        true
    }

    /// Admit a batched snapshot. Entries are admitted in ascending index
    /// order regardless of how the batch was delivered, so `last_seen`
    /// advances monotonically on the same path as single events.
    pub fn admit_batch(&self, mut entries: Vec<(u64, String)>) {
        entries.sort_by_key(|(index, _)| *index);
        for (index, value) in entries {
            self.admit(index, value);
        }
    }

    /// Take all currently queued values without blocking.
    pub fn drain(&self) -> Vec<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.values.drain(..).collect()
    }

    /// Clear queued values and return the index to the unseen state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.last_seen = None;
        inner.values.clear();
    }

    /// Last admitted index, if any.
    pub fn last_seen(&self) -> Option<u64> {
        self.inner.lock().unwrap().last_seen
    }
}

/// Intake for plan-mode control signals.
///
/// The first notification after subscribing reflects pre-existing external
/// state rather than a change, so it only arms the queue and is otherwise
/// discarded. Multiple toggles between drains coalesce to the latest value.
#[derive(Debug, Default)]
pub struct ControlQueue {
    inner: Mutex<ControlInner>,
}

#[derive(Debug, Default)]
struct ControlInner {
    initialized: bool,
    pending: Option<bool>,
}

impl ControlQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&self, plan_mode: bool) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.initialized {
            inner.initialized = true;
            return;
        }
        inner.pending = Some(plan_mode);
    }

    /// Take the most recent control value, if one was observed.
    pub fn drain(&self) -> Option<bool> {
        self.inner.lock().unwrap().pending.take()
    }

    /// Drop any pending value across a restart. Arming is preserved: the
    /// subscription snapshot was already absorbed once, and the transport
    /// reports only genuine changes after that, so a toggle arriving after a
    /// restart must still come through.
    pub fn reset(&self) {
        self.inner.lock().unwrap().pending = None;
    }
}
