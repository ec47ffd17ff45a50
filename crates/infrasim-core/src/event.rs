//! Step events and passive listeners.
//!
//! The simulator emits events while committing a step and delivers them in
//! one batch once the step is done. Each event kind has its own bounded
//! [`EventBuffer`]; when a buffer fills up the oldest events are dropped,
//! and the loss is logged as a warning when the batch is delivered.
//!
//! Listeners are read-only. They observe the run but cannot change it.
//!
//! Event kinds can be suppressed via [`EventBus::suppress`]. Suppressed
//! events are never buffered.

use crate::fixed::Ticks;
use crate::validation::Violation;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. Every event carries the clock value of the step it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A step starting at `time` and covering `time_step` ticks was published.
    StepCommitted { time: Ticks, time_step: Ticks },
    /// Verification of the step starting at `time` failed.
    ViolationDetected { time: Ticks, violation: Violation },
}

/// Discriminant of [`Event`], used for buffer lookup and suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StepCommitted,
    ViolationDetected,
}

const EVENT_KIND_COUNT: usize = 2;

const EVENT_KINDS: [EventKind; EVENT_KIND_COUNT] =
    [EventKind::StepCommitted, EventKind::ViolationDetected];

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::StepCommitted { .. } => EventKind::StepCommitted,
            Event::ViolationDetected { .. } => EventKind::ViolationDetected,
        }
    }

    pub fn time(&self) -> Ticks {
        match self {
            Event::StepCommitted { time, .. } | Event::ViolationDetected { time, .. } => *time,
        }
    }
}

impl EventKind {
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// A bounded ring buffer of events. When full, the oldest event is dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Option<Event>>,
    /// Next write position.
    head: usize,
    len: usize,
    /// Total events ever written, including dropped ones.
    total_written: u64,
    dropped: u64,
    /// Dropped since the last `clear`.
    dropped_pending: u64,
}

impl EventBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
            dropped: 0,
            dropped_pending: 0,
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        } else {
            self.dropped += 1;
            self.dropped_pending += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Events that were overwritten before delivery, over the buffer's
    /// lifetime.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Events overwritten since the buffer was last cleared.
    pub fn dropped_since_clear(&self) -> u64 {
        self.dropped_pending
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        let cap = self.capacity();
        let start = (self.head + cap - self.len) % cap;
        (0..self.len).filter_map(move |i| self.events[(start + i) % cap].as_ref())
    }

    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
        self.dropped_pending = 0;
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type PassiveListener = Box<dyn FnMut(&Event)>;

/// Buffers events per kind and delivers them to listeners in registration
/// order.
pub struct EventBus {
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    listeners: Vec<PassiveListener>,
    default_capacity: usize,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("listeners", &self.listeners.len())
            .field("default_capacity", &self.default_capacity)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            listeners: Vec::new(),
            default_capacity,
        }
    }

    /// Stop buffering `kind`. Already-buffered events of that kind are dropped.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Buffer an event for the next delivery. No-op for suppressed kinds.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event);
    }

    pub fn on_event(&mut self, listener: PassiveListener) {
        self.listeners.push(listener);
    }

    /// Buffered events of one kind, if any were emitted since the last
    /// delivery.
    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    /// Hand every buffered event to every listener, then clear the buffers.
    /// Returns how many events were dropped from this batch.
    ///
    /// Events are delivered in time order; within a step, `ViolationDetected`
    /// precedes the `StepCommitted` that follows it.
    pub fn deliver(&mut self) -> u64 {
        let mut lost = 0;
        for (kind, buffer) in EVENT_KINDS.iter().zip(&self.buffers) {
            let Some(buffer) = buffer else { continue };
            let dropped = buffer.dropped_since_clear();
            if dropped > 0 {
                tracing::warn!(
                    ?kind,
                    dropped,
                    capacity = buffer.capacity(),
                    "event buffer overflowed before delivery"
                );
                lost += dropped;
            }
        }

        let mut events: Vec<Event> = self
            .buffers
            .iter()
            .flatten()
            .flat_map(|buffer| buffer.iter().cloned())
            .collect();
        events.sort_by_key(|e| (e.time(), e.kind() == EventKind::StepCommitted));

        for listener in &mut self.listeners {
            for event in &events {
                listener(event);
            }
        }
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
        lost
    }
}
