use std::sync::Mutex;

use arbor_types::Timestamp;

/// Wall-clock source that never repeats or goes backwards.
///
/// `tick` returns the current time unless that would not be strictly greater
/// than the last value handed out, in which case it returns the next
/// representable instant after it. Ties between appends are thereby broken by
/// insertion order.
pub struct WallClock {
    last: Mutex<Timestamp>,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Timestamp::zero()),
        }
    }

    /// Produce a timestamp strictly greater than every earlier one.
    pub fn tick(&self) -> Timestamp {
        let now = Timestamp::now();
        let mut last = self.last.lock().expect("lock poisoned");
        let next = if now > *last { now } else { last.next_after() };
        *last = next;
        next
    }

    /// Make sure later ticks land after `seen` (e.g. a stamp loaded from disk).
    pub fn observe(&self, seen: Timestamp) {
        let mut last = self.last.lock().expect("lock poisoned");
        if seen > *last {
            *last = seen;
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WallClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last = *self.last.lock().expect("lock poisoned");
        f.debug_struct("WallClock").field("last", &last).finish()
    }
}
