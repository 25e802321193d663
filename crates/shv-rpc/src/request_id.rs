use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A crashed caller that re-uses request ids after a long outage must not
/// collide with in-flight state on the broker it reconnects to — so the
/// counter rolls over every 15 minutes rather than running forever
/// (spec §4.4).
const ROLLOVER_PERIOD: Duration = Duration::from_secs(15 * 60);

struct State {
    epoch_start: Instant,
    next: u32,
}

/// Monotonically increasing request-id counter, reset to 1 every 15
/// minutes. Guarded by a `parking_lot::Mutex` — the same lightweight
/// locking idiom the teacher uses for its own shared channel table.
pub struct RequestIdGenerator {
    state: Mutex<State>,
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                epoch_start: Instant::now(),
                next: 1,
            }),
        }
    }

    pub fn next_id(&self) -> u32 {
        let mut state = self.state.lock();
        if state.epoch_start.elapsed() >= ROLLOVER_PERIOD {
            state.epoch_start = Instant::now();
            state.next = 1;
        }
        let id = state.next;
        state.next = state.next.wrapping_add(1).max(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_within_an_epoch() {
        let gen = RequestIdGenerator::new();
        let a = gen.next_id();
        let b = gen.next_id();
        let c = gen.next_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn starts_at_one() {
        let gen = RequestIdGenerator::new();
        assert_eq!(gen.next_id(), 1);
    }
}
