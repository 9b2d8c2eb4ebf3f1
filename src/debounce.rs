use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Pending<T> {
    due_at: Instant,
    generation: u64,
    value: T,
}

/// Delays a value until a quiet period of `delay` has elapsed.
///
/// Each `schedule` replaces whatever was pending, so at most one value is
/// ever waiting. The owner drives time by calling [`Debouncer::poll`].
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    generation: u64,
    pending: Option<Pending<T>>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: 0,
            pending: None,
        }
    }

    /// Cancel any pending value and schedule `value` for `now + delay`.
    /// Returns the generation handle of the new schedule.
    pub fn schedule(&mut self, now: Instant, value: T) -> u64 {
        self.generation = self.generation.saturating_add(1);
        self.pending = Some(Pending {
            due_at: now + self.delay,
            generation: self.generation,
            value,
        });
        self.generation
    }

    /// Drop the pending value, if any. Returns true when something was pending.
    pub fn cancel(&mut self) -> bool {
        self.generation = self.generation.saturating_add(1);
        self.pending.take().is_some()
    }

    /// Take the pending value once its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some(pending) if pending.due_at <= now && pending.generation == self.generation => {
                self.pending.take().map(|p| p.value)
            }
            _ => None,
        }
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due_at)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(300);

    #[test]
    fn fires_after_delay() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        debouncer.schedule(start, "abc");

        assert_eq!(debouncer.poll(start + Duration::from_millis(299)), None);
        assert_eq!(debouncer.poll(start + DELAY), Some("abc"));
        assert_eq!(debouncer.next_due(), None);
    }

    #[test]
    fn rapid_calls_fire_once_with_last_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);

        for (i, value) in ["a", "ab", "abc", "abcd"].iter().enumerate() {
            debouncer.schedule(start + Duration::from_millis(50 * i as u64), *value);
        }

        let mut fired = Vec::new();
        for ms in (0..1000).step_by(10) {
            if let Some(value) = debouncer.poll(start + Duration::from_millis(ms)) {
                fired.push(value);
            }
        }

        assert_eq!(fired, vec!["abcd"]);
    }

    #[test]
    fn reschedule_pushes_deadline_out() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        debouncer.schedule(start, 1);
        debouncer.schedule(start + Duration::from_millis(200), 2);

        assert_eq!(debouncer.poll(start + DELAY), None);
        assert_eq!(
            debouncer.next_due(),
            Some(start + Duration::from_millis(500))
        );
        assert_eq!(debouncer.poll(start + Duration::from_millis(500)), Some(2));
    }

    #[test]
    fn cancel_drops_pending_value() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        debouncer.schedule(start, "abc");

        assert!(debouncer.cancel());
        assert!(!debouncer.cancel());
        assert_eq!(debouncer.poll(start + Duration::from_secs(5)), None);
    }

    #[test]
    fn schedule_returns_increasing_handles() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        let first = debouncer.schedule(start, ());
        let second = debouncer.schedule(start, ());
        assert!(second > first);
    }

    #[test]
    fn zero_delay_fires_on_next_poll() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::ZERO);
        debouncer.schedule(start, 7);
        assert_eq!(debouncer.poll(start), Some(7));
    }
}
