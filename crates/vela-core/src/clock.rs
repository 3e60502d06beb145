//! Deterministic nanosecond clock and periodic timers.
//!
//! Grounded on `original_source/nautilus_core/clock.py`'s `TestClock` and
//! `advance_time`. There is no `LiveClock` here — wall-clock time has no
//! place in a deterministic backtest core.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeEvent {
    pub name: String,
    pub ts_event: i64,
}

struct Timer {
    name: String,
    interval_ns: i64,
    next_fire: i64,
    stop_at: Option<i64>,
}

/// Monotonic nanosecond clock advanced explicitly by the driver, with
/// named periodic timers.
pub struct TestClock {
    now_ns: i64,
    timers: Vec<Timer>,
}

impl Default for TestClock {
    fn default() -> Self {
        TestClock { now_ns: 0, timers: Vec::new() }
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamp_ns(&self) -> i64 {
        self.now_ns
    }

    /// Jump directly to `ts` without firing timers; used by the driver to
    /// align the clock with the next datum's `ts_event` before
    /// [`TestClock::advance_time`] emits anything due in between.
    pub fn set_time(&mut self, ts: i64) {
        self.now_ns = ts;
    }

    /// Schedule a periodic timer. `start` is the first fire time; `stop`,
    /// if given, removes the timer once fired for a time past `stop`.
    pub fn set_timer(&mut self, name: impl Into<String>, interval_ns: i64, start: i64, stop: Option<i64>) {
        let name = name.into();
        self.timers.retain(|t| t.name != name);
        self.timers.push(Timer { name, interval_ns, next_fire: start, stop_at: stop });
    }

    pub fn cancel_timer(&mut self, name: &str) {
        self.timers.retain(|t| t.name != name);
    }

    /// Emit every timer event due at or before `to`, in timestamp order,
    /// then advance the clock to `to`.
    pub fn advance_time(&mut self, to: i64) -> Vec<TimeEvent> {
        let mut due = Vec::new();
        for timer in self.timers.iter_mut() {
            while timer.next_fire <= to {
                if let Some(stop) = timer.stop_at {
                    if timer.next_fire > stop {
                        break;
                    }
                }
                due.push(TimeEvent { name: timer.name.clone(), ts_event: timer.next_fire });
                timer.next_fire += timer.interval_ns;
            }
        }
        due.sort_by_key(|e| e.ts_event);
        self.timers.retain(|t| match t.stop_at {
            Some(stop) => t.next_fire <= stop,
            None => true,
        });
        self.now_ns = to;
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_time_fires_due_timers_in_order() {
        let mut clock = TestClock::new();
        clock.set_timer("heartbeat", 100, 100, None);
        let events = clock.advance_time(350);
        let names: Vec<i64> = events.iter().map(|e| e.ts_event).collect();
        assert_eq!(names, vec![100, 200, 300]);
        assert_eq!(clock.timestamp_ns(), 350);
    }

    #[test]
    fn timer_removed_after_stop() {
        let mut clock = TestClock::new();
        clock.set_timer("short", 10, 10, Some(15));
        let events = clock.advance_time(100);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ts_event, 10);
        let events2 = clock.advance_time(200);
        assert!(events2.is_empty());
    }

    #[test]
    fn cancel_timer_stops_future_fires() {
        let mut clock = TestClock::new();
        clock.set_timer("t", 10, 10, None);
        clock.cancel_timer("t");
        assert!(clock.advance_time(1000).is_empty());
    }

    #[test]
    fn set_time_does_not_fire_timers() {
        let mut clock = TestClock::new();
        clock.set_timer("t", 10, 10, None);
        clock.set_time(500);
        assert_eq!(clock.timestamp_ns(), 500);
    }
}
