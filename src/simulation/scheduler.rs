//! Event Scheduling Facade.
//!
//! Thin adapter that turns orchestration decisions ("in 1 s, start this
//! coordinator") into timed entries of the [`EventQueue`]. It owns the
//! simulated clock, the insertion counter used to break ties and the global
//! stop deadline. Repeating timers are built on top of it by callbacks that
//! reschedule themselves.

use embassy_time::{Duration, Instant};

use super::events::{Event, EventQueue, ScheduledEvent};

/// Smallest representable step of simulated time (one embassy tick).
pub const EPSILON: Duration = Duration::from_ticks(1);

/// Longest simulated span accepted, in milliseconds (about 34 years). Every
/// millisecond-to-tick conversion and instant sum stays inside `u64` below it.
pub const MAX_SIMULATED_MS: u64 = 1 << 40;

pub struct Scheduler {
    queue: EventQueue,
    now: Instant,
    next_sequence: u64,
    stop_at: Option<Instant>,
    dispatched: u64,
}

impl Scheduler {
    /// Create a scheduler at t = 0.
    pub fn new() -> Self {
        Self {
            queue: EventQueue::new(),
            now: Instant::from_ticks(0),
            next_sequence: 0,
            stop_at: None,
            dispatched: 0,
        }
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// Schedule `event` to run `delay` after the current time.
    pub fn schedule(&mut self, delay: Duration, event: Event) {
        let at = self.now + delay;
        self.push(at, event);
    }

    /// Schedule `event` at an absolute time. Returns `false` (and drops the
    /// event) if `at` lies in the past.
    pub fn schedule_at(&mut self, at: Instant, event: Event) -> bool {
        if at < self.now {
            return false;
        }
        self.push(at, event);
        true
    }

    fn push(&mut self, at: Instant, event: Event) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(ScheduledEvent::new(at, sequence, event));
    }

    /// Set the global deadline. Events scheduled at or after `at` never run.
    pub fn stop_at(&mut self, at: Instant) {
        self.stop_at = Some(at);
    }

    pub fn stop_deadline(&self) -> Option<Instant> {
        self.stop_at
    }

    /// Pop the next runnable event and advance the clock to its time.
    ///
    /// Returns `None` once the queue is drained or the next event lies at or
    /// beyond the stop deadline. In both cases the clock moves to the
    /// deadline, if one is set and still ahead.
    pub fn next_event(&mut self) -> Option<Event> {
        if self.queue.is_empty() {
            self.advance_to_stop();
            return None;
        }
        let next_time = self.queue.peek_earliest()?.time();
        if self.stop_at.is_some_and(|stop| next_time >= stop) {
            self.advance_to_stop();
            return None;
        }

        let scheduled = self.queue.pop_earliest()?;
        self.advance(scheduled.time());
        self.dispatched += 1;
        Some(scheduled.into_event())
    }

    fn advance(&mut self, to: Instant) {
        self.now = to;
    }

    fn advance_to_stop(&mut self) {
        if let Some(stop) = self.stop_at {
            if stop > self.now {
                self.advance(stop);
            }
        }
    }

    /// Events still waiting in the queue (including those past the deadline).
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Events handed out by [`Scheduler::next_event`] so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::NetworkId;

    fn round(network: u16) -> Event {
        Event::SendRound { network: NetworkId(network) }
    }

    #[test]
    fn clock_advances_to_each_event() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Duration::from_millis(20), round(1));
        scheduler.schedule(Duration::from_millis(10), round(0));

        assert_eq!(scheduler.next_event(), Some(round(0)));
        assert_eq!(scheduler.now().as_millis(), 10);

        // Relative delays are measured from the current event.
        scheduler.schedule(Duration::from_millis(5), round(2));
        assert_eq!(scheduler.next_event(), Some(round(2)));
        assert_eq!(scheduler.now().as_millis(), 15);
        assert_eq!(scheduler.next_event(), Some(round(1)));
        assert_eq!(scheduler.next_event(), None);
        assert_eq!(scheduler.dispatched(), 3);
    }

    #[test]
    fn each_scheduler_owns_its_clock() {
        let mut first = Scheduler::new();
        first.schedule(Duration::from_secs(3), round(0));
        first.next_event();

        let second = Scheduler::new();
        assert_eq!(second.now(), Instant::from_ticks(0));
        assert_eq!(first.now(), Instant::from_secs(3));
    }

    #[test]
    fn same_instant_events_run_in_insertion_order() {
        let mut scheduler = Scheduler::new();
        for network in 0..4 {
            scheduler.schedule(Duration::from_secs(1), round(network));
        }
        let order: Vec<Event> = std::iter::from_fn(|| scheduler.next_event()).collect();
        assert_eq!(order, vec![round(0), round(1), round(2), round(3)]);
    }

    #[test]
    fn nothing_runs_at_or_after_the_stop_deadline() {
        let mut scheduler = Scheduler::new();
        scheduler.stop_at(Instant::from_secs(30));
        scheduler.schedule_at(Instant::from_secs(30) - EPSILON, Event::Report);
        scheduler.schedule_at(Instant::from_secs(30), round(0));
        scheduler.schedule_at(Instant::from_secs(31), round(1));

        assert_eq!(scheduler.next_event(), Some(Event::Report));
        assert_eq!(scheduler.next_event(), None);
        assert_eq!(scheduler.now(), Instant::from_secs(30));
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn drained_queue_runs_the_clock_to_the_deadline() {
        let mut scheduler = Scheduler::new();
        scheduler.stop_at(Instant::from_secs(10));
        scheduler.schedule(Duration::from_secs(2), round(0));

        assert_eq!(scheduler.next_event(), Some(round(0)));
        assert_eq!(scheduler.next_event(), None);
        assert_eq!(scheduler.now(), Instant::from_secs(10));
        assert_eq!(scheduler.pending(), 0);

        // Without a deadline the clock stays at the last event.
        let mut open_ended = Scheduler::new();
        open_ended.schedule(Duration::from_secs(2), round(0));
        open_ended.next_event();
        assert_eq!(open_ended.next_event(), None);
        assert_eq!(open_ended.now(), Instant::from_secs(2));
    }

    #[test]
    fn past_absolute_times_are_rejected() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Duration::from_millis(100), round(0));
        scheduler.next_event();
        assert!(!scheduler.schedule_at(Instant::from_millis(50), round(1)));
        assert!(scheduler.schedule_at(Instant::from_millis(100), round(1)));
        assert_eq!(scheduler.pending(), 1);
    }
}
