//! Event kernel: the closed set of scheduled actions and the queue that
//! orders them.
//!
//! Events are ordered by time; events scheduled for the same instant run in
//! insertion order.

use embassy_time::Instant;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::types::{ChannelId, DataConfirm, DataIndication, DataRequest, DeviceHandle, NetworkId, StartConfirm, StartRequest};

/// Everything that can happen at a point in simulated time.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Issue MLME-START on a coordinator.
    BeaconStart { device: DeviceHandle, request: StartRequest },
    /// MLME-START.confirm from the MAC.
    StartConfirm(StartConfirm),
    /// One transmission round of a network.
    SendRound { network: NetworkId },
    /// Issue MCPS-DATA on a leaf device.
    DataRequest { device: DeviceHandle, request: DataRequest },
    /// MCPS-DATA.confirm from the MAC.
    DataConfirm(DataConfirm),
    /// MCPS-DATA.indication from the MAC.
    DataIndication(DataIndication),
    /// Rebind a single device to another medium.
    ChannelReassignment { device: DeviceHandle, channel: ChannelId },
    /// Rebind a whole network (entity reference and every device).
    NetworkReassignment { network: NetworkId, channel: ChannelId },
    /// Capture the end-of-run statistics.
    Report,
}

/// An event scheduled for execution at a specific simulation time.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    time: Instant,
    sequence: u64,
    event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Instant, sequence: u64, event: Event) -> Self {
        Self { time, sequence, event }
    }

    pub fn time(&self) -> Instant {
        self.time
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn into_event(self) -> Event {
        self.event
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap; reverse both keys so the earliest time,
        // then the earliest insertion, comes out first.
        other.time.cmp(&self.time).then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<ScheduledEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ScheduledEvent) {
        self.heap.push(event);
    }

    pub fn pop_earliest(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    pub fn peek_earliest(&self) -> Option<&ScheduledEvent> {
        self.heap.peek()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(network: u16) -> Event {
        Event::SendRound { network: NetworkId(network) }
    }

    #[test]
    fn earliest_time_comes_first() {
        let mut queue = EventQueue::new();
        queue.push(ScheduledEvent::new(Instant::from_millis(300), 0, round(3)));
        queue.push(ScheduledEvent::new(Instant::from_millis(100), 1, round(1)));
        queue.push(ScheduledEvent::new(Instant::from_millis(200), 2, round(2)));

        let order: Vec<u64> = std::iter::from_fn(|| queue.pop_earliest()).map(|e| e.time().as_millis()).collect();
        assert_eq!(order, vec![100, 200, 300]);
    }

    #[test]
    fn ties_are_broken_by_insertion_order() {
        let mut queue = EventQueue::new();
        let at = Instant::from_millis(1000);
        for (sequence, network) in [(7, 2), (3, 0), (5, 1)] {
            queue.push(ScheduledEvent::new(at, sequence, round(network)));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.peek_earliest().map(ScheduledEvent::sequence), Some(3));
        let order: Vec<Event> = std::iter::from_fn(|| queue.pop_earliest()).map(ScheduledEvent::into_event).collect();
        assert_eq!(order, vec![round(0), round(1), round(2)]);
        assert!(queue.is_empty());
    }
}
