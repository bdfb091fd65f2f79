//! Channel Reassignment Controller.
//!
//! One-shot actions that, at a given simulated time, point a device (or every
//! device of a network) at another medium. No compatibility check is made
//! against the device's association: a leaf moved away from its coordinator
//! simply stops being heard, which shows up as a lower delivery ratio.

use embassy_time::Instant;

use super::events::Event;
use super::mac::MacLayer;
use super::network::PanNetwork;
use super::orchestrator::SimulationError;
use super::scheduler::Scheduler;
use super::types::{ChannelId, DeviceHandle, NetworkId};

/// A channel swap that has taken effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reassignment {
    pub device: DeviceHandle,
    pub from: Option<ChannelId>,
    pub to: ChannelId,
    pub at: Instant,
}

#[derive(Debug, Default)]
pub struct ChannelController {
    applied: Vec<Reassignment>,
}

impl ChannelController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebind `device` to `channel` at `at`.
    pub fn schedule_reassignment(
        &self,
        scheduler: &mut Scheduler,
        device: DeviceHandle,
        channel: ChannelId,
        at: Instant,
    ) -> Result<(), SimulationError> {
        Self::schedule(scheduler, at, Event::ChannelReassignment { device, channel })
    }

    /// Rebind a whole network, entity reference included, at `at`.
    pub fn schedule_network_reassignment(
        &self,
        scheduler: &mut Scheduler,
        network: NetworkId,
        channel: ChannelId,
        at: Instant,
    ) -> Result<(), SimulationError> {
        Self::schedule(scheduler, at, Event::NetworkReassignment { network, channel })
    }

    fn schedule(scheduler: &mut Scheduler, at: Instant, event: Event) -> Result<(), SimulationError> {
        let now = scheduler.now();
        if !scheduler.schedule_at(at, event) {
            return Err(SimulationError::ScheduleInPast {
                at_ms: at.as_millis(),
                now_ms: now.as_millis(),
            });
        }
        Ok(())
    }

    /// Perform a single-device swap. Called when the scheduled event fires.
    pub fn apply<M: MacLayer>(&mut self, mac: &mut M, now: Instant, device: DeviceHandle, channel: ChannelId) -> Reassignment {
        let from = mac.bound_channel(device);
        mac.bind_channel(device, channel);
        log::info!("{} ms\t{}'s channel has been changed to {}", now.as_millis(), device, channel);

        let reassignment = Reassignment {
            device,
            from,
            to: channel,
            at: now,
        };
        self.applied.push(reassignment);
        reassignment
    }

    /// Perform a whole-network swap, one record per device.
    pub fn apply_network<M: MacLayer>(&mut self, mac: &mut M, now: Instant, network: &mut PanNetwork, channel: ChannelId) -> Vec<Reassignment> {
        let previous: Vec<(DeviceHandle, Option<ChannelId>)> = network.devices().iter().map(|&d| (d, mac.bound_channel(d))).collect();
        network.set_channel(mac, channel);
        log::info!("{} ms\tPAN {} moved to {}", now.as_millis(), network.id(), channel);

        let records: Vec<Reassignment> = previous
            .into_iter()
            .map(|(device, from)| Reassignment {
                device,
                from,
                to: channel,
                at: now,
            })
            .collect();
        self.applied.extend_from_slice(&records);
        records
    }

    /// Swaps applied so far, in order.
    pub fn history(&self) -> &[Reassignment] {
        &self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::geometry::LayoutPolicy;
    use crate::simulation::mac::SimulatedMac;
    use crate::simulation::signal_calculations::PathLossParameters;
    use crate::simulation::types::{Coordinates, MacAddress};
    use embassy_time::Duration;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn reassignment_fires_at_the_requested_time() {
        let mut scheduler = Scheduler::new();
        let controller = ChannelController::new();
        let device = DeviceHandle(3);
        controller
            .schedule_reassignment(&mut scheduler, device, ChannelId(1), Instant::from_millis(3100))
            .unwrap();

        assert_eq!(scheduler.next_event(), Some(Event::ChannelReassignment { device, channel: ChannelId(1) }));
        assert_eq!(scheduler.now(), Instant::from_millis(3100));
    }

    #[test]
    fn past_reassignment_is_rejected() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(Duration::from_secs(5), Event::Report);
        scheduler.next_event();

        let controller = ChannelController::new();
        let result = controller.schedule_network_reassignment(&mut scheduler, NetworkId(0), ChannelId(1), Instant::from_secs(1));
        assert_eq!(result, Err(SimulationError::ScheduleInPast { at_ms: 1000, now_ms: 5000 }));
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn apply_rebinds_only_the_target_device() {
        let mut mac = SimulatedMac::new(PathLossParameters::default(), 0);
        let a = mac.create_channel();
        let b = mac.create_channel();
        let target = mac.create_device(MacAddress(1));
        let bystander = mac.create_device(MacAddress(2));
        mac.bind_channel(target, a);
        mac.bind_channel(bystander, a);

        let mut controller = ChannelController::new();
        let record = controller.apply(&mut mac, Instant::from_millis(3100), target, b);

        assert_eq!(record.from, Some(a));
        assert_eq!(mac.bound_channel(target), Some(b));
        assert_eq!(mac.bound_channel(bystander), Some(a));
        assert_eq!(controller.history(), &[record]);
    }

    #[test]
    fn network_swap_moves_entity_and_devices() {
        let mut mac = SimulatedMac::new(PathLossParameters::default(), 0);
        let a = mac.create_channel();
        let b = mac.create_channel();
        let mut rng = StdRng::seed_from_u64(0);
        let mut network = PanNetwork::new(NetworkId(0), a, LayoutPolicy::default(), Coordinates::default(), 10);
        network.install(&mut mac, 3, &mut rng).unwrap();

        let mut controller = ChannelController::new();
        let records = controller.apply_network(&mut mac, Instant::from_secs(2), &mut network, b);

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.from == Some(a) && r.to == b));
        assert_eq!(network.channel(), b);
        assert!(network.devices().iter().all(|&d| mac.bound_channel(d) == Some(b)));
    }
}
