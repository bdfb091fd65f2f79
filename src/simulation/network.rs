//! Network Entity: one PAN made of a coordinator and its leaf devices.
//!
//! Lifecycle: created → installed (devices created, positioned, bound to the
//! entity's channel and associated) → started (MLME-START scheduled on the
//! coordinator) → repeated transmission rounds until the global deadline,
//! the round limit, or [`PanNetwork::stop`].

use embassy_time::{Duration, Instant};
use rand::Rng;

use super::events::Event;
use super::geometry::LayoutPolicy;
use super::mac::MacLayer;
use super::policy::RoundTiming;
use super::scheduler::Scheduler;
use super::stats::Statistics;
use super::types::{ChannelId, Coordinates, DataRequest, DeviceHandle, DeviceSlot, LogicalChannel, MacAddress, NetworkId, StartRequest};

/// Caller-contract violations on a network entity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("network {0} has not been installed")]
    NotInstalled(NetworkId),
    #[error("network {0} is already installed")]
    AlreadyInstalled(NetworkId),
    #[error("network {0} has already been started")]
    AlreadyStarted(NetworkId),
    #[error("network {0} needs at least one device (the coordinator)")]
    NoDevices(NetworkId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Installed,
    Started,
}

/// Beacon parameters passed to MLME-START.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconSettings {
    pub beacon_order: u8,
    pub superframe_order: u8,
}

impl Default for BeaconSettings {
    fn default() -> Self {
        // 15/15 is non-beacon mode.
        Self {
            beacon_order: 15,
            superframe_order: 15,
        }
    }
}

/// What one call to [`PanNetwork::send_round`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundSummary {
    pub round_index: u64,
    /// Transmission attempts scheduled (one per leaf device).
    pub scheduled: usize,
    /// Delay until the next round, `None` if the network stopped repeating.
    pub next_round_in: Option<Duration>,
}

pub struct PanNetwork {
    id: NetworkId,
    channel: ChannelId,
    layout: LayoutPolicy,
    anchor: Coordinates,
    payload_size: usize,
    devices: Vec<DeviceHandle>,
    coordinator_address: Option<MacAddress>,
    lifecycle: Lifecycle,
    logical_channel: Option<LogicalChannel>,
    rounds_sent: u64,
    last_round_at: Option<Instant>,
    round_limit: Option<u64>,
    stopped: bool,
}

impl PanNetwork {
    pub fn new(id: NetworkId, channel: ChannelId, layout: LayoutPolicy, anchor: Coordinates, payload_size: usize) -> Self {
        Self {
            id,
            channel,
            layout,
            anchor,
            payload_size,
            devices: Vec::new(),
            coordinator_address: None,
            lifecycle: Lifecycle::Created,
            logical_channel: None,
            rounds_sent: 0,
            last_round_at: None,
            round_limit: None,
            stopped: false,
        }
    }

    /// Stop repeating after `limit` rounds.
    pub fn with_round_limit(mut self, limit: Option<u64>) -> Self {
        self.round_limit = limit;
        self
    }

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn anchor(&self) -> Coordinates {
        self.anchor
    }

    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }

    pub fn coordinator(&self) -> Option<DeviceHandle> {
        self.devices.first().copied()
    }

    /// Device at `index` (0 is the coordinator).
    pub fn device(&self, index: usize) -> Option<DeviceHandle> {
        self.devices.get(index).copied()
    }

    pub fn slot(&self, device: DeviceHandle) -> Option<DeviceSlot> {
        self.devices.iter().position(|&d| d == device).map(|index| DeviceSlot { network: self.id, index })
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn logical_channel(&self) -> Option<LogicalChannel> {
        self.logical_channel
    }

    pub fn rounds_sent(&self) -> u64 {
        self.rounds_sent
    }

    pub fn last_round_at(&self) -> Option<Instant> {
        self.last_round_at
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Cancel the repeating round. A round already in the queue still fires
    /// but schedules no transmissions and does not reschedule itself.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Create `device_count` devices, place them per the layout policy, bind
    /// them to the entity's channel and associate leaves with the coordinator.
    pub fn install<M: MacLayer, R: Rng + ?Sized>(&mut self, mac: &mut M, device_count: usize, rng: &mut R) -> Result<(), NetworkError> {
        if self.lifecycle != Lifecycle::Created {
            return Err(NetworkError::AlreadyInstalled(self.id));
        }
        if device_count == 0 {
            return Err(NetworkError::NoDevices(self.id));
        }

        let positions = self.layout.positions(self.anchor, device_count, rng);
        for (index, position) in positions.into_iter().enumerate() {
            let address = DeviceSlot { network: self.id, index }.address();
            let device = mac.create_device(address);
            mac.set_position(device, position);
            mac.bind_channel(device, self.channel);
            self.devices.push(device);
        }

        let coordinator_address = DeviceSlot { network: self.id, index: 0 }.address();
        for &device in &self.devices {
            mac.associate(device, self.id.pan_id(), coordinator_address);
        }
        self.coordinator_address = Some(coordinator_address);
        self.lifecycle = Lifecycle::Installed;

        log::info!(
            "Installed PAN {} with {} devices on {} around ({:.1}, {:.1})",
            self.id,
            device_count,
            self.channel,
            self.anchor.x,
            self.anchor.y
        );
        Ok(())
    }

    /// Point the entity, and every installed device, at another medium.
    pub fn set_channel<M: MacLayer>(&mut self, mac: &mut M, channel: ChannelId) {
        self.channel = channel;
        for &device in &self.devices {
            mac.bind_channel(device, channel);
        }
    }

    /// Schedule MLME-START on the coordinator after `delay`.
    pub fn start(
        &mut self,
        scheduler: &mut Scheduler,
        logical_channel: LogicalChannel,
        delay: Duration,
        beacon: BeaconSettings,
    ) -> Result<(), NetworkError> {
        match self.lifecycle {
            Lifecycle::Created => return Err(NetworkError::NotInstalled(self.id)),
            Lifecycle::Started => return Err(NetworkError::AlreadyStarted(self.id)),
            Lifecycle::Installed => {}
        }
        let coordinator = self.coordinator().ok_or(NetworkError::NoDevices(self.id))?;

        let request = StartRequest {
            pan_id: self.id.pan_id(),
            pan_coordinator: true,
            beacon_order: beacon.beacon_order,
            superframe_order: beacon.superframe_order,
            logical_channel,
        };
        log::info!(
            "Scheduling MLME-START for PAN {} on logical channel {} at {} ms",
            self.id,
            logical_channel.number(),
            (scheduler.now() + delay).as_millis()
        );
        scheduler.schedule(delay, Event::BeaconStart { device: coordinator, request });
        self.logical_channel = Some(logical_channel);
        self.lifecycle = Lifecycle::Started;
        Ok(())
    }

    /// Schedule one data request per leaf device, addressed to the
    /// coordinator, at `device_index × slot` from now, then reschedule the
    /// next round unless the network was stopped or hit its round limit.
    /// A stopped network schedules nothing at all.
    ///
    /// `Requested` is counted here, when the attempt is scheduled.
    pub fn send_round<R: Rng + ?Sized>(
        &mut self,
        scheduler: &mut Scheduler,
        stats: &mut Statistics,
        timing: &RoundTiming,
        rng: &mut R,
    ) -> Result<RoundSummary, NetworkError> {
        let coordinator_address = match (self.lifecycle, self.coordinator_address) {
            (Lifecycle::Created, _) | (_, None) => return Err(NetworkError::NotInstalled(self.id)),
            (_, Some(address)) => address,
        };

        let now = scheduler.now();
        let round_index = self.rounds_sent;
        if self.stopped {
            log::debug!("{} ms\tPAN {} is stopped, round {} skipped", now.as_millis(), self.id, round_index);
            return Ok(RoundSummary {
                round_index,
                scheduled: 0,
                next_round_in: None,
            });
        }
        for (index, &device) in self.devices.iter().enumerate().skip(1) {
            let offset = timing.slot_offset(index);
            log::debug!(
                "{} ms\tPAN {}: device {} - scheduled [{} ~ {}] ms",
                now.as_millis(),
                self.id,
                index,
                (now + offset).as_millis(),
                (now + offset + timing.slot_length()).as_millis()
            );
            scheduler.schedule(
                offset,
                Event::DataRequest {
                    device,
                    request: DataRequest {
                        destination: coordinator_address,
                        payload_size: self.payload_size,
                        msdu_handle: (round_index % 256) as u8,
                    },
                },
            );
            stats.record_requested();
        }

        self.rounds_sent += 1;
        self.last_round_at = Some(now);

        let limit_reached = self.round_limit.is_some_and(|limit| self.rounds_sent >= limit);
        let next_round_in = if limit_reached {
            log::debug!("PAN {} stops repeating after {} rounds", self.id, self.rounds_sent);
            None
        } else {
            let period = timing.round_period(self.devices.len(), rng);
            scheduler.schedule(period, Event::SendRound { network: self.id });
            Some(period)
        };

        Ok(RoundSummary {
            round_index,
            scheduled: self.devices.len().saturating_sub(1),
            next_round_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::mac::SimulatedMac;
    use crate::simulation::signal_calculations::PathLossParameters;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct Fixture {
        mac: SimulatedMac,
        scheduler: Scheduler,
        stats: Statistics,
        rng: StdRng,
        network: PanNetwork,
    }

    fn fixture() -> Fixture {
        let mut mac = SimulatedMac::new(PathLossParameters::default(), 3);
        let channel = mac.create_channel();
        Fixture {
            mac,
            scheduler: Scheduler::new(),
            stats: Statistics::new(),
            rng: StdRng::seed_from_u64(3),
            network: PanNetwork::new(NetworkId(0), channel, LayoutPolicy::default(), Coordinates::default(), 10),
        }
    }

    fn drain(scheduler: &mut Scheduler) -> Vec<(u64, Event)> {
        let mut events = Vec::new();
        while let Some(event) = scheduler.next_event() {
            events.push((scheduler.now().as_millis(), event));
        }
        events
    }

    #[test]
    fn install_creates_coordinator_first_and_binds_channel() {
        let mut f = fixture();
        f.network.install(&mut f.mac, 4, &mut f.rng).unwrap();

        assert_eq!(f.network.lifecycle(), Lifecycle::Installed);
        assert_eq!(f.network.devices().len(), 4);
        let coordinator = f.network.coordinator().unwrap();
        assert!(f.network.slot(coordinator).unwrap().is_coordinator());
        for &device in f.network.devices() {
            assert_eq!(f.mac.bound_channel(device), Some(f.network.channel()));
            assert_eq!(f.mac.association(device).map(|(pan, _)| pan), Some(0));
        }
        assert_eq!(f.network.install(&mut f.mac, 4, &mut f.rng), Err(NetworkError::AlreadyInstalled(NetworkId(0))));
    }

    #[test]
    fn round_before_install_fails_fast() {
        let mut f = fixture();
        let result = f.network.send_round(&mut f.scheduler, &mut f.stats, &RoundTiming::default(), &mut f.rng);
        assert_eq!(result, Err(NetworkError::NotInstalled(NetworkId(0))));
        assert_eq!(f.stats.snapshot().requested, 0);
        assert_eq!(f.scheduler.pending(), 0);
    }

    #[test]
    fn start_is_guarded() {
        let mut f = fixture();
        let channel = LogicalChannel::cyclic(0);
        assert_eq!(
            f.network.start(&mut f.scheduler, channel, Duration::from_millis(0), BeaconSettings::default()),
            Err(NetworkError::NotInstalled(NetworkId(0)))
        );
        f.network.install(&mut f.mac, 2, &mut f.rng).unwrap();
        f.network.start(&mut f.scheduler, channel, Duration::from_millis(500), BeaconSettings::default()).unwrap();
        assert_eq!(
            f.network.start(&mut f.scheduler, channel, Duration::from_millis(0), BeaconSettings::default()),
            Err(NetworkError::AlreadyStarted(NetworkId(0)))
        );

        let events = drain(&mut f.scheduler);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, 500);
        assert!(matches!(events[0].1, Event::BeaconStart { request: StartRequest { pan_coordinator: true, .. }, .. }));
    }

    #[test]
    fn round_schedules_one_slot_per_leaf() {
        let mut f = fixture();
        f.network.install(&mut f.mac, 5, &mut f.rng).unwrap();
        let summary = f
            .network
            .send_round(&mut f.scheduler, &mut f.stats, &RoundTiming::default(), &mut f.rng)
            .unwrap();

        assert_eq!(summary.scheduled, 4);
        assert_eq!(summary.next_round_in, Some(Duration::from_millis(2000)));
        // Requested is counted at scheduling time, before anything executes.
        assert_eq!(f.stats.snapshot().requested, 4);
        assert_eq!(f.stats.snapshot().attempted, 0);

        let coordinator = f.network.coordinator().unwrap();
        let requests: Vec<(u64, DeviceHandle)> = drain(&mut f.scheduler)
            .into_iter()
            .filter_map(|(at, event)| match event {
                Event::DataRequest { device, .. } => Some((at, device)),
                _ => None,
            })
            .collect();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|&(_, device)| device != coordinator));
        assert_eq!(requests.iter().map(|&(at, _)| at).collect::<Vec<_>>(), vec![1000, 2000, 3000, 4000]);
    }

    #[test]
    fn coordinator_only_network_still_reschedules() {
        let mut f = fixture();
        f.network.install(&mut f.mac, 1, &mut f.rng).unwrap();
        let summary = f
            .network
            .send_round(&mut f.scheduler, &mut f.stats, &RoundTiming::default(), &mut f.rng)
            .unwrap();
        assert_eq!(summary.scheduled, 0);
        assert!(summary.next_round_in.is_some());
        assert_eq!(f.stats.snapshot().requested, 0);
        assert_eq!(drain(&mut f.scheduler), vec![(2000, Event::SendRound { network: NetworkId(0) })]);
    }

    #[test]
    fn round_limit_and_stop_end_repetition() {
        let mut f = fixture();
        f.network = PanNetwork::new(NetworkId(0), ChannelId(0), LayoutPolicy::default(), Coordinates::default(), 10).with_round_limit(Some(2));
        f.network.install(&mut f.mac, 2, &mut f.rng).unwrap();
        let timing = RoundTiming::default();

        let first = f.network.send_round(&mut f.scheduler, &mut f.stats, &timing, &mut f.rng).unwrap();
        let second = f.network.send_round(&mut f.scheduler, &mut f.stats, &timing, &mut f.rng).unwrap();
        assert!(first.next_round_in.is_some());
        assert_eq!(second.round_index, 1);
        assert_eq!(second.next_round_in, None);

        let mut g = fixture();
        g.network.install(&mut g.mac, 2, &mut g.rng).unwrap();
        g.network.stop();
        let summary = g.network.send_round(&mut g.scheduler, &mut g.stats, &timing, &mut g.rng).unwrap();
        assert_eq!(summary.next_round_in, None);
        assert_eq!(summary.scheduled, 0);
        assert!(g.network.is_stopped());
        assert_eq!(g.network.rounds_sent(), 0);
        assert_eq!(g.stats.snapshot().requested, 0);
        assert_eq!(g.scheduler.pending(), 0);
    }

    #[test]
    fn set_channel_rebinds_every_device() {
        let mut f = fixture();
        f.network.install(&mut f.mac, 3, &mut f.rng).unwrap();
        let other = f.mac.create_channel();
        f.network.set_channel(&mut f.mac, other);
        assert_eq!(f.network.channel(), other);
        assert!(f.network.devices().iter().all(|&d| f.mac.bound_channel(d) == Some(other)));
    }
}
