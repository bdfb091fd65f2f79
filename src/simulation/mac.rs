//! MAC/PHY collaborator boundary.
//!
//! [`MacLayer`] is everything the orchestration core needs from the radio
//! stack: device and channel creation, channel binding, positioning,
//! association, and the two request primitives (MLME-START and MCPS-DATA).
//! Outcomes come back asynchronously as scheduled [`Event`]s.
//!
//! [`SimulatedMac`] is a minimal collaborator: one frame at a time per
//! medium, log-distance reception, no backoff or retransmission.

use embassy_time::Instant;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{HashMap, VecDeque};

use super::events::Event;
use super::geometry::distance;
use super::scheduler::Scheduler;
use super::signal_calculations::{
    CCA_DURATION, PathLossParameters, TURNAROUND_DURATION, calculate_effective_distance, calculate_rssi, frame_air_time,
};
use super::types::{
    ChannelId, Coordinates, DataConfirm, DataIndication, DataRequest, DeviceHandle, LogicalChannel, MacAddress, MacStatus, StartConfirm,
    StartRequest,
};

/// Interface consumed by the orchestration core.
pub trait MacLayer {
    /// Create a new shared medium and return a reference to it.
    fn create_channel(&mut self) -> ChannelId;

    fn create_device(&mut self, address: MacAddress) -> DeviceHandle;

    fn address(&self, device: DeviceHandle) -> Option<MacAddress>;

    /// Point `device` at `channel`. Takes effect for the next transmission.
    fn bind_channel(&mut self, device: DeviceHandle, channel: ChannelId);

    fn bound_channel(&self, device: DeviceHandle) -> Option<ChannelId>;

    fn set_position(&mut self, device: DeviceHandle, position: Coordinates);

    /// Manually associate `device` with a PAN and its coordinator.
    fn associate(&mut self, device: DeviceHandle, pan_id: u16, coordinator: MacAddress);

    /// MLME-START.request. Answered by [`Event::StartConfirm`].
    fn start_beacon(&mut self, scheduler: &mut Scheduler, device: DeviceHandle, request: StartRequest);

    /// MCPS-DATA.request. Answered by [`Event::DataConfirm`] on the sender
    /// and, on success, [`Event::DataIndication`] on the receiver.
    fn send_data(&mut self, scheduler: &mut Scheduler, device: DeviceHandle, request: DataRequest);
}

/// Maximum number of transmission records kept. Bounded to keep memory
/// predictable on long runs.
pub const TRANSMISSION_HISTORY_CAPACITY: usize = 10_000;

/// One MCPS-DATA attempt as seen by the medium.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransmissionRecord {
    pub at: Instant,
    pub device: DeviceHandle,
    /// Medium the device was bound to when it transmitted.
    pub channel: Option<ChannelId>,
    pub status: MacStatus,
}

/// Beacon state set by a successful MLME-START.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeaconState {
    pub pan_id: u16,
    pub logical_channel: LogicalChannel,
    pub beacon_order: u8,
    pub superframe_order: u8,
    pub started_at: Instant,
}

#[derive(Debug, Clone)]
struct DeviceState {
    address: MacAddress,
    channel: Option<ChannelId>,
    position: Coordinates,
    association: Option<(u16, MacAddress)>,
    beacon: Option<BeaconState>,
}

pub struct SimulatedMac {
    params: PathLossParameters,
    devices: Vec<DeviceState>,
    addresses: HashMap<MacAddress, DeviceHandle>,
    channel_count: u32,
    // Per medium: end of the frame currently on air.
    busy_until: HashMap<ChannelId, Instant>,
    history: VecDeque<TransmissionRecord>,
    rng: StdRng,
}

impl SimulatedMac {
    pub fn new(params: PathLossParameters, seed: u64) -> Self {
        log::debug!(
            "Radio range {:.1} m at {} dBm tx, {} dBm sensitivity",
            calculate_effective_distance(&params),
            params.tx_power_dbm,
            params.sensitivity_dbm
        );
        Self {
            params,
            devices: Vec::new(),
            addresses: HashMap::new(),
            channel_count: 0,
            busy_until: HashMap::new(),
            history: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count as usize
    }

    pub fn position(&self, device: DeviceHandle) -> Option<Coordinates> {
        self.devices.get(device.index()).map(|d| d.position)
    }

    pub fn beacon(&self, device: DeviceHandle) -> Option<BeaconState> {
        self.devices.get(device.index()).and_then(|d| d.beacon)
    }

    pub fn association(&self, device: DeviceHandle) -> Option<(u16, MacAddress)> {
        self.devices.get(device.index()).and_then(|d| d.association)
    }

    /// Transmission attempts, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TransmissionRecord> {
        self.history.iter()
    }

    fn push_record(&mut self, record: TransmissionRecord) {
        if self.history.len() >= TRANSMISSION_HISTORY_CAPACITY {
            log::warn!("Transmission history full ({}), dropping oldest record", TRANSMISSION_HISTORY_CAPACITY);
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    /// Decide whether a frame from `sender` on `channel` reaches `destination`.
    fn evaluate_reception(&mut self, sender: &DeviceState, channel: ChannelId, destination: MacAddress) -> Option<(DeviceHandle, f64)> {
        let receiver_handle = *self.addresses.get(&destination)?;
        let receiver = self.devices.get(receiver_handle.index())?;
        if receiver.channel != Some(channel) {
            return None;
        }
        let d = distance(&sender.position, &receiver.position);
        let rssi = calculate_rssi(d, &self.params, &mut self.rng);
        (rssi >= self.params.sensitivity_dbm).then_some((receiver_handle, rssi))
    }
}

impl MacLayer for SimulatedMac {
    fn create_channel(&mut self) -> ChannelId {
        let channel = ChannelId(self.channel_count);
        self.channel_count += 1;
        channel
    }

    fn create_device(&mut self, address: MacAddress) -> DeviceHandle {
        let handle = DeviceHandle(self.devices.len() as u32);
        self.devices.push(DeviceState {
            address,
            channel: None,
            position: Coordinates::default(),
            association: None,
            beacon: None,
        });
        self.addresses.insert(address, handle);
        handle
    }

    fn address(&self, device: DeviceHandle) -> Option<MacAddress> {
        self.devices.get(device.index()).map(|d| d.address)
    }

    fn bind_channel(&mut self, device: DeviceHandle, channel: ChannelId) {
        if let Some(state) = self.devices.get_mut(device.index()) {
            state.channel = Some(channel);
        }
    }

    fn bound_channel(&self, device: DeviceHandle) -> Option<ChannelId> {
        self.devices.get(device.index()).and_then(|d| d.channel)
    }

    fn set_position(&mut self, device: DeviceHandle, position: Coordinates) {
        if let Some(state) = self.devices.get_mut(device.index()) {
            state.position = position;
        }
    }

    fn associate(&mut self, device: DeviceHandle, pan_id: u16, coordinator: MacAddress) {
        if let Some(state) = self.devices.get_mut(device.index()) {
            state.association = Some((pan_id, coordinator));
        }
    }

    fn start_beacon(&mut self, scheduler: &mut Scheduler, device: DeviceHandle, request: StartRequest) {
        let now = scheduler.now();
        let status = match self.devices.get_mut(device.index()) {
            Some(state) if request.pan_coordinator && state.channel.is_some() => {
                state.beacon = Some(BeaconState {
                    pan_id: request.pan_id,
                    logical_channel: request.logical_channel,
                    beacon_order: request.beacon_order,
                    superframe_order: request.superframe_order,
                    started_at: now,
                });
                MacStatus::Success
            }
            _ => MacStatus::InvalidParameter,
        };
        scheduler.schedule(TURNAROUND_DURATION, Event::StartConfirm(StartConfirm { device, status }));
    }

    fn send_data(&mut self, scheduler: &mut Scheduler, device: DeviceHandle, request: DataRequest) {
        let now = scheduler.now();
        let Some(sender) = self.devices.get(device.index()).cloned() else {
            return;
        };

        let Some(channel) = sender.channel else {
            self.push_record(TransmissionRecord {
                at: now,
                device,
                channel: None,
                status: MacStatus::InvalidParameter,
            });
            scheduler.schedule(
                TURNAROUND_DURATION,
                Event::DataConfirm(DataConfirm {
                    device,
                    msdu_handle: request.msdu_handle,
                    status: MacStatus::InvalidParameter,
                }),
            );
            return;
        };

        if self.busy_until.get(&channel).is_some_and(|&end| end > now) {
            log::debug!("{} busy, {} gives up after CCA", channel, device);
            self.push_record(TransmissionRecord {
                at: now,
                device,
                channel: Some(channel),
                status: MacStatus::ChannelAccessFailure,
            });
            scheduler.schedule(
                CCA_DURATION,
                Event::DataConfirm(DataConfirm {
                    device,
                    msdu_handle: request.msdu_handle,
                    status: MacStatus::ChannelAccessFailure,
                }),
            );
            return;
        }

        let airtime = frame_air_time(request.payload_size);
        self.busy_until.insert(channel, now + airtime);

        let reception = self.evaluate_reception(&sender, channel, request.destination);
        let status = if reception.is_some() { MacStatus::Success } else { MacStatus::NoAck };
        self.push_record(TransmissionRecord {
            at: now,
            device,
            channel: Some(channel),
            status,
        });

        // Confirm goes first so the attempt is counted before the reception.
        scheduler.schedule(
            airtime,
            Event::DataConfirm(DataConfirm {
                device,
                msdu_handle: request.msdu_handle,
                status,
            }),
        );
        if let Some((receiver, rssi)) = reception {
            scheduler.schedule(
                airtime,
                Event::DataIndication(DataIndication {
                    device: receiver,
                    source: sender.address,
                    payload_size: request.payload_size,
                    rssi: rssi as f32,
                }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Duration;

    fn data_to(destination: MacAddress) -> DataRequest {
        DataRequest {
            destination,
            payload_size: 10,
            msdu_handle: 0,
        }
    }

    fn drain(scheduler: &mut Scheduler) -> Vec<Event> {
        std::iter::from_fn(|| scheduler.next_event()).collect()
    }

    fn pair(mac: &mut SimulatedMac, channel: ChannelId) -> (DeviceHandle, DeviceHandle) {
        let coordinator = mac.create_device(MacAddress(1));
        let leaf = mac.create_device(MacAddress(2));
        mac.bind_channel(coordinator, channel);
        mac.bind_channel(leaf, channel);
        mac.set_position(leaf, Coordinates::new(0.0, 10.0, 0.0));
        (coordinator, leaf)
    }

    #[test]
    fn delivered_frame_confirms_before_indication() {
        let mut mac = SimulatedMac::new(PathLossParameters::default(), 1);
        let mut scheduler = Scheduler::new();
        let channel = mac.create_channel();
        let (coordinator, leaf) = pair(&mut mac, channel);

        mac.send_data(&mut scheduler, leaf, data_to(MacAddress(1)));
        let events = drain(&mut scheduler);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::DataConfirm(DataConfirm { status: MacStatus::Success, .. })));
        assert!(matches!(events[1], Event::DataIndication(DataIndication { device, .. }) if device == coordinator));
        assert_eq!(scheduler.now(), Instant::from_ticks(0) + frame_air_time(10));
    }

    #[test]
    fn different_channels_do_not_hear_each_other() {
        let mut mac = SimulatedMac::new(PathLossParameters::default(), 1);
        let mut scheduler = Scheduler::new();
        let a = mac.create_channel();
        let b = mac.create_channel();
        let (coordinator, leaf) = pair(&mut mac, a);
        mac.bind_channel(coordinator, b);

        mac.send_data(&mut scheduler, leaf, data_to(MacAddress(1)));
        let events = drain(&mut scheduler);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::DataConfirm(DataConfirm { status: MacStatus::NoAck, .. })));
        assert_eq!(mac.history().map(|r| r.channel).collect::<Vec<_>>(), vec![Some(a)]);
    }

    #[test]
    fn out_of_range_frame_is_not_acknowledged() {
        let mut mac = SimulatedMac::new(PathLossParameters::default(), 1);
        let mut scheduler = Scheduler::new();
        let channel = mac.create_channel();
        let (_, leaf) = pair(&mut mac, channel);
        mac.set_position(leaf, Coordinates::new(10_000.0, 0.0, 0.0));

        mac.send_data(&mut scheduler, leaf, data_to(MacAddress(1)));
        let events = drain(&mut scheduler);
        assert!(matches!(events[..], [Event::DataConfirm(DataConfirm { status: MacStatus::NoAck, .. })]));
    }

    #[test]
    fn busy_medium_reports_channel_access_failure() {
        let mut mac = SimulatedMac::new(PathLossParameters::default(), 1);
        let mut scheduler = Scheduler::new();
        let channel = mac.create_channel();
        let (_, leaf) = pair(&mut mac, channel);
        let other = mac.create_device(MacAddress(3));
        mac.bind_channel(other, channel);

        mac.send_data(&mut scheduler, leaf, data_to(MacAddress(1)));
        mac.send_data(&mut scheduler, other, data_to(MacAddress(1)));

        let statuses: Vec<MacStatus> = mac.history().map(|r| r.status).collect();
        assert_eq!(statuses, vec![MacStatus::Success, MacStatus::ChannelAccessFailure]);

        // Once the first frame is off the air the medium is free again.
        drain(&mut scheduler);
        scheduler.schedule(Duration::from_millis(1), Event::Report);
        scheduler.next_event();
        mac.send_data(&mut scheduler, other, data_to(MacAddress(1)));
        assert_eq!(mac.history().last().map(|r| r.status), Some(MacStatus::Success));
    }

    #[test]
    fn start_requires_bound_coordinator() {
        let mut mac = SimulatedMac::new(PathLossParameters::default(), 1);
        let mut scheduler = Scheduler::new();
        let channel = mac.create_channel();
        let unbound = mac.create_device(MacAddress(9));
        let (coordinator, _) = pair(&mut mac, channel);
        let request = StartRequest {
            pan_id: 4,
            pan_coordinator: true,
            beacon_order: 15,
            superframe_order: 15,
            logical_channel: LogicalChannel::cyclic(0),
        };

        mac.start_beacon(&mut scheduler, coordinator, request);
        mac.start_beacon(&mut scheduler, unbound, request);
        let events = drain(&mut scheduler);
        assert_eq!(
            events,
            vec![
                Event::StartConfirm(StartConfirm {
                    device: coordinator,
                    status: MacStatus::Success
                }),
                Event::StartConfirm(StartConfirm {
                    device: unbound,
                    status: MacStatus::InvalidParameter
                }),
            ]
        );
        assert_eq!(mac.beacon(coordinator).map(|b| b.pan_id), Some(4));
        assert!(mac.beacon(unbound).is_none());
    }
}
