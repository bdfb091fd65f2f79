//! Multi-Network Orchestrator.
//!
//! [`Simulation`] owns every piece of run state: the scheduler and its
//! clock, the MAC collaborator, the network id allocator, the statistics,
//! the channel controller and the seeded RNG. Networks are built, launched
//! with staggered start times, and then driven one event at a time until the
//! stop deadline.

use embassy_time::{Duration, Instant};
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::channel_controller::{ChannelController, Reassignment};
use super::events::Event;
use super::geometry::network_anchor;
use super::mac::{MacLayer, SimulatedMac};
use super::network::{BeaconSettings, NetworkError, PanNetwork};
use super::scheduler::{EPSILON, MAX_SIMULATED_MS, Scheduler};
use super::stats::{Statistics, StatsSnapshot};
use super::types::{ChannelId, Coordinates, DeviceHandle, LogicalChannel, NetworkId, NetworkIdAllocator};
use crate::config::{MediumSharing, ScenarioConfig};

/// End-of-run state of one network, as seen by the simulated MAC.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct NetworkSummary {
    pub network: NetworkId,
    pub devices: usize,
    pub anchor: Coordinates,
    pub coordinator_position: Option<Coordinates>,
    /// Channel the coordinator's beacon was started on, if MLME-START succeeded.
    pub beacon_channel: Option<LogicalChannel>,
    pub rounds_sent: u64,
    pub last_round_ms: Option<u64>,
    pub stopped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error(transparent)]
    Sequencing(#[from] NetworkError),
    #[error("unknown network {0}")]
    UnknownNetwork(NetworkId),
    #[error("network {network} has no device {index}")]
    UnknownDevice { network: NetworkId, index: usize },
    #[error("unknown channel {0}")]
    UnknownChannel(u32),
    #[error("cannot schedule at {at_ms} ms, simulation is already at {now_ms} ms")]
    ScheduleInPast { at_ms: u64, now_ms: u64 },
    #[error("no stop deadline set, launch the networks before running")]
    MissingStopDeadline,
    #[error("invalid scenario: {0}")]
    InvalidConfig(String),
}

pub struct Simulation<M: MacLayer> {
    config: ScenarioConfig,
    scheduler: Scheduler,
    mac: M,
    ids: NetworkIdAllocator,
    networks: Vec<PanNetwork>,
    // Primary media first, spares after.
    channels: Vec<ChannelId>,
    primary_channels: usize,
    stats: Statistics,
    controller: ChannelController,
    rng: StdRng,
    report: Option<StatsSnapshot>,
    report_scheduled: bool,
}

impl<M: MacLayer> Simulation<M> {
    /// Create the run state and the media described by `config`.
    pub fn new(config: ScenarioConfig, mut mac: M) -> Self {
        let primary_channels = config.primary_channels();
        let channels: Vec<ChannelId> = (0..config.total_channels()).map(|_| mac.create_channel()).collect();
        log::info!(
            "Created {} media ({:?} sharing, {} spare)",
            channels.len(),
            config.medium_sharing,
            config.channel_count
        );

        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            scheduler: Scheduler::new(),
            mac,
            ids: NetworkIdAllocator::new(),
            networks: Vec::new(),
            channels,
            primary_channels,
            stats: Statistics::new(),
            controller: ChannelController::new(),
            report: None,
            report_scheduled: false,
        }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn now(&self) -> Instant {
        self.scheduler.now()
    }

    pub fn mac(&self) -> &M {
        &self.mac
    }

    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    pub fn channel(&self, index: u32) -> Result<ChannelId, SimulationError> {
        self.channels.get(index as usize).copied().ok_or(SimulationError::UnknownChannel(index))
    }

    pub fn networks(&self) -> &[PanNetwork] {
        &self.networks
    }

    pub fn network(&self, id: NetworkId) -> Option<&PanNetwork> {
        self.networks.get(id.index())
    }

    fn network_mut(&mut self, id: NetworkId) -> Result<&mut PanNetwork, SimulationError> {
        self.networks.get_mut(id.index()).ok_or(SimulationError::UnknownNetwork(id))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Snapshot captured by the terminal report, once it has fired.
    pub fn report(&self) -> Option<StatsSnapshot> {
        self.report
    }

    pub fn reassignments(&self) -> &[Reassignment] {
        self.controller.history()
    }

    fn channel_for(&mut self, id: NetworkId) -> ChannelId {
        match self.config.medium_sharing {
            MediumSharing::Shared => self.channels[0],
            MediumSharing::Isolated if id.index() < self.primary_channels => self.channels[id.index()],
            MediumSharing::Isolated => {
                let channel = self.mac.create_channel();
                self.channels.push(channel);
                channel
            }
        }
    }

    /// Allocate a fresh id and create an uninstalled network anchored by it.
    pub fn create_network(&mut self) -> NetworkId {
        let id = self.ids.allocate();
        let channel = self.channel_for(id);
        let anchor = network_anchor(id, self.config.anchor_spacing);
        let network = PanNetwork::new(id, channel, self.config.layout.clone(), anchor, self.config.payload_size)
            .with_round_limit(self.config.round_limit);
        self.networks.push(network);
        log::debug!(
            "Created PAN {} on {} at ({:.1}, {:.1}), {} networks allocated",
            id,
            channel,
            anchor.x,
            anchor.y,
            self.ids.allocated()
        );
        id
    }

    pub fn install_network(&mut self, id: NetworkId, device_count: usize) -> Result<(), SimulationError> {
        let network = self.networks.get_mut(id.index()).ok_or(SimulationError::UnknownNetwork(id))?;
        network.install(&mut self.mac, device_count, &mut self.rng)?;
        Ok(())
    }

    /// Create and install `count` networks of `devices_per_network` devices.
    pub fn build_networks(&mut self, count: usize, devices_per_network: usize) -> Result<Vec<NetworkId>, SimulationError> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.create_network();
            self.install_network(id, devices_per_network)?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Start every network after its stagger delay, schedule its first round
    /// at the same instant, set the stop deadline `duration-ms` from now and
    /// schedule the terminal report one tick before it.
    pub fn launch_all(&mut self, ids: &[NetworkId]) -> Result<(), SimulationError> {
        self.config.validate().map_err(SimulationError::InvalidConfig)?;
        let beacon = BeaconSettings {
            beacon_order: self.config.beacon_order,
            superframe_order: self.config.superframe_order,
        };

        for &id in ids {
            let delay = self.config.stagger.start_delay(id, &mut self.rng);
            let network = self.networks.get_mut(id.index()).ok_or(SimulationError::UnknownNetwork(id))?;
            network.start(&mut self.scheduler, LogicalChannel::cyclic(id.index()), delay, beacon)?;
            // Inserted after BeaconStart, so the coordinator starts before the first round.
            self.scheduler.schedule(delay, Event::SendRound { network: id });
        }

        if !self.report_scheduled {
            let stop = self.scheduler.now() + Duration::from_millis(self.config.duration_ms);
            self.scheduler.stop_at(stop);
            let report_at = stop - EPSILON;
            if !self.scheduler.schedule_at(report_at, Event::Report) {
                return Err(SimulationError::ScheduleInPast {
                    at_ms: report_at.as_millis(),
                    now_ms: self.scheduler.now().as_millis(),
                });
            }
            self.report_scheduled = true;
            log::info!("Launched {} networks, stopping at {} ms", ids.len(), stop.as_millis());
        }
        Ok(())
    }

    pub fn schedule_reassignment(&mut self, device: DeviceHandle, channel: ChannelId, at: Instant) -> Result<(), SimulationError> {
        self.controller.schedule_reassignment(&mut self.scheduler, device, channel, at)
    }

    pub fn schedule_network_reassignment(&mut self, network: NetworkId, channel: ChannelId, at: Instant) -> Result<(), SimulationError> {
        if self.network(network).is_none() {
            return Err(SimulationError::UnknownNetwork(network));
        }
        self.controller.schedule_network_reassignment(&mut self.scheduler, network, channel, at)
    }

    /// Install the `[[reassignment]]` entries of the scenario.
    pub fn schedule_reassignments(&mut self) -> Result<(), SimulationError> {
        for entry in self.config.reassignment.clone() {
            let network_id = NetworkId(entry.network);
            let channel = self.channel(entry.channel)?;
            if entry.at_ms > MAX_SIMULATED_MS {
                return Err(SimulationError::InvalidConfig(format!(
                    "reassignment at {} ms exceeds the maximum of {} ms",
                    entry.at_ms, MAX_SIMULATED_MS
                )));
            }
            let at = Instant::from_millis(entry.at_ms);
            match entry.device {
                Some(index) => {
                    let network = self.network(network_id).ok_or(SimulationError::UnknownNetwork(network_id))?;
                    let device = network.device(index).ok_or(SimulationError::UnknownDevice { network: network_id, index })?;
                    self.schedule_reassignment(device, channel, at)?;
                }
                None => self.schedule_network_reassignment(network_id, channel, at)?,
            }
        }
        Ok(())
    }

    /// Cancel the repeating round of one network.
    pub fn stop_network(&mut self, id: NetworkId) -> Result<(), SimulationError> {
        self.network_mut(id)?.stop();
        Ok(())
    }

    /// Dispatch exactly one event. Returns `false` once nothing is left to
    /// run before the stop deadline.
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        match self.scheduler.next_event() {
            Some(event) => {
                self.dispatch(event)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run to the stop deadline and return the final statistics.
    pub fn run(&mut self) -> Result<StatsSnapshot, SimulationError> {
        if self.scheduler.stop_deadline().is_none() {
            return Err(SimulationError::MissingStopDeadline);
        }
        while self.step()? {}

        log::info!(
            "Simulation finished at {} ms after {} events ({} left unrun)",
            self.scheduler.now().as_millis(),
            self.scheduler.dispatched(),
            self.scheduler.pending()
        );
        Ok(self.report.unwrap_or_else(|| self.stats.snapshot()))
    }

    fn dispatch(&mut self, event: Event) -> Result<(), SimulationError> {
        let now = self.scheduler.now();
        match event {
            Event::BeaconStart { device, request } => {
                self.mac.start_beacon(&mut self.scheduler, device, request);
            }
            Event::StartConfirm(confirm) => {
                log::info!("{} ms\t{} MLME-START.confirm: {:?}", now.as_millis(), confirm.device, confirm.status);
            }
            Event::SendRound { network } => {
                let entity = self.networks.get_mut(network.index()).ok_or(SimulationError::UnknownNetwork(network))?;
                let summary = entity.send_round(&mut self.scheduler, &mut self.stats, &self.config.round, &mut self.rng)?;
                match summary.next_round_in {
                    Some(period) => log::debug!(
                        "{} ms\tPAN {} round {}: {} attempts scheduled, next round in {} ms",
                        now.as_millis(),
                        network,
                        summary.round_index,
                        summary.scheduled,
                        period.as_millis()
                    ),
                    None => log::info!(
                        "{} ms\tPAN {} round {}: {} attempts scheduled, no further rounds",
                        now.as_millis(),
                        network,
                        summary.round_index,
                        summary.scheduled
                    ),
                }
            }
            Event::DataRequest { device, request } => {
                self.mac.send_data(&mut self.scheduler, device, request);
            }
            Event::DataConfirm(confirm) => {
                log::debug!("{} ms\t{} MCPS-DATA.confirm: {:?}", now.as_millis(), confirm.device, confirm.status);
                self.stats.record_attempted(confirm.status);
            }
            Event::DataIndication(indication) => {
                log::debug!(
                    "{} ms\t{} received {} octets from {} at {:.1} dBm",
                    now.as_millis(),
                    indication.device,
                    indication.payload_size,
                    indication.source,
                    indication.rssi
                );
                self.stats.record_received();
            }
            Event::ChannelReassignment { device, channel } => {
                self.controller.apply(&mut self.mac, now, device, channel);
            }
            Event::NetworkReassignment { network, channel } => {
                let entity = self.networks.get_mut(network.index()).ok_or(SimulationError::UnknownNetwork(network))?;
                self.controller.apply_network(&mut self.mac, now, entity, channel);
            }
            Event::Report => {
                let snapshot = self.stats.snapshot();
                log::info!("{}", snapshot);
                self.report = Some(snapshot);
            }
        }
        Ok(())
    }
}

impl Simulation<SimulatedMac> {
    /// Per-network state after a run, in network id order.
    pub fn network_summaries(&self) -> Vec<NetworkSummary> {
        self.networks
            .iter()
            .map(|network| {
                let coordinator = network.coordinator();
                NetworkSummary {
                    network: network.id(),
                    devices: network.devices().len(),
                    anchor: network.anchor(),
                    coordinator_position: coordinator.and_then(|c| self.mac.position(c)),
                    beacon_channel: coordinator.and_then(|c| self.mac.beacon(c)).map(|b| b.logical_channel),
                    rounds_sent: network.rounds_sent(),
                    last_round_ms: network.last_round_at().map(|at| at.as_millis()),
                    stopped: network.is_stopped(),
                }
            })
            .collect()
    }
}
