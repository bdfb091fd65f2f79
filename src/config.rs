//! Scenario configuration.
//!
//! A scenario is read from a TOML or JSON file (chosen by extension). Every
//! key is optional; missing keys fall back to the default scenario of three
//! networks with five devices each, sharing one medium for 30 seconds.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::simulation::geometry::LayoutPolicy;
use crate::simulation::policy::{RoundTiming, StaggerPolicy};
use crate::simulation::scheduler::MAX_SIMULATED_MS;
use crate::simulation::signal_calculations::PathLossParameters;

const MAX_NETWORKS: usize = u16::MAX as usize;
const MAX_DEVICES_PER_NETWORK: usize = u16::MAX as usize;
/// Beacon and superframe orders are 4-bit fields; 15 means non-beacon mode.
const MAX_BEACON_ORDER: u8 = 15;

/// How networks are mapped onto media when they are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediumSharing {
    /// Every network is bound to the same medium.
    #[default]
    Shared,
    /// Each network gets a medium of its own.
    Isolated,
}

/// A scheduled channel swap, for one device or for a whole network.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReassignmentConfig {
    pub network: u16,
    /// Device index inside the network. Absent means every device.
    #[serde(default)]
    pub device: Option<usize>,
    /// Index of the target medium (see [`ScenarioConfig::total_channels`]).
    pub channel: u32,
    pub at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScenarioConfig {
    pub network_count: usize,
    /// Devices per network, coordinator included.
    pub devices_per_network: usize,
    pub duration_ms: u64,
    pub seed: u64,
    /// MSDU payload of every data request, in octets.
    pub payload_size: usize,
    /// Spare media created up-front, reachable only through reassignments.
    pub channel_count: usize,
    pub medium_sharing: MediumSharing,
    /// Distance between consecutive network anchors on each axis (meters).
    pub anchor_spacing: f64,
    pub beacon_order: u8,
    pub superframe_order: u8,
    /// Rounds per network before it stops repeating. Unbounded when absent.
    pub round_limit: Option<u64>,
    pub layout: LayoutPolicy,
    pub round: RoundTiming,
    pub stagger: StaggerPolicy,
    pub radio: PathLossParameters,
    pub reassignment: Vec<ReassignmentConfig>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            network_count: 3,
            devices_per_network: 5,
            duration_ms: 30_000,
            seed: 0,
            payload_size: 10,
            channel_count: 0,
            medium_sharing: MediumSharing::Shared,
            anchor_spacing: 20.0,
            beacon_order: 15,
            superframe_order: 15,
            round_limit: None,
            layout: LayoutPolicy::default(),
            round: RoundTiming::default(),
            stagger: StaggerPolicy::default(),
            radio: PathLossParameters::default(),
            reassignment: Vec::new(),
        }
    }
}

impl ScenarioConfig {
    /// Load and validate a scenario file. `.json` files are parsed as JSON,
    /// anything else as TOML.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path).with_context(|| format!("Failed to read scenario file: {}", path.display()))?;

        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config: ScenarioConfig = if is_json {
            serde_json::from_str(&data).with_context(|| format!("Invalid JSON in {}", path.display()))?
        } else {
            toml::from_str(&data).with_context(|| format!("Invalid TOML in {}", path.display()))?
        };

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid scenario {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Media created by the simulation: the primary ones followed by the spares.
    pub fn total_channels(&self) -> usize {
        self.primary_channels() + self.channel_count
    }

    pub fn primary_channels(&self) -> usize {
        match self.medium_sharing {
            MediumSharing::Shared => 1,
            MediumSharing::Isolated => self.network_count,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.network_count == 0 {
            return Err("Scenario must contain at least one network".to_string());
        }
        if self.network_count > MAX_NETWORKS {
            return Err(format!("Network count {} exceeds maximum of {}", self.network_count, MAX_NETWORKS));
        }
        if self.devices_per_network == 0 {
            return Err("Each network needs at least one device (the coordinator)".to_string());
        }
        if self.devices_per_network > MAX_DEVICES_PER_NETWORK {
            return Err(format!(
                "Devices per network {} exceeds maximum of {}",
                self.devices_per_network, MAX_DEVICES_PER_NETWORK
            ));
        }
        if self.duration_ms == 0 {
            return Err("Invalid duration-ms, must be positive".to_string());
        }
        if self.duration_ms > MAX_SIMULATED_MS {
            return Err(format!("duration-ms {} exceeds the maximum of {} ms", self.duration_ms, MAX_SIMULATED_MS));
        }
        if self.anchor_spacing.is_nan() || self.anchor_spacing < 0.0 {
            return Err(format!("Invalid anchor-spacing {}, must be non-negative", self.anchor_spacing));
        }
        if self.beacon_order > MAX_BEACON_ORDER || self.superframe_order > MAX_BEACON_ORDER {
            return Err(format!(
                "Beacon order {} and superframe order {} must not exceed {}",
                self.beacon_order, self.superframe_order, MAX_BEACON_ORDER
            ));
        }
        if self.round_limit == Some(0) {
            return Err("Invalid round-limit, must be positive when set".to_string());
        }

        self.layout.validate()?;
        self.round.validate()?;
        self.stagger.validate()?;
        self.radio.validate()?;

        if let RoundTiming::Slotted { network_count, .. } = self.round {
            if network_count != self.network_count as u64 {
                return Err(format!(
                    "Slotted round timing is sized for {} networks but the scenario has {}",
                    network_count, self.network_count
                ));
            }
        }
        if !self
            .round
            .longest_span_ms(self.devices_per_network)
            .is_some_and(|span| span <= MAX_SIMULATED_MS)
        {
            return Err(format!("Round timing spans more than the maximum of {} ms", MAX_SIMULATED_MS));
        }
        let last_stop = self
            .stagger
            .latest_delay_ms(self.network_count)
            .and_then(|delay| delay.checked_add(self.duration_ms));
        if !last_stop.is_some_and(|ms| ms <= MAX_SIMULATED_MS) {
            return Err(format!(
                "Stagger of {} networks plus duration-ms exceeds the maximum of {} ms",
                self.network_count, MAX_SIMULATED_MS
            ));
        }

        let total_channels = self.total_channels();
        for reassignment in &self.reassignment {
            if reassignment.network as usize >= self.network_count {
                return Err(format!(
                    "Reassignment at {} ms targets unknown network {}",
                    reassignment.at_ms, reassignment.network
                ));
            }
            if let Some(device) = reassignment.device {
                if device >= self.devices_per_network {
                    return Err(format!(
                        "Reassignment at {} ms targets unknown device {} of network {}",
                        reassignment.at_ms, device, reassignment.network
                    ));
                }
            }
            if reassignment.channel as usize >= total_channels {
                return Err(format!(
                    "Reassignment at {} ms targets unknown channel {} ({} channels available)",
                    reassignment.at_ms, reassignment.channel, total_channels
                ));
            }
            if reassignment.at_ms > MAX_SIMULATED_MS {
                return Err(format!(
                    "Reassignment at {} ms exceeds the maximum of {} ms",
                    reassignment.at_ms, MAX_SIMULATED_MS
                ));
            }
            if reassignment.at_ms >= self.duration_ms {
                log::warn!(
                    "Reassignment at {} ms lies beyond the {} ms run and will never fire",
                    reassignment.at_ms,
                    self.duration_ms
                );
            }
        }
        Ok(())
    }
}
