//! Multi-network simulation core.
//!
//! Several IEEE 802.15.4 PANs (one coordinator plus leaf devices each) share
//! simulated media under a discrete-event scheduler. Each network transmits
//! in repeating rounds, one slot per leaf device, while an orchestrator
//! staggers the networks' start times and collects delivery statistics.
//!
//! ## Module Organization
//!
//! - `types`: identifiers and MAC request/confirm records
//! - `events`: the event enum and the time-ordered queue
//! - `scheduler`: simulated clock, relative scheduling and the stop deadline
//! - `stats`: requested / attempted / received counters
//! - `geometry`: distances, network anchors and device layouts
//! - `signal_calculations`: path loss, RSSI and frame airtime
//! - `mac`: the MAC/PHY collaborator trait and its simulated implementation
//! - `policy`: round timing and network start stagger
//! - `network`: one PAN and its round logic
//! - `channel_controller`: scheduled channel swaps
//! - `orchestrator`: builds, launches and drives all networks

pub mod channel_controller;
pub mod events;
pub mod geometry;
pub mod mac;
pub mod network;
pub mod orchestrator;
pub mod policy;
pub mod scheduler;
pub mod signal_calculations;
pub mod stats;
pub mod types;

pub use mac::{MacLayer, SimulatedMac};
pub use orchestrator::{NetworkSummary, Simulation, SimulationError};
pub use stats::StatsSnapshot;
