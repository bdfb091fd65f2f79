//! Round and stagger timing policies.
//!
//! How slots, round periods and per-network start offsets are computed is a
//! policy choice; the variants below cover a fixed-period round and the
//! slotted arithmetic where the period grows with device and network count.

use embassy_time::Duration;
use rand::Rng;
use serde::Deserialize;

use super::types::NetworkId;

/// Slot layout and repetition period of a network's transmission round.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RoundTiming {
    /// Constant period between rounds.
    #[serde(rename_all = "kebab-case")]
    Fixed {
        slot_length_ms: u64,
        period_ms: u64,
        #[serde(default)]
        jitter_ms: u64,
    },
    /// Period = (slot × (devices − 1) + gap) × network count, so every
    /// network gets a turn before the first one transmits again.
    #[serde(rename_all = "kebab-case")]
    Slotted {
        slot_length_ms: u64,
        inter_slot_gap_ms: u64,
        network_count: u64,
        #[serde(default)]
        jitter_ms: u64,
    },
}

impl Default for RoundTiming {
    fn default() -> Self {
        RoundTiming::Fixed {
            slot_length_ms: 1000,
            period_ms: 2000,
            jitter_ms: 0,
        }
    }
}

impl RoundTiming {
    pub fn validate(&self) -> Result<(), String> {
        let slot_length_ms = match self {
            RoundTiming::Fixed { slot_length_ms, .. } | RoundTiming::Slotted { slot_length_ms, .. } => *slot_length_ms,
        };
        if slot_length_ms == 0 {
            return Err("Invalid slot-length-ms, must be positive".to_string());
        }
        match self {
            RoundTiming::Fixed { period_ms, jitter_ms, .. } => {
                if *period_ms == 0 {
                    return Err("Invalid period-ms, must be positive".to_string());
                }
                if *jitter_ms >= *period_ms {
                    return Err(format!("Round jitter {} ms must be shorter than the period {} ms", jitter_ms, period_ms));
                }
            }
            RoundTiming::Slotted {
                inter_slot_gap_ms,
                network_count,
                jitter_ms,
                ..
            } => {
                if *network_count == 0 {
                    return Err("Invalid network-count in slotted round timing, must be positive".to_string());
                }
                if *jitter_ms > *inter_slot_gap_ms {
                    return Err(format!(
                        "Round jitter {} ms must not exceed the inter-slot gap {} ms",
                        jitter_ms, inter_slot_gap_ms
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn slot_length(&self) -> Duration {
        match self {
            RoundTiming::Fixed { slot_length_ms, .. } | RoundTiming::Slotted { slot_length_ms, .. } => Duration::from_millis(*slot_length_ms),
        }
    }

    /// Offset of a leaf device's transmission from the start of the round.
    /// Strictly increasing in `device_index`, one slot apart.
    pub fn slot_offset(&self, device_index: usize) -> Duration {
        self.slot_length() * device_index as u32
    }

    /// Unperturbed delay until the next round of a network with
    /// `device_count` devices (coordinator included).
    pub fn nominal_period(&self, device_count: usize) -> Duration {
        match self {
            RoundTiming::Fixed { period_ms, .. } => Duration::from_millis(*period_ms),
            RoundTiming::Slotted {
                slot_length_ms,
                inter_slot_gap_ms,
                network_count,
                ..
            } => {
                let leaves = device_count.saturating_sub(1) as u64;
                Duration::from_millis((slot_length_ms * leaves + inter_slot_gap_ms) * network_count)
            }
        }
    }

    /// Longest delay, in milliseconds, that one round of `device_count`
    /// devices schedules: the end of the last leaf's slot or the period,
    /// whichever is later. `None` if it does not fit in `u64`.
    pub fn longest_span_ms(&self, device_count: usize) -> Option<u64> {
        let (slot_length_ms, period_ms) = match self {
            RoundTiming::Fixed { slot_length_ms, period_ms, .. } => (*slot_length_ms, *period_ms),
            RoundTiming::Slotted {
                slot_length_ms,
                inter_slot_gap_ms,
                network_count,
                ..
            } => {
                let leaves = device_count.saturating_sub(1) as u64;
                let period = slot_length_ms.checked_mul(leaves)?.checked_add(*inter_slot_gap_ms)?.checked_mul(*network_count)?;
                (*slot_length_ms, period)
            }
        };
        let last_slot_end = slot_length_ms.checked_mul(device_count as u64)?;
        Some(last_slot_end.max(period_ms))
    }

    /// Delay until the next round, shortened by a random amount in
    /// `[1, jitter]` when jitter is enabled. Never shorter than one slot.
    pub fn round_period<R: Rng + ?Sized>(&self, device_count: usize, rng: &mut R) -> Duration {
        let nominal = self.nominal_period(device_count);
        let jitter_ms = match self {
            RoundTiming::Fixed { jitter_ms, .. } | RoundTiming::Slotted { jitter_ms, .. } => *jitter_ms,
        };
        if jitter_ms == 0 {
            return nominal;
        }
        let noise = Duration::from_millis(rng.gen_range(1..=jitter_ms));
        let floor = self.slot_length();
        if nominal.as_ticks() > noise.as_ticks() + floor.as_ticks() {
            nominal - noise
        } else {
            floor
        }
    }
}

/// Start offset of each network relative to launch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StaggerPolicy {
    /// delay = id × step
    #[serde(rename_all = "kebab-case")]
    Linear { step_ms: u64 },
    /// delay = id × step + uniform jitter in `[0, max_jitter)`.
    #[serde(rename_all = "kebab-case")]
    LinearJitter { step_ms: u64, max_jitter_ms: u64 },
}

impl Default for StaggerPolicy {
    fn default() -> Self {
        StaggerPolicy::Linear { step_ms: 1000 }
    }
}

impl StaggerPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if let StaggerPolicy::LinearJitter { step_ms, max_jitter_ms } = self {
            if max_jitter_ms >= step_ms {
                return Err(format!(
                    "Stagger jitter {} ms must be shorter than the stagger step {} ms",
                    max_jitter_ms, step_ms
                ));
            }
        }
        Ok(())
    }

    /// Latest start delay, in milliseconds, among `network_count` networks.
    /// `None` if it does not fit in `u64`.
    pub fn latest_delay_ms(&self, network_count: usize) -> Option<u64> {
        let last = network_count.saturating_sub(1) as u64;
        match self {
            StaggerPolicy::Linear { step_ms } => step_ms.checked_mul(last),
            StaggerPolicy::LinearJitter { step_ms, max_jitter_ms } => step_ms.checked_mul(last)?.checked_add(*max_jitter_ms),
        }
    }

    pub fn start_delay<R: Rng + ?Sized>(&self, network: NetworkId, rng: &mut R) -> Duration {
        match self {
            StaggerPolicy::Linear { step_ms } => Duration::from_millis(step_ms * network.0 as u64),
            StaggerPolicy::LinearJitter { step_ms, max_jitter_ms } => {
                let jitter = if *max_jitter_ms == 0 { 0 } else { rng.gen_range(0..*max_jitter_ms) };
                Duration::from_millis(step_ms * network.0 as u64 + jitter)
            }
        }
    }
}
