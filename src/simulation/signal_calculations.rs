//! Radio signal and timing calculations.
//!
//! Contains helpers for:
//! - Log-distance path loss with optional log-normal shadowing
//! - RSSI sampling at a given distance
//! - IEEE 802.15.4 (2.4 GHz O-QPSK) frame airtime
//!
//! Units:
//! - Power: dBm
//! - Distance: meters
//! - Time: embassy `Duration`

use embassy_time::Duration;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

/// Duration of one octet at 250 kb/s.
pub const OCTET_DURATION: Duration = Duration::from_micros(32);
/// Synchronization header plus PHY header (preamble, SFD, length).
pub const PHY_OVERHEAD_OCTETS: usize = 6;
/// MAC header and FCS of a data frame with extended addressing.
pub const MAC_OVERHEAD_OCTETS: usize = 21;
/// Clear channel assessment period (8 symbols).
pub const CCA_DURATION: Duration = Duration::from_micros(128);
/// RX-to-TX turnaround (12 symbols).
pub const TURNAROUND_DURATION: Duration = Duration::from_micros(192);

/// Parameters of the propagation model and radio front-end.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PathLossParameters {
    /// Path loss exponent (n). 2.0 is free space, 3.0 a typical indoor value.
    pub path_loss_exponent: f64,
    /// Path loss at the 1 m reference distance (dB).
    pub reference_loss_db: f64,
    /// Standard deviation of log-normal shadowing (dB). 0 disables it.
    pub shadowing_sigma: f64,
    pub tx_power_dbm: f64,
    /// Minimum RSSI at which a frame is decoded.
    pub sensitivity_dbm: f64,
}

impl Default for PathLossParameters {
    fn default() -> Self {
        Self {
            path_loss_exponent: 3.0,
            reference_loss_db: 46.6777,
            shadowing_sigma: 0.0,
            tx_power_dbm: 0.0,
            sensitivity_dbm: -106.58,
        }
    }
}

impl PathLossParameters {
    pub fn validate(&self) -> Result<(), String> {
        if self.path_loss_exponent.is_nan() || self.path_loss_exponent <= 0.0 {
            return Err(format!("Invalid path-loss-exponent {}, must be positive", self.path_loss_exponent));
        }
        if self.shadowing_sigma.is_nan() || self.shadowing_sigma < 0.0 {
            return Err(format!("Invalid shadowing-sigma {}, must be non-negative", self.shadowing_sigma));
        }
        Ok(())
    }
}

/// Path loss (dB) at `distance`:
///
/// ```text
/// PL(d) = PL(d₀) + 10 × n × log₁₀(d/d₀) + X_σ,   d₀ = 1 m
/// ```
///
/// # Parameters
///
/// - `distance`: transmitter to receiver distance in meters
/// - `params`: exponent, reference loss and shadowing sigma of the model
/// - `rng`: source for the shadowing sample
///
/// # Returns
///
/// Path loss in dB. Stochastic when `shadowing_sigma > 0`.
///
/// # Notes
///
/// - Distances under the reference distance return the reference loss
/// - The shadowing term is sampled from Normal(0, σ) on every call
pub fn calculate_path_loss<R: Rng + ?Sized>(distance: f64, params: &PathLossParameters, rng: &mut R) -> f64 {
    let deterministic = if distance < 1.0 {
        params.reference_loss_db
    } else {
        params.reference_loss_db + 10.0 * params.path_loss_exponent * distance.log10()
    };
    let shadowing = if params.shadowing_sigma > 0.0 {
        match Normal::new(0.0, params.shadowing_sigma) {
            Ok(normal) => normal.sample(rng),
            Err(_) => 0.0,
        }
    } else {
        0.0
    };
    deterministic + shadowing
}

/// Sampled RSSI (dBm) of a frame sent with the configured power over `distance`.
pub fn calculate_rssi<R: Rng + ?Sized>(distance: f64, params: &PathLossParameters, rng: &mut R) -> f64 {
    params.tx_power_dbm - calculate_path_loss(distance, params, rng)
}

/// Distance at which the mean RSSI equals the receiver sensitivity.
///
/// Solves the path loss model without shadowing for the link budget:
///
/// ```text
/// d = 10 ^ ((P_tx - S - PL(d₀)) / (10 × n))
/// ```
///
/// # Parameters
///
/// - `params`: transmit power, sensitivity and path loss model
///
/// # Returns
///
/// Range in meters, or `0.0` when the reference loss alone already exceeds
/// the link budget.
pub fn calculate_effective_distance(params: &PathLossParameters) -> f64 {
    let budget = params.tx_power_dbm - params.sensitivity_dbm - params.reference_loss_db;
    if budget <= 0.0 {
        return 0.0;
    }
    10f64.powf(budget / (10.0 * params.path_loss_exponent))
}

/// On-air duration of a data frame carrying `payload_size` octets.
///
/// # Returns
///
/// (PHY overhead + MAC overhead + payload) octets at 32 µs per octet
/// (250 kbit/s, 2.4 GHz O-QPSK).
pub fn frame_air_time(payload_size: usize) -> Duration {
    OCTET_DURATION * (PHY_OVERHEAD_OCTETS + MAC_OVERHEAD_OCTETS + payload_size) as u32
}
