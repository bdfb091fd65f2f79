//! Geometry helpers for device placement.
//!
//! Contains helper functions for:
//! - Euclidean distance between devices
//! - Per-network anchor points so networks occupy distinct regions
//! - Layout policies (grid, bounded random disc) producing device positions

use rand::Rng;
use serde::Deserialize;
use std::f64::consts::TAU;

use super::types::{Coordinates, NetworkId};

/// Euclidean distance in meters.
pub fn distance(a: &Coordinates, b: &Coordinates) -> f64 {
    distance2(a, b).sqrt()
}

/// Squared distance (avoids a sqrt when only comparing).
pub fn distance2(a: &Coordinates, b: &Coordinates) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    dx * dx + dy * dy + dz * dz
}

/// Anchor of a network: networks are laid out along the diagonal,
/// `spacing` meters apart on each axis.
///
/// # Parameters
///
/// - `network`: id of the network, its position along the diagonal
/// - `spacing`: distance between consecutive anchors on each axis, in meters
///
/// # Returns
///
/// `(id × spacing, id × spacing, 0)`. Network 0 sits on the origin.
pub fn network_anchor(network: NetworkId, spacing: f64) -> Coordinates {
    let offset = network.0 as f64 * spacing;
    Coordinates::new(offset, offset, 0.0)
}

/// How the devices of one network are positioned around its anchor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LayoutPolicy {
    /// Row-major grid starting at the anchor.
    Grid { spacing: f64, columns: usize },
    /// Uniform distance in `[0, radius]` and uniform angle around the anchor.
    /// The coordinator is placed on the anchor itself.
    RandomDisc { radius: f64 },
}

impl Default for LayoutPolicy {
    fn default() -> Self {
        LayoutPolicy::RandomDisc { radius: 5.0 }
    }
}

impl LayoutPolicy {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            LayoutPolicy::Grid { spacing, columns } => {
                if *columns == 0 {
                    return Err("Grid layout needs at least one column".to_string());
                }
                if spacing.is_nan() || *spacing <= 0.0 {
                    return Err(format!("Invalid grid spacing {}, must be positive", spacing));
                }
            }
            LayoutPolicy::RandomDisc { radius } => {
                if radius.is_nan() || *radius < 0.0 {
                    return Err(format!("Invalid disc radius {}, must be non-negative", radius));
                }
            }
        }
        Ok(())
    }

    /// Positions for `count` devices, index 0 first.
    ///
    /// # Parameters
    ///
    /// - `anchor`: reference point of the network
    /// - `count`: number of devices, coordinator included
    /// - `rng`: only sampled by `RandomDisc`
    ///
    /// # Returns
    ///
    /// One position per device. `Grid` is deterministic; `RandomDisc` puts
    /// index 0 on the anchor and draws the rest inside the disc.
    pub fn positions<R: Rng + ?Sized>(&self, anchor: Coordinates, count: usize, rng: &mut R) -> Vec<Coordinates> {
        match self {
            LayoutPolicy::Grid { spacing, columns } => (0..count)
                .map(|i| {
                    let row = (i / columns) as f64;
                    let col = (i % columns) as f64;
                    Coordinates::new(anchor.x + col * spacing, anchor.y + row * spacing, anchor.z)
                })
                .collect(),
            LayoutPolicy::RandomDisc { radius } => (0..count)
                .map(|i| {
                    if i == 0 || *radius == 0.0 {
                        return anchor;
                    }
                    let rho = rng.gen_range(0.0..=*radius);
                    let theta = rng.gen_range(0.0..TAU);
                    Coordinates::new(anchor.x + rho * theta.cos(), anchor.y + rho * theta.sin(), anchor.z)
                })
                .collect(),
        }
    }
}
