use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use log::{LevelFilter, info};
use serde::Serialize;
use std::path::PathBuf;

use multipan_simulator::config::ScenarioConfig;
use multipan_simulator::simulation::{NetworkSummary, SimulatedMac, Simulation, StatsSnapshot};

#[derive(Parser)]
#[command(name = "multipan-simulator")]
#[command(about = "Slotted multi-PAN IEEE 802.15.4 simulator")]
struct Args {
    /// Scenario file (.toml or .json). Built-in defaults when omitted.
    scenario: Option<PathBuf>,

    #[arg(long, help = "Override the number of networks")]
    networks: Option<usize>,

    #[arg(long, help = "Override devices per network, coordinator included")]
    devices: Option<usize>,

    #[arg(long, help = "Override the simulated run length")]
    duration_ms: Option<u64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, help = "Also print the final statistics as JSON")]
    json: bool,

    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

#[derive(Serialize)]
struct RunReport<'a> {
    stats: &'a StatsSnapshot,
    networks: &'a [NetworkSummary],
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("multipan_simulator"), args.log_level)
        .parse_default_env()
        .init();

    let mut config = match &args.scenario {
        Some(path) => ScenarioConfig::load(path)?,
        None => ScenarioConfig::default(),
    };
    if let Some(networks) = args.networks {
        config.network_count = networks;
    }
    if let Some(devices) = args.devices {
        config.devices_per_network = devices;
    }
    if let Some(duration_ms) = args.duration_ms {
        config.duration_ms = duration_ms;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate().map_err(|e| anyhow::anyhow!("Invalid scenario: {}", e))?;

    info!(
        "Starting {} networks x {} devices for {} ms (seed {})",
        config.network_count, config.devices_per_network, config.duration_ms, config.seed
    );

    let mac = SimulatedMac::new(config.radio.clone(), config.seed);
    let (network_count, devices_per_network) = (config.network_count, config.devices_per_network);
    let mut simulation = Simulation::new(config, mac);
    let ids = simulation
        .build_networks(network_count, devices_per_network)
        .context("Failed to build networks")?;
    simulation.launch_all(&ids).context("Failed to launch networks")?;
    simulation.schedule_reassignments().context("Failed to schedule channel reassignments")?;
    let snapshot = simulation.run().context("Simulation aborted")?;

    let networks = simulation.network_summaries();
    info!("{} devices on {} media", simulation.mac().device_count(), simulation.mac().channel_count());
    for summary in &networks {
        info!(
            "PAN {}: {} devices at ({:.1}, {:.1}), {} rounds, last at {} ms{}",
            summary.network,
            summary.devices,
            summary.anchor.x,
            summary.anchor.y,
            summary.rounds_sent,
            summary.last_round_ms.map_or_else(|| "-".to_string(), |ms| ms.to_string()),
            if summary.stopped { ", stopped" } else { "" }
        );
    }

    println!("{}", snapshot);
    if args.json {
        let report = RunReport { stats: &snapshot, networks: &networks };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
