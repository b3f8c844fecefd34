use anyhow::Context;
use clap::Parser;
use resqterra_coordinator::sim::{SimConfig, SimulatedVehicle};
use resqterra_coordinator::store::MemoryStore;
use resqterra_coordinator::transport::LocalBus;
use resqterra_coordinator::{Coordinator, CoordinatorConfig, FleetEvent, Ingestor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "resqterra-coordinator", about = "ResQTerra fleet coordinator")]
struct Args {
    /// Path to a coordinator.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Spawn this many simulated vehicles on the local bus
    #[arg(long, default_value_t = 0)]
    simulate: usize,

    /// Bus capacity per subscriber before old messages are dropped
    #[arg(long, default_value_t = 1024)]
    bus_capacity: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = CoordinatorConfig::load(args.config.as_deref()).context("loading configuration")?;

    info!("Coordinator starting");
    info!("  Critical battery: {}%", config.critical_battery_percent);
    info!("  Min assignment battery: {}%", config.min_assignment_battery_percent);
    info!("  Ack timeout: {:?}", config.ack_timeout());
    info!("  Sweep interval: {:?}", config.sweep_interval());

    let bus = LocalBus::new(args.bus_capacity);
    let store = Arc::new(MemoryStore::new());
    let coordinator = Coordinator::new(config, Arc::new(bus.clone()), store);

    let restored = coordinator.restore().await.context("restoring missions")?;
    info!(restored, "Mission store loaded");

    // Subscribe before anything publishes so no inbound message is missed
    let inbound = bus.subscribe();
    let ingestor = Ingestor::new(coordinator.clone());
    let ingest_handle = tokio::spawn(async move { ingestor.run(inbound).await });
    let sweep_handle = coordinator.spawn_sweep();

    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(FleetEvent::MissionUpdated(m)) => {
                    debug!(mission_id = %m.id, status = %m.status, assigned_to = ?m.assigned_to, "Mission updated");
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event observer fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let sim_handles = if args.simulate > 0 {
        info!(vehicles = args.simulate, "Starting simulated fleet");
        SimulatedVehicle::spawn_fleet(args.simulate, SimConfig::default(), &bus)
    } else {
        Vec::new()
    };

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("Shutting down");

    for handle in sim_handles {
        handle.abort();
    }
    sweep_handle.abort();
    ingest_handle.abort();

    let vehicles = coordinator.vehicles().await;
    let missions = coordinator.missions().await;
    info!(vehicles = vehicles.len(), missions = missions.len(), "Final fleet state");
    Ok(())
}
