//! ==============================================================================
//! main.rs - sensor hub entry point
//! ==============================================================================
//!
//! purpose:
//!     wires the process-wide pieces together and runs them until ctrl-c.
//!
//! responsibilities:
//!     - load hub.toml (or defaults) and install logging
//!     - build the one SensorStore this process owns
//!     - optionally seed the demo sensors
//!     - run the fluctuation loop in the background
//!     - serve the json api and the live stream
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                      sensor hub (this file)                  │
//!     │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//!     │  │ fluctuation │  │ web server  │  │ stream clients      │  │
//!     │  │ (10s cycle) │  │ (port 3000) │  │ (2s snapshots each) │  │
//!     │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘  │
//!     │         └────────────────┼────────────────────┘             │
//!     │                    ┌─────┴─────┐                            │
//!     │                    │   store   │ <- store.rs                │
//!     │                    └───────────┘                            │
//!     │        (Clone-able handle to the shared reading table)      │
//!     └─────────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use sensor_hub::api::{self, ApiState};
use sensor_hub::config::HubConfig;
use sensor_hub::events::EventBus;
use sensor_hub::{simulator, Reading, SensorHub, SensorStore, StreamGateway};

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Sensor Hub");
    println!("  \"Latest reading in, live snapshot out\"");
    println!("===========================================================");

    // step 1: load configuration
    let config = HubConfig::load_or_default();
    config.print_summary();

    // step 2: logging (RUST_LOG wins over the config file)
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // step 3: the store and everything that hangs off it
    let store = SensorStore::new();
    if config.logging.show_sensor_data {
        store.subscribe(
            |r: &Reading| -> Result<()> {
                tracing::info!(
                    sensor_id = %r.sensor_id,
                    temperature = ?r.temperature,
                    humidity = ?r.humidity,
                    co2 = ?r.co2,
                    pressure = ?r.pressure,
                    "reading"
                );
                Ok(())
            },
            None,
        );
    }
    let hub = SensorHub::new(store.clone(), EventBus::new());
    let gateway = StreamGateway::new(store.clone(), config.stream.interval(), config.stream.buffer);

    if config.simulator.seed_demo_sensors {
        hub.init_demo_sensors();
    }

    // step 4: background fluctuation
    let fluctuation = if config.simulator.enabled {
        tracing::info!(
            interval_seconds = config.simulator.interval_seconds,
            "starting fluctuation simulator"
        );
        Some(simulator::spawn_fluctuation_loop(
            store.clone(),
            config.simulator.interval(),
        ))
    } else {
        None
    };

    // step 5: serve until ctrl-c
    let result = api::serve(&config.server, ApiState::new(hub, gateway)).await;

    if let Some(handle) = fluctuation {
        handle.abort();
    }
    if let Err(e) = &result {
        tracing::error!("web server error: {:#}", e);
    }
    tracing::info!("sensor hub stopped");
    result
}
