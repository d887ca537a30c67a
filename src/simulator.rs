//! ==============================================================================
//! simulator.rs - fluctuation simulator and demo sensors
//! ==============================================================================
//!
//! purpose:
//!     keeps the demo alive: nudges every stored metric by a small random
//!     step, either on a recurring timer or when asked over http. both paths
//!     go through `fluctuate_all`, which writes via the store so subscribers
//!     see simulated changes exactly like real ones.
//!
//! relationships:
//!     - used by: main.rs (recurring loop), hub.rs (on-demand pass, seeding)
//!     - writes: store.rs (`modify`, `set`)
//!
//! ==============================================================================

use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;

use crate::domain::{Metric, MetricValues, Reading};
use crate::store::SensorStore;

/// the four sensors the demo starts with
pub const DEMO_SENSORS: [(&str, MetricValues); 4] = [
    ("main_room", MetricValues::full(24.5, 65.2, 420.0, 1013.25)),
    ("greenhouse_01", MetricValues::full(26.8, 72.1, 380.0, 1012.8)),
    ("laboratory", MetricValues::full(22.3, 58.9, 450.0, 1014.1)),
    ("cultivation_area", MetricValues::full(28.1, 78.5, 395.0, 1011.9)),
];

/// upsert the demo sensors with fresh timestamps. returns how many were written.
pub fn init_demo_sensors(store: &SensorStore) -> usize {
    for (sensor_id, values) in DEMO_SENSORS {
        let mut reading = Reading::new(sensor_id);
        values.apply_to(&mut reading);
        store.set(reading);
    }
    tracing::info!(count = DEMO_SENSORS.len(), "demo sensors initialized");
    DEMO_SENSORS.len()
}

/// one fluctuation pass over every sensor using the thread rng
pub fn fluctuate_all(store: &SensorStore) -> usize {
    fluctuate_all_with(store, &mut rand::thread_rng())
}

/// one fluctuation pass driven by `rng`. returns how many sensors changed.
///
/// only metrics the sensor already reports are touched; each moves by at
/// most `Metric::max_step` and is rounded to the metric's precision.
pub fn fluctuate_all_with<R: Rng>(store: &SensorStore, rng: &mut R) -> usize {
    let mut updated = 0;
    for sensor_id in store.sensor_ids() {
        let result = store.modify(&sensor_id, |reading| {
            perturb(reading, rng);
            Ok(())
        });
        // a sensor deleted between listing and writing is simply skipped
        if result.is_ok() {
            updated += 1;
        }
    }
    tracing::debug!(sensors = updated, "fluctuation pass applied");
    updated
}

fn perturb<R: Rng>(reading: &mut Reading, rng: &mut R) {
    let present: Vec<(Metric, f64)> = reading.metrics().collect();
    for (metric, value) in present {
        let step = metric.max_step();
        let delta = rng.gen_range(-step..=step);
        reading.set(metric, metric.round(value + delta));
    }
}

/// run `fluctuate_all` every `interval` until the returned task is aborted
pub fn spawn_fluctuation_loop(store: SensorStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            fluctuate_all(&store);
        }
    })
}
