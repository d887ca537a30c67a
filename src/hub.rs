//! ==============================================================================
//! hub.rs - boundary operations over the sensor store
//! ==============================================================================
//!
//! purpose:
//!     everything an outside caller (http handler, llm tool, test) can do to
//!     the sensors: ingest, query, absolute and relative mutation, presets,
//!     reset. inputs arrive already typed; the only validation left here is
//!     about the request as a whole (e.g. an empty update).
//!
//! side channel:
//!     ingest and every mutation run the alert thresholds on the resulting
//!     reading and publish crossings on the event bus once the write has
//!     landed. first ingest of an id publishes `SensorConnected` ahead of
//!     its alerts.
//!
//! relationships:
//!     - used by: api.rs, main.rs
//!     - uses: store.rs, simulator.rs, alerts.rs, analysis.rs, events.rs
//!
//! ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::{self, Alert};
use crate::analysis::SensorAnalysis;
use crate::domain::{MetricDeltas, MetricValues, Reading};
use crate::error::HubError;
use crate::events::{EventBus, HubEvent};
use crate::simulator;
use crate::store::SensorStore;

/// values written by `reset`
pub const RESET_VALUES: MetricValues = MetricValues::full(24.0, 65.0, 400.0, 1013.0);

/// canned weather conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    HotDay,
    ColdNight,
    HumidWeather,
    DryWeather,
    OptimalGrowth,
    StressTest,
}

impl Preset {
    pub fn values(self) -> MetricValues {
        match self {
            Preset::HotDay => MetricValues::full(32.0, 45.0, 410.0, 1010.0),
            Preset::ColdNight => MetricValues::full(15.0, 85.0, 440.0, 1015.0),
            Preset::HumidWeather => MetricValues::full(25.0, 90.0, 400.0, 1008.0),
            Preset::DryWeather => MetricValues::full(28.0, 25.0, 380.0, 1020.0),
            Preset::OptimalGrowth => MetricValues::full(24.0, 65.0, 400.0, 1013.0),
            Preset::StressTest => MetricValues::full(38.0, 15.0, 500.0, 995.0),
        }
    }
}

/// result of `ingest`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    NewSensor,
    Updated,
}

/// full snapshot with its generation time
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub sensors: Vec<Reading>,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
}

/// which sensors a preset reached
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PresetOutcome {
    pub applied: Vec<String>,
    pub missing: Vec<String>,
}

/// clone-able entry point shared by every request handler
#[derive(Clone, Default)]
pub struct SensorHub {
    store: SensorStore,
    events: EventBus,
}

impl SensorHub {
    pub fn new(store: SensorStore, events: EventBus) -> Self {
        Self { store, events }
    }

    pub fn store(&self) -> &SensorStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// store a validated reading with the caller's timestamp. a reading
    /// older than the one already stored is rejected, so a sensor's
    /// timestamp never moves backwards.
    pub fn ingest(&self, reading: Reading) -> Result<Ingested, HubError> {
        let sensor_id = reading.sensor_id.clone();
        let timestamp = reading.timestamp;
        let alerts = alerts::check(&reading);

        let created = self.store.set_if_not_older(reading)?;
        if created {
            tracing::info!(%sensor_id, "new sensor connected");
            self.events.publish(HubEvent::SensorConnected {
                sensor_id,
                timestamp,
            });
        }
        self.publish_alerts(alerts);

        Ok(if created {
            Ingested::NewSensor
        } else {
            Ingested::Updated
        })
    }

    pub fn reading(&self, sensor_id: &str) -> Result<Reading, HubError> {
        self.store
            .get(sensor_id)
            .ok_or_else(|| HubError::NotFound(sensor_id.to_string()))
    }

    pub fn snapshot(&self) -> Snapshot {
        let sensors = self.store.list();
        Snapshot {
            count: sensors.len(),
            sensors,
            timestamp: Utc::now(),
        }
    }

    /// overwrite just the given metrics
    pub fn set_values(&self, sensor_id: &str, values: MetricValues) -> Result<Reading, HubError> {
        if values.is_empty() {
            return Err(HubError::Validation("updates object is required".into()));
        }
        let reading = self.store.modify(sensor_id, |r| {
            values.apply_to(r);
            Ok(())
        })?;
        self.raise_alerts(&reading);
        Ok(reading)
    }

    /// add deltas to current values. any targeted metric the sensor does not
    /// report rejects the whole call.
    pub fn adjust_values(&self, sensor_id: &str, deltas: MetricDeltas) -> Result<Reading, HubError> {
        if deltas.is_empty() {
            return Err(HubError::Validation("at least one change is required".into()));
        }
        let reading = self.store.modify(sensor_id, |r| deltas.apply_to(r))?;
        self.raise_alerts(&reading);
        Ok(reading)
    }

    /// apply `preset` to `sensor_ids`, or to every sensor when None.
    /// ids that are not registered are skipped and reported.
    pub fn apply_preset(&self, preset: Preset, sensor_ids: Option<Vec<String>>) -> PresetOutcome {
        let targets = sensor_ids.unwrap_or_else(|| self.store.sensor_ids());
        let values = preset.values();
        let mut outcome = PresetOutcome::default();

        for sensor_id in targets {
            match self.set_values(&sensor_id, values) {
                Ok(_) => outcome.applied.push(sensor_id),
                Err(_) => outcome.missing.push(sensor_id),
            }
        }
        tracing::info!(
            ?preset,
            applied = outcome.applied.len(),
            missing = outcome.missing.len(),
            "preset applied"
        );
        outcome
    }

    pub fn reset(&self, sensor_id: &str) -> Result<Reading, HubError> {
        self.set_values(sensor_id, RESET_VALUES)
    }

    pub fn delete(&self, sensor_id: &str) -> Result<(), HubError> {
        if self.store.delete(sensor_id) {
            Ok(())
        } else {
            Err(HubError::NotFound(sensor_id.to_string()))
        }
    }

    pub fn init_demo_sensors(&self) -> usize {
        simulator::init_demo_sensors(&self.store)
    }

    pub fn fluctuate(&self) -> usize {
        simulator::fluctuate_all(&self.store)
    }

    /// growing-condition verdict for every sensor, sorted by id
    pub fn analyze(&self) -> Vec<SensorAnalysis> {
        self.store.list().iter().map(SensorAnalysis::from).collect()
    }

    fn raise_alerts(&self, reading: &Reading) {
        self.publish_alerts(alerts::check(reading));
    }

    fn publish_alerts(&self, alerts: Vec<Alert>) {
        for alert in alerts {
            tracing::warn!(sensor_id = %alert.sensor_id, metric = %alert.metric, "{}", alert.message);
            self.events.publish(HubEvent::Alert(alert));
        }
    }
}
