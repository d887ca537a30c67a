//! ==============================================================================
//! domain.rs - sensor readings and the values that modify them
//! ==============================================================================
//!
//! purpose:
//!     the single typed `Reading` used everywhere inside the hub, plus the
//!     boundary payload it is validated from and the partial value / delta
//!     bundles used by the mutation operations.
//!
//! relationships:
//!     - used by: store.rs (registry values), hub.rs (mutations), api.rs (json)
//!     - validated once at the boundary: `ReadingPayload` -> `Reading`
//!
//! ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HubError;

/// the four environmental metrics a sensor may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Temperature,
    Humidity,
    Co2,
    Pressure,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Co2,
        Metric::Pressure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Co2 => "co2",
            Metric::Pressure => "pressure",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Humidity => "%",
            Metric::Co2 => "ppm",
            Metric::Pressure => "hPa",
        }
    }

    /// number of decimals kept after an adjustment or fluctuation
    pub fn precision(self) -> i32 {
        match self {
            Metric::Temperature | Metric::Humidity => 1,
            Metric::Co2 => 0,
            Metric::Pressure => 2,
        }
    }

    /// half-width of the random step applied by the fluctuation simulator
    pub fn max_step(self) -> f64 {
        match self {
            Metric::Temperature => 2.0,
            Metric::Humidity => 5.0,
            Metric::Co2 => 20.0,
            Metric::Pressure => 2.0,
        }
    }

    /// round `value` to this metric's precision
    pub fn round(self, value: f64) -> f64 {
        let factor = 10f64.powi(self.precision());
        (value * factor).round() / factor
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// latest snapshot of one sensor
///
/// an absent metric means the sensor does not report it, not zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
}

impl Reading {
    /// a reading with no metrics, stamped now
    pub fn new(sensor_id: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp: Utc::now(),
            temperature: None,
            humidity: None,
            co2: None,
            pressure: None,
        }
    }

    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        self.set(metric, value);
        self
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Co2 => self.co2,
            Metric::Pressure => self.pressure,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        *self.slot(metric) = Some(value);
    }

    fn slot(&mut self, metric: Metric) -> &mut Option<f64> {
        match metric {
            Metric::Temperature => &mut self.temperature,
            Metric::Humidity => &mut self.humidity,
            Metric::Co2 => &mut self.co2,
            Metric::Pressure => &mut self.pressure,
        }
    }

    /// metrics this sensor currently reports, with their values
    pub fn metrics(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL
            .into_iter()
            .filter_map(|m| self.get(m).map(|v| (m, v)))
    }

    /// stamp a fresh write time that never goes behind the previous one
    pub fn touch(&mut self) {
        self.timestamp = Utc::now().max(self.timestamp);
    }
}

// ==============================================================================
// boundary payload
// ==============================================================================
// everything arriving from outside is deserialized loosely and validated once
// into a `Reading`. nothing downstream re-checks these fields.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadingPayload {
    pub sensor_id: Option<String>,
    pub timestamp: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub co2: Option<f64>,
    pub pressure: Option<f64>,
}

impl TryFrom<ReadingPayload> for Reading {
    type Error = HubError;

    fn try_from(payload: ReadingPayload) -> Result<Self, Self::Error> {
        let sensor_id = match payload.sensor_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => return Err(HubError::Validation("sensor_id is required".into())),
        };

        let raw = payload
            .timestamp
            .ok_or_else(|| HubError::Validation("timestamp is required".into()))?;
        let timestamp = DateTime::parse_from_rfc3339(&raw)
            .map_err(|e| HubError::Validation(format!("invalid timestamp {:?}: {}", raw, e)))?
            .with_timezone(&Utc);

        Ok(Reading {
            sensor_id,
            timestamp,
            temperature: payload.temperature,
            humidity: payload.humidity,
            co2: payload.co2,
            pressure: payload.pressure,
        })
    }
}

// ==============================================================================
// partial updates
// ==============================================================================

/// absolute values for any subset of metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
}

impl MetricValues {
    pub const fn full(temperature: f64, humidity: f64, co2: f64, pressure: f64) -> Self {
        Self {
            temperature: Some(temperature),
            humidity: Some(humidity),
            co2: Some(co2),
            pressure: Some(pressure),
        }
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Co2 => self.co2,
            Metric::Pressure => self.pressure,
        }
    }

    pub fn is_empty(&self) -> bool {
        Metric::ALL.iter().all(|m| self.get(*m).is_none())
    }

    /// overwrite the given fields on `reading`, leaving the rest untouched
    pub fn apply_to(&self, reading: &mut Reading) {
        for metric in Metric::ALL {
            if let Some(value) = self.get(metric) {
                reading.set(metric, value);
            }
        }
    }
}

/// relative changes for any subset of metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDeltas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure_change: Option<f64>,
}

impl MetricDeltas {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature_change,
            Metric::Humidity => self.humidity_change,
            Metric::Co2 => self.co2_change,
            Metric::Pressure => self.pressure_change,
        }
    }

    pub fn is_empty(&self) -> bool {
        Metric::ALL.iter().all(|m| self.get(*m).is_none())
    }

    /// add every delta to `reading`, rounding per metric precision.
    ///
    /// rejects the whole call if any targeted metric is absent; `reading`
    /// is left unmodified in that case.
    pub fn apply_to(&self, reading: &mut Reading) -> Result<(), HubError> {
        let mut next = reading.clone();
        for metric in Metric::ALL {
            let Some(delta) = self.get(metric) else { continue };
            let current = reading.get(metric).ok_or_else(|| HubError::UnsupportedMetric {
                sensor_id: reading.sensor_id.clone(),
                metric,
            })?;
            next.set(metric, metric.round(current + delta));
        }
        *reading = next;
        Ok(())
    }
}
