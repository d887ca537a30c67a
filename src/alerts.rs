//! ==============================================================================
//! alerts.rs - threshold checks on incoming readings
//! ==============================================================================
//!
//! purely observational: `check` never rejects a reading, it only reports
//! which metrics sit outside the safe band.
//!
//! ==============================================================================

use serde::Serialize;

use crate::domain::{Metric, Reading};

pub const TEMPERATURE_MIN: f64 = 15.0;
pub const TEMPERATURE_MAX: f64 = 35.0;
pub const HUMIDITY_MIN: f64 = 30.0;
pub const HUMIDITY_MAX: f64 = 90.0;
pub const CO2_MAX: f64 = 1500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub sensor_id: String,
    pub metric: Metric,
    pub kind: AlertKind,
    pub value: f64,
    pub message: String,
}

impl Alert {
    fn new(reading: &Reading, metric: Metric, kind: AlertKind, value: f64, label: &str) -> Self {
        let message = format!(
            "{}: {}{} on sensor {}",
            label,
            value,
            metric.unit(),
            reading.sensor_id
        );
        Self {
            sensor_id: reading.sensor_id.clone(),
            metric,
            kind,
            value,
            message,
        }
    }
}

/// every threshold `reading` crosses, in metric order
pub fn check(reading: &Reading) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let mut raise = |metric, kind, value, label: &str| {
        alerts.push(Alert::new(reading, metric, kind, value, label));
    };

    if let Some(t) = reading.temperature {
        if t < TEMPERATURE_MIN {
            raise(Metric::Temperature, AlertKind::Low, t, "Critical low temperature");
        } else if t > TEMPERATURE_MAX {
            raise(Metric::Temperature, AlertKind::High, t, "Critical high temperature");
        }
    }

    if let Some(h) = reading.humidity {
        if h < HUMIDITY_MIN {
            raise(Metric::Humidity, AlertKind::Low, h, "Low humidity warning");
        } else if h > HUMIDITY_MAX {
            raise(Metric::Humidity, AlertKind::High, h, "High humidity warning");
        }
    }

    if let Some(c) = reading.co2 {
        if c > CO2_MAX {
            raise(Metric::Co2, AlertKind::High, c, "High CO2 levels");
        }
    }

    // pressure has no threshold
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comfortable_reading_raises_nothing() {
        let r = Reading::new("s1")
            .with(Metric::Temperature, 24.0)
            .with(Metric::Humidity, 65.0)
            .with(Metric::Co2, 400.0)
            .with(Metric::Pressure, 1013.0);
        assert!(check(&r).is_empty());
    }

    #[test]
    fn boundaries_are_exclusive() {
        let r = Reading::new("s1")
            .with(Metric::Temperature, 15.0)
            .with(Metric::Humidity, 90.0)
            .with(Metric::Co2, 1500.0);
        assert!(check(&r).is_empty());
    }

    #[test]
    fn each_crossing_is_reported() {
        let r = Reading::new("lab")
            .with(Metric::Temperature, 38.0)
            .with(Metric::Humidity, 15.0)
            .with(Metric::Co2, 1800.0);
        let alerts = check(&r);

        assert_eq!(alerts.len(), 3);
        assert_eq!(alerts[0].metric, Metric::Temperature);
        assert_eq!(alerts[0].kind, AlertKind::High);
        assert_eq!(alerts[1].kind, AlertKind::Low);
        assert_eq!(alerts[2].value, 1800.0);
        assert_eq!(alerts[2].message, "High CO2 levels: 1800ppm on sensor lab");
    }

    #[test]
    fn absent_metrics_are_ignored() {
        let r = Reading::new("s1").with(Metric::Co2, 2000.0);
        let alerts = check(&r);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric, Metric::Co2);
    }

    #[test]
    fn pressure_never_alerts() {
        let r = Reading::new("s1")
            .with(Metric::Pressure, 850.0)
            .with(Metric::Temperature, 10.0);
        let alerts = check(&r);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "Critical low temperature: 10°C on sensor s1");
    }
}
