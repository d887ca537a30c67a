//! ==============================================================================
//! analysis.rs - growing-condition assessment
//! ==============================================================================
//!
//! purpose:
//!     rates each metric of a reading against the band plants grow best in.
//!     unlike alerts.rs this reports every metric, including the ones that
//!     look fine, so a dashboard can show a full verdict per sensor.
//!
//! bands (inclusive):
//!     temperature   18 - 28 °C
//!     humidity      40 - 80 %
//!     co2          300 - 1200 ppm
//!
//! pressure has no growing band and is never assessed.
//!
//! relationships:
//!     - used by: hub.rs (`SensorHub::analyze`), api.rs (analysis route)
//!
//! ==============================================================================

use serde::Serialize;

use crate::domain::{Metric, Reading};

pub const TEMPERATURE_OPTIMAL: (f64, f64) = (18.0, 28.0);
pub const HUMIDITY_OPTIMAL: (f64, f64) = (40.0, 80.0);
pub const CO2_OPTIMAL: (f64, f64) = (300.0, 1200.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    TooLow,
    Optimal,
    TooHigh,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub metric: Metric,
    pub value: f64,
    pub rating: Rating,
    pub note: &'static str,
}

/// the assessments of one sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorAnalysis {
    pub sensor_id: String,
    pub assessments: Vec<Assessment>,
}

impl From<&Reading> for SensorAnalysis {
    fn from(reading: &Reading) -> Self {
        Self {
            sensor_id: reading.sensor_id.clone(),
            assessments: assess(reading),
        }
    }
}

struct Band {
    range: (f64, f64),
    low: &'static str,
    optimal: &'static str,
    high: &'static str,
}

fn band(metric: Metric) -> Option<Band> {
    match metric {
        Metric::Temperature => Some(Band {
            range: TEMPERATURE_OPTIMAL,
            low: "Too cold - may stress plants",
            optimal: "Within optimal range",
            high: "Too hot - may cause heat stress",
        }),
        Metric::Humidity => Some(Band {
            range: HUMIDITY_OPTIMAL,
            low: "Too dry - may cause leaf stress",
            optimal: "Good level",
            high: "Too humid - risk of fungal issues",
        }),
        Metric::Co2 => Some(Band {
            range: CO2_OPTIMAL,
            low: "Low - may limit photosynthesis",
            optimal: "Good for photosynthesis",
            high: "Very high - may stress plants",
        }),
        Metric::Pressure => None,
    }
}

/// one assessment per banded metric the reading reports, in metric order
pub fn assess(reading: &Reading) -> Vec<Assessment> {
    reading
        .metrics()
        .filter_map(|(metric, value)| {
            let band = band(metric)?;
            let (min, max) = band.range;
            let (rating, note) = if value < min {
                (Rating::TooLow, band.low)
            } else if value > max {
                (Rating::TooHigh, band.high)
            } else {
                (Rating::Optimal, band.optimal)
            };
            Some(Assessment {
                metric,
                value,
                rating,
                note,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(metric: Metric, value: f64) -> Rating {
        let r = Reading::new("s1").with(metric, value);
        assess(&r)[0].rating
    }

    #[test]
    fn band_edges_are_optimal() {
        assert_eq!(rating(Metric::Temperature, 18.0), Rating::Optimal);
        assert_eq!(rating(Metric::Temperature, 28.0), Rating::Optimal);
        assert_eq!(rating(Metric::Humidity, 40.0), Rating::Optimal);
        assert_eq!(rating(Metric::Humidity, 80.0), Rating::Optimal);
        assert_eq!(rating(Metric::Co2, 300.0), Rating::Optimal);
        assert_eq!(rating(Metric::Co2, 1200.0), Rating::Optimal);
    }

    #[test]
    fn just_outside_the_band() {
        assert_eq!(rating(Metric::Temperature, 17.9), Rating::TooLow);
        assert_eq!(rating(Metric::Temperature, 28.1), Rating::TooHigh);
        assert_eq!(rating(Metric::Humidity, 39.9), Rating::TooLow);
        assert_eq!(rating(Metric::Humidity, 80.1), Rating::TooHigh);
        assert_eq!(rating(Metric::Co2, 299.0), Rating::TooLow);
        assert_eq!(rating(Metric::Co2, 1201.0), Rating::TooHigh);
    }

    #[test]
    fn notes_follow_the_rating() {
        let r = Reading::new("gh")
            .with(Metric::Temperature, 12.0)
            .with(Metric::Humidity, 85.0)
            .with(Metric::Co2, 450.0);
        let notes: Vec<_> = assess(&r).into_iter().map(|a| a.note).collect();
        assert_eq!(
            notes,
            vec![
                "Too cold - may stress plants",
                "Too humid - risk of fungal issues",
                "Good for photosynthesis"
            ]
        );
    }

    #[test]
    fn pressure_and_absent_metrics_are_skipped() {
        let r = Reading::new("s1").with(Metric::Pressure, 900.0);
        assert!(assess(&r).is_empty());

        let partial = SensorAnalysis::from(&Reading::new("s2").with(Metric::Humidity, 20.0));
        assert_eq!(partial.sensor_id, "s2");
        assert_eq!(partial.assessments.len(), 1);
        assert_eq!(partial.assessments[0].metric, Metric::Humidity);
    }
}
