//! ==============================================================================
//! sensor_hub - in-memory environmental sensor hub
//! ==============================================================================
//!
//! holds the latest reading per sensor, tells subscribers about every write,
//! keeps demo values moving with a fluctuation simulator and streams full
//! snapshots to connected clients.
//!
//! ```text
//!     producers (ingest, tools, simulator)
//!              │
//!              ▼
//!       ┌─────────────┐  dispatch   ┌──────────────┐
//!       │ SensorStore │ ──────────> │ subscribers  │
//!       └──────┬──────┘             └──────────────┘
//!              │ list() every tick
//!              ▼
//!       ┌─────────────┐   sse       ┌──────────────┐
//!       │StreamGateway│ ──────────> │   clients    │
//!       └─────────────┘             └──────────────┘
//! ```
//!
//! ==============================================================================

pub mod alerts;
pub mod analysis;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod hub;
pub mod simulator;
pub mod store;
pub mod stream;

pub use domain::{Metric, MetricDeltas, MetricValues, Reading, ReadingPayload};
pub use error::HubError;
pub use hub::{Preset, SensorHub};
pub use store::{SensorStore, Subscriber, SubscriberId};
pub use stream::{StreamGateway, StreamMessage};
