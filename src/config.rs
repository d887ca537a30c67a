//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `hub.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ServerConfig: Where the http api listens.
//!     - SimulatorConfig: Whether and how often readings fluctuate.
//!     - StreamConfig: Cadence and buffering of live stream clients.
//!     - LoggingConfig: Log filter and per-write data logging.
//!
//! every section and field is optional in the file; missing ones take the
//! defaults below.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub simulator: SimulatorConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulatorConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub seed_demo_sensors: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 10,
            seed_demo_sensors: true,
        }
    }
}

impl SimulatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub interval_seconds: u64,
    /// messages queued per client before the sender waits
    pub buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 2,
            buffer: 16,
        }
    }
}

impl StreamConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_sensor_data: false,
        }
    }
}

impl HubConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load with default fallback
    ///
    /// runs before logging is installed, so problems go to stdout
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("hub.toml"),
            std::path::PathBuf::from("..").join("config").join("hub.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("┌─────────────────────────────────────────┐");
        println!("│           HUB CONFIGURATION             │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Listen: {}", self.server.address());
        println!(
            "│ Simulator: {} ({}s interval)",
            if self.simulator.enabled { "on" } else { "off" },
            self.simulator.interval_seconds
        );
        println!("│ Stream Interval: {}s", self.stream.interval_seconds);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
