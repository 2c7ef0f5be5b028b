use serde::{Serialize, Deserialize};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use crate::state::Readings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcConfig {
    pub bus: u8,
    pub address: u8,
    pub settle_us: u32,   // Conversion time between command write and read back
}

impl Default for AdcConfig {
    fn default() -> Self {
        AdcConfig {
            bus: 1,
            address: 0x48,
            settle_us: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    pub bus: u8,
    pub address: u8,
    pub width: u8,
    pub height: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            enabled: true,
            bus: 1,
            address: 0x3C,
            width: 128,
            height: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub endpoint: String,
    pub interface: String,
    pub ssid: String,
    pub password: String,
    pub connect_poll_ms: u64,
    pub connect_attempts: Option<u32>,     // None keeps polling forever
    pub request_timeout_ms: Option<u64>,   // None leaves the transport defaults
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            endpoint: String::from("http://192.168.200.54:5000/api/v1/remotecontrol/joysticks"),
            interface: String::from("wlan0"),
            ssid: String::new(),
            password: String::new(),
            connect_poll_ms: 1000,
            connect_attempts: None,
            request_timeout_ms: None,
        }
    }
}

impl NetworkConfig {
    pub fn connect_poll(&self) -> Duration {
        Duration::from_millis(self.connect_poll_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Rest zone of the joysticks. Readings inside `[low, high]` are idle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Deadband {
    pub low: i16,
    pub high: i16,
}

impl Default for Deadband {
    fn default() -> Self {
        Deadband {
            low: 118,
            high: 137,
        }
    }
}

impl Deadband {
    pub fn is_idle(&self, reading: i16) -> bool {
        reading >= self.low && reading <= self.high
    }

    /// True as soon as one channel leaves the rest zone.
    pub fn needs_send(&self, readings: &Readings) -> bool {
        readings.iter().any(|&r| !self.is_idle(r))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub adc: AdcConfig,
    pub display: DisplayConfig,
    pub network: NetworkConfig,
    pub deadband: Deadband,
    pub loop_period_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            adc: AdcConfig::default(),
            display: DisplayConfig::default(),
            network: NetworkConfig::default(),
            deadband: Deadband::default(),
            loop_period_ms: 50,
        }
    }
}

impl Config {
    pub fn loop_period(&self) -> Duration {
        Duration::from_millis(self.loop_period_ms)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(io::Error::other)?;

        let mut file = fs::File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Loads `path`, writing the defaults out first when the file does not exist.
    /// A file that exists but does not parse falls back to defaults and is left untouched.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                log::info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let config = Self::default();
                match config.save(path) {
                    Ok(()) => log::info!("Wrote default configuration to {}", path.display()),
                    Err(e) => log::warn!("Could not write default configuration to {}: {}", path.display(), e),
                }
                config
            }
            Err(e) => {
                log::error!("Error loading {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }
}
