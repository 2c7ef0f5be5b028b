//! Joystick remote: samples an ADS7830 over I2C, shows the readings on an
//! SSD1306 and posts them to the control endpoint whenever a stick leaves
//! its rest zone. Also hosts the firmware flasher and service launcher used
//! by the companion binaries.

pub mod adc;
pub mod config;
pub mod display;
pub mod flasher;
pub mod launcher;
pub mod logger;
pub mod sampler;
pub mod state;
pub mod telemetry;
pub mod wifi;

#[cfg(test)]
mod testing;
