//! The steady-state loop: read, show, decide, send, sleep.

use std::thread;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::adc::AdcReader;
use crate::config::{Config, Deadband};
use crate::display::Renderer;
use crate::state::{self, Readings};
use crate::telemetry::{SendError, TelemetryClient};
use crate::wifi::WirelessLink;

pub trait ChannelSource {
    fn read_all_channels(&mut self) -> Readings;
}

pub trait SnapshotSink {
    fn render(&mut self, lines: &[String], clear: bool);
}

pub trait TelemetrySink {
    fn send(&mut self, readings: &Readings) -> Result<(), SendError>;
}

impl<I2C: I2c, D: DelayNs> ChannelSource for AdcReader<I2C, D> {
    fn read_all_channels(&mut self) -> Readings {
        AdcReader::read_all_channels(self)
    }
}

impl<I2C: I2c> SnapshotSink for Renderer<I2C> {
    fn render(&mut self, lines: &[String], clear: bool) {
        Renderer::render(self, lines, clear)
    }
}

impl TelemetrySink for TelemetryClient {
    fn send(&mut self, readings: &Readings) -> Result<(), SendError> {
        TelemetryClient::send(self, readings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every joystick rests inside the deadband.
    Idle,
    Sent,
    SendFailed,
    /// Something to send but no link.
    LinkDown,
}

pub struct SamplingLoop<S, D, T, L> {
    source: S,
    display: D,
    telemetry: T,
    link: L,
    deadband: Deadband,
    period: Duration,
}

impl<S, D, T, L> SamplingLoop<S, D, T, L>
where
    S: ChannelSource,
    D: SnapshotSink,
    T: TelemetrySink,
    L: WirelessLink,
{
    pub fn new(source: S, display: D, telemetry: T, link: L, config: &Config) -> Self {
        SamplingLoop {
            source,
            display,
            telemetry,
            link,
            deadband: config.deadband,
            period: config.loop_period(),
        }
    }

    pub fn run_cycle(&mut self) -> CycleOutcome {
        let readings = self.source.read_all_channels();
        log::debug!("ADC readings: {:?}", state::labelled(&readings));

        self.display.render(&state::snapshot_lines(&readings), true);

        if !self.deadband.needs_send(&readings) {
            return CycleOutcome::Idle;
        }

        if !self.link.is_connected() {
            log::info!("Not connected to Wi-Fi, skipping data sending");
            return CycleOutcome::LinkDown;
        }

        match self.telemetry.send(&readings) {
            Ok(()) => {
                log::info!("Data sent: {:?}", readings);
                CycleOutcome::Sent
            }
            Err(SendError::Rejected { status, body }) => {
                log::warn!("Failed to send data, status {}: {}", status, body.as_deref().unwrap_or("<undecodable body>"));
                CycleOutcome::SendFailed
            }
            Err(e) => {
                log::warn!("Error sending data: {}", e);
                CycleOutcome::SendFailed
            }
        }
    }

    pub fn run(&mut self) -> ! {
        log::info!("Sampling every {:?}, deadband {}..={}", self.period, self.deadband.low, self.deadband.high);
        loop {
            self.run_cycle();
            thread::sleep(self.period);
        }
    }
}
