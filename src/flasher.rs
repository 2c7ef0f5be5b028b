//! Puts the low-level controller into its bootloader and flashes it.

use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

use rppal::gpio::{Gpio, IoPin, Mode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlashError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
    #[error("could not run {tool}: {source}")]
    Spawn { tool: String, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct FlashConfig {
    pub boot_pin: u8,
    pub run_pin: u8,
    pub tool: PathBuf,
    pub image: PathBuf,
    pub port: String,
    pub hold: Duration,     // Both lines low before releasing run
    pub settle: Duration,   // Bootloader start-up after run goes high
}

impl Default for FlashConfig {
    fn default() -> Self {
        FlashConfig {
            boot_pin: 23,
            run_pin: 24,
            tool: PathBuf::from("/home/pi/.local/bin/picoboot3"),
            image: PathBuf::from("LowLevelController.bin"),
            port: String::from("/dev/serial0"),
            hold: Duration::from_secs(1),
            settle: Duration::from_millis(100),
        }
    }
}

pub trait ControlLines {
    fn set_boot(&mut self, high: bool);
    fn set_run(&mut self, high: bool);
    /// Returns both lines to inputs.
    fn release(&mut self);
}

pub struct GpioLines {
    boot: IoPin,
    run: IoPin,
}

impl GpioLines {
    pub fn new(boot_pin: u8, run_pin: u8) -> Result<Self, FlashError> {
        let gpio = Gpio::new()?;
        let mut boot = gpio.get(boot_pin)?.into_io(Mode::Output);
        let mut run = gpio.get(run_pin)?.into_io(Mode::Output);
        // Lines stay as inputs after release instead of reverting on drop
        boot.set_reset_on_drop(false);
        run.set_reset_on_drop(false);
        log::info!("GPIO boot-enable {} and run-control {} as outputs", boot_pin, run_pin);
        Ok(GpioLines { boot, run })
    }
}

fn drive(pin: &mut IoPin, high: bool) {
    if high { pin.set_high(); } else { pin.set_low(); }
}

impl ControlLines for GpioLines {
    fn set_boot(&mut self, high: bool) {
        drive(&mut self.boot, high);
    }

    fn set_run(&mut self, high: bool) {
        drive(&mut self.run, high);
    }

    fn release(&mut self) {
        self.boot.set_mode(Mode::Input);
        self.run.set_mode(Mode::Input);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlashReport {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl FlashReport {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

fn run_tool(config: &FlashConfig) -> Result<FlashReport, FlashError> {
    let mut command = Command::new(&config.tool);
    command
        .arg("-f").arg(&config.image)
        .arg("-p").arg(&config.port)
        .arg("-a");
    log::info!("Executing command: {:?}", command);

    let output = command.output().map_err(|source| FlashError::Spawn {
        tool: config.tool.display().to_string(),
        source,
    })?;

    Ok(FlashReport {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Resets the controller into its bootloader, runs the flashing tool, and
/// lets it boot again. The lines are released whatever the tool does.
pub fn flash<C: ControlLines>(lines: &mut C, config: &FlashConfig) -> Result<FlashReport, FlashError> {
    log::info!("Setting run-control and boot-enable low");
    lines.set_boot(false);
    lines.set_run(false);
    thread::sleep(config.hold);

    log::info!("Setting run-control high");
    lines.set_run(true);
    thread::sleep(config.settle);

    let result = run_tool(config);

    log::info!("Setting boot-enable high");
    lines.set_boot(true);
    lines.release();

    match &result {
        Ok(report) if report.success() => log::info!("Firmware update successful"),
        Ok(report) => log::error!("Firmware update failed with exit code {:?}", report.exit_code),
        Err(e) => log::error!("Firmware update failed: {}", e),
    }
    result
}
