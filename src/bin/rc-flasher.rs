use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;

use rc_remote::flasher::{self, FlashConfig, GpioLines};
use rc_remote::logger;

#[derive(Parser)]
#[command(about = "Forces the low-level controller into its bootloader and flashes a new image")]
struct Args {
    /// Firmware image to flash
    image: PathBuf,

    /// Flashing tool, called as `<tool> -f <image> -p <port> -a`
    #[arg(long, default_value = "/home/pi/.local/bin/picoboot3")]
    tool: PathBuf,

    #[arg(short, long, default_value = "/dev/serial0")]
    port: String,

    /// BCM number of the boot-enable line
    #[arg(long, default_value_t = 23)]
    boot_pin: u8,

    /// BCM number of the run-control line
    #[arg(long, default_value_t = 24)]
    run_pin: u8,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    logger::init(args.log_level)?;

    let config = FlashConfig {
        boot_pin: args.boot_pin,
        run_pin: args.run_pin,
        tool: args.tool,
        image: args.image,
        port: args.port,
        hold: Duration::from_secs(1),
        settle: Duration::from_millis(100),
    };

    log::info!("Starting firmware update process");
    let mut lines = GpioLines::new(config.boot_pin, config.run_pin)?;
    let report = flasher::flash(&mut lines, &config)?;

    if !report.stdout.is_empty() {
        log::info!("stdout: {}", report.stdout.trim_end());
    }
    if !report.stderr.is_empty() {
        log::warn!("stderr: {}", report.stderr.trim_end());
    }

    Ok(if report.success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
