use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use rppal::hal::Delay;
use rppal::i2c::I2c;

use rc_remote::adc::AdcReader;
use rc_remote::config::Config;
use rc_remote::display::Renderer;
use rc_remote::logger;
use rc_remote::sampler::SamplingLoop;
use rc_remote::telemetry::TelemetryClient;
use rc_remote::wifi::{self, WifiStation};

#[derive(Parser)]
#[command(about = "Joystick remote: reads the sticks and posts them to the control endpoint")]
struct Args {
    /// JSON configuration file, created with defaults when missing
    #[arg(short, long, default_value = "remote.json")]
    config: PathBuf,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn open_display(config: &Config) -> Renderer<I2c> {
    if !config.display.enabled {
        log::info!("Display disabled in configuration");
        return Renderer::Unavailable;
    }
    match I2c::with_bus(config.display.bus) {
        Ok(i2c) => Renderer::open(i2c, &config.display),
        Err(e) => {
            log::error!("Cannot open I2C bus {} for the display: {}", config.display.bus, e);
            Renderer::Unavailable
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(args.log_level)?;

    log::info!("Starting joystick remote");
    let config = Config::load_or_default(&args.config);

    let client = TelemetryClient::new(&config.network)?;

    let mut station = WifiStation::new(&config.network);
    wifi::acquire_link(&mut station, config.network.connect_poll(), config.network.connect_attempts)?;
    match client.local_address() {
        Ok(ip) => log::info!("IP address on {}: {}", station.interface(), ip),
        Err(e) => log::warn!("Could not determine local address: {}", e),
    }

    let renderer = open_display(&config);
    if !renderer.is_active() {
        log::info!("Running without display, readings are only posted");
    }

    let adc_bus = I2c::with_bus(config.adc.bus)
        .with_context(|| format!("opening I2C bus {} for the ADC", config.adc.bus))?;
    let adc = AdcReader::new(adc_bus, Delay::new(), &config.adc);

    log::info!("Posting to {}", client.endpoint());
    SamplingLoop::new(adc, renderer, client, station, &config).run()
}
