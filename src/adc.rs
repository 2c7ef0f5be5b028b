//! ADS7830 8-channel, 8-bit converter on the I2C bus.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use thiserror::Error;

use crate::config::AdcConfig;
use crate::state::{ADC_CHANNELS, Readings, SENTINEL};

const START_BIT: u8 = 0b1000_0000;
const POWER_DOWN_NORMAL: u8 = 0b0000_0000;

/// Channel-select code for bits 6-4, indexed by channel.
const CHANNEL_SELECT: [u8; ADC_CHANNELS] = [0b000, 0b001, 0b010, 0b011, 0b100, 0b101, 0b110, 0b111];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdcError {
    #[error("invalid channel {0}, must be 0-7")]
    InvalidChannel(u8),
    #[error("bus error on channel {channel}: {kind}")]
    Bus { channel: u8, kind: ErrorKind },
}

/// Command byte for a single-ended read of `channel` in normal power mode.
pub fn command_byte(channel: u8) -> Result<u8, AdcError> {
    let select = CHANNEL_SELECT
        .get(channel as usize)
        .ok_or(AdcError::InvalidChannel(channel))?;
    Ok(START_BIT | (select << 4) | POWER_DOWN_NORMAL)
}

pub struct AdcReader<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    settle_us: u32,
}

impl<I2C: I2c, D: DelayNs> AdcReader<I2C, D> {
    pub fn new(i2c: I2C, delay: D, config: &AdcConfig) -> Self {
        log::info!("ADS7830 ADC at address {:#04x}", config.address);
        AdcReader {
            i2c,
            delay,
            address: config.address,
            settle_us: config.settle_us,
        }
    }

    pub fn read_channel(&mut self, channel: u8) -> Result<u8, AdcError> {
        let command = command_byte(channel)?;
        let bus = |e: I2C::Error| AdcError::Bus { channel, kind: e.kind() };

        self.i2c.write(self.address, &[command]).map_err(bus)?;
        self.delay.delay_us(self.settle_us);

        // First byte is status, second is the sample
        let mut rx_buffer = [0u8; 2];
        self.i2c.read(self.address, &mut rx_buffer).map_err(bus)?;
        Ok(rx_buffer[1])
    }

    /// Reads every channel in order. A failed channel reads as [`SENTINEL`].
    pub fn read_all_channels(&mut self) -> Readings {
        let mut values = [SENTINEL; ADC_CHANNELS];
        for (channel, value) in values.iter_mut().enumerate() {
            match self.read_channel(channel as u8) {
                Ok(sample) => *value = i16::from(sample),
                Err(e) => log::warn!("ADC read failed: {}", e),
            }
        }
        values
    }

    #[cfg(test)]
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}
