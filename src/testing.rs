//! Fake bus and delay used by the driver tests.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

#[derive(Debug, Clone, PartialEq)]
pub enum Transfer {
    Write { address: u8, bytes: Vec<u8> },
    Read { address: u8, len: usize },
}

/// Answers like an ADS7830 on every present address: the last single-byte
/// write selects the channel and a 2-byte read returns `[status, sample]`.
pub struct FakeBus {
    pub present: Vec<u8>,
    pub samples: [u8; 8],
    pub failing_channel: Option<u8>,
    /// Display data writes (`0x40` control byte) accepted before the bus fails them.
    pub data_writes_before_failure: Option<usize>,
    pub transfers: Vec<Transfer>,
    last_command: Option<u8>,
    data_writes: usize,
}

impl FakeBus {
    pub fn new(present: &[u8]) -> Self {
        FakeBus {
            present: present.to_vec(),
            samples: [0; 8],
            failing_channel: None,
            data_writes_before_failure: None,
            transfers: Vec::new(),
            last_command: None,
            data_writes: 0,
        }
    }

    pub fn with_samples(mut self, samples: [u8; 8]) -> Self {
        self.samples = samples;
        self
    }

    pub fn writes_to(&self, address: u8) -> Vec<Vec<u8>> {
        self.transfers
            .iter()
            .filter_map(|t| match t {
                Transfer::Write { address: a, bytes } if *a == address => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    fn ack(&self, address: u8) -> Result<(), ErrorKind> {
        if self.present.contains(&address) {
            Ok(())
        } else {
            Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
        }
    }

    fn on_write(&mut self, address: u8, bytes: &[u8]) -> Result<(), ErrorKind> {
        self.transfers.push(Transfer::Write { address, bytes: bytes.to_vec() });
        self.ack(address)?;
        if let [0x40, _, ..] = bytes {
            self.data_writes += 1;
            if self.data_writes_before_failure.is_some_and(|n| self.data_writes > n) {
                return Err(ErrorKind::ArbitrationLoss);
            }
        }
        if let [command] = bytes {
            let channel = (command >> 4) & 0x07;
            if self.failing_channel == Some(channel) {
                self.last_command = None;
                return Err(ErrorKind::Bus);
            }
            self.last_command = Some(*command);
        }
        Ok(())
    }

    fn on_read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), ErrorKind> {
        self.transfers.push(Transfer::Read { address, len: buffer.len() });
        self.ack(address)?;
        buffer.fill(0);
        if let (Some(command), [status, sample, ..]) = (self.last_command, &mut *buffer) {
            *status = 0x80;
            *sample = self.samples[((command >> 4) & 0x07) as usize];
        }
        Ok(())
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c for FakeBus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.on_write(address, bytes)?,
                Operation::Read(buffer) => self.on_read(address, buffer)?,
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDelay {
    pub total_ns: u64,
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}
