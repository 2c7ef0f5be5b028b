use serde::Serialize;
use std::collections::BTreeMap;

pub const ADC_CHANNELS: usize = 8;

/// Marks a channel whose read failed during the cycle.
pub const SENTINEL: i16 = -1;

/// One sampling cycle, ordered by channel index.
pub type Readings = [i16; ADC_CHANNELS];

/// Four display rows, two channels each.
pub fn snapshot_lines(readings: &Readings) -> [String; 4] {
    std::array::from_fn(|row| {
        let left = row * 2;
        let right = left + 1;
        format!("{}: {:03}    {}:{:03}", left, readings[left], right, readings[right])
    })
}

/// `CH0`..`CH7` map of the channels that were read successfully.
pub fn labelled(readings: &Readings) -> BTreeMap<String, u8> {
    readings
        .iter()
        .enumerate()
        .filter_map(|(channel, &value)| {
            u8::try_from(value).ok().map(|v| (format!("CH{}", channel), v))
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct TelemetryPayload<'a> {
    #[serde(rename = "Joysticks")]
    pub joysticks: &'a [i16],
}

impl<'a> TelemetryPayload<'a> {
    pub fn new(readings: &'a Readings) -> Self {
        TelemetryPayload { joysticks: readings }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
