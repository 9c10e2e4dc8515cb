//! ==============================================================================
//! domain.rs - readings, thresholds and the settings the core evaluates against
//! ==============================================================================
//!
//! purpose:
//!     the plain data that flows through the monitor. nothing in here has
//!     side effects; everything is cheap to clone and easy to build in tests.
//!
//! relationships:
//!     - produced by: transport.rs (RawReading from mqtt payloads)
//!     - consumed by: evaluator.rs, notifier.rs, alarm.rs, monitor.rs
//!     - configured by: config.rs (ThresholdSet, AlertSettings)
//!
//! ==============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PayloadError;

/// one of the three monitored quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Temperature,
    Humidity,
    Gas,
}

impl Channel {
    /// fixed enumeration order used for display and notification ordering
    pub const ALL: [Channel; 3] = [Channel::Temperature, Channel::Humidity, Channel::Gas];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
            Channel::Gas => "gas",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Channel::Temperature => "Temperature",
            Channel::Humidity => "Humidity",
            Channel::Gas => "Gas",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Channel::Temperature => "°C",
            Channel::Humidity => "%",
            Channel::Gas => " PPM",
        }
    }

    /// humidity is the odd one out: dry air is the hazard, so lower is worse
    pub fn lower_is_worse(&self) -> bool {
        matches!(self, Channel::Humidity)
    }

    /// "52.0°C", "25.0%", "1200.0 PPM"
    pub fn format_value(&self, value: f64) -> String {
        format!("{:.1}{}", value, self.unit())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// derived classification of a single channel value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorStatus {
    #[default]
    Normal,
    Warning,
    Critical,
}

// ==============================================================================
// readings
// ==============================================================================

/// reading as it arrives from the transport, before the core stamps it
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawReading {
    pub temperature: f64,
    pub humidity: f64,
    pub gas: f64,
}

impl RawReading {
    /// decode an mqtt payload
    ///
    /// the payload must be a json object. missing or non-numeric channel
    /// values become 0 so the evaluator stays total on garbage input.
    /// the device firmware publishes gas as `gasLevel`, both names are accepted.
    pub fn from_payload(payload: &[u8]) -> Result<Self, PayloadError> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        let object = value.as_object().ok_or(PayloadError::NotAnObject)?;

        let field = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| object.get(*name).and_then(lenient_number))
                .unwrap_or(0.0)
        };

        Ok(Self {
            temperature: field(&["temperature", "temp"]),
            humidity: field(&["humidity", "humd"]),
            gas: field(&["gas", "gasLevel"]),
        })
    }

    pub fn stamp(self, timestamp: u64) -> Reading {
        Reading {
            temperature: self.temperature,
            humidity: self.humidity,
            gas: self.gas,
            timestamp,
        }
    }
}

fn lenient_number(value: &serde_json::Value) -> Option<f64> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// a stamped reading; immutable once built
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub temperature: f64,
    pub humidity: f64,
    pub gas: f64,
    /// milliseconds since the unix epoch, taken from the core's clock
    pub timestamp: u64,
}

impl Reading {
    pub fn value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Humidity => self.humidity,
            Channel::Gas => self.gas,
        }
    }
}

// ==============================================================================
// thresholds & settings
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelThreshold {
    pub warning: f64,
    pub critical: f64,
}

/// a channel left out of the config keeps its default bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSet {
    pub temperature: ChannelThreshold,
    pub humidity: ChannelThreshold,
    pub gas: ChannelThreshold,
}

impl ThresholdSet {
    pub fn get(&self, channel: Channel) -> &ChannelThreshold {
        match channel {
            Channel::Temperature => &self.temperature,
            Channel::Humidity => &self.humidity,
            Channel::Gas => &self.gas,
        }
    }

    /// describe every channel whose warning/critical pair has the wrong polarity
    pub fn validate(&self) -> Vec<String> {
        Channel::ALL
            .iter()
            .filter_map(|&channel| {
                let t = self.get(channel);
                let ordered = if channel.lower_is_worse() {
                    t.warning > t.critical
                } else {
                    t.warning < t.critical
                };
                (!ordered).then(|| {
                    let expected = if channel.lower_is_worse() { ">" } else { "<" };
                    format!(
                        "{} thresholds out of order: expected warning ({}) {} critical ({})",
                        channel, t.warning, expected, t.critical
                    )
                })
            })
            .collect()
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            temperature: ChannelThreshold { warning: 35.0, critical: 50.0 },
            humidity: ChannelThreshold { warning: 60.0, critical: 30.0 },
            gas: ChannelThreshold { warning: 500.0, critical: 1000.0 },
        }
    }
}

/// everything the settings store feeds into an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertSettings {
    pub thresholds: ThresholdSet,
    pub notifications_enabled: bool,
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
    pub persistent_notifications_enabled: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            thresholds: ThresholdSet::default(),
            notifications_enabled: true,
            sound_enabled: true,
            vibration_enabled: true,
            persistent_notifications_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_accepts_device_field_names() {
        let raw = RawReading::from_payload(br#"{"temperature": 28.5, "humidity": 41, "gasLevel": 730}"#).unwrap();
        assert_eq!(raw, RawReading { temperature: 28.5, humidity: 41.0, gas: 730.0 });
    }

    #[test]
    fn payload_defaults_missing_and_garbage_to_zero() {
        let raw = RawReading::from_payload(br#"{"temperature": "hot", "gas": "812.5"}"#).unwrap();
        assert_eq!(raw.temperature, 0.0);
        assert_eq!(raw.humidity, 0.0);
        assert_eq!(raw.gas, 812.5);
    }

    #[test]
    fn payload_must_be_an_object() {
        assert!(matches!(RawReading::from_payload(b"[1, 2, 3]"), Err(PayloadError::NotAnObject)));
        assert!(matches!(RawReading::from_payload(b"not json"), Err(PayloadError::Json(_))));
    }

    #[test]
    fn default_thresholds_are_well_ordered() {
        assert!(ThresholdSet::default().validate().is_empty());
    }

    #[test]
    fn inverted_humidity_pair_is_reported() {
        let mut thresholds = ThresholdSet::default();
        thresholds.humidity = ChannelThreshold { warning: 30.0, critical: 60.0 };
        thresholds.gas = ChannelThreshold { warning: 900.0, critical: 900.0 };

        let problems = thresholds.validate();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].starts_with("humidity"));
        assert!(problems[1].starts_with("gas"));
    }
}
