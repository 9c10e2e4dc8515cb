//! telemetry alarm host
//!
//! watches temperature, humidity and gas readings from an MQTT feed and
//! drives a single escalating alarm: per-channel notifications, a looping
//! siren, vibration, and a re-assertion every 30 seconds until the readings
//! recover or an operator dismisses it.

pub mod alarm;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod evaluator;
pub mod hal;
pub mod monitor;
pub mod notifier;
pub mod runtime;
pub mod server;
pub mod throttle;
pub mod transport;

#[cfg(feature = "hardware")]
mod gpio;
#[cfg(any(feature = "hardware", test))]
mod pattern;
