//! ==============================================================================
//! gpio.rs - buzzer relay and vibration motor outputs
//! ==============================================================================
//!
//! purpose:
//!     claims an output pin and hands it to a PatternLoop, so the alarm
//!     logic never waits on hardware.
//!
//! hardware:
//!     buzzer on a sainsmart relay (gpio 17 by default), vibration motor
//!     behind a transistor (gpio 27 by default).
//!     the relay is ACTIVE LOW - gpio low = relay on = buzzer sounds.
//!
//! relationships:
//!     - used by: hal.rs (real Hal, feature="hardware")
//!     - uses: rppal::gpio, pattern.rs
//!
//! ==============================================================================

use rppal::gpio::{Gpio, OutputPin};

use crate::error::DeliveryError;
use crate::pattern::PatternLoop;

/// start driving `pin` with `pattern` (on, off, on, off... in ms)
pub fn start(pin: u8, pattern: Vec<u64>, repeat: bool, active_low: bool) -> Result<PatternLoop, DeliveryError> {
    let mut output = Gpio::new()?.get(pin)?.into_output();
    set_active(&mut output, false, active_low);

    PatternLoop::spawn(format!("gpio{}-pattern", pin), pattern, repeat, move |on| {
        set_active(&mut output, on, active_low)
    })
}

fn set_active(pin: &mut OutputPin, on: bool, active_low: bool) {
    if on != active_low {
        pin.set_high();
    } else {
        pin.set_low();
    }
}
