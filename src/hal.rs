//! ==============================================================================
//! hal.rs - Alert Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     provides a unified interface for every way the host can get a human's
//!     attention: push notification, siren, vibration.
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (buzzer relay + vibration motor via `rppal`) and a development machine
//!     (log-only mock).
//!
//! design philosophy:
//!     - "Compile Anywhere": The host should compile on Windows/Mac/Linux.
//!     - "Never Block": every call returns quickly. Network pushes and GPIO
//!       patterns run on a background task/thread.
//!     - "Stop Means Stopped": stop_sound/stop_vibration return only after the
//!       running pattern has been cancelled. the pattern thread is woken
//!       directly, so this takes no longer than one pin write.
//!
//! relationships:
//!     - used by: notifier.rs (the only caller)
//!     - uses: gpio.rs (on feature="hardware")
//!     - uses: reqwest (webhook push, both builds)
//!
//! ==============================================================================

use crate::config::HostConfig;
use crate::error::DeliveryError;
use crate::notifier::Notification;

pub trait AlertProvider: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), DeliveryError>;
    fn play_sound(&self, looping: bool) -> Result<(), DeliveryError>;
    fn stop_sound(&self) -> Result<(), DeliveryError>;
    /// alternating on/off durations in milliseconds, repeated until stopped
    fn vibrate(&self, pattern: &[u64]) -> Result<(), DeliveryError>;
    fn stop_vibration(&self) -> Result<(), DeliveryError>;
}

// ==============================================================================================
// WEBHOOK PUSH (shared by both builds)
// ==============================================================================================

/// posts notifications as json to a webhook
///
/// the request runs on a spawned task; a failed post is logged there since
/// the caller has already moved on.
pub struct PushClient {
    client: reqwest::Client,
    url: String,
}

impl PushClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into() }
    }

    pub fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DeliveryError::Push(format!("no async runtime: {}", e)))?;

        let request = self.client.post(&self.url).json(notification);
        let title = notification.title.clone();
        runtime.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!("[PUSH] delivered '{}'", title);
                }
                Ok(resp) => {
                    tracing::warn!("[PUSH] '{}' rejected with {}", title, resp.status());
                }
                Err(e) => {
                    tracing::warn!("[PUSH] '{}' failed: {}", title, e);
                }
            }
        });
        Ok(())
    }
}

/// log the notification, then push it if a webhook is configured
fn deliver(push: Option<&PushClient>, notification: &Notification) -> Result<(), DeliveryError> {
    tracing::info!("[NOTIFY] {} | {}", notification.title, notification.body);
    match push {
        Some(client) => client.send(notification),
        None => Ok(()),
    }
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For WSL / Non-Hardware Build)
// ==============================================================================================
#[cfg(not(feature = "hardware"))]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(not(feature = "hardware"))]
pub struct Hal {
    push: Option<PushClient>,
    sounding: AtomicBool,
    vibrating: AtomicBool,
}

#[cfg(not(feature = "hardware"))]
impl Hal {
    pub fn new(config: &HostConfig) -> Self {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Self {
            push: config.push.as_ref().map(|p| PushClient::new(&p.url)),
            sounding: AtomicBool::new(false),
            vibrating: AtomicBool::new(false),
        }
    }

    pub fn is_sounding(&self) -> bool {
        self.sounding.load(Ordering::SeqCst)
    }

    pub fn is_vibrating(&self) -> bool {
        self.vibrating.load(Ordering::SeqCst)
    }
}

#[cfg(not(feature = "hardware"))]
impl AlertProvider for Hal {
    fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        deliver(self.push.as_ref(), notification)
    }

    fn play_sound(&self, looping: bool) -> Result<(), DeliveryError> {
        tracing::debug!("[MOCK SIREN] on (looping: {})", looping);
        self.sounding.store(looping, Ordering::SeqCst);
        Ok(())
    }

    fn stop_sound(&self) -> Result<(), DeliveryError> {
        tracing::debug!("[MOCK SIREN] off");
        self.sounding.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn vibrate(&self, pattern: &[u64]) -> Result<(), DeliveryError> {
        tracing::debug!("[MOCK VIBRATION] pattern {:?}", pattern);
        self.vibrating.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_vibration(&self) -> Result<(), DeliveryError> {
        tracing::debug!("[MOCK VIBRATION] off");
        self.vibrating.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
use std::sync::Mutex;

#[cfg(feature = "hardware")]
use crate::gpio;
#[cfg(feature = "hardware")]
use crate::pattern::PatternLoop;

/// buzzer on/off rhythm for the looping siren
#[cfg(feature = "hardware")]
const SIREN_PATTERN: [u64; 2] = [400, 200];

#[cfg(feature = "hardware")]
pub struct Hal {
    push: Option<PushClient>,
    buzzer_pin: u8,
    vibration_pin: u8,
    active_low: bool,
    siren: Mutex<Option<PatternLoop>>,
    vibration: Mutex<Option<PatternLoop>>,
}

#[cfg(feature = "hardware")]
impl Hal {
    pub fn new(config: &HostConfig) -> Self {
        tracing::info!(
            "Using REAL HARDWARE HAL (rppal, buzzer gpio {}, vibration gpio {})",
            config.hardware.buzzer_pin,
            config.hardware.vibration_pin
        );
        Self {
            push: config.push.as_ref().map(|p| PushClient::new(&p.url)),
            buzzer_pin: config.hardware.buzzer_pin,
            vibration_pin: config.hardware.vibration_pin,
            active_low: config.hardware.active_low,
            siren: Mutex::new(None),
            vibration: Mutex::new(None),
        }
    }

    /// replace whatever pattern is running in `slot`
    fn restart(
        &self,
        slot: &Mutex<Option<PatternLoop>>,
        pin: u8,
        pattern: &[u64],
        repeat: bool,
    ) -> Result<(), DeliveryError> {
        let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(running) = guard.take() {
            running.stop();
        }
        *guard = Some(gpio::start(pin, pattern.to_vec(), repeat, self.active_low)?);
        Ok(())
    }

    fn halt(slot: &Mutex<Option<PatternLoop>>) {
        let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(running) = guard.take() {
            running.stop();
        }
    }
}

#[cfg(feature = "hardware")]
impl AlertProvider for Hal {
    fn notify(&self, notification: &Notification) -> Result<(), DeliveryError> {
        deliver(self.push.as_ref(), notification)
    }

    fn play_sound(&self, looping: bool) -> Result<(), DeliveryError> {
        self.restart(&self.siren, self.buzzer_pin, &SIREN_PATTERN, looping)
    }

    fn stop_sound(&self) -> Result<(), DeliveryError> {
        Self::halt(&self.siren);
        Ok(())
    }

    fn vibrate(&self, pattern: &[u64]) -> Result<(), DeliveryError> {
        self.restart(&self.vibration, self.vibration_pin, pattern, true)
    }

    fn stop_vibration(&self) -> Result<(), DeliveryError> {
        Self::halt(&self.vibration);
        Ok(())
    }
}
