//! ==============================================================================
//! notifier.rs - notification dispatcher
//! ==============================================================================
//!
//! purpose:
//!     turns per-channel status changes and alarm transitions into
//!     notifications, siren and vibration calls on the AlertProvider.
//!
//! rate limiting (per channel):
//!     - critical: immediately on entering critical, then at most every 10s
//!     - warning:  at most once per 30 minutes
//!     - recovery: once on returning to normal; re-arms both limits
//!
//! failure policy:
//!     every provider error is logged and swallowed. the alarm keeps its
//!     state whether or not the device managed to alert anyone.
//!
//! relationships:
//!     - used by: monitor.rs
//!     - uses: hal.rs (AlertProvider), throttle.rs, evaluator.rs
//!
//! ==============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::alarm::ClearReason;
use crate::config::TimingConfig;
use crate::domain::{AlertSettings, Channel, ChannelThreshold, Reading, SensorStatus};
use crate::error::DeliveryError;
use crate::evaluator::classify;
use crate::hal::AlertProvider;
use crate::throttle::RateLimiter;

/// vibrate 1s, pause 0.5s, repeat
pub const VIBRATION_PATTERN: [u64; 2] = [1000, 500];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Warning,
    Critical,
    Recovery,
    AlarmRaised,
    AlarmReasserted,
    AlarmCleared,
    AlarmDismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Default,
    High,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub channel: Option<Channel>,
    pub title: String,
    pub body: String,
    pub sound: bool,
    pub priority: Priority,
}

impl Notification {
    pub fn channel_critical(channel: Channel, value: f64, threshold: &ChannelThreshold, sound: bool) -> Self {
        let title = match channel {
            Channel::Temperature => "🌡️ Critical Temperature!",
            Channel::Humidity => "💧 Critical Humidity!",
            Channel::Gas => "🚨 Critical Gas Level!",
        };
        Self {
            kind: NotificationKind::Critical,
            channel: Some(channel),
            title: title.to_string(),
            body: format!(
                "{}: {} (Critical: {}{})",
                channel.label(),
                channel.format_value(value),
                bound(channel),
                threshold.critical
            ),
            sound,
            priority: Priority::Max,
        }
    }

    pub fn channel_warning(channel: Channel, value: f64, threshold: &ChannelThreshold, sound: bool) -> Self {
        Self {
            kind: NotificationKind::Warning,
            channel: Some(channel),
            title: format!("⚠️ {} Warning", channel.label()),
            body: format!(
                "{}: {} (Warning: {}{})",
                channel.label(),
                channel.format_value(value),
                bound(channel),
                threshold.warning
            ),
            sound,
            priority: Priority::High,
        }
    }

    pub fn channel_recovered(channel: Channel, value: f64) -> Self {
        Self {
            kind: NotificationKind::Recovery,
            channel: Some(channel),
            title: format!("✅ {} Back to Normal", channel.label()),
            body: format!("{}: {}", channel.label(), channel.format_value(value)),
            sound: false,
            priority: Priority::Default,
        }
    }

    /// the alarm-wide notification listing every critical channel
    pub fn alarm_active(kind: NotificationKind, critical: &[Channel], reading: &Reading, sound: bool) -> Self {
        let levels = critical
            .iter()
            .map(|c| format!("{}: {}", c.label(), c.format_value(reading.value(*c))))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            kind,
            channel: None,
            title: "🚨 CRITICAL ALARM ACTIVE!".to_string(),
            body: format!("Critical levels detected: {}", levels),
            sound,
            priority: Priority::Max,
        }
    }

    pub fn alarm_cleared() -> Self {
        Self {
            kind: NotificationKind::AlarmCleared,
            channel: None,
            title: "✅ Alarm Cleared".to_string(),
            body: "All sensors have returned to safe levels".to_string(),
            sound: false,
            priority: Priority::Default,
        }
    }

    pub fn alarm_dismissed(still_critical: &[Channel]) -> Self {
        let body = if still_critical.is_empty() {
            "Alarm silenced by operator".to_string()
        } else {
            let names = still_critical.iter().map(|c| c.label()).collect::<Vec<_>>().join(", ");
            format!("Alarm silenced by operator; still critical: {}", names)
        };
        Self {
            kind: NotificationKind::AlarmDismissed,
            channel: None,
            title: "🔕 Alarm Dismissed".to_string(),
            body,
            sound: false,
            priority: Priority::Default,
        }
    }
}

/// the comparison that makes a value bad, as shown to a human
fn bound(channel: Channel) -> &'static str {
    if channel.lower_is_worse() {
        "<"
    } else {
        ">="
    }
}

// ==============================================================================
// per-channel bookkeeping
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelNotificationState {
    pub current_status: SensorStatus,
    warning: RateLimiter,
    critical: RateLimiter,
}

impl ChannelNotificationState {
    fn new(timing: &TimingConfig) -> Self {
        Self {
            current_status: SensorStatus::Normal,
            warning: RateLimiter::new(timing.warning_cooldown().as_millis() as u64),
            critical: RateLimiter::new(timing.critical_cooldown().as_millis() as u64),
        }
    }

    pub fn last_warning_at(&self) -> Option<u64> {
        self.warning.last_fired()
    }

    pub fn last_critical_at(&self) -> Option<u64> {
        self.critical.last_fired()
    }

    /// advance to `status`; returns the notification kind to send, if any
    fn advance(&mut self, status: SensorStatus, now: u64) -> Option<NotificationKind> {
        let previous = self.current_status;
        self.current_status = status;

        match status {
            SensorStatus::Critical => {
                if previous != SensorStatus::Critical || self.critical.should_fire(now) {
                    self.critical.record_fired(now);
                    Some(NotificationKind::Critical)
                } else {
                    None
                }
            }
            SensorStatus::Warning => {
                if self.warning.should_fire(now) {
                    self.warning.record_fired(now);
                    Some(NotificationKind::Warning)
                } else {
                    None
                }
            }
            SensorStatus::Normal if previous != SensorStatus::Normal => {
                self.warning.reset();
                self.critical.reset();
                Some(NotificationKind::Recovery)
            }
            SensorStatus::Normal => None,
        }
    }
}

/// a looping effect the dispatcher has (or has tried to) set going
#[derive(Debug, Default, Clone, Copy)]
struct LoopingEffect {
    running: bool,
    failed: bool,
}

// ==============================================================================
// dispatcher
// ==============================================================================

pub struct Dispatcher {
    provider: Arc<dyn AlertProvider>,
    timing: TimingConfig,
    channels: HashMap<Channel, ChannelNotificationState>,
    siren: LoopingEffect,
    vibration: LoopingEffect,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn AlertProvider>, timing: &TimingConfig) -> Self {
        Self {
            provider,
            timing: timing.clone(),
            channels: HashMap::new(),
            siren: LoopingEffect::default(),
            vibration: LoopingEffect::default(),
        }
    }

    pub fn channel_state(&self, channel: Channel) -> ChannelNotificationState {
        self.channels
            .get(&channel)
            .copied()
            .unwrap_or_else(|| ChannelNotificationState::new(&self.timing))
    }

    pub fn is_sounding(&self) -> bool {
        self.siren.running
    }

    pub fn is_vibrating(&self) -> bool {
        self.vibration.running
    }

    /// per-channel warning/critical/recovery notifications for one evaluation
    ///
    /// bookkeeping advances even when notifications are disabled, so turning
    /// them back on does not replay stale transitions.
    pub fn notify_channels(&mut self, reading: &Reading, settings: &AlertSettings, now: u64) -> Vec<Notification> {
        let mut outgoing = Vec::new();

        for channel in Channel::ALL {
            let value = reading.value(channel);
            let threshold = settings.thresholds.get(channel);
            let status = classify(value, channel, &settings.thresholds);

            let state = self
                .channels
                .entry(channel)
                .or_insert_with(|| ChannelNotificationState::new(&self.timing));

            let notification = match state.advance(status, now) {
                Some(NotificationKind::Critical) => {
                    Notification::channel_critical(channel, value, threshold, settings.sound_enabled)
                }
                Some(NotificationKind::Warning) => {
                    Notification::channel_warning(channel, value, threshold, settings.sound_enabled)
                }
                Some(NotificationKind::Recovery) => Notification::channel_recovered(channel, value),
                _ => continue,
            };
            outgoing.push(notification);
        }

        for notification in &outgoing {
            self.send(notification, settings);
        }
        outgoing
    }

    pub fn alarm_raised(&mut self, critical: &[Channel], reading: &Reading, settings: &AlertSettings) {
        tracing::warn!("[ALARM] critical alarm started: {:?}", critical);
        self.sync_effects(true, settings);
        let n = Notification::alarm_active(NotificationKind::AlarmRaised, critical, reading, settings.sound_enabled);
        self.send(&n, settings);
    }

    pub fn alarm_reasserted(&mut self, critical: &[Channel], reading: &Reading, settings: &AlertSettings) {
        self.sync_effects(true, settings);
        if !settings.persistent_notifications_enabled {
            tracing::debug!("[ALARM] still critical {:?}, persistent notifications off", critical);
            return;
        }
        tracing::info!("[ALARM] still critical: {:?}", critical);
        let n = Notification::alarm_active(NotificationKind::AlarmReasserted, critical, reading, settings.sound_enabled);
        self.send(&n, settings);
    }

    pub fn alarm_cleared(&mut self, reason: ClearReason, still_critical: &[Channel], settings: &AlertSettings) {
        self.sync_effects(false, settings);
        let n = match reason {
            ClearReason::Recovered => {
                tracing::info!("[ALARM] critical alarm stopped");
                Notification::alarm_cleared()
            }
            ClearReason::Dismissed => {
                tracing::info!("[ALARM] critical alarm dismissed by operator");
                Notification::alarm_dismissed(still_critical)
            }
        };
        self.send(&n, settings);
    }

    /// bring siren and vibration in line with the alarm and the current flags
    ///
    /// a failed start is not retried until the alarm has been cleared.
    pub fn sync_effects(&mut self, alarm_active: bool, settings: &AlertSettings) {
        let provider = Arc::clone(&self.provider);

        Self::sync_one(
            &mut self.siren,
            alarm_active && settings.sound_enabled,
            alarm_active,
            "siren",
            || provider.play_sound(true),
            || provider.stop_sound(),
        );
        Self::sync_one(
            &mut self.vibration,
            alarm_active && settings.vibration_enabled,
            alarm_active,
            "vibration",
            || provider.vibrate(&VIBRATION_PATTERN),
            || provider.stop_vibration(),
        );
    }

    fn sync_one(
        effect: &mut LoopingEffect,
        wanted: bool,
        alarm_active: bool,
        name: &str,
        start: impl FnOnce() -> Result<(), DeliveryError>,
        stop: impl FnOnce() -> Result<(), DeliveryError>,
    ) {
        if wanted && !effect.running && !effect.failed {
            match start() {
                Ok(()) => effect.running = true,
                Err(e) => {
                    tracing::warn!("[ALARM] failed to start {}: {}", name, e);
                    effect.failed = true;
                }
            }
        } else if !wanted && effect.running {
            if let Err(e) = stop() {
                tracing::warn!("[ALARM] failed to stop {}: {}", name, e);
            }
            effect.running = false;
        }

        if !alarm_active {
            effect.failed = false;
        }
    }

    fn send(&self, notification: &Notification, settings: &AlertSettings) {
        if !settings.notifications_enabled {
            return;
        }
        if let Err(e) = self.provider.notify(notification) {
            tracing::warn!("[NOTIFY] failed to deliver '{}': {}", notification.title, e);
        }
    }
}
