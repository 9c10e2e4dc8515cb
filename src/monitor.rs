//! ==============================================================================
//! monitor.rs - the evaluation pipeline
//! ==============================================================================
//!
//! purpose:
//!     the single funnel every trigger goes through:
//!
//!         reading ──┐
//!         tick    ──┼──► classify ──► critical set ──► AlarmMachine ──► Dispatcher
//!         dismiss ──┤
//!         settings ─┘
//!
//!     owns the alarm, the per-channel notification table, the latest
//!     reading and the current settings. nothing else mutates them.
//!
//! relationships:
//!     - driven by: runtime.rs (one task, so calls never overlap)
//!     - uses: evaluator.rs, alarm.rs, notifier.rs, clock.rs
//!
//! ==============================================================================

use std::sync::Arc;

use serde::Serialize;

use crate::alarm::{AlarmDisplay, AlarmMachine, AlarmState, ClearReason, Transition};
use crate::clock::Clock;
use crate::config::TimingConfig;
use crate::domain::{AlertSettings, Channel, RawReading, Reading, SensorStatus};
use crate::evaluator::{critical_channels, statuses};
use crate::hal::AlertProvider;
use crate::notifier::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelReport {
    pub channel: Channel,
    pub value: f64,
    pub status: SensorStatus,
}

/// everything the dashboard needs, minus the derived alarm duration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub reading: Option<Reading>,
    pub channels: Vec<ChannelReport>,
    pub alarm: AlarmState,
}

pub struct Monitor {
    clock: Arc<dyn Clock>,
    settings: AlertSettings,
    latest: Option<Reading>,
    alarm: AlarmMachine,
    dispatcher: Dispatcher,
}

impl Monitor {
    pub fn new(
        settings: AlertSettings,
        timing: &TimingConfig,
        provider: Arc<dyn AlertProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            clock,
            settings,
            latest: None,
            alarm: AlarmMachine::new(timing.reassert_interval()),
            dispatcher: Dispatcher::new(provider, timing),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    pub fn alarm(&self) -> &AlarmState {
        self.alarm.state()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn next_wake_at(&self) -> Option<u64> {
        self.alarm.next_wake_at()
    }

    pub fn display(&self) -> AlarmDisplay {
        self.alarm.state().display(self.clock.now_ms())
    }

    /// stamp an inbound reading with our own clock and evaluate it
    pub fn on_reading(&mut self, raw: RawReading) -> Transition {
        let reading = raw.stamp(self.clock.now_ms());
        self.latest = Some(reading);
        self.evaluate(&reading)
    }

    /// the re-assertion wake-up; a no-op unless one is due
    pub fn tick(&mut self) -> Transition {
        let now = self.clock.now_ms();
        if !self.alarm.is_due(now) {
            return Transition::None;
        }

        let critical = self
            .latest
            .map(|r| critical_channels(&r, &self.settings.thresholds))
            .unwrap_or_default();
        let transition = self.alarm.tick(&critical, now);
        self.apply(transition, &critical, &[]);
        transition
    }

    /// operator stop: silence everything now, even if channels are still critical
    pub fn dismiss(&mut self) -> Transition {
        let still_critical = self.alarm.state().critical_sensors.clone();
        let transition = self.alarm.dismiss();
        self.apply(transition, &[], &still_critical);
        transition
    }

    /// new thresholds/flags take effect immediately on the latest reading
    pub fn apply_settings(&mut self, settings: AlertSettings) -> Transition {
        if settings == self.settings {
            return Transition::None;
        }
        self.settings = settings;
        tracing::info!("[MONITOR] settings updated");

        match self.latest {
            Some(reading) => self.evaluate(&reading),
            None => Transition::None,
        }
    }

    /// stop every running side effect; used on shutdown
    pub fn shutdown(&mut self) {
        self.dispatcher.sync_effects(false, &self.settings);
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let channels = self
            .latest
            .map(|r| {
                statuses(&r, &self.settings.thresholds)
                    .into_iter()
                    .map(|(channel, status)| ChannelReport { channel, value: r.value(channel), status })
                    .collect()
            })
            .unwrap_or_default();

        MonitorSnapshot {
            reading: self.latest,
            channels,
            alarm: self.alarm.state().clone(),
        }
    }

    fn evaluate(&mut self, reading: &Reading) -> Transition {
        let now = self.clock.now_ms();
        let critical = critical_channels(reading, &self.settings.thresholds);

        tracing::debug!(
            "[MONITOR] t={:.1} h={:.1} gas={:.1} critical={:?}",
            reading.temperature,
            reading.humidity,
            reading.gas,
            critical
        );

        let transition = self.alarm.observe(&critical, now);
        self.dispatcher.notify_channels(reading, &self.settings, now);
        self.apply(transition, &critical, &[]);
        transition
    }

    /// fire the side effects that belong to a transition
    fn apply(&mut self, transition: Transition, critical: &[Channel], still_critical: &[Channel]) {
        let reading = self.latest.unwrap_or_else(|| RawReading::default().stamp(0));

        match transition {
            Transition::None => {}
            Transition::Raised => self.dispatcher.alarm_raised(critical, &reading, &self.settings),
            Transition::Updated => self.dispatcher.sync_effects(true, &self.settings),
            Transition::Reasserted => self.dispatcher.alarm_reasserted(critical, &reading, &self.settings),
            Transition::Cleared(reason) => {
                let remaining = match reason {
                    ClearReason::Recovered => &[][..],
                    ClearReason::Dismissed => still_critical,
                };
                self.dispatcher.alarm_cleared(reason, remaining, &self.settings);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::ChannelThreshold;
    use crate::hal::recording::{Effect, RecordingProvider};
    use crate::notifier::NotificationKind;

    const T: u64 = 1_700_000_000_000;

    struct Rig {
        clock: Arc<ManualClock>,
        provider: Arc<RecordingProvider>,
        monitor: Monitor,
    }

    fn rig_with(settings: AlertSettings) -> Rig {
        let clock = Arc::new(ManualClock::new(T));
        let provider = Arc::new(RecordingProvider::default());
        let monitor = Monitor::new(settings, &TimingConfig::default(), provider.clone(), clock.clone());
        Rig { clock, provider, monitor }
    }

    fn rig() -> Rig {
        rig_with(AlertSettings::default())
    }

    fn raw(temperature: f64, humidity: f64, gas: f64) -> RawReading {
        RawReading { temperature, humidity, gas }
    }

    fn safe() -> RawReading {
        raw(22.0, 65.0, 100.0)
    }

    fn alarm_kinds(provider: &RecordingProvider) -> Vec<NotificationKind> {
        provider
            .kinds()
            .into_iter()
            .filter(|k| !matches!(k, NotificationKind::Warning | NotificationKind::Critical | NotificationKind::Recovery))
            .collect()
    }

    #[test]
    fn hot_reading_raises_the_alarm() {
        let mut r = rig();
        r.monitor.apply_settings(AlertSettings {
            thresholds: crate::domain::ThresholdSet {
                temperature: ChannelThreshold { warning: 35.0, critical: 50.0 },
                ..Default::default()
            },
            ..Default::default()
        });

        assert_eq!(r.monitor.on_reading(raw(52.0, 65.0, 100.0)), Transition::Raised);
        let display = r.monitor.display();
        assert!(display.is_active);
        assert_eq!(display.critical_sensors, vec![Channel::Temperature]);

        let effects = r.provider.effects();
        assert!(effects.contains(&Effect::PlaySound(true)));
        assert!(effects.contains(&Effect::Vibrate(vec![1000, 500])));
        assert_eq!(alarm_kinds(&r.provider), vec![NotificationKind::AlarmRaised]);
    }

    #[test]
    fn duration_counts_from_start() {
        let mut r = rig();
        r.monitor.on_reading(raw(20.0, 65.0, 1500.0));
        r.clock.advance_secs(65);
        assert_eq!(r.monitor.display().alarm_duration, 65);

        r.monitor.on_reading(safe());
        assert_eq!(r.monitor.display().alarm_duration, 0);
    }

    #[test]
    fn humidity_levels_follow_inverted_thresholds() {
        let mut r = rig();
        let status = |m: &Monitor| m.snapshot().channels[1].status;

        r.monitor.on_reading(raw(22.0, 25.0, 100.0));
        assert_eq!(status(&r.monitor), SensorStatus::Critical);
        assert!(r.monitor.alarm().is_active);

        r.monitor.on_reading(raw(22.0, 45.0, 100.0));
        assert_eq!(status(&r.monitor), SensorStatus::Warning);
        assert!(!r.monitor.alarm().is_active);

        r.monitor.on_reading(raw(22.0, 70.0, 100.0));
        assert_eq!(status(&r.monitor), SensorStatus::Normal);
    }

    #[test]
    fn recovery_stops_everything_once() {
        let mut r = rig();
        r.monitor.on_reading(raw(20.0, 65.0, 1500.0));
        r.provider.clear();

        assert_eq!(r.monitor.on_reading(safe()), Transition::Cleared(ClearReason::Recovered));
        assert_eq!(r.monitor.on_reading(safe()), Transition::None);

        assert_eq!(alarm_kinds(&r.provider), vec![NotificationKind::AlarmCleared]);
        assert_eq!(r.provider.count(&Effect::StopSound), 1);
        assert_eq!(r.provider.count(&Effect::StopVibration), 1);
        assert_eq!(r.monitor.next_wake_at(), None);
        assert_eq!(r.monitor.alarm(), &AlarmState::default());
    }

    #[test]
    fn dismiss_silences_then_next_critical_reading_rearms() {
        let mut r = rig();
        r.monitor.on_reading(raw(20.0, 65.0, 1500.0));
        r.provider.clear();

        assert_eq!(r.monitor.dismiss(), Transition::Cleared(ClearReason::Dismissed));
        assert_eq!(r.provider.count(&Effect::StopSound), 1);
        assert!(!r.monitor.display().is_active);
        let dismissed = r.provider.notifications().pop().unwrap();
        assert_eq!(dismissed.kind, NotificationKind::AlarmDismissed);
        assert!(dismissed.body.contains("Gas"));

        r.clock.advance_secs(1);
        assert_eq!(r.monitor.on_reading(raw(20.0, 65.0, 1500.0)), Transition::Raised);
        assert_eq!(
            alarm_kinds(&r.provider),
            vec![NotificationKind::AlarmDismissed, NotificationKind::AlarmRaised]
        );
        assert_eq!(r.provider.count(&Effect::PlaySound(true)), 1);
    }

    #[test]
    fn reassertion_every_thirty_seconds() {
        let mut r = rig();
        r.monitor.on_reading(raw(20.0, 65.0, 1500.0));

        r.clock.advance_secs(29);
        assert_eq!(r.monitor.tick(), Transition::None);
        r.clock.advance_secs(1);
        assert_eq!(r.monitor.tick(), Transition::Reasserted);
        r.clock.advance_secs(30);
        assert_eq!(r.monitor.tick(), Transition::Reasserted);

        assert_eq!(
            alarm_kinds(&r.provider),
            vec![
                NotificationKind::AlarmRaised,
                NotificationKind::AlarmReasserted,
                NotificationKind::AlarmReasserted
            ]
        );
        assert_eq!(r.monitor.alarm().last_notified_at, T + 60_000);
        // the siren was started once and left running
        assert_eq!(r.provider.count(&Effect::PlaySound(true)), 1);
    }

    #[test]
    fn reassertion_is_quiet_without_persistent_notifications() {
        let mut r = rig_with(AlertSettings { persistent_notifications_enabled: false, ..Default::default() });
        r.monitor.on_reading(raw(20.0, 65.0, 1500.0));
        r.clock.advance_secs(30);

        assert_eq!(r.monitor.tick(), Transition::Reasserted);
        assert_eq!(alarm_kinds(&r.provider), vec![NotificationKind::AlarmRaised]);
        assert!(r.monitor.alarm().is_active);
    }

    #[test]
    fn tick_clears_when_thresholds_moved_past_the_reading() {
        let mut r = rig();
        r.monitor.on_reading(raw(20.0, 65.0, 1500.0));

        // set directly so no re-evaluation happens before the tick
        r.monitor.settings.thresholds.gas = ChannelThreshold { warning: 1800.0, critical: 2000.0 };
        r.clock.advance_secs(30);

        assert_eq!(r.monitor.tick(), Transition::Cleared(ClearReason::Recovered));
        assert_eq!(alarm_kinds(&r.provider).last(), Some(&NotificationKind::AlarmCleared));
    }

    #[test]
    fn threshold_edit_re_evaluates_latest_reading() {
        let mut r = rig();
        r.monitor.on_reading(raw(45.0, 65.0, 100.0));
        assert!(!r.monitor.alarm().is_active);

        let mut settings = *r.monitor.settings();
        settings.thresholds.temperature.critical = 44.0;
        assert_eq!(r.monitor.apply_settings(settings), Transition::Raised);
        assert_eq!(r.monitor.apply_settings(settings), Transition::None);
    }

    #[test]
    fn unchanged_reading_respects_cooldowns() {
        let mut r = rig();
        let reading = raw(55.0, 45.0, 100.0);

        for _ in 0..9 {
            r.monitor.on_reading(reading);
            r.clock.advance_secs(1);
        }
        let per_channel = |p: &RecordingProvider, kind| p.kinds().into_iter().filter(|k| *k == kind).count();
        assert_eq!(per_channel(&r.provider, NotificationKind::Critical), 1);
        assert_eq!(per_channel(&r.provider, NotificationKind::Warning), 1);

        r.clock.advance_secs(1);
        r.monitor.on_reading(reading);
        assert_eq!(per_channel(&r.provider, NotificationKind::Critical), 2);
        assert_eq!(per_channel(&r.provider, NotificationKind::Warning), 1);
    }

    #[test]
    fn delivery_failures_never_block_transitions() {
        let clock = Arc::new(ManualClock::new(T));
        let provider = Arc::new(RecordingProvider::failing());
        let mut monitor =
            Monitor::new(AlertSettings::default(), &TimingConfig::default(), provider.clone(), clock.clone());

        assert_eq!(monitor.on_reading(raw(20.0, 65.0, 1500.0)), Transition::Raised);
        assert!(monitor.alarm().is_active);
        assert_eq!(monitor.on_reading(safe()), Transition::Cleared(ClearReason::Recovered));
        assert!(!monitor.alarm().is_active);
        // nothing was running, so nothing needed stopping
        assert_eq!(provider.count(&Effect::StopSound), 0);
    }

    #[test]
    fn muted_alarm_is_visual_only() {
        let mut r = rig_with(AlertSettings {
            notifications_enabled: false,
            sound_enabled: false,
            vibration_enabled: false,
            ..Default::default()
        });

        assert_eq!(r.monitor.on_reading(raw(20.0, 65.0, 1500.0)), Transition::Raised);
        assert!(r.monitor.display().is_active);
        assert!(r.provider.effects().is_empty());
    }

    #[test]
    fn snapshot_reports_every_channel() {
        let mut r = rig();
        assert!(r.monitor.snapshot().channels.is_empty());

        r.monitor.on_reading(raw(40.0, 65.0, 1200.0));
        let snapshot = r.monitor.snapshot();
        assert_eq!(snapshot.reading.map(|x| x.timestamp), Some(T));
        let statuses: Vec<_> = snapshot.channels.iter().map(|c| c.status).collect();
        assert_eq!(statuses, vec![SensorStatus::Warning, SensorStatus::Normal, SensorStatus::Critical]);
        assert_eq!(snapshot.alarm.critical_sensors, vec![Channel::Gas]);
    }
}
