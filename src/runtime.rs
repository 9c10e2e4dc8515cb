//! ==============================================================================
//! runtime.rs - the monitor event loop
//! ==============================================================================
//!
//! purpose:
//!     runs the Monitor on a single tokio task. everything that wants to
//!     change alarm state (mqtt readings, the dismiss button, config edits)
//!     goes through one ordered queue, so evaluations never overlap.
//!
//! architecture:
//!
//!     ┌──────────────┐   Command    ┌─────────────────────────────────┐
//!     │ transport.rs │ ───────────► │            monitor task          │
//!     │ server.rs    │   (mpsc)     │  select! {                       │
//!     │ config.rs    │              │     queue.recv()  -> Monitor     │
//!     └──────────────┘              │     sleep(next_wake) -> tick()   │
//!            ▲                      │  }                               │
//!            │   MonitorSnapshot    └───────────────┬─────────────────┘
//!            └──────────── (watch) ─────────────────┘
//!
//! relationships:
//!     - owns: monitor.rs
//!     - used by: main.rs, transport.rs, server.rs, config.rs (hot reload)
//!
//! ==============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::alarm::AlarmDisplay;
use crate::clock::Clock;
use crate::domain::{AlertSettings, RawReading};
use crate::monitor::{Monitor, MonitorSnapshot};

/// readings waiting for evaluation before senders start to wait
const QUEUE_DEPTH: usize = 64;

#[derive(Debug)]
pub enum Command {
    Reading(RawReading),
    Dismiss { reply: oneshot::Sender<AlarmDisplay> },
    UpdateSettings(AlertSettings),
    Shutdown,
}

/// cheap, cloneable access to the running monitor
#[derive(Clone)]
pub struct MonitorHandle {
    queue: mpsc::Sender<Command>,
    snapshot: watch::Receiver<MonitorSnapshot>,
    clock: Arc<dyn Clock>,
}

impl MonitorHandle {
    /// queue a reading for evaluation
    pub async fn submit(&self, reading: RawReading) -> Result<()> {
        self.send(Command::Reading(reading)).await
    }

    /// silence the alarm and return what the dashboard should now show
    pub async fn dismiss(&self) -> Result<AlarmDisplay> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Dismiss { reply }).await?;
        rx.await.map_err(|_| anyhow!("monitor stopped before answering"))
    }

    pub async fn update_settings(&self, settings: AlertSettings) -> Result<()> {
        self.send(Command::UpdateSettings(settings)).await
    }

    /// for callers outside the runtime (the file watcher thread)
    pub fn update_settings_blocking(&self, settings: AlertSettings) -> Result<()> {
        self.queue
            .blocking_send(Command::UpdateSettings(settings))
            .map_err(|_| anyhow!("monitor is not running"))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn display(&self) -> AlarmDisplay {
        self.snapshot.borrow().alarm.display(self.clock.now_ms())
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// a receiver that wakes on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot.clone()
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.queue.send(command).await.map_err(|_| anyhow!("monitor is not running"))
    }
}

/// move `monitor` onto its own task
pub fn spawn(monitor: Monitor) -> (MonitorHandle, JoinHandle<()>) {
    let (queue, rx) = mpsc::channel(QUEUE_DEPTH);
    let (snapshot_tx, snapshot) = watch::channel(monitor.snapshot());
    let clock = monitor.clock();

    let handle = MonitorHandle { queue, snapshot, clock };
    let task = tokio::spawn(run(monitor, rx, snapshot_tx));
    (handle, task)
}

async fn run(mut monitor: Monitor, mut queue: mpsc::Receiver<Command>, snapshot: watch::Sender<MonitorSnapshot>) {
    let clock = monitor.clock();
    tracing::info!("[MONITOR] event loop started");

    loop {
        let mut reply_to = None;
        let wake_in = monitor
            .next_wake_at()
            .map(|at| Duration::from_millis(at.saturating_sub(clock.now_ms())));

        tokio::select! {
            command = queue.recv() => match command {
                Some(Command::Reading(raw)) => {
                    monitor.on_reading(raw);
                }
                Some(Command::Dismiss { reply }) => {
                    monitor.dismiss();
                    reply_to = Some(reply);
                }
                Some(Command::UpdateSettings(settings)) => {
                    monitor.apply_settings(settings);
                }
                Some(Command::Shutdown) | None => break,
            },
            _ = sleep_or_pending(wake_in) => {
                monitor.tick();
            }
        }

        snapshot.send_replace(monitor.snapshot());
        if let Some(reply) = reply_to {
            // the requester may have given up; the dismiss still stands
            let _ = reply.send(monitor.display());
        }
    }

    monitor.shutdown();
    snapshot.send_replace(monitor.snapshot());
    tracing::info!("[MONITOR] event loop stopped");
}

async fn sleep_or_pending(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TimingConfig;
    use crate::domain::Channel;
    use crate::hal::recording::{Effect, RecordingProvider};
    use crate::notifier::NotificationKind;

    const T: u64 = 1_700_000_000_000;

    fn start() -> (Arc<ManualClock>, Arc<RecordingProvider>, MonitorHandle, JoinHandle<()>) {
        let clock = Arc::new(ManualClock::new(T));
        let provider = Arc::new(RecordingProvider::default());
        let monitor = Monitor::new(AlertSettings::default(), &TimingConfig::default(), provider.clone(), clock.clone());
        let (handle, task) = spawn(monitor);
        (clock, provider, handle, task)
    }

    fn gas_leak() -> RawReading {
        RawReading { temperature: 21.0, humidity: 65.0, gas: 1500.0 }
    }

    #[tokio::test]
    async fn readings_publish_snapshots() {
        let (clock, _provider, handle, _task) = start();
        let mut rx = handle.subscribe();
        assert!(!handle.display().is_active);

        handle.submit(gas_leak()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx.changed()).await.unwrap().unwrap();

        let display = handle.display();
        assert!(display.is_active);
        assert_eq!(display.critical_sensors, vec![Channel::Gas]);

        clock.advance_secs(12);
        assert_eq!(handle.display().alarm_duration, 12);
    }

    #[tokio::test]
    async fn dismiss_answers_after_queued_readings() {
        let (_clock, provider, handle, _task) = start();

        handle.submit(gas_leak()).await.unwrap();
        let display = handle.dismiss().await.unwrap();

        assert!(!display.is_active);
        assert!(provider.kinds().contains(&NotificationKind::AlarmDismissed));
        assert_eq!(provider.count(&Effect::StopSound), 1);
    }

    /// follows tokio's clock, so paused tests see the time the timers see
    struct TokioClock {
        base: u64,
        start: tokio::time::Instant,
    }

    impl Clock for TokioClock {
        fn now_ms(&self) -> u64 {
            self.base + self.start.elapsed().as_millis() as u64
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wake_timer_reasserts_every_interval() {
        let clock = Arc::new(TokioClock { base: T, start: tokio::time::Instant::now() });
        let provider = Arc::new(RecordingProvider::default());
        let monitor = Monitor::new(AlertSettings::default(), &TimingConfig::default(), provider.clone(), clock);
        let (handle, _task) = spawn(monitor);
        let reasserts = || {
            provider
                .kinds()
                .into_iter()
                .filter(|k| *k == NotificationKind::AlarmReasserted)
                .count()
        };

        handle.submit(gas_leak()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(provider.kinds().contains(&NotificationKind::AlarmRaised));
        assert_eq!(reasserts(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(reasserts(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(reasserts(), 2);
        assert_eq!(handle.display().alarm_duration, 61);
    }

    #[tokio::test]
    async fn shutdown_stops_effects_and_closes_the_queue() {
        let (_clock, provider, handle, task) = start();

        handle.submit(gas_leak()).await.unwrap();
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(provider.count(&Effect::PlaySound(true)), 1);
        assert_eq!(provider.count(&Effect::StopSound), 1);
        assert_eq!(provider.count(&Effect::StopVibration), 1);
        assert!(handle.submit(gas_leak()).await.is_err());
    }
}
