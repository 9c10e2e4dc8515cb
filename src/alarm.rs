//! ==============================================================================
//! alarm.rs - the alarm state machine
//! ==============================================================================
//!
//! purpose:
//!     owns the single process-wide alarm. decides WHEN the alarm starts,
//!     re-asserts and stops; the dispatcher decides HOW that reaches a human.
//!
//! states:
//!
//!                critical set non-empty
//!     INACTIVE ─────────────────────────► ACTIVE ──┐ reading, set non-empty
//!        ▲                                   │  ▲  │ (refresh critical_sensors)
//!        │   set empty (reading or tick)     │  └──┘
//!        └───────────── or dismiss() ────────┘
//!
//!     while ACTIVE a wake-up is scheduled every `reassert_interval`. the
//!     owner calls tick() once it is due.
//!
//! relationships:
//!     - used by: monitor.rs
//!     - pure: no clock, no provider. time comes in as `now` (unix ms)
//!
//! ==============================================================================

use std::time::Duration;

use serde::Serialize;

use crate::domain::Channel;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmState {
    pub is_active: bool,
    pub critical_sensors: Vec<Channel>,
    pub started_at: Option<u64>,
    pub last_notified_at: u64,
}

impl AlarmState {
    /// whole seconds since the alarm started; 0 when inactive
    pub fn alarm_duration(&self, now: u64) -> u64 {
        match (self.is_active, self.started_at) {
            (true, Some(started_at)) => now.saturating_sub(started_at) / 1000,
            _ => 0,
        }
    }

    pub fn display(&self, now: u64) -> AlarmDisplay {
        AlarmDisplay {
            is_active: self.is_active,
            critical_sensors: self.critical_sensors.clone(),
            alarm_duration: self.alarm_duration(now),
        }
    }
}

/// what the dashboard renders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmDisplay {
    pub is_active: bool,
    pub critical_sensors: Vec<Channel>,
    pub alarm_duration: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    /// no channel is critical any more
    Recovered,
    /// an operator silenced it
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// nothing changed
    None,
    Raised,
    /// still active; critical set refreshed
    Updated,
    Reasserted,
    Cleared(ClearReason),
}

/// shortest re-assertion period the machine will schedule
const MIN_REASSERT_INTERVAL: Duration = Duration::from_secs(1);

pub struct AlarmMachine {
    state: AlarmState,
    reassert_interval_ms: u64,
    next_wake_at: Option<u64>,
}

impl AlarmMachine {
    pub fn new(reassert_interval: Duration) -> Self {
        Self {
            state: AlarmState::default(),
            reassert_interval_ms: reassert_interval.max(MIN_REASSERT_INTERVAL).as_millis() as u64,
            next_wake_at: None,
        }
    }

    pub fn state(&self) -> &AlarmState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    /// when the next re-assertion is due; None while inactive
    pub fn next_wake_at(&self) -> Option<u64> {
        self.next_wake_at
    }

    pub fn is_due(&self, now: u64) -> bool {
        self.next_wake_at.is_some_and(|at| now >= at)
    }

    /// feed the critical set from a fresh evaluation
    pub fn observe(&mut self, critical: &[Channel], now: u64) -> Transition {
        match (self.state.is_active, critical.is_empty()) {
            (false, true) => Transition::None,
            (false, false) => {
                self.state = AlarmState {
                    is_active: true,
                    critical_sensors: critical.to_vec(),
                    started_at: Some(now),
                    last_notified_at: now,
                };
                self.next_wake_at = Some(now + self.reassert_interval_ms);
                Transition::Raised
            }
            (true, false) => {
                self.state.critical_sensors = critical.to_vec();
                Transition::Updated
            }
            (true, true) => {
                self.reset();
                Transition::Cleared(ClearReason::Recovered)
            }
        }
    }

    /// the periodic wake-up; `critical` is re-derived by the caller
    pub fn tick(&mut self, critical: &[Channel], now: u64) -> Transition {
        if !self.is_due(now) {
            return Transition::None;
        }

        if critical.is_empty() {
            self.reset();
            return Transition::Cleared(ClearReason::Recovered);
        }

        self.state.critical_sensors = critical.to_vec();
        self.state.last_notified_at = now;
        self.next_wake_at = Some(now + self.reassert_interval_ms);
        Transition::Reasserted
    }

    /// force the exit path; the next critical evaluation raises a new alarm
    pub fn dismiss(&mut self) -> Transition {
        if !self.state.is_active {
            return Transition::None;
        }
        self.reset();
        Transition::Cleared(ClearReason::Dismissed)
    }

    fn reset(&mut self) {
        self.state = AlarmState::default();
        self.next_wake_at = None;
    }
}
