//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `host.toml`.
//!     loads configuration from file or falls back to defaults.
//!     watches the file so threshold and alert edits apply without a restart.
//!
//! structure:
//!     - TransportConfig: MQTT broker and the topic the device publishes on.
//!     - ThresholdSet: warning/critical bounds per channel (domain.rs).
//!     - AlertsConfig: notification / sound / vibration / persistence toggles.
//!     - TimingConfig: re-assertion interval and notification cooldowns.
//!     - ServerConfig, PushConfig, HardwareConfig, LoggingConfig.
//!
//! ==============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;

use crate::domain::{AlertSettings, ThresholdSet};
use crate::runtime::MonitorHandle;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct HostConfig {
    pub transport: TransportConfig,
    #[serde(default)]
    pub thresholds: ThresholdSet,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub push: Option<PushConfig>,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    #[serde(default = "enabled")]
    pub notifications_enabled: bool,
    #[serde(default = "enabled")]
    pub sound_enabled: bool,
    #[serde(default = "enabled")]
    pub vibration_enabled: bool,
    #[serde(default = "enabled")]
    pub persistent_notifications_enabled: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    #[serde(default = "default_reassert")]
    pub reassert_interval_secs: u64,
    #[serde(default = "default_critical_cooldown")]
    pub critical_cooldown_secs: u64,
    #[serde(default = "default_warning_cooldown")]
    pub warning_cooldown_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// optional webhook that receives every notification as json
#[derive(Debug, Deserialize, Clone)]
pub struct PushConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HardwareConfig {
    pub buzzer_pin: u8,
    pub vibration_pin: u8,
    /// sainsmart relays trigger on LOW
    #[serde(default = "enabled")]
    pub active_low: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub show_sensor_data: bool,
}

fn enabled() -> bool {
    true
}

fn default_keep_alive() -> u64 {
    60
}

fn default_reassert() -> u64 {
    30
}

fn default_critical_cooldown() -> u64 {
    10
}

fn default_warning_cooldown() -> u64 {
    30 * 60
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            sound_enabled: true,
            vibration_enabled: true,
            persistent_notifications_enabled: true,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reassert_interval_secs: default_reassert(),
            critical_cooldown_secs: default_critical_cooldown(),
            warning_cooldown_secs: default_warning_cooldown(),
        }
    }
}

impl TimingConfig {
    pub fn reassert_interval(&self) -> Duration {
        Duration::from_secs(self.reassert_interval_secs)
    }

    pub fn critical_cooldown(&self) -> Duration {
        Duration::from_secs(self.critical_cooldown_secs)
    }

    pub fn warning_cooldown(&self) -> Duration {
        Duration::from_secs(self.warning_cooldown_secs)
    }

    /// a zero interval would re-assert (or re-notify) on every loop turn
    pub fn validate(&self) -> anyhow::Result<()> {
        let fields = [
            ("reassert_interval_secs", self.reassert_interval_secs),
            ("critical_cooldown_secs", self.critical_cooldown_secs),
            ("warning_cooldown_secs", self.warning_cooldown_secs),
        ];
        for (name, value) in fields {
            if value == 0 {
                anyhow::bail!("timing.{} must be at least 1 second", name);
            }
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self { buzzer_pin: 17, vibration_pin: 27, active_low: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl HostConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: HostConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;
        config.timing.validate()?;

        Ok(config)
    }

    /// first config file that exists, in search order
    pub fn source_path() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config").join("host.toml"),
            PathBuf::from("..").join("config").join("host.toml"),
        ];
        paths.into_iter().find(|p| p.exists())
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        if let Some(path) = Self::source_path() {
            match Self::load(&path) {
                Ok(config) => {
                    println!("[CONFIG] Loaded from {}", path.display());
                    return config;
                }
                Err(e) => {
                    println!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e);
                }
            }
        }

        println!("[CONFIG] Warning: No usable config file - using defaults");
        Self::default()
    }

    /// the part of the config the monitor evaluates against
    pub fn alert_settings(&self) -> AlertSettings {
        AlertSettings {
            thresholds: self.thresholds,
            notifications_enabled: self.alerts.notifications_enabled,
            sound_enabled: self.alerts.sound_enabled,
            vibration_enabled: self.alerts.vibration_enabled,
            persistent_notifications_enabled: self.alerts.persistent_notifications_enabled,
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let t = &self.thresholds;
        println!("┌─────────────────────────────────────────┐");
        println!("│           HOST CONFIGURATION            │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Broker: {}:{}", self.transport.host, self.transport.port);
        println!("│ Topic: {}", self.transport.topic);
        println!("│ Temperature: warn >= {} / crit >= {}", t.temperature.warning, t.temperature.critical);
        println!("│ Humidity: warn < {} / crit < {}", t.humidity.warning, t.humidity.critical);
        println!("│ Gas: warn >= {} / crit >= {}", t.gas.warning, t.gas.critical);
        println!("│ Re-assert every: {}s", self.timing.reassert_interval_secs);
        println!("│ Push: {}", self.push.as_ref().map(|p| p.url.as_str()).unwrap_or("off"));
        println!("│ Dashboard: http://{}", self.server.bind);
        println!("│ Log Level: {}", self.logging.level);
        println!("├─────────────────────────────────────────┤");
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig {
                host: "broker.hivemq.com".to_string(),
                port: 1883,
                client_id: "telemetry-alarm-host".to_string(),
                topic: "iot/project/sensordata".to_string(),
                keep_alive_secs: default_keep_alive(),
                username: None,
                password: None,
            },
            thresholds: ThresholdSet::default(),
            alerts: AlertsConfig::default(),
            timing: TimingConfig::default(),
            server: ServerConfig::default(),
            push: None,
            hardware: HardwareConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ==============================================================================
// hot reload
// ==============================================================================

/// watch `path` and push new alert settings to the monitor on every save
///
/// the directory is watched rather than the file because most editors save
/// by replacing it. transport, timing and hardware changes need a restart.
pub fn watch(path: &Path, handle: MonitorHandle) -> anyhow::Result<RecommendedWatcher> {
    let file = path.to_path_buf();
    let file_name = file.file_name().map(|n| n.to_os_string());
    let dir = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("[CONFIG] watch error: {}", e);
                return;
            }
        };

        let touches_config = event.paths.iter().any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
        if !touches_config || !(event.kind.is_modify() || event.kind.is_create()) {
            return;
        }

        match HostConfig::load(&file) {
            Ok(config) => {
                for problem in config.thresholds.validate() {
                    tracing::warn!("[CONFIG] {}", problem);
                }
                match handle.update_settings_blocking(config.alert_settings()) {
                    Ok(()) => tracing::info!("[CONFIG] Reloaded alert settings from {}", file.display()),
                    Err(e) => tracing::warn!("[CONFIG] Reload dropped: {}", e),
                }
            }
            Err(e) => {
                tracing::warn!("[CONFIG] Ignoring edit of {}: {:#}", file.display(), e);
            }
        }
    })?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
