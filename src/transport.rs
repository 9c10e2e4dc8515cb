//! ==============================================================================
//! transport.rs - MQTT subscriber
//! ==============================================================================
//!
//! purpose:
//!     connects to the broker, subscribes to the sensor topic and forwards
//!     every decoded payload to the monitor. re-subscribes on every ConnAck
//!     so a broker restart does not silently stop the feed.
//!
//!     the connection state (connecting / connected / disconnected, when the
//!     link came up, when the last message arrived) is published on a watch
//!     channel for the dashboard.
//!
//! payload:
//!     {"temperature": 24.1, "humidity": 52.0, "gasLevel": 310}
//!
//! ==============================================================================

use std::time::Duration;

use anyhow::Result;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use tokio::sync::watch;

use crate::config::{LoggingConfig, TransportConfig};
use crate::domain::RawReading;
use crate::runtime::MonitorHandle;

/// pause before polling again after a connection error
const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportStatus {
    pub state: ConnectionState,
    /// unix ms of the last ConnAck; None while not connected
    pub connected_since: Option<u64>,
    /// unix ms of the last publish on the sensor topic
    pub last_message_at: Option<u64>,
}

impl TransportStatus {
    /// whole seconds connected; 0 when the link is down
    pub fn uptime(&self, now: u64) -> u64 {
        match (self.state, self.connected_since) {
            (ConnectionState::Connected, Some(since)) => now.saturating_sub(since) / 1000,
            _ => 0,
        }
    }

    /// fold one event loop result into the status
    pub fn observe(&mut self, event: Result<&Event, ()>, now: u64) {
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                self.state = ConnectionState::Connected;
                self.connected_since = Some(now);
            }
            Ok(Event::Incoming(Packet::Publish(_))) => {
                self.last_message_at = Some(now);
            }
            Ok(Event::Incoming(Packet::Disconnect)) | Err(()) => {
                self.state = ConnectionState::Disconnected;
                self.connected_since = None;
            }
            Ok(_) => {}
        }
    }

    fn connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.connected_since = None;
    }
}

pub fn status_channel() -> (watch::Sender<TransportStatus>, watch::Receiver<TransportStatus>) {
    watch::channel(TransportStatus::default())
}

pub fn options(config: &TransportConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }
    options
}

/// poll the broker forever; returns only when the monitor has stopped
pub async fn run(
    config: TransportConfig,
    logging: LoggingConfig,
    handle: MonitorHandle,
    status: watch::Sender<TransportStatus>,
) -> Result<()> {
    let clock = handle.clock();
    let (client, mut event_loop) = AsyncClient::new(options(&config), 10);
    tracing::info!("[MQTT] connecting to {}:{} as {}", config.host, config.port, config.client_id);
    status.send_modify(|s| s.connecting());

    loop {
        let event = event_loop.poll().await;
        let now = clock.now_ms();
        status.send_modify(|s| s.observe(event.as_ref().map_err(|_| ()), now));

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("[MQTT] connected, subscribing to {}", config.topic);
                if let Err(e) = client.try_subscribe(&config.topic, QoS::AtMostOnce) {
                    tracing::error!("[MQTT] subscribe failed: {}", e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some(reading) = decode(&publish.payload, logging.show_sensor_data) else {
                    continue;
                };
                if handle.submit(reading).await.is_err() {
                    tracing::info!("[MQTT] monitor stopped, disconnecting");
                    let _ = client.try_disconnect();
                    status.send_modify(|s| s.observe(Err(()), now));
                    return Ok(());
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!("[MQTT] connection error: {}", e);
                tokio::time::sleep(RETRY_DELAY).await;
                status.send_modify(|s| s.connecting());
            }
        }
    }
}

/// a payload that is not a json object is logged and skipped
fn decode(payload: &[u8], show: bool) -> Option<RawReading> {
    match RawReading::from_payload(payload) {
        Ok(reading) => {
            if show {
                tracing::info!(
                    "[SENSOR] temperature={:.1} humidity={:.1} gas={:.0}",
                    reading.temperature,
                    reading.humidity,
                    reading.gas
                );
            }
            Some(reading)
        }
        Err(e) => {
            tracing::warn!("[MQTT] dropping payload: {} ({})", e, String::from_utf8_lossy(payload));
            None
        }
    }
}
