//! ==============================================================================
//! server.rs - dashboard and json api
//! ==============================================================================
//!
//! routes:
//!     GET  /                   minimal html status page
//!     GET  /api                latest reading, per-channel status, alarm, connection
//!     GET  /api/alarm          {isActive, criticalSensors, alarmDuration}
//!     GET  /api/connection     mqtt link state, uptime, last message time
//!     POST /api/alarm/dismiss  silence the alarm, returns the new alarm view
//!
//! all state comes from the MonitorHandle snapshot and the transport status
//! channel; nothing here mutates the alarm except through the handle.
//!
//! ==============================================================================

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::alarm::AlarmDisplay;
use crate::domain::{Reading, SensorStatus};
use crate::monitor::ChannelReport;
use crate::runtime::MonitorHandle;
use crate::transport::TransportStatus;

/// shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub monitor: MonitorHandle,
    pub transport: watch::Receiver<TransportStatus>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionView {
    #[serde(flatten)]
    pub status: TransportStatus,
    pub uptime: u64,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub reading: Option<Reading>,
    pub channels: Vec<ChannelReport>,
    pub alarm: AlarmDisplay,
    pub connection: ConnectionView,
}

impl AppState {
    fn connection(&self) -> ConnectionView {
        let status = *self.transport.borrow();
        ConnectionView { status, uptime: status.uptime(self.monitor.clock().now_ms()) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api", get(api_handler))
        .route("/api/alarm", get(alarm_handler))
        .route("/api/alarm/dismiss", post(dismiss_handler))
        .route("/api/connection", get(connection_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("[SERVER] dashboard live at http://{}", bind);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn api_handler(State(state): State<AppState>) -> Json<ApiResponse> {
    let snapshot = state.monitor.snapshot();
    Json(ApiResponse {
        reading: snapshot.reading,
        channels: snapshot.channels,
        alarm: state.monitor.display(),
        connection: state.connection(),
    })
}

async fn alarm_handler(State(state): State<AppState>) -> Json<AlarmDisplay> {
    Json(state.monitor.display())
}

async fn connection_handler(State(state): State<AppState>) -> Json<ConnectionView> {
    Json(state.connection())
}

async fn dismiss_handler(
    State(state): State<AppState>,
) -> Result<Json<AlarmDisplay>, (StatusCode, String)> {
    match state.monitor.dismiss().await {
        Ok(display) => Ok(Json(display)),
        Err(e) => Err((StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
    }
}

async fn dashboard_handler(State(state): State<AppState>) -> Html<String> {
    let snapshot = state.monitor.snapshot();
    let alarm = state.monitor.display();
    let connection = state.connection();

    let rows: String = snapshot
        .channels
        .iter()
        .map(|c| {
            let color = match c.status {
                SensorStatus::Normal => "#4caf50",
                SensorStatus::Warning => "#ff9800",
                SensorStatus::Critical => "#f44336",
            };
            format!(
                r#"<tr><td>{}</td><td>{}</td><td style="color: {};">{:?}</td></tr>"#,
                c.channel.label(),
                html_escape(&c.channel.format_value(c.value)),
                color,
                c.status
            )
        })
        .collect();

    let banner = if alarm.is_active {
        let names: Vec<&str> = alarm.critical_sensors.iter().map(|c| c.label()).collect();
        format!(
            r#"<div style="background: #f44336; padding: 1rem; border-radius: 8px;">
    <h2>🚨 CRITICAL ALARM ACTIVE ({}s)</h2>
    <p>{}</p>
    <form method="post" action="/api/alarm/dismiss"><button>Dismiss</button></form>
</div>"#,
            alarm.alarm_duration,
            html_escape(&names.join(", "))
        )
    } else {
        r#"<div style="background: #2e7d32; padding: 1rem; border-radius: 8px;">All sensors normal</div>"#.to_string()
    };

    Html(format!(
        r#"<!doctype html>
<html>
<head><title>telemetry alarm</title><meta http-equiv="refresh" content="2"></head>
<body style="font-family: system-ui; padding: 2rem; background: #1a1a2e; color: #eee;">
<p>MQTT: {:?} (up {}s)</p>
{}
<table style="margin-top: 1rem;">{}</table>
</body>
</html>"#,
        connection.status.state, connection.uptime, banner, rows
    ))
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::TimingConfig;
    use crate::domain::{AlertSettings, RawReading};
    use crate::hal::recording::RecordingProvider;
    use crate::monitor::Monitor;
    use crate::transport::{status_channel, ConnectionState};

    const T: u64 = 1_700_000_000_000;

    fn start() -> (Arc<ManualClock>, watch::Sender<TransportStatus>, AppState) {
        let clock = Arc::new(ManualClock::new(T));
        let monitor = Monitor::new(
            AlertSettings::default(),
            &TimingConfig::default(),
            Arc::new(RecordingProvider::default()),
            clock.clone(),
        );
        let (status_tx, transport) = status_channel();
        let monitor = crate::runtime::spawn(monitor).0;
        (clock, status_tx, AppState { monitor, transport })
    }

    #[tokio::test]
    async fn alarm_endpoint_serializes_camel_case() {
        let (_clock, _status, state) = start();
        let Json(display) = alarm_handler(State(state)).await;
        let json = serde_json::to_value(display).unwrap();
        assert_eq!(json, serde_json::json!({"isActive": false, "criticalSensors": [], "alarmDuration": 0}));
    }

    #[tokio::test]
    async fn dismiss_endpoint_clears() {
        let (_clock, _status, state) = start();
        state.monitor.submit(RawReading { temperature: 55.0, humidity: 65.0, gas: 0.0 }).await.unwrap();

        let Json(display) = dismiss_handler(State(state.clone())).await.unwrap();
        assert!(!display.is_active);

        let Json(api) = api_handler(State(state)).await;
        assert_eq!(api.channels.len(), 3);
        assert!(!api.alarm.is_active);
    }

    #[tokio::test]
    async fn connection_state_is_exposed() {
        let (clock, status, state) = start();

        let Json(view) = connection_handler(State(state.clone())).await;
        assert_eq!(view.status.state, ConnectionState::Disconnected);
        assert_eq!(view.uptime, 0);

        status.send_modify(|s| {
            s.state = ConnectionState::Connected;
            s.connected_since = Some(T);
            s.last_message_at = Some(T + 1_000);
        });
        clock.advance_secs(42);

        let Json(api) = api_handler(State(state)).await;
        let json = serde_json::to_value(&api.connection).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "state": "connected",
                "connectedSince": T,
                "lastMessageAt": T + 1_000,
                "uptime": 42
            })
        );
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(html_escape(r#"<b a="1">&"#), "&lt;b a=&quot;1&quot;&gt;&amp;");
    }
}
