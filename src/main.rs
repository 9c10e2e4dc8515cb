//! ==============================================================================
//! main.rs - telemetry alarm host entry point
//! ==============================================================================
//!
//! responsibilities:
//!     - load host.toml and set up logging
//!     - build the alert provider (mock or rppal, by feature)
//!     - start the monitor task, the config watcher and the dashboard
//!     - run the mqtt subscriber until ctrl-c
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                     rust host (this file)                    │
//!     │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//!     │  │ mqtt client │  │ web server  │  │ host.toml watcher   │  │
//!     │  │ (readings)  │  │ (port 3000) │  │ (notify)            │  │
//!     │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘  │
//!     │         └────────────────┼────────────────────┘             │
//!     │                    ┌─────┴─────┐                            │
//!     │                    │  monitor  │ <- runtime.rs              │
//!     │                    └─────┬─────┘                            │
//!     └──────────────────────────┼──────────────────────────────────┘
//!                                │ AlertProvider
//!                    ┌───────────┴───────────┐
//!                    ▼                       ▼
//!             ┌─────────────┐         ┌─────────────┐
//!             │ buzzer /    │         │ webhook     │
//!             │ vibration   │         │ push        │
//!             └─────────────┘         └─────────────┘
//!
//! ==============================================================================

use std::sync::Arc;

use anyhow::Result;

use telemetry_alarm_host::clock::SystemClock;
use telemetry_alarm_host::config::{self, HostConfig};
use telemetry_alarm_host::hal::{AlertProvider, Hal};
use telemetry_alarm_host::monitor::Monitor;
use telemetry_alarm_host::{runtime, server, transport};

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Telemetry Alarm Host");
    println!("  temperature / humidity / gas");
    println!("===========================================================");

    // step 1: load configuration
    let config = HostConfig::load_or_default();
    config.print_summary();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let app_name = env!("CARGO_PKG_NAME").replace('-', "_");
            let level = config.logging.level.as_str();

            format!("{app_name}={level},tower_http={level}").into()
        }))
        .init();

    for problem in config.thresholds.validate() {
        tracing::warn!("[CONFIG] {}", problem);
    }

    // step 2: the monitor and its alert provider
    let provider: Arc<dyn AlertProvider> = Arc::new(Hal::new(&config));
    let monitor = Monitor::new(config.alert_settings(), &config.timing, provider, Arc::new(SystemClock));
    let (handle, monitor_task) = runtime::spawn(monitor);
    println!("[STARTUP] ✓ Monitor running");

    // step 3: hot reload of thresholds and alert flags
    let _watcher = match HostConfig::source_path() {
        Some(path) => match config::watch(&path, handle.clone()) {
            Ok(watcher) => {
                println!("[STARTUP] ✓ Watching {} for changes", path.display());
                Some(watcher)
            }
            Err(e) => {
                tracing::warn!("[CONFIG] hot reload disabled: {:#}", e);
                None
            }
        },
        None => None,
    };

    // step 4: the dashboard in background
    let (status_tx, status_rx) = transport::status_channel();
    let bind = config.server.bind.clone();
    let web_state = server::AppState { monitor: handle.clone(), transport: status_rx };
    tokio::spawn(async move {
        if let Err(e) = server::run(&bind, web_state).await {
            tracing::error!("[SERVER] web server error: {:#}", e);
        }
    });

    // step 5: mqtt until ctrl-c
    println!("\n[RUNTIME] Subscribing to {}", config.transport.topic);
    println!("────────────────────────────────────────────────────────────");

    tokio::select! {
        result = transport::run(config.transport.clone(), config.logging.clone(), handle.clone(), status_tx) => {
            if let Err(e) = result {
                tracing::error!("[MQTT] subscriber stopped: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n[SHUTDOWN] ctrl-c received");
        }
    }

    // silence the siren before exiting
    handle.shutdown().await.ok();
    monitor_task.await?;
    Ok(())
}
