//! GSM Bridge Agent - SMS remote control and watchdog for a
//! home-automation server.
//!
//! Startup sequence: load config, rewrite the modem daemon's backing
//! config (backup first), unlock the SIM, arm jamming detection,
//! validate with a network check, then run the heartbeat loop and the
//! notifier listener.

use anyhow::{Context, Result};
use gsm_bridge_agent::config::{Config, ConfigFile};
use gsm_bridge_agent::controller::DeviceController;
use gsm_bridge_agent::gateway::{ModemGateway, SerialLink};
use gsm_bridge_agent::http;
use gsm_bridge_agent::notify::NotificationRouter;
use gsm_bridge_agent::scheduler::HeartbeatScheduler;
use gsm_bridge_agent::surface::{HttpDeviceSink, ScriptSmsOutbox, SystemProcessControl};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("GSM_BRIDGE_CONFIG").ok())
        .unwrap_or_else(|| "gsm-bridge.toml".to_string())
        .into()
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let file = ConfigFile::read(&path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;

    // logging first: normalization below warns about bad config entries
    tracing_subscriber::fmt()
        .with_max_level(if file.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    info!("GSM bridge agent starting...");
    let cfg = Config::from_file(file)?;
    cfg.dump();
    let cfg = Arc::new(cfg);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("failed to build HTTP client")?;

    let outbox = Arc::new(ScriptSmsOutbox::new(cfg.send_sms_script.clone()));
    let devices = Arc::new(HttpDeviceSink::new(client.clone(), &cfg.control_url));
    let controller = DeviceController::new(client, &cfg.control_url);
    let gateway = ModemGateway::new(SerialLink::new(&cfg.serial_port, cfg.baud.as_u32()));

    let notifier = Arc::new(NotificationRouter::new(
        cfg.authorized_phones.clone(),
        outbox.clone(),
    ));
    http::spawn(&cfg.notify_listen, notifier)
        .await
        .context("failed to start notifier listener")?;

    let mut scheduler = HeartbeatScheduler::new(
        cfg.clone(),
        gateway,
        controller,
        devices,
        outbox,
        Arc::new(SystemProcessControl),
    );
    scheduler.startup().await.context("startup failed")?;

    info!("heartbeat every {}s", cfg.heartbeat_secs);
    scheduler.run().await
}
