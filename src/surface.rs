//! External collaborator seams.
//!
//! The host automation server is only reached through these traits:
//! a device-state sink, an outbound SMS sink and a process-lifecycle
//! control. Production impls live here; tests swap in the in-memory
//! fakes from [`testing`].

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use sysinfo::System;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// The four status channels this core writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKey {
    GsmInfo,
    ReceivedSms,
    NetStat,
    Jamming,
}

impl DeviceKey {
    /// Control-surface unit index of the status device.
    pub fn unit(self) -> u32 {
        match self {
            Self::GsmInfo => 1,
            Self::ReceivedSms => 2,
            Self::NetStat => 3,
            Self::Jamming => 4,
        }
    }
}

/// Device-state sink: `(value, numeric level)` updates keyed by device.
#[async_trait]
pub trait DeviceSink: Send + Sync {
    async fn update(&self, key: DeviceKey, value: &str, level: i32);
}

/// Outbound SMS sink. Fire-and-forget: no delivery receipt is tracked.
#[async_trait]
pub trait SmsOutbox: Send + Sync {
    async fn send(&self, phone: &str, subject: &str, body: &str);
}

/// Process-lifecycle collaborator for the modem worker. The core only
/// decides *when* to call these, never how they are implemented.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    async fn worker_present(&self, name: &str) -> bool;
    /// Stop signal plus a 2 second grace wait.
    async fn stop_workers(&self, name: &str);
}

/// Pushes status updates through the control surface's `udevice` call.
pub struct HttpDeviceSink {
    client: reqwest::Client,
    base: String,
}

impl HttpDeviceSink {
    pub fn new(client: reqwest::Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DeviceSink for HttpDeviceSink {
    async fn update(&self, key: DeviceKey, value: &str, level: i32) {
        let url = format!("{}/json.htm", self.base);
        let unit = key.unit().to_string();
        let nvalue = level.to_string();
        let result = self
            .client
            .get(&url)
            .query(&[
                ("type", "command"),
                ("param", "udevice"),
                ("idx", unit.as_str()),
                ("nvalue", nvalue.as_str()),
                ("svalue", value),
            ])
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => debug!("{key:?} updated"),
            Ok(resp) => warn!("{key:?} update rejected: {}", resp.status()),
            Err(e) => warn!("{key:?} update failed: {e}"),
        }
    }
}

/// Sends SMS through the host's helper script, detached.
pub struct ScriptSmsOutbox {
    script: PathBuf,
}

impl ScriptSmsOutbox {
    pub fn new(script: PathBuf) -> Self {
        Self { script }
    }
}

#[async_trait]
impl SmsOutbox for ScriptSmsOutbox {
    async fn send(&self, phone: &str, subject: &str, body: &str) {
        info!("SMS to {phone}: {subject}");
        match Command::new(&self.script)
            .arg(phone)
            .arg(subject)
            .arg(body)
            .spawn()
        {
            // detached: the child outlives this call
            Ok(_child) => {}
            Err(e) => warn!("send script {} failed: {e}", self.script.display()),
        }
    }
}

/// Process table via sysinfo, stop via `killall`.
pub struct SystemProcessControl;

#[async_trait]
impl ProcessControl for SystemProcessControl {
    async fn worker_present(&self, name: &str) -> bool {
        let mut sys = System::new();
        sys.refresh_processes();
        sys.processes().values().any(|p| p.name() == name)
    }

    async fn stop_workers(&self, name: &str) {
        info!("stopping {name} workers");
        match Command::new("killall").arg(name).output().await {
            Ok(out) if !out.status.success() => {
                debug!("killall {name}: {}", String::from_utf8_lossy(&out.stderr).trim())
            }
            Ok(_) => {}
            Err(e) => warn!("killall {name} failed: {e}"),
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}

pub mod testing {
    //! In-memory fakes recording every call, for scheduler and router
    //! tests.

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingSink {
        pub updates: Mutex<Vec<(DeviceKey, String, i32)>>,
    }

    #[async_trait]
    impl DeviceSink for RecordingSink {
        async fn update(&self, key: DeviceKey, value: &str, level: i32) {
            self.updates
                .lock()
                .unwrap()
                .push((key, value.to_string(), level));
        }
    }

    #[derive(Default)]
    pub struct RecordingOutbox {
        pub sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl SmsOutbox for RecordingOutbox {
        async fn send(&self, phone: &str, subject: &str, body: &str) {
            self.sent
                .lock()
                .unwrap()
                .push((phone.to_string(), subject.to_string(), body.to_string()));
        }
    }

    /// Scripted process table: pops one answer per poll, repeating the
    /// last one once the script runs out.
    pub struct ScriptedProcesses {
        pub present: Mutex<Vec<bool>>,
        pub stops: Mutex<u32>,
    }

    impl ScriptedProcesses {
        pub fn new(present: Vec<bool>) -> Self {
            Self {
                present: Mutex::new(present),
                stops: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ProcessControl for ScriptedProcesses {
        async fn worker_present(&self, _name: &str) -> bool {
            let mut script = self.present.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script.first().copied().unwrap_or(false)
            }
        }

        async fn stop_workers(&self, _name: &str) {
            *self.stops.lock().unwrap() += 1;
        }
    }
}
