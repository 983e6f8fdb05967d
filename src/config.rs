//! Bridge configuration
//!
//! Handles:
//! - TOML config file loading (path from argv or `GSM_BRIDGE_CONFIG`)
//! - Normalization of the passkey and the name->idx command table
//! - Authorized phone list (order defines notification priority)
//!
//! The runtime `Config` is built once at startup and treated as
//! read-only for the rest of the process lifetime; a restart reloads it.

use anyhow::{Context, Result};
use deunicode::deunicode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Permitted UART rates, rendered `atN` in the backing config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    B2400,
    B4800,
    B9600,
    B19200,
    B115200,
    B230400,
    B460800,
}

impl BaudRate {
    pub fn from_u32(rate: u32) -> Option<Self> {
        match rate {
            2400 => Some(Self::B2400),
            4800 => Some(Self::B4800),
            9600 => Some(Self::B9600),
            19200 => Some(Self::B19200),
            115200 => Some(Self::B115200),
            230400 => Some(Self::B230400),
            460800 => Some(Self::B460800),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::B2400 => 2400,
            Self::B4800 => 4800,
            Self::B9600 => 9600,
            Self::B19200 => 19200,
            Self::B115200 => 115200,
            Self::B230400 => 230400,
            Self::B460800 => 460800,
        }
    }

    /// Token written into the backing file, e.g. `at19200`.
    pub fn rc_token(self) -> String {
        format!("at{}", self.as_u32())
    }
}

/// Raw file shape. Comma-separated fields stay strings here and are
/// parsed into the runtime `Config` once.
#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    pub serial_port: String,
    pub baud_rate: u32,
    #[serde(default)]
    pub sim_pin: Option<String>,
    #[serde(default)]
    pub apn: Option<String>,
    pub authorized_phones: String,
    pub passkey: String,
    /// `Name:IDX,Name:IDX,...`
    #[serde(default)]
    pub commands: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub control_url: Option<String>,
    #[serde(default)]
    pub heartbeat_secs: Option<u64>,
    #[serde(default)]
    pub rc_path: Option<PathBuf>,
    #[serde(default)]
    pub worker_name: Option<String>,
    #[serde(default)]
    pub send_sms_script: Option<PathBuf>,
    #[serde(default)]
    pub notify_listen: Option<String>,
}

/// Immutable per-session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub serial_port: String,
    pub baud: BaudRate,
    pub sim_pin: Option<String>,
    /// Reserved for a future data bearer, parsed and ignored.
    pub apn: Option<String>,
    /// Unique, order-significant: first entry is the priority contact.
    pub authorized_phones: Vec<String>,
    /// Already normalized.
    pub passkey: String,
    /// Normalized friendly name -> control-surface identifier,
    /// insertion order preserved.
    pub devices: Vec<(String, String)>,
    pub debug: bool,
    pub control_url: String,
    pub heartbeat_secs: u64,
    pub rc_path: PathBuf,
    pub worker_name: String,
    pub send_sms_script: PathBuf,
    pub notify_listen: String,
}

/// Fold diacritics, drop spaces/tabs, lowercase. Newlines survive so
/// multi-command SMS bodies still split into segments.
pub fn normalize(text: &str) -> String {
    deunicode(text)
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\r'))
        .collect()
}

impl ConfigFile {
    /// Parse the raw file only. Normalization (and its warnings) happens
    /// in `Config::from_file`, once the caller has logging up.
    pub async fn read(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        Self::from_file(ConfigFile::read(path).await?)
    }

    pub fn from_file(file: ConfigFile) -> Result<Self> {
        let baud = BaudRate::from_u32(file.baud_rate)
            .with_context(|| format!("unsupported baud rate {}", file.baud_rate))?;

        let mut authorized_phones: Vec<String> = Vec::new();
        for phone in file.authorized_phones.split(',') {
            let phone = phone.trim();
            if phone.is_empty() {
                continue;
            }
            if authorized_phones.iter().any(|p| p == phone) {
                warn!("duplicate authorized phone {phone} ignored");
                continue;
            }
            authorized_phones.push(phone.to_string());
        }
        if authorized_phones.is_empty() {
            anyhow::bail!("no authorized phone numbers configured");
        }

        let mut devices = Vec::new();
        for pair in normalize(&file.commands).split(',') {
            if pair.is_empty() {
                continue;
            }
            match pair.split_once(':') {
                Some((name, idx)) if !name.is_empty() && !idx.is_empty() => {
                    devices.push((name.to_string(), idx.to_string()));
                }
                _ => warn!("ignoring malformed command pair '{pair}' (expected Name:IDX)"),
            }
        }

        let passkey = normalize(&file.passkey);
        if passkey.is_empty() {
            anyhow::bail!("passkey must not be empty");
        }

        Ok(Config {
            serial_port: file.serial_port.trim().to_string(),
            baud,
            sim_pin: file.sim_pin.filter(|p| !p.trim().is_empty()),
            apn: file.apn.filter(|a| !a.trim().is_empty()),
            authorized_phones,
            passkey,
            devices,
            debug: file.debug,
            control_url: file
                .control_url
                .unwrap_or_else(|| "http://127.0.0.1:8080".to_string()),
            heartbeat_secs: file.heartbeat_secs.unwrap_or(20),
            rc_path: file.rc_path.unwrap_or_else(|| PathBuf::from("/home/pi/.gammurc")),
            worker_name: file.worker_name.unwrap_or_else(|| "gammu".to_string()),
            send_sms_script: file
                .send_sms_script
                .unwrap_or_else(|| PathBuf::from("/home/pi/domoticz/scripts/bash/send_sms.sh")),
            notify_listen: file
                .notify_listen
                .unwrap_or_else(|| "127.0.0.1:8765".to_string()),
        })
    }

    /// Debug dump of the effective configuration (PIN redacted).
    pub fn dump(&self) {
        debug!("serial_port: {}", self.serial_port);
        debug!("baud: {}", self.baud.as_u32());
        debug!("sim_pin set: {}", self.sim_pin.is_some());
        debug!("authorized phones: {}", self.authorized_phones.join(","));
        debug!("device table: {} entries", self.devices.len());
        for (name, idx) in &self.devices {
            debug!("  {name} -> {idx}");
        }
        debug!("control_url: {}", self.control_url);
        debug!("heartbeat: {}s", self.heartbeat_secs);
        debug!("rc file: {}", self.rc_path.display());
        debug!("worker: {}", self.worker_name);
    }
}
