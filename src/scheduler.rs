//! Heartbeat scheduler: the fixed-interval watchdog loop.
//!
//! Each tick first supervises the modem worker process (a stuck worker
//! forces a full restart of the startup sequence), then drains the
//! modem: jamming check, network check, SMS inbox. Ticks run to
//! completion inside the loop body, so they never overlap and the modem
//! channel needs no lock. Every tick-local failure is caught here,
//! logged, and the schedule continues.

use crate::config::Config;
use crate::controller::DeviceController;
use crate::error::BridgeError;
use crate::gateway::{ModemGateway, ModemLink, PinStatus, ReportKind};
use crate::interpreter;
use crate::report::{self, InboundMessage, ModemReport};
use crate::rcfile;
use crate::surface::{DeviceKey, DeviceSink, ProcessControl, SmsOutbox};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Worker-process polls per tick before declaring the worker stuck.
const SUPERVISE_POLLS: u32 = 17;
const SUPERVISE_PAUSE: Duration = Duration::from_secs(1);
/// Configuration write arming the modem's jamming detection.
const ARM_JAMMING: &str = "AT+SJDR=1,0,255";

/// Tick phases, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Drained,
    Restarted,
}

pub struct HeartbeatScheduler<L: ModemLink> {
    cfg: Arc<Config>,
    gateway: ModemGateway<L>,
    controller: DeviceController,
    devices: Arc<dyn DeviceSink>,
    outbox: Arc<dyn SmsOutbox>,
    process: Arc<dyn ProcessControl>,
}

impl<L: ModemLink> HeartbeatScheduler<L> {
    pub fn new(
        cfg: Arc<Config>,
        gateway: ModemGateway<L>,
        controller: DeviceController,
        devices: Arc<dyn DeviceSink>,
        outbox: Arc<dyn SmsOutbox>,
        process: Arc<dyn ProcessControl>,
    ) -> Self {
        Self {
            cfg,
            gateway,
            controller,
            devices,
            outbox,
            process,
        }
    }

    /// Full startup sequence: rewrite the backing config (backup
    /// first), unlock the SIM, arm jamming detection, then validate
    /// with a network check. Validation failure restores the previous
    /// backing config and aborts with `ConfigWriteFailed`.
    pub async fn startup(&mut self) -> Result<(), BridgeError> {
        let backup =
            rcfile::rewrite(&self.cfg.rc_path, self.cfg.baud, &self.cfg.serial_port).await?;

        if let Some(pin) = self.cfg.sim_pin.clone() {
            match self.gateway.unlock(&pin).await? {
                PinStatus::NotRequired => info!("no PIN code required"),
                PinStatus::Unlocked => info!("SIM unlocked"),
            }
        }

        if let Err(e) = self.gateway.send_control_bits(ARM_JAMMING).await {
            warn!("could not arm jamming detection: {e}");
        }

        match self.network_report().await {
            Some(ModemReport::NetworkStatus { raw, .. }) => {
                rcfile::discard_backup(&backup).await;
                self.devices.update(DeviceKey::GsmInfo, &raw, 0).await;
                info!("startup complete, modem attached");
                Ok(())
            }
            _ => {
                warn!("network validation failed, reverting backing config");
                rcfile::restore(&self.cfg.rc_path, &backup).await?;
                Err(BridgeError::ConfigWriteFailed(
                    "network validation failed after rewrite".into(),
                ))
            }
        }
    }

    /// Run the heartbeat forever. The interval must exceed worst-case
    /// tick duration; delayed ticks are absorbed, never stacked.
    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = interval(Duration::from_secs(self.cfg.heartbeat_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.tick().await {
                Ok(outcome) => debug!("tick finished: {outcome:?}"),
                Err(e) => error!("tick failed: {e:#}"),
            }
        }
    }

    /// One full tick: Supervising, then Draining or Restarting.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        debug!("tick: supervising");
        if let Err(e) = self.supervise().await {
            warn!("{e}, restarting");
            self.restart().await?;
            return Ok(TickOutcome::Restarted);
        }
        debug!("tick: draining");
        self.drain().await;
        Ok(TickOutcome::Drained)
    }

    /// Poll the process table for the modem worker, early-exiting the
    /// first poll where it is absent. A bounded, cancellable wait, not
    /// a busy spin.
    async fn supervise(&self) -> Result<(), BridgeError> {
        for attempt in 0..SUPERVISE_POLLS {
            if !self.process.worker_present(&self.cfg.worker_name).await {
                return Ok(());
            }
            if attempt + 1 < SUPERVISE_POLLS {
                sleep(SUPERVISE_PAUSE).await;
            }
        }
        Err(BridgeError::ProcessStuck(SUPERVISE_POLLS))
    }

    /// Tear the worker down and re-run the startup sequence. Any state
    /// fetched earlier in the tick is discarded.
    async fn restart(&mut self) -> Result<()> {
        self.process.stop_workers(&self.cfg.worker_name).await;
        self.startup().await?;
        Ok(())
    }

    /// Jamming check, network check, SMS drain. A failure in one
    /// report category never aborts the others.
    async fn drain(&mut self) {
        match self.gateway.run_report(ReportKind::Jamming).await {
            Ok(raw) => match report::parse_jamming(&raw) {
                Ok(ModemReport::Jamming(level)) => {
                    self.devices
                        .update(DeviceKey::Jamming, level.text(), level.alert_level())
                        .await
                }
                Ok(other) => warn!("unexpected jamming report: {other:?}"),
                Err(e) => warn!("jamming report unreadable: {e}"),
            },
            Err(e) => warn!("jamming check skipped: {e}"),
        }

        match self.network_report().await {
            Some(ModemReport::NetworkStatus { attachment, raw }) => {
                self.devices.update(DeviceKey::GsmInfo, &raw, 0).await;
                self.devices.update(DeviceKey::NetStat, &attachment, 0).await;
            }
            Some(_) => {
                self.devices
                    .update(DeviceKey::GsmInfo, "Error with Gammu", 0)
                    .await
            }
            None => {}
        }

        match self.gateway.run_report(ReportKind::ListMessages).await {
            Ok(raw) => self.drain_inbox(&raw).await,
            Err(e) => warn!("message check skipped: {e}"),
        }
    }

    async fn network_report(&mut self) -> Option<ModemReport> {
        let raw = match self.gateway.run_report(ReportKind::Network).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("network check skipped: {e}");
                return None;
            }
        };
        match report::parse_network(&raw) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("network report unreadable: {e}");
                None
            }
        }
    }

    /// Process every listed message, then issue exactly one delete-all
    /// whenever the inbox was non-empty -- even when parsing aborted or
    /// a reply failed. A reply-delivery failure therefore drops the
    /// source message; see DESIGN.md.
    async fn drain_inbox(&mut self, raw: &str) {
        if raw.trim().is_empty() || raw.contains("0 SMS parts in 0 SMS sequences") {
            debug!("no messages received");
            return;
        }
        match report::parse_messages(raw) {
            Ok(messages) => {
                for message in &messages {
                    self.handle_message(message).await;
                }
                info!("{} messages processed", messages.len());
            }
            Err(e) => warn!("message drain aborted: {e}"),
        }
        match self.gateway.run_report(ReportKind::DeleteAll).await {
            Ok(out) => debug!("inbox cleared: {}", out.trim()),
            Err(e) => warn!("delete-all failed: {e}"),
        }
    }

    async fn handle_message(&mut self, message: &InboundMessage) {
        let summary = message.summary();
        self.devices
            .update(DeviceKey::ReceivedSms, &summary, 0)
            .await;
        info!("{summary}");

        let interpretation = match interpreter::interpret(message, &self.cfg) {
            Ok(interpretation) => interpretation,
            Err(BridgeError::UnauthorizedSender(sender)) => {
                info!("command received but {sender} is not registered; authorized phones:");
                for phone in &self.cfg.authorized_phones {
                    debug!("  {phone}");
                }
                return;
            }
            Err(e) => {
                debug!("message from {} ignored: {e}", message.sender);
                return;
            }
        };

        info!("proceeding with command from {}", message.sender);
        let mut answer = String::new();
        for action in &interpretation.actions {
            answer.push_str(&self.controller.apply(action).await);
        }

        if interpretation.wants_restart {
            info!("system will reboot shortly");
            self.outbox.send(&message.sender, "Reboot now", "").await;
            sleep(Duration::from_secs(1)).await;
            self.controller.system_reboot().await;
        }

        if !answer.is_empty() {
            info!("{answer}");
            self.outbox
                .send(&message.sender, "Command reply", &answer)
                .await;
        }
    }
}
