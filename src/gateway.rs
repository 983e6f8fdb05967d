//! Modem gateway: issues commands to the modem subsystem and collects
//! its raw text reports.
//!
//! The channel is an exclusive resource with an open/use/close
//! lifecycle per operation; it is never held across a heartbeat tick.
//! Serialized ticks make a lock unnecessary.

use crate::error::BridgeError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, trace};

/// Abstract line-oriented channel to the modem subsystem.
///
/// `read_line` returns `None` once an idle read yields nothing: that is
/// the end-of-report condition for streamed replies.
#[async_trait]
pub trait ModemLink: Send {
    async fn open(&mut self) -> Result<(), BridgeError>;
    async fn write_line(&mut self, command: &str) -> Result<(), BridgeError>;
    async fn read_line(&mut self) -> Result<Option<String>, BridgeError>;
    async fn close(&mut self);
}

/// Production link over a serial UART.
pub struct SerialLink {
    port: String,
    baud: u32,
    read_timeout: Duration,
    stream: Option<tokio_serial::SerialStream>,
}

impl SerialLink {
    pub fn new(port: &str, baud: u32) -> Self {
        Self {
            port: port.to_string(),
            baud,
            read_timeout: Duration::from_secs(1),
            stream: None,
        }
    }
}

#[async_trait]
impl ModemLink for SerialLink {
    async fn open(&mut self) -> Result<(), BridgeError> {
        let stream = tokio_serial::new(&self.port, self.baud)
            .open_native_async()
            .map_err(|e| BridgeError::ChannelOpenFailed(format!("{}: {e}", self.port)))?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn write_line(&mut self, command: &str) -> Result<(), BridgeError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| BridgeError::ChannelOpenFailed("channel not open".into()))?;
        trace!("-> {command}");
        stream.write_all(format!("{command}\r").as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Option<String>, BridgeError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| BridgeError::ChannelOpenFailed("channel not open".into()))?;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match tokio::time::timeout(self.read_timeout, stream.read(&mut byte)).await {
                // idle: nothing arrived within the window
                Err(_) => {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Ok(Ok(0)) => {
                    if line.is_empty() {
                        return Ok(None);
                    }
                    break;
                }
                Ok(Ok(_)) => {
                    if byte[0] == b'\n' {
                        break;
                    }
                    line.push(byte[0]);
                }
                Ok(Err(e)) => return Err(BridgeError::ChannelIo(e)),
            }
        }
        let text = String::from_utf8_lossy(&line).trim_end_matches('\r').to_string();
        trace!("<- {text}");
        Ok(Some(text))
    }

    async fn close(&mut self) {
        self.stream = None;
    }
}

/// Report categories the gateway knows how to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Jamming,
    Network,
    ListMessages,
    DeleteAll,
}

impl ReportKind {
    fn command(self) -> &'static str {
        match self {
            Self::Jamming => "AT+SJDR?",
            Self::Network => "networkinfo",
            Self::ListMessages => "getallsms",
            Self::DeleteAll => "deleteallsms 1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinStatus {
    Unlocked,
    NotRequired,
}

pub struct ModemGateway<L: ModemLink> {
    link: L,
}

impl<L: ModemLink> ModemGateway<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    /// Issue the security-unlock command. "Nothing to enter" means the
    /// SIM needed no PIN; any other non-success reply is fatal and must
    /// never be auto-retried (three failures lock the card).
    pub async fn unlock(&mut self, pin: &str) -> Result<PinStatus, BridgeError> {
        let reply = self
            .exchange(&format!("entersecuritycode PIN {pin}"))
            .await?;
        if reply.contains("Nothing to enter") {
            debug!("no PIN code required");
            return Ok(PinStatus::NotRequired);
        }
        if reply.trim().is_empty() || reply.contains("OK") {
            return Ok(PinStatus::Unlocked);
        }
        Err(BridgeError::Security(reply.trim().to_string()))
    }

    /// Fetch one raw report: open, write the query, drain lines until
    /// an idle read, close.
    pub async fn run_report(&mut self, kind: ReportKind) -> Result<String, BridgeError> {
        debug!("running {kind:?} report");
        self.exchange(kind.command()).await
    }

    /// Fire-and-forget configuration write, e.g. arming jamming
    /// detection at startup.
    pub async fn send_control_bits(&mut self, bits: &str) -> Result<(), BridgeError> {
        self.link.open().await?;
        let result = self.link.write_line(bits).await;
        self.link.close().await;
        result
    }

    async fn exchange(&mut self, command: &str) -> Result<String, BridgeError> {
        self.link.open().await?;
        let result = self.write_and_drain(command).await;
        self.link.close().await;
        result
    }

    async fn write_and_drain(&mut self, command: &str) -> Result<String, BridgeError> {
        self.link.write_line(command).await?;
        let mut report = String::new();
        while let Some(line) = self.link.read_line().await? {
            report.push_str(&line);
            report.push('\n');
        }
        Ok(report)
    }
}

pub mod testing {
    //! Scripted in-memory link for gateway and scheduler tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Inner {
        replies: Vec<(String, Vec<String>)>,
        written: Vec<String>,
        opens: usize,
        closes: usize,
        fail_open: bool,
        pending: VecDeque<String>,
    }

    /// Replies are scripted per written command; each command drains
    /// its own queue of lines, then reads go idle. Clones share state,
    /// so a test can keep a handle after moving the link into the
    /// gateway.
    #[derive(Default, Clone)]
    pub struct ScriptedLink {
        inner: Arc<Mutex<Inner>>,
    }

    impl ScriptedLink {
        pub fn reply(self, command: &str, lines: &[&str]) -> Self {
            self.inner.lock().unwrap().replies.push((
                command.to_string(),
                lines.iter().map(|s| s.to_string()).collect(),
            ));
            self
        }

        pub fn failing_open() -> Self {
            let link = Self::default();
            link.inner.lock().unwrap().fail_open = true;
            link
        }

        pub fn written(&self) -> Vec<String> {
            self.inner.lock().unwrap().written.clone()
        }

        pub fn opens(&self) -> usize {
            self.inner.lock().unwrap().opens
        }

        pub fn closes(&self) -> usize {
            self.inner.lock().unwrap().closes
        }
    }

    #[async_trait]
    impl ModemLink for ScriptedLink {
        async fn open(&mut self) -> Result<(), BridgeError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_open {
                return Err(BridgeError::ChannelOpenFailed("scripted failure".into()));
            }
            inner.opens += 1;
            Ok(())
        }

        async fn write_line(&mut self, command: &str) -> Result<(), BridgeError> {
            let mut inner = self.inner.lock().unwrap();
            inner.written.push(command.to_string());
            inner.pending = inner
                .replies
                .iter()
                .find(|(c, _)| c == command)
                .map(|(_, lines)| lines.iter().cloned().collect())
                .unwrap_or_default();
            Ok(())
        }

        async fn read_line(&mut self) -> Result<Option<String>, BridgeError> {
            Ok(self.inner.lock().unwrap().pending.pop_front())
        }

        async fn close(&mut self) {
            self.inner.lock().unwrap().closes += 1;
        }
    }
}
