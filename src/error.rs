//! Error taxonomy for the bridge core.
//!
//! Every tick-local failure is caught at the tick boundary and logged;
//! nothing here is allowed to take the heartbeat loop down. The fatal
//! variants (`ConfigWriteFailed`, `Security`) only abort startup.

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("backing config rewrite failed: {0}")]
    ConfigWriteFailed(String),

    /// SIM refused the unlock. Never auto-retried: repeated attempts
    /// risk locking the card.
    #[error("SIM security error: {0}")]
    Security(String),

    #[error("modem channel open failed: {0}")]
    ChannelOpenFailed(String),

    #[error("modem channel I/O error: {0}")]
    ChannelIo(#[from] std::io::Error),

    #[error("malformed modem report: {0}")]
    MalformedReport(String),

    #[error("control surface unreachable: {0}")]
    ControlSurfaceUnreachable(String),

    #[error("sender not authorized: {0}")]
    UnauthorizedSender(String),

    #[error("passkey missing from message body")]
    PasskeyMismatch,

    #[error("modem worker still running after {0} polls")]
    ProcessStuck(u32),
}
