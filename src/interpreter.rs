//! SMS command interpreter.
//!
//! Authorizes the sender, strips the passkey, tokenizes the remainder
//! against the configured name->identifier table and classifies each
//! token into a device action. Unauthorized or passkey-less messages
//! are rejected silently: no reply ever goes back to an
//! unauthenticated sender.

use crate::config::{normalize, Config};
use crate::error::BridgeError;
use crate::report::InboundMessage;

/// Closed multilingual synonym sets. Extending a list is enough to
/// teach the interpreter a new word; the control flow never changes.
const ON_WORDS: &[&str] = &["allumer", "on", "light", "lightup", "1", "power"];
const OFF_WORDS: &[&str] = &["eteindre", "off", "lightoff", "cutoff", "0"];
const TOGGLE_WORDS: &[&str] = &[
    "toggle", "togle", "change", "changer", "basculer", "invert", "switch", "inverser",
];

const RESTART_TOKEN: &str = "restart";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchCommand {
    On,
    Off,
    Toggle,
}

impl SwitchCommand {
    /// Map a normalized trailing token to a switch command, if it is a
    /// known synonym.
    pub fn classify(token: &str) -> Option<Self> {
        if ON_WORDS.contains(&token) {
            Some(Self::On)
        } else if OFF_WORDS.contains(&token) {
            Some(Self::Off)
        } else if TOGGLE_WORDS.contains(&token) {
            Some(Self::Toggle)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "On",
            Self::Off => "Off",
            Self::Toggle => "Toggle",
        }
    }
}

/// One classified command token. The friendly name rides along for the
/// reply text; `idx` is the control-surface identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceAction {
    SetSwitch {
        name: String,
        idx: String,
        command: SwitchCommand,
    },
    /// The level is forwarded as the raw token: anything that is not a
    /// switch synonym goes to the control surface unvalidated, and a
    /// downstream rejection becomes part of the reply.
    SetLevel {
        name: String,
        idx: String,
        level: String,
    },
    Query {
        idx: String,
    },
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Interpretation {
    /// In processing order: segment by segment, table order within one.
    pub actions: Vec<DeviceAction>,
    /// The literal restart token appeared in some segment.
    pub wants_restart: bool,
}

/// Interpret one inbound message against the configuration.
///
/// Errors (`UnauthorizedSender`, `PasskeyMismatch`) mean "log and stay
/// silent"; only an `Ok` interpretation produces a reply.
pub fn interpret(msg: &InboundMessage, cfg: &Config) -> Result<Interpretation, BridgeError> {
    if !cfg.authorized_phones.iter().any(|p| p == &msg.sender) {
        return Err(BridgeError::UnauthorizedSender(msg.sender.clone()));
    }

    let condensed = normalize(&msg.body);
    if !condensed.contains(&cfg.passkey) {
        return Err(BridgeError::PasskeyMismatch);
    }

    // Everything after the first passkey occurrence, one segment per line.
    let remainder = condensed
        .splitn(2, &cfg.passkey)
        .nth(1)
        .unwrap_or("")
        .to_string();

    let mut out = Interpretation::default();
    for segment in remainder.split('\n') {
        for (name, idx) in &cfg.devices {
            if !segment.contains(name.as_str()) {
                continue;
            }
            let trailing = segment.splitn(2, name.as_str()).nth(1).unwrap_or("");
            let action = if trailing.is_empty() {
                DeviceAction::Query { idx: idx.clone() }
            } else if let Some(command) = SwitchCommand::classify(trailing) {
                DeviceAction::SetSwitch {
                    name: name.clone(),
                    idx: idx.clone(),
                    command,
                }
            } else {
                DeviceAction::SetLevel {
                    name: name.clone(),
                    idx: idx.clone(),
                    level: trailing.to_string(),
                }
            };
            out.actions.push(action);
            // no early exit: every matching name fires
        }
        if segment.contains(RESTART_TOKEN) {
            out.wants_restart = true;
        }
    }
    Ok(out)
}
