//! Parsers for the modem subsystem's text reports.
//!
//! The formats are fixed-layout and position-based; that brittleness is
//! contained here. A short or garbled block fails with
//! `MalformedReport` instead of out-of-range access, so the rest of the
//! system never observes partial records.

use crate::error::BridgeError;

const JAMMING_MARKER: &str = "+SJDR:";
const ATTACHMENT_LABEL: &str = "GPRS                 : ";
const EMPTY_INBOX_MARKER: &str = "0 SMS parts in 0 SMS sequences";
const MESSAGE_DELIMITER: &str = "Location";
const SENT_LABEL: &str = "Sent                 : ";
const REMOTE_LABEL: &str = "Remote number        : \"";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JammingLevel {
    None,
    Interference,
    Alert,
}

impl JammingLevel {
    /// Alert-device level: 0 none, 3 interference, 4 jamming alert.
    pub fn alert_level(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Interference => 3,
            Self::Alert => 4,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::None => "No jamming",
            Self::Interference => "Interferences detected",
            Self::Alert => "Alert jamming !",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemReport {
    Jamming(JammingLevel),
    NetworkStatus { attachment: String, raw: String },
    Error,
}

/// One SMS as enumerated by the list-all report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: String,
    pub sent: String,
    pub body: String,
}

impl InboundMessage {
    /// Human-readable summary pushed to the received-SMS status device.
    pub fn summary(&self) -> String {
        format!("{}({}):\n{}", self.sent, self.sender, self.body)
    }
}

/// Extract the jamming level from a streamed `AT+SJDR?` reply.
///
/// The reply line carries comma-separated fields; field 4 is the
/// detection status: `1` alert, `2` interference, anything else clear.
/// Alert is checked first. A reply without the marker line reads as
/// clear (the modem had nothing to say).
pub fn parse_jamming(raw: &str) -> Result<ModemReport, BridgeError> {
    for line in raw.lines() {
        let line = line.trim();
        if line.contains(JAMMING_MARKER) && line.len() > 10 {
            let field = line
                .split(',')
                .nth(4)
                .ok_or_else(|| {
                    BridgeError::MalformedReport(format!("jamming line too short: '{line}'"))
                })?
                .trim_end_matches('\r');
            if field.contains('1') {
                return Ok(ModemReport::Jamming(JammingLevel::Alert));
            }
            if field.contains('2') {
                return Ok(ModemReport::Jamming(JammingLevel::Interference));
            }
            return Ok(ModemReport::Jamming(JammingLevel::None));
        }
    }
    Ok(ModemReport::Jamming(JammingLevel::None))
}

/// Parse the network-info report. Warning/error markers short-circuit
/// to `ModemReport::Error`; otherwise the attachment status is the text
/// following the GPRS label up to the end of its line.
pub fn parse_network(raw: &str) -> Result<ModemReport, BridgeError> {
    let raw = raw.trim();
    if raw.contains("Warning") || raw.contains("Error") {
        return Ok(ModemReport::Error);
    }
    let after = raw
        .split(ATTACHMENT_LABEL)
        .nth(1)
        .ok_or_else(|| BridgeError::MalformedReport("attachment label not found".into()))?;
    let attachment = after.lines().next().unwrap_or("").trim_end_matches('\r');
    Ok(ModemReport::NetworkStatus {
        attachment: attachment.to_string(),
        raw: raw.to_string(),
    })
}

/// Split the list-all report into messages, in block order.
///
/// Each block exposes the sent timestamp at line 3, the remote number
/// at line 5 and the body at line 8; the cursor then advances past
/// line 10 to the next block. A report stating an empty inbox yields an
/// empty vec; a truncated block aborts with `MalformedReport`.
pub fn parse_messages(raw: &str) -> Result<Vec<InboundMessage>, BridgeError> {
    if raw.contains(EMPTY_INBOX_MARKER) {
        return Ok(Vec::new());
    }
    let mut messages = Vec::new();
    let mut rest = raw.trim().to_string();
    while rest.contains(MESSAGE_DELIMITER) {
        let lines: Vec<&str> = rest.split('\n').collect();
        if lines.len() < 9 {
            return Err(BridgeError::MalformedReport(format!(
                "message block truncated ({} lines)",
                lines.len()
            )));
        }
        let sent = lines[3]
            .split(SENT_LABEL)
            .nth(1)
            .ok_or_else(|| BridgeError::MalformedReport("sent timestamp missing".into()))?
            .split(" +")
            .next()
            .unwrap_or("")
            .trim_end_matches('\r');
        let sender = lines[5]
            .split(REMOTE_LABEL)
            .nth(1)
            .and_then(|s| s.split('"').next())
            .ok_or_else(|| BridgeError::MalformedReport("remote number missing".into()))?;
        let body = lines[8].trim_end_matches('\r');
        messages.push(InboundMessage {
            sender: sender.to_string(),
            sent: sent.to_string(),
            body: body.to_string(),
        });
        rest = if lines.len() > 10 {
            lines[10..].join("\n")
        } else {
            String::new()
        };
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jamming_alert_takes_precedence() {
        let raw = "AT+SJDR?\n+SJDR: 1,0,255,0,1\r\nOK\n";
        assert_eq!(
            parse_jamming(raw).unwrap(),
            ModemReport::Jamming(JammingLevel::Alert)
        );
    }

    #[test]
    fn jamming_interference() {
        let raw = "+SJDR: 1,0,255,0,2\r\n";
        assert_eq!(
            parse_jamming(raw).unwrap(),
            ModemReport::Jamming(JammingLevel::Interference)
        );
    }

    #[test]
    fn jamming_clear_on_other_digit_or_no_marker() {
        assert_eq!(
            parse_jamming("+SJDR: 1,0,255,0,0\r\n").unwrap(),
            ModemReport::Jamming(JammingLevel::None)
        );
        assert_eq!(
            parse_jamming("OK\n").unwrap(),
            ModemReport::Jamming(JammingLevel::None)
        );
    }

    #[test]
    fn jamming_short_line_is_malformed() {
        let raw = "+SJDR: 1,0,255\n";
        assert!(matches!(
            parse_jamming(raw),
            Err(BridgeError::MalformedReport(_))
        ));
    }

    const NETWORK_OK: &str = "Network state        : home network\n\
Network              : 208 01 (Orange F), LAC 4E6F, CID 0C66\n\
GPRS                 : attached\n\
Packet network state : home network\n";

    #[test]
    fn network_extracts_attachment() {
        match parse_network(NETWORK_OK).unwrap() {
            ModemReport::NetworkStatus { attachment, raw } => {
                assert_eq!(attachment, "attached");
                assert!(raw.contains("Orange F"));
            }
            other => panic!("unexpected report: {other:?}"),
        }
    }

    #[test]
    fn network_warning_is_error_report() {
        assert_eq!(
            parse_network("Warning: something odd\n").unwrap(),
            ModemReport::Error
        );
        assert_eq!(
            parse_network("Error opening device\n").unwrap(),
            ModemReport::Error
        );
    }

    #[test]
    fn network_without_label_is_malformed() {
        assert!(matches!(
            parse_network("Network state        : home network\n"),
            Err(BridgeError::MalformedReport(_))
        ));
    }

    fn block(n: u32, sender: &str, body: &str) -> String {
        format!(
            "Location {n}, folder \"Inbox\", SIM memory, Inbox folder\n\
SMS message\n\
SMSC number          : \"+33609001390\"\n\
Sent                 : Mon 01 Jun 2020 10:2{n}:00  +0200\n\
Coding               : Default GSM alphabet\n\
Remote number        : \"{sender}\"\n\
Status               : Read\n\
\n\
{body}\n\
\n\
"
        )
    }

    #[test]
    fn empty_inbox_marker_yields_no_messages() {
        let raw = "0 SMS parts in 0 SMS sequences";
        assert!(parse_messages(raw).unwrap().is_empty());
    }

    #[test]
    fn two_blocks_parse_in_order() {
        let raw = format!(
            "{}{}2 SMS parts in 2 SMS sequences",
            block(1, "+33601020304", "cmd livingfan on"),
            block(2, "+44601020304", "cmd bedroomlight")
        );
        let msgs = parse_messages(&raw).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].sender, "+33601020304");
        assert_eq!(msgs[0].body, "cmd livingfan on");
        assert_eq!(msgs[0].sent, "Mon 01 Jun 2020 10:21:00 ");
        assert_eq!(msgs[1].sender, "+44601020304");
        assert_eq!(msgs[1].body, "cmd bedroomlight");
    }

    #[test]
    fn truncated_block_is_malformed() {
        let raw = "Location 1, folder \"Inbox\"\nSMS message\nSMSC number : x\n";
        assert!(matches!(
            parse_messages(raw),
            Err(BridgeError::MalformedReport(_))
        ));
    }

    #[test]
    fn summary_formats_like_the_status_device() {
        let msg = InboundMessage {
            sender: "+33601020304".into(),
            sent: "Mon 01 Jun 2020 10:21:00".into(),
            body: "cmd livingfan on".into(),
        };
        assert_eq!(
            msg.summary(),
            "Mon 01 Jun 2020 10:21:00(+33601020304):\ncmd livingfan on"
        );
    }
}
