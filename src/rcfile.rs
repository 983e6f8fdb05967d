//! Backing modem-daemon config file rewrite.
//!
//! The file is plain `key = value` text. Exactly two keys are touched:
//! the connection/baud parameter and the port parameter. Each rewrite
//! replaces everything between the key's label and the next line break,
//! after copying the file to a timestamped backup. The backup is the
//! recovery path if post-startup validation fails.

use crate::config::BaudRate;
use crate::error::BridgeError;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONNECTION_LABEL: &str = "connection = ";
const PORT_LABEL: &str = "port = ";

/// Replace the value following `label` (up to the next `\n`) with
/// `value`. Returns `None` when the label is absent.
fn replace_value(text: &str, label: &str, value: &str) -> Option<String> {
    let start = text.find(label)? + label.len();
    let end = text[start..]
        .find('\n')
        .map(|i| start + i)
        .unwrap_or(text.len());
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..start]);
    out.push_str(value);
    out.push_str(&text[end..]);
    Some(out)
}

/// Rewrite the connection and port keys in place. The backup copy is
/// taken before any modification; its path is returned so the caller
/// can later restore or discard it.
pub async fn rewrite(path: &Path, baud: BaudRate, port: &str) -> Result<PathBuf, BridgeError> {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let backup = PathBuf::from(format!("{}.bak.{stamp}", path.display()));
    tokio::fs::copy(path, &backup)
        .await
        .map_err(|e| BridgeError::ConfigWriteFailed(format!("backup failed: {e}")))?;
    debug!("backing config backed up to {}", backup.display());

    let mut text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BridgeError::ConfigWriteFailed(format!("read failed: {e}")))?;

    for (label, value) in [
        (CONNECTION_LABEL, baud.rc_token()),
        (PORT_LABEL, port.to_string()),
    ] {
        text = replace_value(&text, label, &value).ok_or_else(|| {
            BridgeError::ConfigWriteFailed(format!("label '{}' not found", label.trim_end()))
        })?;
    }

    tokio::fs::write(path, text)
        .await
        .map_err(|e| BridgeError::ConfigWriteFailed(format!("write failed: {e}")))?;
    info!("backing config rewritten ({})", path.display());
    Ok(backup)
}

/// Put the pre-rewrite content back. Used when validation after a
/// rewrite shows the modem daemon unhappy with the new values.
pub async fn restore(path: &Path, backup: &Path) -> Result<(), BridgeError> {
    tokio::fs::copy(backup, path)
        .await
        .map_err(|e| BridgeError::ConfigWriteFailed(format!("restore failed: {e}")))?;
    info!("backing config restored from {}", backup.display());
    Ok(())
}

/// Validation passed, the backup is no longer needed.
pub async fn discard_backup(backup: &Path) {
    if let Err(e) = tokio::fs::remove_file(backup).await {
        debug!("could not remove backup {}: {e}", backup.display());
    }
}
