//! Device controller: turns classified actions into control-surface
//! HTTP calls and human-readable reply fragments.
//!
//! Nothing here retries. A non-200 status or a transport failure is
//! rendered verbatim into the SMS reply; the operator retries by
//! resending the message.

use crate::error::BridgeError;
use crate::interpreter::DeviceAction;
use serde::Deserialize;
use tracing::{debug, info};

/// `result[0]` of the device query response.
#[derive(Debug, Deserialize)]
pub struct DeviceStatus {
    #[serde(rename = "Name")]
    pub name: String,
    pub idx: String,
    #[serde(rename = "Data")]
    pub data: String,
    #[serde(rename = "LastUpdate")]
    pub last_update: String,
}

#[derive(Debug, Deserialize)]
struct DeviceQueryReply {
    result: Vec<DeviceStatus>,
}

pub struct DeviceController {
    client: reqwest::Client,
    base: String,
}

impl DeviceController {
    pub fn new(client: reqwest::Client, base: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Apply one action and return its reply fragment.
    pub async fn apply(&self, action: &DeviceAction) -> String {
        match action {
            DeviceAction::SetSwitch { name, idx, command } => {
                self.switch(name, idx, command.as_str()).await
            }
            DeviceAction::SetLevel { name, idx, level } => {
                // the raw token goes through unvalidated; the control
                // surface is the judge of what a level means
                let command = format!("Set%20Level&level={level}");
                self.switch(name, idx, &command).await
            }
            DeviceAction::Query { idx } => self.query(idx).await,
        }
    }

    async fn switch(&self, name: &str, idx: &str, command: &str) -> String {
        let url = format!(
            "{}/json.htm?type=command&param=switchlight&idx={idx}&switchcmd={command}",
            self.base
        );
        debug!("control call: {url}");
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().as_u16() == 200 => {
                format!("Ok, device {name}(IDX: {idx}) was set to {command}")
            }
            Ok(resp) => {
                let code = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                format!("Problem with command ! code {code}: {body}")
            }
            Err(e) => {
                let err = BridgeError::ControlSurfaceUnreachable(e.to_string());
                format!("Problem with command ! {err}")
            }
        }
    }

    async fn query(&self, idx: &str) -> String {
        let url = format!("{}/json.htm?type=devices&rid={idx}", self.base);
        debug!("status query: {url}");
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().as_u16() == 200 => {
                let body = resp.text().await.unwrap_or_default();
                match serde_json::from_str::<DeviceQueryReply>(&body)
                    .ok()
                    .and_then(|r| r.result.into_iter().next())
                {
                    Some(status) => format!(
                        "Device {} (IDX:{}) is {} (last updated on {})",
                        status.name, status.idx, status.data, status.last_update
                    ),
                    None => format!("Problem with command ! unexpected response: {body}"),
                }
            }
            Ok(resp) => {
                let code = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                format!("Problem with command ! code {code}: {body}")
            }
            Err(e) => {
                let err = BridgeError::ControlSurfaceUnreachable(e.to_string());
                format!("Problem with command ! {err}")
            }
        }
    }

    /// Ask the host server to reboot the system.
    pub async fn system_reboot(&self) {
        let url = format!("{}/json.htm?type=command&param=system_reboot", self.base);
        match self.client.get(&url).send().await {
            Ok(resp) => info!("system reboot requested ({})", resp.status()),
            Err(e) => info!("system reboot request failed: {e}"),
        }
    }
}
