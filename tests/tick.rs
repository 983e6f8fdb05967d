//! End-to-end heartbeat tick: scripted modem link, fake collaborator
//! sinks and a recording control-surface stub.

use axum::extract::RawQuery;
use axum::routing::get;
use axum::Router;
use gsm_bridge_agent::config::{Config, ConfigFile};
use gsm_bridge_agent::controller::DeviceController;
use gsm_bridge_agent::gateway::testing::ScriptedLink;
use gsm_bridge_agent::gateway::ModemGateway;
use gsm_bridge_agent::scheduler::{HeartbeatScheduler, TickOutcome};
use gsm_bridge_agent::surface::testing::{RecordingOutbox, RecordingSink, ScriptedProcesses};
use gsm_bridge_agent::surface::DeviceKey;
use std::sync::{Arc, Mutex};

fn config() -> Arc<Config> {
    Arc::new(
        Config::from_file(ConfigFile {
            serial_port: "/dev/ttyUSB0".into(),
            baud_rate: 115200,
            sim_pin: None,
            apn: None,
            authorized_phones: "+33601020304,+44601020304".into(),
            passkey: "cmd".into(),
            commands: "living fan:12,bedroom light:14".into(),
            debug: false,
            control_url: None,
            heartbeat_secs: None,
            rc_path: None,
            worker_name: None,
            send_sms_script: None,
            notify_listen: None,
        })
        .unwrap(),
    )
}

/// Minimal control surface answering 200 to everything and recording
/// each query string.
async fn spawn_control_surface() -> (String, Arc<Mutex<Vec<String>>>) {
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let recorder = seen.clone();
    let app = Router::new().route(
        "/json.htm",
        get(move |RawQuery(q): RawQuery| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().unwrap().push(q.unwrap_or_default());
                "{\"status\":\"OK\"}"
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

/// One inbox block in the list-all report layout.
fn inbox_block(sender: &str, body: &str) -> Vec<String> {
    vec![
        "Location 1, folder \"Inbox\", SIM memory, Inbox folder".to_string(),
        "SMS message".to_string(),
        "SMSC number          : \"+33609001390\"".to_string(),
        "Sent                 : Mon 01 Jun 2020 10:21:00  +0200".to_string(),
        "Coding               : Default GSM alphabet".to_string(),
        format!("Remote number        : \"{sender}\""),
        "Status               : Read".to_string(),
        String::new(),
        body.to_string(),
        String::new(),
        "1 SMS parts in 1 SMS sequences".to_string(),
    ]
}

#[tokio::test]
async fn healthy_tick_drains_and_replies() {
    let (base, surface_calls) = spawn_control_surface().await;

    let inbox = inbox_block("+33601020304", "cmd living fan toggle");
    let inbox_lines: Vec<&str> = inbox.iter().map(String::as_str).collect();
    let link = ScriptedLink::default()
        .reply("AT+SJDR?", &["+SJDR: 1,0,255,0,0", "OK"])
        .reply(
            "networkinfo",
            &[
                "Network state        : home network",
                "GPRS                 : attached",
            ],
        )
        .reply("getallsms", &inbox_lines)
        .reply("deleteallsms 1", &["OK"]);
    let handle = link.clone();

    let devices = Arc::new(RecordingSink::default());
    let outbox = Arc::new(RecordingOutbox::default());
    let process = Arc::new(ScriptedProcesses::new(vec![false]));

    let mut scheduler = HeartbeatScheduler::new(
        config(),
        ModemGateway::new(link),
        DeviceController::new(reqwest::Client::new(), &base),
        devices.clone(),
        outbox.clone(),
        process.clone(),
    );

    assert_eq!(scheduler.tick().await.unwrap(), TickOutcome::Drained);

    // one jamming update, clear
    let updates = devices.updates.lock().unwrap();
    let jamming: Vec<_> = updates
        .iter()
        .filter(|(k, _, _)| *k == DeviceKey::Jamming)
        .collect();
    assert_eq!(jamming.len(), 1);
    assert_eq!(jamming[0].1, "No jamming");
    assert_eq!(jamming[0].2, 0);

    // one network update pair: raw info + attachment
    assert_eq!(
        updates
            .iter()
            .filter(|(k, _, _)| *k == DeviceKey::GsmInfo)
            .count(),
        1
    );
    assert!(updates
        .iter()
        .any(|(k, v, _)| *k == DeviceKey::NetStat && v == "attached"));

    // the received-SMS device carries the message summary
    assert!(updates
        .iter()
        .any(|(k, v, _)| *k == DeviceKey::ReceivedSms && v.contains("cmd living fan toggle")));

    // exactly one control-surface toggle call
    let calls = surface_calls.lock().unwrap();
    let toggles: Vec<_> = calls
        .iter()
        .filter(|q| q.contains("param=switchlight"))
        .collect();
    assert_eq!(toggles.len(), 1);
    assert!(toggles[0].contains("idx=12"));
    assert!(toggles[0].contains("switchcmd=Toggle"));

    // one reply SMS carrying the success fragment, to the sender
    let sent = outbox.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "+33601020304");
    assert_eq!(sent[0].1, "Command reply");
    assert_eq!(sent[0].2, "Ok, device livingfan(IDX: 12) was set to Toggle");

    // exactly one delete-all, after the drain
    let written = handle.written();
    assert_eq!(
        written.iter().filter(|c| c.as_str() == "deleteallsms 1").count(),
        1
    );
    assert_eq!(written.last().map(String::as_str), Some("deleteallsms 1"));

    // worker was never restarted
    assert_eq!(*process.stops.lock().unwrap(), 0);
}

#[tokio::test]
async fn restart_command_reboots_through_the_control_surface() {
    let (base, surface_calls) = spawn_control_surface().await;

    let inbox = inbox_block("+33601020304", "cmd restart");
    let inbox_lines: Vec<&str> = inbox.iter().map(String::as_str).collect();
    let link = ScriptedLink::default()
        .reply("AT+SJDR?", &[])
        .reply("networkinfo", &["GPRS                 : attached"])
        .reply("getallsms", &inbox_lines)
        .reply("deleteallsms 1", &["OK"]);
    let handle = link.clone();

    let outbox = Arc::new(RecordingOutbox::default());
    let mut scheduler = HeartbeatScheduler::new(
        config(),
        ModemGateway::new(link),
        DeviceController::new(reqwest::Client::new(), &base),
        Arc::new(RecordingSink::default()),
        outbox.clone(),
        Arc::new(ScriptedProcesses::new(vec![false])),
    );

    scheduler.tick().await.unwrap();

    // confirmation SMS to the sender, then the reboot call
    let sent = outbox.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "+33601020304");
    assert_eq!(sent[0].1, "Reboot now");
    assert!(surface_calls
        .lock()
        .unwrap()
        .iter()
        .any(|q| q.contains("param=system_reboot")));

    // inbox still cleared afterwards
    assert_eq!(handle.written().last().map(String::as_str), Some("deleteallsms 1"));
}

#[tokio::test]
async fn unauthorized_message_stays_silent_but_inbox_clears() {
    let (base, surface_calls) = spawn_control_surface().await;

    let inbox = inbox_block("+10000000000", "cmd living fan on");
    let inbox_lines: Vec<&str> = inbox.iter().map(String::as_str).collect();
    let link = ScriptedLink::default()
        .reply("AT+SJDR?", &[])
        .reply("networkinfo", &["GPRS                 : attached"])
        .reply("getallsms", &inbox_lines)
        .reply("deleteallsms 1", &["OK"]);
    let handle = link.clone();

    let devices = Arc::new(RecordingSink::default());
    let outbox = Arc::new(RecordingOutbox::default());
    let mut scheduler = HeartbeatScheduler::new(
        config(),
        ModemGateway::new(link),
        DeviceController::new(reqwest::Client::new(), &base),
        devices.clone(),
        outbox.clone(),
        Arc::new(ScriptedProcesses::new(vec![false])),
    );

    scheduler.tick().await.unwrap();

    // no reply, no control call, but the message was still consumed
    assert!(outbox.sent.lock().unwrap().is_empty());
    assert!(surface_calls
        .lock()
        .unwrap()
        .iter()
        .all(|q| !q.contains("param=switchlight")));
    assert_eq!(
        handle
            .written()
            .iter()
            .filter(|c| c.as_str() == "deleteallsms 1")
            .count(),
        1
    );
}
