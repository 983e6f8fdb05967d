//! GSM bridge agent library.
//!
//! Bridges a home-automation server to a GSM modem: SMS-based remote
//! control, priority notifications over SMS, and a heartbeat watchdog
//! covering jamming detection, network attachment and modem-worker
//! liveness. The binary in `main.rs` wires the production
//! collaborators together; everything behavioural lives here so tests
//! can drive it with fakes.

pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod http;
pub mod interpreter;
pub mod notify;
pub mod rcfile;
pub mod report;
pub mod scheduler;
pub mod surface;
