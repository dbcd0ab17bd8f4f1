//! Declarative cleanup actions and their executor.
//!
//! Configuration describes cleanup as an ordered list of actions: release the
//! processes holding certain TCP/UDP ports, or kill processes by PID or by
//! invocation pattern. Execution is strictly ordered and best effort — a
//! failed or unrecognized action is reported and the rest of the list still
//! runs, since cleanup before a launch is advisory by nature.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::RawAction;
use crate::control::ProcessControl;
use crate::events::{tool_line, Event};
use crate::ports::{self, PortProto};
use crate::terminator;

/// The closed set of supported actions, decoded from raw config entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionDescriptor {
    ReleaseTcpPorts(Vec<String>),
    ReleaseUdpPorts(Vec<String>),
    KillProcess(Vec<String>),
}

impl ActionDescriptor {
    /// Decodes a raw config action; an unknown kind is a reportable error,
    /// not a silent mismatch.
    pub fn decode(raw: &RawAction) -> Result<Self, String> {
        match raw.action.as_str() {
            "closeTCPPorts" => Ok(Self::ReleaseTcpPorts(raw.parameters.clone())),
            "closeUDPPorts" => Ok(Self::ReleaseUdpPorts(raw.parameters.clone())),
            "killProcess" => Ok(Self::KillProcess(raw.parameters.clone())),
            other => Err(format!("unknown action kind \"{}\"", other)),
        }
    }
}

/// Runs action lists, reporting every outcome to the output pane.
#[derive(Clone)]
pub struct ActionExecutor {
    control: Arc<dyn ProcessControl>,
    event_tx: mpsc::Sender<Event>,
}

impl ActionExecutor {
    pub fn new(control: Arc<dyn ProcessControl>, event_tx: mpsc::Sender<Event>) -> Self {
        Self { control, event_tx }
    }

    /// Executes `actions` in order. Unrecognized kinds and per-target
    /// failures are reported and skipped; the list never aborts early.
    pub async fn run(&self, actions: &[RawAction]) {
        for raw in actions {
            match ActionDescriptor::decode(raw) {
                Err(message) => self.notice(&format!("skipping action: {}", message)).await,
                Ok(ActionDescriptor::ReleaseTcpPorts(params)) => {
                    self.release_ports(PortProto::Tcp, &params).await;
                }
                Ok(ActionDescriptor::ReleaseUdpPorts(params)) => {
                    self.release_ports(PortProto::Udp, &params).await;
                }
                Ok(ActionDescriptor::KillProcess(params)) => {
                    self.kill_targets(&params).await;
                }
            }
        }
    }

    async fn release_ports(&self, proto: PortProto, params: &[String]) {
        for raw_port in params {
            let Some(port) = coerce_port(raw_port) else {
                self.notice(&format!(
                    "skipping {} port \"{}\": not a port number",
                    proto.label(),
                    raw_port
                ))
                .await;
                continue;
            };
            match ports::pids_on_port(proto, port).await {
                Err(err) => {
                    self.notice(&format!(
                        "cannot inspect {} port {}: {}",
                        proto.label(),
                        port,
                        err
                    ))
                    .await;
                }
                Ok(pids) if pids.is_empty() => {
                    self.notice(&format!("no process on {} port {}", proto.label(), port))
                        .await;
                }
                Ok(pids) => {
                    for pid in pids {
                        self.kill_one(pid, &format!("{} port {}", proto.label(), port))
                            .await;
                    }
                }
            }
        }
    }

    async fn kill_targets(&self, params: &[String]) {
        for target in params {
            let target = target.trim();
            if let Ok(pid) = target.parse::<u32>() {
                self.kill_one(pid, &format!("pid {}", pid)).await;
                continue;
            }
            let pids = self.control.find_by_pattern(target);
            if pids.is_empty() {
                self.notice(&format!("no process matching \"{}\"", target))
                    .await;
                continue;
            }
            for pid in pids {
                self.kill_one(pid, &format!("\"{}\"", target)).await;
            }
        }
    }

    async fn kill_one(&self, pid: u32, what: &str) {
        if pid == self.control.own_pid() {
            self.notice(&format!("skipped {} (pid {}): own process", what, pid))
                .await;
            return;
        }
        let outcome = terminator::kill_pid(&self.control, pid).await;
        self.notice(&format!(
            "kill {} (pid {}): {}",
            what,
            pid,
            terminator::describe(outcome)
        ))
        .await;
    }

    async fn notice(&self, text: &str) {
        let _ = self.event_tx.send(Event::Notice(tool_line(text))).await;
    }
}

/// Coerces an action parameter to a port number.
fn coerce_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|port| *port > 0)
}
