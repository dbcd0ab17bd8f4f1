//! Supervision of the single current process.
//!
//! The supervisor owns one slot. Launching into an occupied slot requests
//! termination of the old occupant first — fire and forget, the old process
//! may still be exiting while the replacement starts — then runs the
//! pre-launch cleanup actions and spawns the new process in a background
//! task so the event loop keeps servicing input throughout. A sequence
//! number decides ownership of the slot: if a newer launch started while a
//! spawn was still in flight, the stale process is terminated instead of
//! recorded ("replace, not queue").

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::actions::ActionExecutor;
use crate::config::{LaunchTarget, RawAction};
use crate::control::ProcessControl;
use crate::events::{tool_line, Event, StreamKind};
use crate::terminator;

/// How the current process was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchKind {
    Script,
    CustomCommand,
}

/// Everything needed to (re-)issue one launch.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub kind: LaunchKind,
    /// Name used for action lookup and display labeling.
    pub identifier: String,
    /// What actually gets executed.
    pub command_text: String,
}

impl LaunchRequest {
    /// Builds a request from a key-binding target.
    pub fn from_target(target: &LaunchTarget, scripts_dir: &Path) -> Self {
        match target {
            LaunchTarget::Script(file) => {
                let identifier = Path::new(file)
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.clone());
                Self {
                    kind: LaunchKind::Script,
                    identifier,
                    command_text: scripts_dir.join(file).to_string_lossy().into_owned(),
                }
            }
            LaunchTarget::Command(command) => Self::custom(command),
        }
    }

    /// Builds a request from a free-text command submission.
    pub fn custom(command: &str) -> Self {
        let trimmed = command.trim().to_string();
        Self {
            kind: LaunchKind::CustomCommand,
            identifier: trimmed.clone(),
            command_text: trimmed,
        }
    }
}

/// How a supervised process left the slot.
#[derive(Debug, Clone, Copy)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub runtime: std::time::Duration,
    pub kind: LaunchKind,
}

/// The live occupant of the supervisor's slot.
#[derive(Debug)]
pub struct SupervisedProcess {
    pub child: Child,
    pub pid: Option<u32>,
    pub kind: LaunchKind,
    pub command_text: String,
    pub started_at: Instant,
}

pub struct ProcessSupervisor {
    control: Arc<dyn ProcessControl>,
    executor: ActionExecutor,
    event_tx: mpsc::Sender<Event>,
    current: Option<SupervisedProcess>,
    last_launch: Option<LaunchRequest>,
    launch_seq: u64,
}

impl ProcessSupervisor {
    pub fn new(
        control: Arc<dyn ProcessControl>,
        executor: ActionExecutor,
        event_tx: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            control,
            executor,
            event_tx,
            current: None,
            last_launch: None,
            launch_seq: 0,
        }
    }

    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    /// Starts a launch. Any current process gets its termination request
    /// first, before the new one can ever be recorded; the cleanup actions
    /// and the spawn itself run in a background task.
    pub fn begin_launch(&mut self, request: LaunchRequest, actions: Vec<RawAction>) {
        if let Some(old) = self.current.take() {
            self.notice(&format!(
                "terminating previous process ({})",
                describe_process(&old)
            ));
            self.request_termination(old);
        }

        self.launch_seq += 1;
        let seq = self.launch_seq;
        self.last_launch = Some(request.clone());
        self.notice_raw("--------------------------------------------------");
        self.notice(&format!("launching {}", request.identifier));

        let executor = self.executor.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            executor.run(&actions).await;
            match spawn_process(request.kind, &request.command_text) {
                Ok(mut child) => {
                    let pid = child.id();
                    attach_stream_readers(&mut child, tx.clone());
                    let process = SupervisedProcess {
                        child,
                        pid,
                        kind: request.kind,
                        command_text: request.command_text,
                        started_at: Instant::now(),
                    };
                    let _ = tx.send(Event::ProcessSpawned { seq, process }).await;
                }
                Err(err) => {
                    let _ = tx
                        .send(Event::LaunchFailed {
                            seq,
                            error: err.to_string(),
                        })
                        .await;
                }
            }
        });
    }

    /// Records a spawned process as current — unless a newer launch already
    /// superseded it, in which case the latecomer is terminated.
    pub fn on_spawned(&mut self, seq: u64, process: SupervisedProcess) {
        if seq != self.launch_seq {
            self.notice(&format!(
                "superseded before startup finished ({})",
                describe_process(&process)
            ));
            self.request_termination(process);
            return;
        }
        self.notice(&format!("started {}", describe_process(&process)));
        self.current = Some(process);
    }

    /// Reports a failed spawn. Returns whether the failure belongs to the
    /// launch currently occupying the slot; a superseded launch's failure
    /// changes nothing.
    pub fn on_launch_failed(&mut self, seq: u64, error: &str) -> bool {
        if seq != self.launch_seq {
            return false;
        }
        self.notice(&format!("launch failed: {}", error));
        true
    }

    /// Requests termination of the current process and clears the slot.
    /// Returns whether there was anything to stop.
    pub fn stop(&mut self) -> bool {
        match self.current.take() {
            Some(process) => {
                self.notice(&format!("stopping {}", describe_process(&process)));
                self.request_termination(process);
                true
            }
            None => {
                self.notice("no process is running");
                false
            }
        }
    }

    /// The most recent launch request, for the repeat command.
    pub fn replay_last(&self) -> Option<LaunchRequest> {
        self.last_launch.clone()
    }

    /// Reaps the current process if it exited on its own. A report means the
    /// slot was cleared; the exit is not an error and nothing restarts
    /// automatically.
    pub fn poll_exit(&mut self) -> Option<ExitReport> {
        let (result, runtime, kind) = {
            let process = self.current.as_mut()?;
            (
                process.child.try_wait(),
                process.started_at.elapsed(),
                process.kind,
            )
        };
        match result {
            Ok(None) => None,
            Ok(Some(status)) => {
                self.current = None;
                Some(ExitReport {
                    code: status.code(),
                    runtime,
                    kind,
                })
            }
            Err(err) => {
                self.notice(&format!("lost track of process: {}", err));
                self.current = None;
                Some(ExitReport {
                    code: None,
                    runtime,
                    kind,
                })
            }
        }
    }

    /// Final teardown on dashboard exit: request termination, don't wait.
    pub fn shutdown(&mut self) {
        if let Some(process) = self.current.take() {
            self.notice(&format!("terminating {} on exit", describe_process(&process)));
            self.request_termination(process);
        }
    }

    fn request_termination(&self, process: SupervisedProcess) {
        let control = self.control.clone();
        let tx = self.event_tx.clone();
        let label = describe_process(&process);
        tokio::spawn(async move {
            let outcome = terminator::terminate_child(process.child, &control).await;
            let _ = tx
                .send(Event::Notice(tool_line(&format!(
                    "kill {}: {}",
                    label,
                    terminator::describe(outcome)
                ))))
                .await;
        });
    }

    // Notices from the event loop itself must not await the loop's own
    // channel; a full queue drops the line instead of deadlocking.
    fn notice(&self, text: &str) {
        self.notice_raw(&tool_line(text));
    }

    fn notice_raw(&self, line: &str) {
        let _ = self.event_tx.try_send(Event::Notice(line.to_string()));
    }
}

fn describe_process(process: &SupervisedProcess) -> String {
    match process.pid {
        Some(pid) => format!("{} (pid {})", process.command_text, pid),
        None => process.command_text.clone(),
    }
}

fn spawn_process(kind: LaunchKind, command_text: &str) -> Result<Child> {
    let mut command = match kind {
        LaunchKind::Script => Command::new(command_text),
        LaunchKind::CustomCommand => {
            let mut parts = shell_words::split(command_text)
                .with_context(|| format!("failed to parse command {}", command_text))?;
            if parts.is_empty() {
                return Err(anyhow!("empty command"));
            }
            let program = parts.remove(0);
            let mut command = Command::new(program);
            command.args(parts);
            command
        }
    };
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command.kill_on_drop(true);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            let _ = libc::setpgid(0, 0);
            Ok(())
        });
    }

    command
        .spawn()
        .with_context(|| format!("failed to spawn {}", command_text))
}

fn attach_stream_readers(child: &mut Child, tx: mpsc::Sender<Event>) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(read_stream(StreamKind::Stdout, stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(read_stream(StreamKind::Stderr, stderr, tx));
    }
}

async fn read_stream<R>(stream: StreamKind, reader: R, tx: mpsc::Sender<Event>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let _ = tx.send(Event::ProcessOutput { line, stream }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::platform_control;
    use std::time::Duration;

    #[test]
    fn script_requests_use_the_file_stem_as_identifier() {
        let request = LaunchRequest::from_target(
            &LaunchTarget::Script("build.sh".to_string()),
            Path::new("./scripts"),
        );
        assert_eq!(request.kind, LaunchKind::Script);
        assert_eq!(request.identifier, "build");
        assert!(request.command_text.ends_with("build.sh"));
    }

    #[test]
    fn custom_requests_trim_and_self_identify() {
        let request = LaunchRequest::custom("  npm run dev  ");
        assert_eq!(request.kind, LaunchKind::CustomCommand);
        assert_eq!(request.identifier, "npm run dev");
        assert_eq!(request.command_text, "npm run dev");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn replacement_terminates_the_old_process_before_recording_the_new() {
        let (tx, mut rx) = mpsc::channel(256);
        let control = platform_control();
        let executor = ActionExecutor::new(control.clone(), tx.clone());
        let mut supervisor = ProcessSupervisor::new(control, executor, tx);

        supervisor.begin_launch(LaunchRequest::custom("sleep 30"), Vec::new());
        let first = wait_for_spawn(&mut rx).await;
        supervisor.on_spawned(first.0, first.1);
        assert!(supervisor.has_current());

        // Second launch: the termination notice for the old process must be
        // observed before the new process is ever spawned.
        supervisor.begin_launch(LaunchRequest::custom("sleep 30"), Vec::new());
        let mut saw_termination_request = false;
        let (seq, process) = loop {
            match recv(&mut rx).await {
                Event::Notice(line) if line.contains("terminating previous process") => {
                    saw_termination_request = true;
                }
                Event::ProcessSpawned { seq, process } => {
                    assert!(
                        saw_termination_request,
                        "spawn arrived before the old process was asked to stop"
                    );
                    break (seq, process);
                }
                _ => {}
            }
        };
        supervisor.on_spawned(seq, process);
        assert!(supervisor.has_current());
        supervisor.shutdown();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stale_spawn_is_superseded_not_recorded() {
        let (tx, mut rx) = mpsc::channel(256);
        let control = platform_control();
        let executor = ActionExecutor::new(control.clone(), tx.clone());
        let mut supervisor = ProcessSupervisor::new(control, executor, tx);

        supervisor.begin_launch(LaunchRequest::custom("sleep 30"), Vec::new());
        let stale = wait_for_spawn(&mut rx).await;
        // A newer launch begins before the first spawn is recorded.
        supervisor.begin_launch(LaunchRequest::custom("sleep 30"), Vec::new());
        supervisor.on_spawned(stale.0, stale.1);
        assert!(!supervisor.has_current());

        let fresh = wait_for_spawn(&mut rx).await;
        supervisor.on_spawned(fresh.0, fresh.1);
        assert!(supervisor.has_current());
        supervisor.shutdown();
    }

    #[cfg(unix)]
    async fn wait_for_spawn(rx: &mut mpsc::Receiver<Event>) -> (u64, SupervisedProcess) {
        loop {
            if let Event::ProcessSpawned { seq, process } = recv(rx).await {
                return (seq, process);
            }
        }
    }

    #[cfg(unix)]
    async fn recv(rx: &mut mpsc::Receiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }
}
