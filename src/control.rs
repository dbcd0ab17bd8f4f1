//! Platform process capabilities: discovery and signal delivery.
//!
//! The dashboard needs two things from the operating system: find live
//! processes matching a textual target, and deliver graceful/forceful
//! termination signals. Both differ per platform family, so they sit behind
//! the [`ProcessControl`] trait with one implementation selected at startup.
//!
//! Discovery is deliberately asymmetric. POSIX systems expose each process's
//! full argument vector, which is matched as a case-insensitive substring;
//! Windows process listing only exposes the executable name, so only the base
//! name is matched there. The dashboard's own PID is excluded from results.

use std::sync::Arc;

/// Why a signal could not be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// The target no longer exists.
    AlreadyGone,
    /// The caller lacks the privilege to signal the target.
    PermissionDenied,
    /// Delivery failed for another reason.
    Other,
}

/// OS capabilities the supervisor, executor, and terminator rely on.
pub trait ProcessControl: Send + Sync {
    /// PID of the dashboard itself. Never a valid target.
    fn own_pid(&self) -> u32;

    /// Live PIDs whose invocation matches `pattern`, own PID excluded.
    fn find_by_pattern(&self, pattern: &str) -> Vec<u32>;

    /// Whether the PID still refers to a live process.
    fn is_alive(&self, pid: u32) -> bool;

    /// Asks the target to exit voluntarily.
    fn signal_graceful(&self, pid: u32) -> Result<(), SignalError>;

    /// Forces the target down.
    fn signal_forceful(&self, pid: u32) -> Result<(), SignalError>;
}

/// Selects the control implementation for the running platform.
pub fn platform_control() -> Arc<dyn ProcessControl> {
    #[cfg(unix)]
    {
        Arc::new(PosixControl)
    }
    #[cfg(windows)]
    {
        Arc::new(WindowsControl)
    }
}

/// Case-insensitive substring match over a joined argument vector.
/// An empty invocation means the process table entry was unreadable and is
/// skipped rather than treated as a match.
fn invocation_matches(invocation: &str, needle_lower: &str) -> bool {
    !invocation.is_empty() && invocation.to_lowercase().contains(needle_lower)
}

/// Case-insensitive executable base-name comparison, `.exe` stripped from
/// both sides.
fn exe_name_matches(process_name: &str, target: &str) -> bool {
    strip_exe(process_name).eq_ignore_ascii_case(strip_exe(target))
}

fn strip_exe(name: &str) -> &str {
    if name.len() >= 4 && name[name.len() - 4..].eq_ignore_ascii_case(".exe") {
        &name[..name.len() - 4]
    } else {
        name
    }
}

#[cfg(unix)]
pub struct PosixControl;

#[cfg(unix)]
impl ProcessControl for PosixControl {
    fn own_pid(&self) -> u32 {
        std::process::id()
    }

    fn find_by_pattern(&self, pattern: &str) -> Vec<u32> {
        use sysinfo::{ProcessesToUpdate, System};

        let needle = pattern.to_lowercase();
        let own = self.own_pid();
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);

        let mut pids: Vec<u32> = sys
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let invocation = process
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                invocation_matches(&invocation, &needle).then(|| pid.as_u32())
            })
            .filter(|pid| *pid != own)
            .collect();
        pids.sort_unstable();
        pids
    }

    fn is_alive(&self, pid: u32) -> bool {
        // Signal 0 probes existence without delivering anything; EPERM still
        // means the process exists.
        let rc = unsafe { libc::kill(pid as i32, 0) };
        if rc == 0 {
            return true;
        }
        matches!(
            std::io::Error::last_os_error().raw_os_error(),
            Some(libc::EPERM)
        )
    }

    fn signal_graceful(&self, pid: u32) -> Result<(), SignalError> {
        send_signal(pid, libc::SIGTERM)
    }

    fn signal_forceful(&self, pid: u32) -> Result<(), SignalError> {
        send_signal(pid, libc::SIGKILL)
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> Result<(), SignalError> {
    let pid = pid as i32;
    let rc = unsafe { libc::kill(pid, signal) };
    let result = if rc == 0 {
        Ok(())
    } else {
        match std::io::Error::last_os_error().raw_os_error() {
            Some(libc::ESRCH) => Err(SignalError::AlreadyGone),
            Some(libc::EPERM) => Err(SignalError::PermissionDenied),
            _ => Err(SignalError::Other),
        }
    };
    // Supervised children run in their own process group; reach descendants
    // too. Best effort, the pid delivery above decides the reported result.
    unsafe {
        let _ = libc::kill(-pid, signal);
    }
    result
}

#[cfg(windows)]
pub struct WindowsControl;

#[cfg(windows)]
impl ProcessControl for WindowsControl {
    fn own_pid(&self) -> u32 {
        std::process::id()
    }

    fn find_by_pattern(&self, pattern: &str) -> Vec<u32> {
        use sysinfo::{ProcessesToUpdate, System};

        let own = self.own_pid();
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);

        // The tabular listing exposes only the executable name, not the
        // argument vector; matching stays on the base name.
        let mut pids: Vec<u32> = sys
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let name = process.name().to_string_lossy();
                exe_name_matches(&name, pattern).then(|| pid.as_u32())
            })
            .filter(|pid| *pid != own)
            .collect();
        pids.sort_unstable();
        pids
    }

    fn is_alive(&self, pid: u32) -> bool {
        use sysinfo::{Pid, ProcessesToUpdate, System};

        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
        sys.process(Pid::from_u32(pid)).is_some()
    }

    fn signal_graceful(&self, pid: u32) -> Result<(), SignalError> {
        // Children spawned by the dashboard get their own console group, so a
        // CTRL_BREAK reaches them; for unrelated targets fall back to a
        // close request via taskkill.
        if send_ctrl_break(pid) {
            return Ok(());
        }
        run_taskkill(pid, false)
    }

    fn signal_forceful(&self, pid: u32) -> Result<(), SignalError> {
        run_taskkill(pid, true)
    }
}

#[cfg(windows)]
fn send_ctrl_break(pid: u32) -> bool {
    use windows_sys::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};
    unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) != 0 }
}

#[cfg(windows)]
fn run_taskkill(pid: u32, force: bool) -> Result<(), SignalError> {
    let mut command = std::process::Command::new("taskkill");
    command.arg("/PID").arg(pid.to_string());
    if force {
        command.arg("/T").arg("/F");
    }
    match command.output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(output) => {
            // taskkill reports a missing process with exit code 128.
            if output.status.code() == Some(128) {
                return Err(SignalError::AlreadyGone);
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_lowercase().contains("denied") {
                Err(SignalError::PermissionDenied)
            } else {
                Err(SignalError::Other)
            }
        }
        Err(_) => Err(SignalError::Other),
    }
}
