//! Event definitions for the application event loop.
//!
//! This module defines the `Event` enum which encapsulates all possible events
//! that drive the dashboard's state transitions: supervised-process updates,
//! tailed log lines, tool notices, user input, and system signals.

use crossterm::event::KeyEvent;

use crate::supervisor::SupervisedProcess;

/// Indicates the source stream of a process output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard Output.
    Stdout,
    /// Standard Error.
    Stderr,
}

/// Represents an event in the dashboard's main event loop.
#[derive(Debug)]
pub enum Event {
    /// A line of output (stdout or stderr) from the supervised process.
    ProcessOutput { line: String, stream: StreamKind },
    /// A launch task finished spawning its process.
    ProcessSpawned { seq: u64, process: SupervisedProcess },
    /// A launch task failed before the process came up.
    LaunchFailed { seq: u64, error: String },
    /// A new line appeared in a tailed log file.
    TailLine { slot: usize, line: String },
    /// A tailed log file could not be read or watched.
    TailError { slot: usize, message: String },
    /// A tool message destined for the output pane.
    Notice(String),
    /// A keyboard event received from the user.
    Key(KeyEvent),
    /// The terminal window was resized.
    Resize { width: u16, height: u16 },
    /// The dashboard was asked to shut down (Ctrl-C / SIGTERM).
    Shutdown,
}

/// Formats a dashboard-generated message the way it appears in the panes.
pub fn tool_line(text: &str) -> String {
    format!("[rundash] {}", text)
}
