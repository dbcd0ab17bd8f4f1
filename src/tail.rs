//! Live tailing of log files.
//!
//! Each tailed file gets a dedicated thread that reads appended data and
//! forwards complete lines to the event loop. A `notify` watcher wakes the
//! thread early when the file changes; if watching fails the thread still
//! makes progress on a fixed poll cadence. Truncation resets the read
//! position so in-place rotation keeps working, and re-pointing a source to
//! a different file detaches the old thread via its handle.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::events::Event;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Detaches a running tail thread.
#[derive(Debug)]
pub struct TailHandle {
    stop: Arc<AtomicBool>,
}

impl TailHandle {
    pub fn detach(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Starts tailing `path`, sending lines and faults for `slot`.
pub fn spawn_tail(slot: usize, path: PathBuf, tx: mpsc::Sender<Event>) -> TailHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    std::thread::spawn(move || tail_loop(slot, &path, tx, flag));
    TailHandle { stop }
}

fn tail_loop(slot: usize, path: &Path, tx: mpsc::Sender<Event>, stop: Arc<AtomicBool>) {
    // The original file may not exist yet; start it empty so the watch has
    // something to attach to.
    if !path.exists() {
        if let Err(err) = File::create(path) {
            let _ = tx.blocking_send(Event::TailError {
                slot,
                message: format!("cannot create {}: {}", path.display(), err),
            });
            return;
        }
    }

    let mut pos = match File::open(path).and_then(|mut file| file.seek(SeekFrom::End(0))) {
        Ok(pos) => pos,
        Err(err) => {
            let _ = tx.blocking_send(Event::TailError {
                slot,
                message: format!("cannot open {}: {}", path.display(), err),
            });
            return;
        }
    };

    // Watcher wakes the loop early on fs events; polling alone still works.
    let (raw_tx, raw_rx) = std::sync::mpsc::channel();
    let _watcher = match RecommendedWatcher::new(
        move |res| {
            let _ = raw_tx.send(res);
        },
        notify::Config::default(),
    ) {
        Ok(mut watcher) => match watcher.watch(path, RecursiveMode::NonRecursive) {
            Ok(()) => Some(watcher),
            Err(_) => None,
        },
        Err(_) => None,
    };

    let mut carry = String::new();
    let mut faulted = false;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        match read_appended(path, &mut pos, &mut carry) {
            Ok(lines) => {
                faulted = false;
                for line in lines {
                    if tx.blocking_send(Event::TailLine { slot, line }).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                // Report once per fault episode, not every poll.
                if !faulted {
                    faulted = true;
                    let _ = tx.blocking_send(Event::TailError {
                        slot,
                        message: err.to_string(),
                    });
                }
            }
        }
        let _ = raw_rx.recv_timeout(POLL_INTERVAL);
    }
}

/// Reads data appended since `pos`, returning the complete lines. Partial
/// trailing lines stay in `carry` until their newline arrives.
fn read_appended(path: &Path, pos: &mut u64, carry: &mut String) -> std::io::Result<Vec<String>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < *pos {
        // Truncated in place; start over from the top.
        *pos = 0;
        carry.clear();
    }
    if len == *pos {
        return Ok(Vec::new());
    }
    file.seek(SeekFrom::Start(*pos))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    *pos += bytes.len() as u64;

    carry.push_str(&String::from_utf8_lossy(&bytes));
    let mut lines = Vec::new();
    while let Some(idx) = carry.find('\n') {
        let mut line: String = carry.drain(..=idx).collect();
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
        lines.push(line);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("rundash-tail-tests");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn appended_lines_come_back_complete() {
        let path = temp_file("append.log");
        std::fs::write(&path, "").unwrap();
        let mut pos = 0;
        let mut carry = String::new();

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "one").unwrap();
        write!(file, "tw").unwrap();
        file.flush().unwrap();

        let lines = read_appended(&path, &mut pos, &mut carry).unwrap();
        assert_eq!(lines, vec!["one".to_string()]);
        assert_eq!(carry, "tw");

        writeln!(file, "o").unwrap();
        file.flush().unwrap();
        let lines = read_appended(&path, &mut pos, &mut carry).unwrap();
        assert_eq!(lines, vec!["two".to_string()]);
        assert!(carry.is_empty());
    }

    #[test]
    fn truncation_resets_the_read_position() {
        let path = temp_file("truncate.log");
        std::fs::write(&path, "old contents that will vanish\n").unwrap();
        let mut pos = std::fs::metadata(&path).unwrap().len();
        let mut carry = String::new();

        std::fs::write(&path, "fresh\n").unwrap();
        let lines = read_appended(&path, &mut pos, &mut carry).unwrap();
        assert_eq!(lines, vec!["fresh".to_string()]);
    }

    #[test]
    fn crlf_endings_are_trimmed() {
        let path = temp_file("crlf.log");
        std::fs::write(&path, "windows line\r\n").unwrap();
        let mut pos = 0;
        let mut carry = String::new();
        let lines = read_appended(&path, &mut pos, &mut carry).unwrap();
        assert_eq!(lines, vec!["windows line".to_string()]);
    }

    #[test]
    fn missing_file_is_an_error_not_a_panic() {
        let path = temp_file("never-created.log");
        let _ = std::fs::remove_file(&path);
        let mut pos = 0;
        let mut carry = String::new();
        assert!(read_appended(&path, &mut pos, &mut carry).is_err());
    }
}
