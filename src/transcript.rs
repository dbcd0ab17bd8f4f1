//! Session transcript persistence.
//!
//! When `persistLogs` is on, every line that reaches a display pane is also
//! appended, timestamp-prefixed, to a dated file under `logs/`. The sink is a
//! pure observer: write failures are swallowed so persistence can never
//! affect the dashboard's control flow.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

pub struct Transcript {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl Transcript {
    /// Opens a dated transcript file under `dir`, creating the directory as
    /// needed.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log dir {}", dir.display()))?;
        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
        let path = dir.join(format!("rundash-{}.log", stamp));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open transcript {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    /// Appends one displayed line. Errors are ignored.
    pub fn record(&mut self, line: &str) {
        let stamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let _ = writeln!(self.writer, "[{}] {}", stamp, line);
        let _ = self.writer.flush();
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_timestamp_prefixed() {
        let dir = std::env::temp_dir().join("rundash-transcript-tests");
        let mut transcript = Transcript::create(&dir).unwrap();
        transcript.record("hello transcript");

        let contents = std::fs::read_to_string(transcript.path()).unwrap();
        let line = contents.lines().last().unwrap();
        assert!(line.starts_with('['));
        assert!(line.ends_with("hello transcript"));
        assert!(line.contains('T'));
    }
}
