//! Discovery of processes holding network ports.
//!
//! Port release is a two step affair: ask the platform which PIDs hold the
//! port, then hand each one to the terminator. This module covers the first
//! step, shelling out to `lsof` on POSIX systems and `netstat -ano` on
//! Windows, the same sources the usual port-freeing tools consult.

use anyhow::{Context, Result};
use tokio::process::Command;

/// Transport protocol a release action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortProto {
    Tcp,
    Udp,
}

impl PortProto {
    pub fn label(&self) -> &'static str {
        match self {
            PortProto::Tcp => "TCP",
            PortProto::Udp => "UDP",
        }
    }
}

/// PIDs currently bound to the given port. An empty list is not an error.
#[cfg(unix)]
pub async fn pids_on_port(proto: PortProto, port: u16) -> Result<Vec<u32>> {
    let mut command = Command::new("lsof");
    command.arg("-t");
    match proto {
        PortProto::Tcp => {
            command.arg("-i").arg(format!("tcp:{}", port));
            command.arg("-s").arg("TCP:LISTEN");
        }
        PortProto::Udp => {
            command.arg("-i").arg(format!("udp:{}", port));
        }
    }
    let output = command.output().await.context("failed to run lsof")?;
    // lsof exits non-zero when nothing matches; that is just an empty result.
    Ok(parse_pid_lines(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(windows)]
pub async fn pids_on_port(proto: PortProto, port: u16) -> Result<Vec<u32>> {
    let output = Command::new("netstat")
        .arg("-ano")
        .output()
        .await
        .context("failed to run netstat")?;
    Ok(parse_netstat(
        &String::from_utf8_lossy(&output.stdout),
        proto,
        port,
    ))
}

/// One PID per line, as `lsof -t` prints them.
fn parse_pid_lines(text: &str) -> Vec<u32> {
    let mut pids: Vec<u32> = text
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

/// Extracts PIDs bound to `port` from `netstat -ano` output. TCP rows must be
/// LISTENING; UDP rows carry no state column.
fn parse_netstat(output: &str, proto: PortProto, port: u16) -> Vec<u32> {
    let wanted = match proto {
        PortProto::Tcp => "TCP",
        PortProto::Udp => "UDP",
    };
    let suffix = format!(":{}", port);
    let mut pids: Vec<u32> = output
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.first()?.to_uppercase() != wanted {
                return None;
            }
            if !columns.get(1)?.ends_with(&suffix) {
                return None;
            }
            match proto {
                PortProto::Tcp => {
                    if !columns.get(3)?.eq_ignore_ascii_case("LISTENING") {
                        return None;
                    }
                    columns.get(4)?.parse().ok()
                }
                PortProto::Udp => columns.get(3)?.parse().ok(),
            }
        })
        .collect();
    pids.sort_unstable();
    pids.dedup();
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_lines_parse_and_dedup() {
        assert_eq!(parse_pid_lines("1234\n5678\n1234\n"), vec![1234, 5678]);
        assert_eq!(parse_pid_lines("  42  \n\nnot-a-pid\n"), vec![42]);
        assert!(parse_pid_lines("").is_empty());
    }

    #[test]
    fn netstat_tcp_rows_require_listening_state() {
        let output = "\
  TCP    0.0.0.0:3000           0.0.0.0:0              LISTENING       4321
  TCP    0.0.0.0:3000           10.0.0.5:55102         ESTABLISHED     4321
  TCP    127.0.0.1:8080         0.0.0.0:0              LISTENING       999
";
        assert_eq!(parse_netstat(output, PortProto::Tcp, 3000), vec![4321]);
        assert_eq!(parse_netstat(output, PortProto::Tcp, 8080), vec![999]);
        assert!(parse_netstat(output, PortProto::Tcp, 9999).is_empty());
    }

    #[test]
    fn netstat_udp_rows_have_no_state_column() {
        let output = "  UDP    0.0.0.0:5353           *:*                             777\n";
        assert_eq!(parse_netstat(output, PortProto::Udp, 5353), vec![777]);
        assert!(parse_netstat(output, PortProto::Tcp, 5353).is_empty());
    }

    #[test]
    fn port_suffix_must_match_exactly() {
        let output = "  TCP    0.0.0.0:13000          0.0.0.0:0              LISTENING       1\n";
        assert!(parse_netstat(output, PortProto::Tcp, 3000).is_empty());
    }
}
