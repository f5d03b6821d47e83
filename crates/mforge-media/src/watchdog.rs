//! Watchdog for hung encoder processes.
//!
//! Any matching process older than the age threshold gets SIGTERM, then
//! SIGKILL if it survives the grace period. Survivors are re-read from the
//! process table, so zombies and reused pids are never escalated.

use std::str::FromStr;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid as NixPid;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::metrics;

/// Longest parent chain followed when checking ancestry.
const MAX_ANCESTRY_DEPTH: usize = 64;

/// Which processes the watchdog may signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchdogScope {
    /// Only descendants of this worker process
    #[default]
    Children,
    /// Every matching process visible to this user
    All,
}

impl FromStr for WatchdogScope {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "children" => Ok(Self::Children),
            "all" => Ok(Self::All),
            other => Err(MediaError::internal(format!(
                "unknown watchdog scope '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub process_name: String,
    pub max_age: Duration,
    pub kill_grace: Duration,
    pub scope: WatchdogScope,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            process_name: "ffmpeg".to_string(),
            max_age: Duration::from_secs(300),
            kill_grace: Duration::from_millis(1000),
            scope: WatchdogScope::Children,
        }
    }
}

/// What one sweep saw and did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchdogReport {
    /// Matching processes in scope
    pub inspected: usize,
    /// Processes sent SIGTERM
    pub terminated: usize,
    /// Processes that needed SIGKILL
    pub killed: usize,
}

pub fn is_overdue(run_time_secs: u64, max_age: Duration) -> bool {
    run_time_secs > max_age.as_secs()
}

/// An overdue process, identified by pid and start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Overdue {
    pid: u32,
    start_time: u64,
}

/// Whether a process sent SIGTERM still needs SIGKILL, given its current
/// `(start_time, status)` if the pid is still in the process table.
fn needs_kill(started: u64, current: Option<(u64, ProcessStatus)>) -> bool {
    match current {
        Some((start_time, status)) => start_time == started && status != ProcessStatus::Zombie,
        None => false,
    }
}

fn is_descendant(sys: &System, pid: Pid, ancestor: Pid) -> bool {
    let mut current = sys.process(pid).and_then(|p| p.parent());
    for _ in 0..MAX_ANCESTRY_DEPTH {
        match current {
            Some(parent) if parent == ancestor => return true,
            Some(parent) => current = sys.process(parent).and_then(|p| p.parent()),
            None => return false,
        }
    }
    false
}

/// Periodic enforcer of the encoder age limit.
#[derive(Debug, Clone, Default)]
pub struct ProcessWatchdog {
    config: WatchdogConfig,
}

impl ProcessWatchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Returns `(inspected, overdue processes)`.
    fn scan(config: &WatchdogConfig) -> (usize, Vec<Overdue>) {
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let me = sysinfo::get_current_pid().ok();

        let mut inspected = 0;
        let mut overdue = Vec::new();
        for (pid, process) in sys.processes() {
            if process.name().to_string_lossy() != config.process_name.as_str() {
                continue;
            }
            if config.scope == WatchdogScope::Children {
                match me {
                    Some(me) if is_descendant(&sys, *pid, me) => {}
                    _ => continue,
                }
            }
            inspected += 1;
            if is_overdue(process.run_time(), config.max_age) {
                overdue.push(Overdue {
                    pid: pid.as_u32(),
                    start_time: process.start_time(),
                });
            }
        }
        (inspected, overdue)
    }

    /// The processes in `signalled` that are still running as the same process.
    fn survivors(signalled: &[Overdue]) -> Vec<u32> {
        let pids: Vec<Pid> = signalled.iter().map(|o| Pid::from_u32(o.pid)).collect();
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&pids), true);

        signalled
            .iter()
            .filter(|o| {
                let current = sys
                    .process(Pid::from_u32(o.pid))
                    .map(|p| (p.start_time(), p.status()));
                needs_kill(o.start_time, current)
            })
            .map(|o| o.pid)
            .collect()
    }

    /// One enumerate / terminate / kill pass.
    pub async fn sweep(&self) -> MediaResult<WatchdogReport> {
        let config = self.config.clone();
        let (inspected, overdue) = tokio::task::spawn_blocking(move || Self::scan(&config))
            .await
            .map_err(|e| MediaError::internal(format!("watchdog scan failed: {e}")))?;

        let mut report = WatchdogReport {
            inspected,
            ..Default::default()
        };

        let mut signalled = Vec::with_capacity(overdue.len());
        for process in overdue {
            warn!(
                pid = process.pid,
                max_age_secs = self.config.max_age.as_secs(),
                "Terminating overdue {} process",
                self.config.process_name
            );
            match kill(NixPid::from_raw(process.pid as i32), Signal::SIGTERM) {
                Ok(()) => {
                    report.terminated += 1;
                    metrics::record_watchdog_signal("SIGTERM");
                    signalled.push(process);
                }
                Err(e) => debug!(pid = process.pid, "SIGTERM failed: {}", e),
            }
        }

        if signalled.is_empty() {
            return Ok(report);
        }
        tokio::time::sleep(self.config.kill_grace).await;

        let survivors = tokio::task::spawn_blocking(move || Self::survivors(&signalled))
            .await
            .map_err(|e| MediaError::internal(format!("watchdog rescan failed: {e}")))?;

        for pid in survivors {
            warn!(pid, "Process survived SIGTERM, sending SIGKILL");
            if kill(NixPid::from_raw(pid as i32), Signal::SIGKILL).is_ok() {
                report.killed += 1;
                metrics::record_watchdog_signal("SIGKILL");
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_overdue() {
        let limit = Duration::from_secs(300);
        assert!(!is_overdue(299, limit));
        assert!(!is_overdue(300, limit));
        assert!(is_overdue(301, limit));
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("children".parse::<WatchdogScope>().unwrap(), WatchdogScope::Children);
        assert_eq!(" ALL ".parse::<WatchdogScope>().unwrap(), WatchdogScope::All);
        assert!("siblings".parse::<WatchdogScope>().is_err());
    }

    #[test]
    fn test_needs_kill() {
        assert!(needs_kill(100, Some((100, ProcessStatus::Run))));
        assert!(needs_kill(100, Some((100, ProcessStatus::Sleep))));
        // Exited but not yet reaped
        assert!(!needs_kill(100, Some((100, ProcessStatus::Zombie))));
        // Pid reused by a newer process
        assert!(!needs_kill(100, Some((160, ProcessStatus::Run))));
        assert!(!needs_kill(100, None));
    }

    #[tokio::test]
    async fn test_fresh_processes_left_alone() {
        let watchdog = ProcessWatchdog::new(WatchdogConfig {
            process_name: "sleep".into(),
            max_age: Duration::from_secs(3600),
            kill_grace: Duration::from_millis(10),
            scope: WatchdogScope::Children,
        });
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        let report = watchdog.sweep().await.unwrap();
        assert_eq!(report.terminated, 0);
        assert_eq!(report.killed, 0);
        child.kill().await.unwrap();
    }

    #[tokio::test]
    async fn test_overdue_child_is_terminated() {
        let watchdog = ProcessWatchdog::new(WatchdogConfig {
            process_name: "sleep".into(),
            max_age: Duration::from_secs(0),
            kill_grace: Duration::from_millis(100),
            scope: WatchdogScope::Children,
        });
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let report = watchdog.sweep().await.unwrap();
        assert!(report.inspected >= 1);
        assert!(report.terminated >= 1);
        // sleep exits on SIGTERM, so nothing is escalated
        assert_eq!(report.killed, 0);

        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(!status.success());
    }
}
