use chrono::{DateTime, Utc};
use std::backtrace::Backtrace;
use std::fmt;
use std::fs;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Logging collaborator injected into the controller and the service runner.
///
/// Everything the lifecycle machinery reports goes through this trait so a
/// run can be observed in tests without installing a global subscriber.
pub trait LifecycleLog: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn debug(&self, message: &str);
    /// Record a thread dump taken on a fault-class notification.
    fn dump(&self, dump: &ThreadDump);
}

/// Default collaborator that forwards to `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingLog {
    /// Service name attached to every record, if running as a service.
    pub service: Option<String>,
}

impl TracingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_service<S: Into<String>>(name: S) -> Self {
        Self {
            service: Some(name.into()),
        }
    }

    pub fn shared(self) -> Arc<dyn LifecycleLog> {
        Arc::new(self)
    }
}

impl LifecycleLog for TracingLog {
    fn info(&self, message: &str) {
        match &self.service {
            Some(service) => info!(service = %service, "{}", message),
            None => info!("{}", message),
        }
    }

    fn warn(&self, message: &str) {
        match &self.service {
            Some(service) => warn!(service = %service, "{}", message),
            None => warn!("{}", message),
        }
    }

    fn error(&self, message: &str) {
        match &self.service {
            Some(service) => error!(service = %service, "{}", message),
            None => error!("{}", message),
        }
    }

    fn debug(&self, message: &str) {
        debug!("{}", message);
    }

    fn dump(&self, dump: &ThreadDump) {
        error!(
            threads = dump.threads.len(),
            captured_at = %dump.captured_at,
            "Thread dump\n{}",
            dump
        );
    }
}

/// State of one OS thread of this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub tid: u32,
    pub name: String,
    /// Scheduler state letter from `/proc`, e.g. `R`, `S`, `D`.
    pub state: String,
}

/// Snapshot of all running threads plus the capturing thread's backtrace.
#[derive(Debug)]
pub struct ThreadDump {
    pub captured_at: DateTime<Utc>,
    pub reason: String,
    pub threads: Vec<ThreadInfo>,
    pub backtrace: Backtrace,
}

impl ThreadDump {
    pub fn capture<S: Into<String>>(reason: S) -> Self {
        Self {
            captured_at: Utc::now(),
            reason: reason.into(),
            threads: list_threads(),
            backtrace: Backtrace::force_capture(),
        }
    }
}

impl fmt::Display for ThreadDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "reason: {}", self.reason)?;
        writeln!(f, "captured at: {}", self.captured_at.to_rfc3339())?;
        for thread in &self.threads {
            writeln!(f, "thread {} [{}] state={}", thread.tid, thread.name, thread.state)?;
        }
        write!(f, "backtrace of capturing thread:\n{}", self.backtrace)
    }
}

#[cfg(target_os = "linux")]
fn list_threads() -> Vec<ThreadInfo> {
    let entries = match fs::read_dir("/proc/self/task") {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Unable to list threads: {}", e);
            return Vec::new();
        }
    };

    let mut threads: Vec<ThreadInfo> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let tid = entry.file_name().to_string_lossy().parse::<u32>().ok()?;
            let name = fs::read_to_string(entry.path().join("comm"))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            let stat = fs::read_to_string(entry.path().join("stat")).unwrap_or_default();
            Some(ThreadInfo {
                tid,
                name,
                state: parse_stat_state(&stat).unwrap_or("?").to_string(),
            })
        })
        .collect();

    threads.sort_by_key(|t| t.tid);
    threads
}

#[cfg(not(target_os = "linux"))]
fn list_threads() -> Vec<ThreadInfo> {
    Vec::new()
}

/// Extract the state field from a `/proc/<pid>/task/<tid>/stat` line.
///
/// The command name is parenthesized and may itself contain spaces or
/// parentheses, so the state is the first field after the last `)`.
fn parse_stat_state(stat: &str) -> Option<&str> {
    let rparen = stat.rfind(')')?;
    stat.get(rparen + 1..)?.split_whitespace().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stat_state() {
        assert_eq!(parse_stat_state("1234 (svcmain-worker) S 1 2 3"), Some("S"));
        assert_eq!(parse_stat_state("7 (weird ) name) R 0"), Some("R"));
        assert_eq!(parse_stat_state("garbage"), None);
    }

    #[test]
    fn test_capture_includes_reason_and_backtrace() {
        let dump = ThreadDump::capture("SIGABRT");
        let rendered = dump.to_string();

        assert!(rendered.contains("reason: SIGABRT"));
        assert!(rendered.contains("backtrace of capturing thread"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_capture_lists_named_threads() {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("dump-probe".to_string())
            .spawn(move || {
                ready_tx.send(()).unwrap();
                let _ = done_rx.recv();
            })
            .unwrap();

        ready_rx.recv().unwrap();
        let dump = ThreadDump::capture("probe");
        done_tx.send(()).unwrap();
        handle.join().unwrap();

        assert!(!dump.threads.is_empty());
        assert!(dump.threads.iter().any(|t| t.name == "dump-probe"));
    }
}
