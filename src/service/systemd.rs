//! systemd as the service manager: launch detection, `sd_notify` status
//! reporting and the control-request feed.
//!
//! systemd has no request channel of its own. Stops arrive as signals and
//! liveness checks as the watchdog deadline, so the feed turns those into
//! [`ControlRequest`]s for the runner.

use super::status::{
    ControlKind, ControlRequest, ServiceHandle, ServiceState, ServiceStatus, StatusReporter,
};
use crate::error::{Result, SvcError};
use std::env;
use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr, UnixDatagram};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::debug;

/// Whether this process was started by systemd as a unit.
pub fn launched_by_manager() -> bool {
    env::var_os("INVOCATION_ID").is_some() || env::var_os("NOTIFY_SOCKET").is_some()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NotifyAddr {
    Path(PathBuf),
    Abstract(Vec<u8>),
}

impl NotifyAddr {
    fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        match raw.strip_prefix('@') {
            Some(name) => Some(NotifyAddr::Abstract(name.as_bytes().to_vec())),
            None => Some(NotifyAddr::Path(PathBuf::from(raw))),
        }
    }
}

/// Reports status through the `NOTIFY_SOCKET` datagram protocol.
pub struct NotifyReporter {
    target: Option<(UnixDatagram, NotifyAddr)>,
}

impl NotifyReporter {
    /// Connect to `NOTIFY_SOCKET`, or report nothing if it is not set
    /// (units with `Type=simple`).
    pub fn from_env() -> Result<Self> {
        match env::var("NOTIFY_SOCKET").ok().as_deref().and_then(NotifyAddr::parse) {
            Some(addr) => Self::connect(addr),
            None => {
                debug!("NOTIFY_SOCKET not set, status reports disabled");
                Ok(Self { target: None })
            }
        }
    }

    pub fn for_socket(path: impl Into<PathBuf>) -> Result<Self> {
        Self::connect(NotifyAddr::Path(path.into()))
    }

    fn connect(addr: NotifyAddr) -> Result<Self> {
        let socket = UnixDatagram::unbound()
            .map_err(|e| SvcError::setup(format!("failed to open notify socket: {}", e)))?;
        Ok(Self {
            target: Some((socket, addr)),
        })
    }

    fn send(&self, message: &str) -> Result<()> {
        let Some((socket, addr)) = &self.target else {
            return Ok(());
        };
        match addr {
            NotifyAddr::Path(path) => socket.send_to(message.as_bytes(), path)?,
            NotifyAddr::Abstract(name) => {
                let addr = SocketAddr::from_abstract_name(name)?;
                socket.send_to_addr(message.as_bytes(), &addr)?
            }
        };
        Ok(())
    }
}

impl StatusReporter for NotifyReporter {
    fn report(&self, status: &ServiceStatus) -> Result<()> {
        self.send(&notify_message(status, false))
    }

    fn acknowledge(&self, status: &ServiceStatus) -> Result<()> {
        self.send(&notify_message(status, true))
    }
}

/// Render a status as `sd_notify` assignments.
pub fn notify_message(status: &ServiceStatus, keepalive: bool) -> String {
    let mut lines = Vec::with_capacity(3);
    match status.state {
        ServiceState::Running => lines.push("READY=1".to_string()),
        ServiceState::StopPending => lines.push("STOPPING=1".to_string()),
        _ => {}
    }
    lines.push(format!("STATUS={}", status.state));
    if keepalive {
        lines.push("WATCHDOG=1".to_string());
    }
    lines.join("\n")
}

/// Half the watchdog period systemd expects, if the watchdog is on for us.
pub fn watchdog_interval() -> Option<Duration> {
    let usec = env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    if let Some(pid) = env::var("WATCHDOG_PID").ok().and_then(|p| p.parse::<u32>().ok()) {
        if pid != std::process::id() {
            return None;
        }
    }
    watchdog_interval_from(usec)
}

fn watchdog_interval_from(usec: u64) -> Option<Duration> {
    if usec == 0 {
        return None;
    }
    Some(Duration::from_micros(usec / 2))
}

/// Translate systemd's stop signals and watchdog deadline into control
/// requests. The feed stops once the receiver is dropped or closed.
pub fn spawn_control_feed(
    handle: Arc<ServiceHandle>,
    watchdog: Option<Duration>,
) -> Result<mpsc::Receiver<ControlRequest>> {
    let register = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| SvcError::setup(format!("failed to register {} handler: {}", name, e)))
    };
    let mut term = register(SignalKind::terminate(), "SIGTERM")?;
    let mut int = register(SignalKind::interrupt(), "SIGINT")?;
    let mut hup = register(SignalKind::hangup(), "SIGHUP")?;
    let mut ticker = watchdog.map(|period| {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        loop {
            let kind = tokio::select! {
                _ = term.recv() => ControlKind::Stop,
                _ = int.recv() => ControlKind::Shutdown,
                _ = hup.recv() => ControlKind::Unknown(libc::SIGHUP as u32),
                _ = next_tick(&mut ticker) => ControlKind::Interrogate,
                _ = tx.closed() => break,
            };
            let request = ControlRequest {
                kind,
                current: handle.current(),
            };
            if tx.send(request).await.is_err() {
                break;
            }
        }
        debug!("Control feed stopped");
    });
    Ok(rx)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Accepts;
    use crate::testing::{RecordingLog, RecordingReporter};
    use tempfile::TempDir;

    #[test]
    fn test_notify_message() {
        let running = ServiceStatus::new(ServiceState::Running).with_accepts(Accepts::STOP_AND_SHUTDOWN);
        assert_eq!(notify_message(&running, false), "READY=1\nSTATUS=running");
        assert_eq!(
            notify_message(&running, true),
            "READY=1\nSTATUS=running\nWATCHDOG=1"
        );
        assert_eq!(
            notify_message(&ServiceStatus::new(ServiceState::StopPending), false),
            "STOPPING=1\nSTATUS=stop-pending"
        );
        assert_eq!(
            notify_message(&ServiceStatus::new(ServiceState::StartPending), false),
            "STATUS=start-pending"
        );
    }

    #[test]
    fn test_notify_addr_parse() {
        assert_eq!(NotifyAddr::parse(""), None);
        assert_eq!(
            NotifyAddr::parse("/run/systemd/notify"),
            Some(NotifyAddr::Path(PathBuf::from("/run/systemd/notify")))
        );
        assert_eq!(
            NotifyAddr::parse("@/org/freedesktop/systemd1/notify"),
            Some(NotifyAddr::Abstract(b"/org/freedesktop/systemd1/notify".to_vec()))
        );
    }

    #[test]
    fn test_watchdog_interval_is_half_the_deadline() {
        assert_eq!(watchdog_interval_from(0), None);
        assert_eq!(
            watchdog_interval_from(10_000_000),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_reporter_writes_datagrams() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notify.sock");
        let manager = UnixDatagram::bind(&path).unwrap();

        let reporter = NotifyReporter::for_socket(&path).unwrap();
        reporter
            .report(&ServiceStatus::new(ServiceState::Running))
            .unwrap();

        let mut buf = [0u8; 256];
        let n = manager.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"READY=1\nSTATUS=running");
    }

    #[tokio::test]
    async fn test_watchdog_tick_becomes_interrogate_with_current_status() {
        let handle = Arc::new(ServiceHandle::new(
            RecordingReporter::new(),
            RecordingLog::new(),
        ));
        let running = ServiceStatus::new(ServiceState::Running).with_accepts(Accepts::STOP_AND_SHUTDOWN);
        handle.set_status(running).unwrap();

        let mut rx = spawn_control_feed(Arc::clone(&handle), Some(Duration::from_millis(10))).unwrap();
        let request = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request.kind, ControlKind::Interrogate);
        assert_eq!(request.current, running);

        drop(rx);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while Arc::strong_count(&handle) > 1 {
            assert!(std::time::Instant::now() < deadline, "control feed outlived its receiver");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
