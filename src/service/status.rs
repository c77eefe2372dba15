use crate::diagnostics::LifecycleLog;
use crate::error::Result;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Service states as seen by a service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Stopped => "stopped",
            ServiceState::StartPending => "start-pending",
            ServiceState::StopPending => "stop-pending",
            ServiceState::Running => "running",
            ServiceState::ContinuePending => "continue-pending",
            ServiceState::PausePending => "pause-pending",
            ServiceState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Control requests a running service is willing to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Accepts {
    pub stop: bool,
    pub shutdown: bool,
    pub pause_continue: bool,
}

impl Accepts {
    pub const NONE: Accepts = Accepts {
        stop: false,
        shutdown: false,
        pause_continue: false,
    };

    pub const STOP_AND_SHUTDOWN: Accepts = Accepts {
        stop: true,
        shutdown: true,
        pause_continue: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub accepts: Accepts,
}

impl ServiceStatus {
    pub fn new(state: ServiceState) -> Self {
        Self {
            state,
            accepts: Accepts::NONE,
        }
    }

    pub fn with_accepts(mut self, accepts: Accepts) -> Self {
        self.accepts = accepts;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Stop,
    Shutdown,
    Interrogate,
    /// Anything else, carrying the manager's raw code.
    Unknown(u32),
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlKind::Stop => f.write_str("stop"),
            ControlKind::Shutdown => f.write_str("shutdown"),
            ControlKind::Interrogate => f.write_str("interrogate"),
            ControlKind::Unknown(code) => write!(f, "#{}", code),
        }
    }
}

/// A request from the service manager, with the status current when it was
/// issued so it can be acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub kind: ControlKind,
    pub current: ServiceStatus,
}

/// The manager-facing side of status reporting.
pub trait StatusReporter: Send + Sync {
    fn report(&self, status: &ServiceStatus) -> Result<()>;

    /// Answer an interrogation with the current status.
    fn acknowledge(&self, status: &ServiceStatus) -> Result<()> {
        self.report(status)
    }
}

/// Tracks the last reported status of one service instance.
pub struct ServiceHandle {
    reporter: Arc<dyn StatusReporter>,
    current: Mutex<ServiceStatus>,
    log: Arc<dyn LifecycleLog>,
}

impl ServiceHandle {
    pub fn new(reporter: Arc<dyn StatusReporter>, log: Arc<dyn LifecycleLog>) -> Self {
        Self {
            reporter,
            current: Mutex::new(ServiceStatus::new(ServiceState::Stopped)),
            log,
        }
    }

    pub fn current(&self) -> ServiceStatus {
        *self.current.lock()
    }

    /// Report a new status. The status is recorded even if the manager
    /// cannot be reached.
    pub fn set_status(&self, status: ServiceStatus) -> Result<()> {
        *self.current.lock() = status;
        self.reporter.report(&status)
    }

    /// Report a status, logging instead of failing.
    pub fn set_status_logged(&self, status: ServiceStatus) {
        if let Err(e) = self.set_status(status) {
            self.log
                .warn(&format!("Failed to report {} status: {}", status.state, e));
        }
    }

    pub fn acknowledge(&self, status: &ServiceStatus) {
        if let Err(e) = self.reporter.acknowledge(status) {
            self.log
                .warn(&format!("Failed to acknowledge interrogate: {}", e));
        }
    }
}
