use std::fmt;

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The worker returned on its own.
    WorkerExited,
    /// An OS signal requested the stop.
    Signal(String),
    /// The service manager requested the stop.
    ControlRequest(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::WorkerExited => write!(f, "worker exited"),
            ShutdownReason::Signal(name) => write!(f, "signal {}", name),
            ShutdownReason::ControlRequest(name) => write!(f, "control request {}", name),
        }
    }
}

/// One item from a stop source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopEvent {
    /// Stop the worker.
    Graceful(ShutdownReason),
    /// Dump all threads, then stop the worker.
    Abort(ShutdownReason),
    /// Dump all threads and keep running.
    Diagnostic(String),
    /// Not a stop request; keep running.
    Ignored(String),
}

/// Result of one controller run.
#[derive(Debug)]
pub struct RunOutcome {
    pub error: Option<anyhow::Error>,
    pub reason: ShutdownReason,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the controller asked the worker to stop, as opposed to the
    /// worker returning by itself.
    pub fn stop_requested(&self) -> bool {
        self.reason != ShutdownReason::WorkerExited
    }

    pub fn into_result(self) -> anyhow::Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
