pub mod app;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod launch;
pub mod service;
pub mod testing;

pub use app::{Controller, RunOutcome, ShutdownReason, SignalSource, StopEvent, StopSource};
pub use config::LifecycleConfig;
pub use diagnostics::{LifecycleLog, ThreadDump, TracingLog};
pub use error::{Result, SvcError, EXIT_ADMIN_FAILURE, EXIT_WORKER_FAILURE};
pub use gate::{Gate, GateState, StopWaiter};
pub use launch::{run, usage, Launch};
pub use service::{ServiceCommand, ServiceRunner, ServiceState, ServiceStatus, StatusReporter};
