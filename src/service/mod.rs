//! Running a worker as a managed service, and administering that service.

#[cfg(target_os = "linux")]
pub mod admin;
pub mod command;
pub mod console;
pub mod runner;
pub mod status;
#[cfg(target_os = "linux")]
pub mod systemd;

#[cfg(target_os = "linux")]
pub use admin::{wait_for_state, StateQuery, SystemdAdmin};
pub use command::{usage, ServiceCommand};
pub use console::{spawn_console_feed, ConsoleReporter};
pub use runner::{ControlRequestSource, PendingAcks, ServiceRunner, DEFAULT_INTERROGATE_DELAY};
pub use status::{
    Accepts, ControlKind, ControlRequest, ServiceHandle, ServiceState, ServiceStatus,
    StatusReporter,
};
#[cfg(target_os = "linux")]
pub use systemd::{launched_by_manager, NotifyReporter};
